use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, info, warn};

use super::paginate::{CancelToken, PageSet, paginate};
use super::{FrameMeasurer, LayoutConfig};
use crate::error::Result;

struct PaginationRequest {
    generation: u64,
    text: Arc<str>,
    config: LayoutConfig,
    token: CancelToken,
}

/// A completed pagination run.
#[derive(Debug, Clone)]
pub struct PaginationResult {
    /// Request number this result answers; later requests have larger numbers.
    pub generation: u64,
    pub config: LayoutConfig,
    pub pages: Arc<PageSet>,
}

/// Background pagination worker.
///
/// Each [`request`](Paginator::request) cancels the run before it and gets a
/// new generation number. The worker thread checks the run's token between
/// measurer calls, so a superseded run stops at its next check. A run that
/// finishes just as it is superseded may still send a result; readers drop it
/// by comparing generations ([`try_latest`](Paginator::try_latest) and
/// [`wait`](Paginator::wait) only hand out the current one).
pub struct Paginator {
    requests: Option<Sender<PaginationRequest>>,
    results: Receiver<PaginationResult>,
    worker: Option<JoinHandle<()>>,
    generation: u64,
    current: Option<CancelToken>,
    worker_lost: bool,
}

impl Paginator {
    /// Start the worker thread.
    pub fn new(measurer: Arc<dyn FrameMeasurer>) -> Result<Self> {
        let (request_tx, request_rx) = crossbeam_channel::unbounded::<PaginationRequest>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded();

        let worker = thread::Builder::new()
            .name("vellum-paginate".into())
            .spawn(move || run_worker(request_rx, result_tx, measurer))?;

        Ok(Self {
            requests: Some(request_tx),
            results: result_rx,
            worker: Some(worker),
            generation: 0,
            current: None,
            worker_lost: false,
        })
    }

    /// Start paginating `text` under `config`, superseding any earlier run.
    ///
    /// Returns the request's generation.
    pub fn request(&mut self, text: Arc<str>, config: LayoutConfig) -> u64 {
        self.cancel();
        self.generation += 1;

        let token = CancelToken::new();
        let request = PaginationRequest {
            generation: self.generation,
            text,
            config,
            token: token.clone(),
        };

        match self.requests.as_ref().map(|tx| tx.send(request)) {
            Some(Ok(())) => self.current = Some(token),
            _ => warn!("paginate: worker is gone, request {} dropped", self.generation),
        }
        self.generation
    }

    /// Cancel the in-flight run, if any (for example when the document is
    /// unloaded). Its result will never be handed out.
    pub fn cancel(&mut self) {
        if let Some(token) = self.current.take() {
            token.cancel();
            debug!("paginate: cancelled generation {}", self.generation);
        }
    }

    /// Generation of the most recent request.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a current run has neither completed nor been cancelled.
    pub fn is_pending(&self) -> bool {
        self.current.is_some()
    }

    /// Non-blocking: the current generation's result if it has arrived.
    /// Stale results are discarded along the way.
    pub fn try_latest(&mut self) -> Option<PaginationResult> {
        loop {
            match self.results.try_recv() {
                Ok(result) => {
                    if let Some(result) = self.accept(result) {
                        return Some(result);
                    }
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => {
                    self.worker_disconnected();
                    return None;
                }
            }
        }
    }

    /// Block until the current generation's result arrives.
    ///
    /// Returns `None` immediately if nothing is pending.
    pub fn wait(&mut self) -> Option<PaginationResult> {
        while self.is_pending() {
            let Ok(result) = self.results.recv() else {
                self.worker_disconnected();
                return None;
            };
            if let Some(result) = self.accept(result) {
                return Some(result);
            }
        }
        None
    }

    /// Like [`wait`](Paginator::wait), giving up after `timeout`.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<PaginationResult> {
        let deadline = std::time::Instant::now() + timeout;
        while self.is_pending() {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            match self.results.recv_timeout(remaining) {
                Ok(result) => {
                    if let Some(result) = self.accept(result) {
                        return Some(result);
                    }
                }
                Err(RecvTimeoutError::Timeout) => return None,
                Err(RecvTimeoutError::Disconnected) => {
                    self.worker_disconnected();
                    return None;
                }
            }
        }
        None
    }

    /// The worker exited (a measurer panicked); nothing pending can finish.
    fn worker_disconnected(&mut self) {
        self.current = None;
        if !self.worker_lost {
            self.worker_lost = true;
            warn!("paginate: worker thread exited, generation {} will not complete", self.generation);
        }
    }

    fn accept(&mut self, result: PaginationResult) -> Option<PaginationResult> {
        if result.generation != self.generation || !self.is_pending() {
            debug!(
                "paginate: discarding stale generation {} (current {})",
                result.generation, self.generation
            );
            return None;
        }
        self.current = None;
        Some(result)
    }
}

impl Drop for Paginator {
    fn drop(&mut self) {
        self.cancel();
        // Closing the request channel ends the worker loop.
        self.requests.take();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("paginate: worker thread panicked");
        }
    }
}

fn run_worker(
    requests: Receiver<PaginationRequest>,
    results: Sender<PaginationResult>,
    measurer: Arc<dyn FrameMeasurer>,
) {
    while let Ok(mut request) = requests.recv() {
        // Only the newest queued request matters.
        while let Ok(newer) = requests.try_recv() {
            request = newer;
        }
        if request.token.is_cancelled() {
            continue;
        }

        debug!(
            "paginate: generation {} started ({} bytes)",
            request.generation,
            request.text.len()
        );
        let Some(pages) = paginate(&request.text, &request.config, measurer.as_ref(), &request.token)
        else {
            debug!("paginate: generation {} cancelled", request.generation);
            continue;
        };

        info!(
            "paginate: generation {} finished with {} pages",
            request.generation,
            pages.len()
        );
        let result = PaginationResult {
            generation: request.generation,
            config: request.config,
            pages: Arc::new(pages),
        };
        if results.send(result).is_err() {
            break;
        }
    }
}
