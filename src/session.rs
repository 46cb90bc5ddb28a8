//! A reading session: one loaded document, its current pagination, and the
//! reader's position in it.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use crate::book::{Document, DocumentRecord};
use crate::error::Result;
use crate::layout::{FrameMeasurer, LayoutConfig, PageSet, PaginationResult, Paginator};
use crate::locator::page_index_for_chapter;

/// Receives `(page, progress)` after every navigation, typically to persist
/// the reading position.
pub trait ProgressSink: Send {
    fn report(&mut self, page: usize, progress: f64);
}

impl<F> ProgressSink for F
where
    F: FnMut(usize, f64) + Send,
{
    fn report(&mut self, page: usize, progress: f64) {
        self(page, progress)
    }
}

/// Reading state over a [`Document`].
///
/// Layout changes go through [`relayout`](ReaderSession::relayout), which
/// supersedes any pagination still running. Results are picked up with
/// [`poll`](ReaderSession::poll) or [`wait`](ReaderSession::wait); only the
/// newest request's pages are ever published, and publication swaps the page
/// set in one step. Until the first publication the page list is empty.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use vellum::{Document, LayoutConfig, MonospaceMeasurer, ReaderSession};
///
/// let doc = Document::open("book.epub")?;
/// let mut session = ReaderSession::new(doc, Arc::new(MonospaceMeasurer::default()))?;
/// session.relayout(LayoutConfig::default())?;
/// session.wait();
/// println!("page 1 of {}:\n{}", session.page_count(), session.current_page_text().unwrap_or(""));
/// # Ok::<(), vellum::Error>(())
/// ```
pub struct ReaderSession {
    document: Document,
    paginator: Paginator,
    pages: Arc<PageSet>,
    layout: Option<LayoutConfig>,
    published: Option<u64>,
    current_page: usize,
    restart_page: Option<usize>,
    sink: Option<Box<dyn ProgressSink>>,
}

impl ReaderSession {
    pub fn new(document: Document, measurer: Arc<dyn FrameMeasurer>) -> Result<Self> {
        Ok(Self {
            document,
            paginator: Paginator::new(measurer)?,
            pages: Arc::new(PageSet::default()),
            layout: None,
            published: None,
            current_page: 0,
            restart_page: None,
            sink: None,
        })
    }

    /// Resume at the record's stored page once the first pages arrive.
    pub fn with_record(self, record: &DocumentRecord) -> Self {
        self.with_restart_page(record.current_page)
    }

    pub fn with_restart_page(mut self, page: usize) -> Self {
        self.restart_page = Some(page);
        self
    }

    pub fn with_progress_sink(mut self, sink: impl ProgressSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Repaginate under `config`. Any run still in progress is cancelled.
    pub fn relayout(&mut self, config: LayoutConfig) -> Result<u64> {
        config.validate()?;
        let generation = self.paginator.request(self.document.shared_text(), config);
        debug!("session: requested layout generation {}", generation);
        Ok(generation)
    }

    /// Publish the newest pagination if it has finished. Returns whether
    /// new pages were published.
    pub fn poll(&mut self) -> bool {
        match self.paginator.try_latest() {
            Some(result) => self.publish(result),
            None => false,
        }
    }

    /// Block until the newest pagination finishes and publish it.
    pub fn wait(&mut self) -> bool {
        match self.paginator.wait() {
            Some(result) => self.publish(result),
            None => false,
        }
    }

    pub fn wait_timeout(&mut self, timeout: Duration) -> bool {
        match self.paginator.wait_timeout(timeout) {
            Some(result) => self.publish(result),
            None => false,
        }
    }

    /// Whether a requested layout has not been published yet.
    pub fn is_paginating(&self) -> bool {
        self.paginator.is_pending()
    }

    /// Cancel pagination and hand back the document.
    pub fn unload(self) -> Document {
        let ReaderSession {
            document,
            mut paginator,
            ..
        } = self;
        paginator.cancel();
        document
    }

    fn publish(&mut self, result: PaginationResult) -> bool {
        if self.published.is_some_and(|published| result.generation <= published) {
            return false;
        }

        self.pages = result.pages;
        self.layout = Some(result.config);
        self.published = Some(result.generation);

        if let Some(page) = self.restart_page.take() {
            self.current_page = page;
        }
        let last = self.pages.len().saturating_sub(1);
        if self.current_page > last {
            debug!("session: clamping page {} to {}", self.current_page, last);
            self.current_page = last;
        }

        info!(
            "session: published generation {} ({} pages, at page {})",
            result.generation,
            self.pages.len(),
            self.current_page
        );
        true
    }

    /// The published page set, shared.
    pub fn pages(&self) -> Arc<PageSet> {
        Arc::clone(&self.pages)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Layout of the published pages.
    pub fn layout(&self) -> Option<&LayoutConfig> {
        self.layout.as_ref()
    }

    pub fn published_generation(&self) -> Option<u64> {
        self.published
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn current_page_text(&self) -> Option<&str> {
        self.pages.page(self.current_page)
    }

    /// Fraction of the document read, counting the current page.
    pub fn progress(&self) -> f64 {
        match self.pages.len() {
            0 => 0.0,
            n => (self.current_page + 1) as f64 / n as f64,
        }
    }

    pub fn next_page(&mut self) -> bool {
        if self.current_page + 1 < self.pages.len() {
            self.set_page(self.current_page + 1);
            true
        } else {
            false
        }
    }

    pub fn previous_page(&mut self) -> bool {
        if self.current_page > 0 && !self.pages.is_empty() {
            self.set_page(self.current_page - 1);
            true
        } else {
            false
        }
    }

    /// Jump to `page`, clamped to the published range. Returns the page
    /// actually shown.
    pub fn go_to_page(&mut self, page: usize) -> usize {
        let page = page.min(self.pages.len().saturating_sub(1));
        self.set_page(page);
        page
    }

    /// Jump to the page where chapter `index` starts.
    pub fn go_to_chapter(&mut self, index: usize) -> Option<usize> {
        let chapter = self.document.chapters().get(index)?;
        let page = page_index_for_chapter(chapter.start_offset, self.pages.offsets(), self.pages.len());
        self.set_page(page);
        Some(page)
    }

    /// Chapter whose text the page begins in.
    pub fn chapter_for_page(&self, page: usize) -> Option<usize> {
        let start = *self.pages.offsets().get(page)?;
        let text = self.document.text();
        let skipped = text[start..].len() - text[start..].trim_start().len();
        self.document.chapter_at(start + skipped)
    }

    pub fn current_chapter(&self) -> Option<usize> {
        self.chapter_for_page(self.current_page)
    }

    fn set_page(&mut self, page: usize) {
        if page == self.current_page {
            return;
        }
        self.current_page = page;
        let progress = self.progress();
        if let Some(sink) = self.sink.as_mut() {
            sink.report(page, progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::book::{DocumentSource, FileType, LoadOptions};
    use crate::layout::{FrameSize, TextStyle};

    fn fixed(n: usize) -> Arc<dyn FrameMeasurer> {
        Arc::new(move |_: &str, _: &TextStyle, _: FrameSize| n)
    }

    fn document(text: &str) -> Document {
        Document::load(
            DocumentSource::PlainText(text.as_bytes().to_vec()),
            &LoadOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_publish_and_navigate() {
        let mut session = ReaderSession::new(document(&"x".repeat(100)), fixed(10)).unwrap();
        assert_eq!(session.page_count(), 0);
        assert_eq!(session.progress(), 0.0);

        session.relayout(LayoutConfig::default()).unwrap();
        assert!(session.wait());
        assert_eq!(session.page_count(), 10);
        assert_eq!(session.current_page(), 0);
        assert_eq!(session.published_generation(), Some(1));

        assert!(!session.previous_page());
        assert!(session.next_page());
        assert_eq!(session.current_page(), 1);
        assert_eq!(session.go_to_page(50), 9);
        assert!(!session.next_page());
        assert_eq!(session.progress(), 1.0);
    }

    #[test]
    fn test_restart_page_applied_and_clamped() {
        let record = crate::book::DocumentRecord::new("a.txt", FileType::Txt).with_current_page(3);
        let mut session = ReaderSession::new(document(&"y".repeat(100)), fixed(10))
            .unwrap()
            .with_record(&record);
        session.relayout(LayoutConfig::default()).unwrap();
        session.wait();
        assert_eq!(session.current_page(), 3);

        let mut session = ReaderSession::new(document(&"y".repeat(100)), fixed(10))
            .unwrap()
            .with_restart_page(40);
        session.relayout(LayoutConfig::default()).unwrap();
        session.wait();
        assert_eq!(session.current_page(), 9);
    }

    #[test]
    fn test_relayout_clamps_current_page() {
        let by_font: Arc<dyn FrameMeasurer> =
            Arc::new(|_: &str, style: &TextStyle, _: FrameSize| style.font_size as usize);
        let mut session = ReaderSession::new(document(&"z".repeat(100)), by_font).unwrap();
        let sized = |font_size: f64| LayoutConfig {
            font_size,
            ..LayoutConfig::default()
        };

        session.relayout(sized(10.0)).unwrap();
        session.wait();
        assert_eq!(session.page_count(), 10);
        session.go_to_page(8);

        session.relayout(sized(50.0)).unwrap();
        assert!(session.wait());
        assert_eq!(session.published_generation(), Some(2));
        assert_eq!(session.page_count(), 2);
        assert_eq!(session.current_page(), 1);
        assert_eq!(session.current_page_text(), Some(&"z".repeat(50)[..]));
    }

    #[test]
    fn test_invalid_layout_rejected() {
        let mut session = ReaderSession::new(document("text"), fixed(10)).unwrap();
        let config = LayoutConfig {
            font_size: 0.0,
            ..LayoutConfig::default()
        };
        assert!(session.relayout(config).is_err());
        assert!(!session.is_paginating());
    }

    #[test]
    fn test_progress_sink_reports_navigation() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink_reports = Arc::clone(&reports);
        let mut session = ReaderSession::new(document(&"w".repeat(40)), fixed(10))
            .unwrap()
            .with_progress_sink(move |page: usize, progress: f64| {
                sink_reports.lock().unwrap().push((page, progress));
            });

        session.relayout(LayoutConfig::default()).unwrap();
        session.wait();
        session.next_page();
        session.go_to_page(3);
        session.go_to_page(3);

        assert_eq!(*reports.lock().unwrap(), vec![(1, 0.5), (3, 1.0)]);
    }
}
