use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};

use super::{FrameMeasurer, LayoutConfig};

/// Cooperative cancellation flag shared between a requester and a run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Pages of one pagination run, with the untrimmed start offset of each.
///
/// `offsets` is strictly ascending and has one entry per page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSet {
    pages: Vec<String>,
    offsets: Vec<usize>,
}

impl PageSet {
    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    /// Byte offset in the full text where each page's fitted range begins.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn page(&self, index: usize) -> Option<&str> {
        self.pages.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Fit `text` into consecutive frames.
///
/// Greedy forward fill: from the cursor, the measurer reports how much text
/// fits one frame; that range (trimmed) becomes a page and the cursor moves
/// past it. Whitespace-only ranges produce no page. If nothing fits, the
/// rest of the text becomes one final page.
///
/// `token` is checked before every measurer call and once more before
/// returning; a cancelled run returns `None`.
pub fn paginate(
    text: &str,
    config: &LayoutConfig,
    measurer: &dyn FrameMeasurer,
    token: &CancelToken,
) -> Option<PageSet> {
    let style = config.text_style();
    let frame = config.frame();
    let mut set = PageSet::default();
    let mut cursor = 0usize;

    while cursor < text.len() {
        if token.is_cancelled() {
            debug!("paginate: cancelled at offset {} of {}", cursor, text.len());
            return None;
        }

        let rest = &text[cursor..];
        let fitted = ceil_char_boundary(rest, measurer.fit(rest, &style, frame));
        let end = if fitted == 0 {
            warn!(
                "paginate: nothing fits a {:.0}x{:.0} frame at offset {}, emitting remaining {} bytes as one page",
                frame.width,
                frame.height,
                cursor,
                rest.len()
            );
            text.len()
        } else {
            cursor + fitted
        };

        let page = text[cursor..end].trim();
        if !page.is_empty() {
            set.pages.push(page.to_string());
            set.offsets.push(cursor);
        }
        cursor = end;
    }

    if token.is_cancelled() {
        debug!("paginate: cancelled before publishing");
        return None;
    }

    debug!("paginate: {} pages from {} bytes", set.len(), text.len());
    Some(set)
}

/// Clamp `index` to `s.len()` and round it up to a char boundary.
fn ceil_char_boundary(s: &str, index: usize) -> usize {
    let mut index = index.min(s.len());
    while !s.is_char_boundary(index) {
        index += 1;
    }
    index
}
