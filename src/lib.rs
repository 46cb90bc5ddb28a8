//! # vellum
//!
//! Document ingestion and pagination for a reading application.
//!
//! ## Features
//!
//! - Load e-book packages (ZIP container, OPF descriptor, NCX or nav TOC)
//! - Load flat text, RTF, and page-extracted PDF text
//! - Normalize everything into one full-text buffer with a chapter table
//! - Paginate in the background against a pluggable text-frame measurer,
//!   with newer layout requests superseding older ones
//! - Map chapters to pages and track reading progress
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use vellum::{Document, LayoutConfig, MonospaceMeasurer, ReaderSession};
//!
//! let doc = Document::open("book.epub")?;
//! println!("{} by {}", doc.metadata().title, doc.metadata().authors.join(", "));
//!
//! let mut session = ReaderSession::new(doc, Arc::new(MonospaceMeasurer::default()))?;
//! session.relayout(LayoutConfig::default())?;
//! session.wait();
//!
//! if let Some(page) = session.go_to_chapter(2) {
//!     println!("chapter 3 starts on page {}", page + 1);
//! }
//! # Ok::<(), vellum::Error>(())
//! ```
//!
//! ## Paginating directly
//!
//! Pagination is a pure function of the text, the layout, and the measurer:
//!
//! ```
//! use vellum::{CancelToken, FrameSize, LayoutConfig, TextStyle, paginate};
//!
//! let fit_ten = |_: &str, _: &TextStyle, _: FrameSize| 10;
//! let pages = paginate(&"x".repeat(35), &LayoutConfig::default(), &fit_ten, &CancelToken::new())
//!     .expect("not cancelled");
//!
//! assert_eq!(pages.len(), 4);
//! assert_eq!(pages.offsets(), &[0, 10, 20, 30]);
//! ```

pub mod archive;
pub mod book;
pub mod epub;
pub mod error;
pub mod layout;
pub mod locator;
pub mod normalize;
pub mod rtf;
pub mod session;
pub(crate) mod util;

pub use book::{
    Chapter, Document, DocumentRecord, DocumentSource, ExtractMode, FileType, LoadOptions, Metadata,
    PageTextExtractor, SourceKind, TocEntry, spawn_load,
};
pub use error::{Error, Result};
pub use layout::{
    CancelToken, FrameMeasurer, FrameSize, LayoutConfig, MonospaceMeasurer, PageSet, PaginationResult,
    Paginator, TextStyle, paginate,
};
pub use session::{ProgressSink, ReaderSession};
