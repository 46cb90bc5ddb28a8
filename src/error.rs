//! Error types for document loading and layout.

use thiserror::Error;

/// Errors that can occur while loading a document or configuring layout.
///
/// Partial content (unresolvable spine items, unreadable TOC files, archive
/// entries with unsupported compression) is never reported here; those items
/// are skipped and logged. Pagination cancellation is not an error either.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// The archive is unreadable or contains no valid local file headers.
    #[error("could not open document: {0}")]
    Format(String),

    /// The package has no resolvable root descriptor.
    #[error("could not open document: no package descriptor found")]
    MissingDescriptor,

    /// Every extraction path produced blank text.
    #[error("could not extract readable text")]
    EmptyExtraction,

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid layout configuration: {0}")]
    InvalidConfig(String),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidConfig(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
