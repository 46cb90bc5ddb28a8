//! Document model and loading entry points.
//!
//! Every source kind (e-book package, page-extracted PDF text, flat text)
//! loads into the same [`Document`]: one full-text buffer plus an optional
//! chapter table. Loading is a single blocking unit of work; use
//! [`spawn_load`] to run it off the calling thread.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::Receiver;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::archive::{self, ScratchTree};
use crate::epub::{self, Package};
use crate::error::{Error, Result};
use crate::normalize::normalize;
use crate::rtf::rtf_to_text;
use crate::util::decode_text;

/// Package metadata (Dublin Core subset)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub title: String,
    pub authors: Vec<String>,
    pub language: String,
}

impl Metadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// A table of contents entry. `href` may carry a `#fragment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub title: String,
    pub href: String,
}

impl TocEntry {
    pub fn new(title: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            href: href.into(),
        }
    }
}

/// One chapter of a package, in spine order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub title: String,
    /// Plain text with paragraphs separated by blank lines.
    pub content: String,
    /// Archive path of the content document.
    pub source_file: String,
    /// Byte offset of `content` within the document's full text.
    pub start_offset: usize,
}

/// File type recorded for a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Epub,
    Txt,
    Rtf,
}

impl FileType {
    /// Detect from the file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(FileType::Pdf),
            "epub" => Some(FileType::Epub),
            "txt" | "text" => Some(FileType::Txt),
            "rtf" => Some(FileType::Rtf),
            _ => None,
        }
    }

    /// Detect from leading bytes; anything unrecognized is treated as text.
    pub fn sniff(data: &[u8]) -> Self {
        if data.starts_with(b"PK\x03\x04") {
            FileType::Epub
        } else if data.starts_with(b"%PDF") {
            FileType::Pdf
        } else if data.trim_ascii_start().starts_with(b"{\\rtf") {
            FileType::Rtf
        } else {
            FileType::Txt
        }
    }

    /// How documents of this type are ingested.
    pub fn source_kind(self) -> SourceKind {
        match self {
            FileType::Pdf => SourceKind::PdfExtracted,
            FileType::Epub => SourceKind::Package,
            FileType::Txt | FileType::Rtf => SourceKind::FlatText,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Epub => "epub",
            FileType::Txt => "txt",
            FileType::Rtf => "rtf",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Ingestion path a document took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Per-page text extracted from a PDF by the host, then normalized.
    PdfExtracted,
    /// Zip-based e-book package, parsed into chapters.
    Package,
    /// Plain or rich text file, normalized.
    FlatText,
}

/// A stored document as supplied by the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub file_path: PathBuf,
    pub file_type: FileType,
    /// Last page shown; used as the restart hint after pagination.
    #[serde(default)]
    pub current_page: usize,
}

impl DocumentRecord {
    pub fn new(file_path: impl Into<PathBuf>, file_type: FileType) -> Self {
        Self {
            file_path: file_path.into(),
            file_type,
            current_page: 0,
        }
    }

    pub fn with_current_page(mut self, page: usize) -> Self {
        self.current_page = page;
        self
    }
}

/// Host-provided PDF text extraction, one string per page.
pub trait PageTextExtractor {
    fn page_texts(&self, path: &Path) -> Result<Vec<String>>;
}

impl<F> PageTextExtractor for F
where
    F: Fn(&Path) -> Result<Vec<String>>,
{
    fn page_texts(&self, path: &Path) -> Result<Vec<String>> {
        self(path)
    }
}

/// Raw input to [`Document::load`].
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// Bytes of a zip-based e-book package.
    Package(Vec<u8>),
    /// Text already extracted from each page of a PDF.
    ExtractedPages(Vec<String>),
    /// Plain text file bytes, in any encoding `decode_text` understands.
    PlainText(Vec<u8>),
    /// RTF file bytes.
    RichText(Vec<u8>),
}

impl DocumentSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            DocumentSource::Package(_) => SourceKind::Package,
            DocumentSource::ExtractedPages(_) => SourceKind::PdfExtracted,
            DocumentSource::PlainText(_) | DocumentSource::RichText(_) => SourceKind::FlatText,
        }
    }

    /// Read a file of the given type. PDF files need a text extractor.
    pub fn read(
        path: &Path,
        file_type: FileType,
        extractor: Option<&dyn PageTextExtractor>,
    ) -> Result<Self> {
        match file_type {
            FileType::Pdf => {
                let extractor = extractor.ok_or_else(|| {
                    Error::UnsupportedFormat("pdf input needs a page text extractor".into())
                })?;
                Ok(DocumentSource::ExtractedPages(extractor.page_texts(path)?))
            }
            FileType::Epub => Ok(DocumentSource::Package(fs::read(path)?)),
            FileType::Txt => Ok(DocumentSource::PlainText(fs::read(path)?)),
            FileType::Rtf => Ok(DocumentSource::RichText(fs::read(path)?)),
        }
    }
}

/// Where package archives are materialized during parsing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractMode {
    /// A temporary directory, removed once parsing finishes or fails.
    #[default]
    Scratch,
    /// An in-memory tree.
    InMemory,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    #[serde(default)]
    pub extract_mode: ExtractMode,
    /// Parent of scratch directories; the system temp dir when unset.
    #[serde(default)]
    pub scratch_root: Option<PathBuf>,
}

impl LoadOptions {
    pub fn in_memory() -> Self {
        Self {
            extract_mode: ExtractMode::InMemory,
            ..Self::default()
        }
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }
}

/// A loaded document: full text plus chapter table.
///
/// The text is shared (`Arc<str>`) so pagination requests can hold it
/// without copying.
#[derive(Debug, Clone)]
pub struct Document {
    kind: SourceKind,
    metadata: Metadata,
    toc: Vec<TocEntry>,
    chapters: Vec<Chapter>,
    text: Arc<str>,
}

impl Document {
    /// Load a document from raw source data.
    ///
    /// Fails with [`Error::Format`] for an unreadable archive,
    /// [`Error::MissingDescriptor`] for a package without a descriptor, and
    /// [`Error::EmptyExtraction`] when no readable text was produced.
    pub fn load(source: DocumentSource, options: &LoadOptions) -> Result<Self> {
        let kind = source.kind();
        let (metadata, toc, chapters, text) = match source {
            DocumentSource::Package(data) => {
                let package = load_package(&data, options)?;
                (package.metadata, package.toc, package.chapters, package.text)
            }
            DocumentSource::ExtractedPages(pages) => {
                (Metadata::default(), Vec::new(), Vec::new(), normalize(pages.as_slice()))
            }
            DocumentSource::PlainText(data) => {
                let text = decode_text(&data, None);
                (Metadata::default(), Vec::new(), Vec::new(), normalize(&[text]))
            }
            DocumentSource::RichText(data) => {
                let text = rtf_to_text(&data);
                (Metadata::default(), Vec::new(), Vec::new(), normalize(&[text]))
            }
        };

        if text.trim().is_empty() {
            return Err(Error::EmptyExtraction);
        }

        info!(
            "loaded {:?} document: {} bytes, {} chapters",
            kind,
            text.len(),
            chapters.len()
        );

        Ok(Self {
            kind,
            metadata,
            toc,
            chapters,
            text: Arc::from(text),
        })
    }

    /// Open a file with default options, detecting its type.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use vellum::Document;
    ///
    /// let doc = Document::open("book.epub")?;
    /// println!("{} ({} chapters)", doc.metadata().title, doc.chapters().len());
    /// # Ok::<(), vellum::Error>(())
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, &LoadOptions::default(), None)
    }

    /// Open a file, detecting its type from the extension or leading bytes.
    pub fn open_with(
        path: impl AsRef<Path>,
        options: &LoadOptions,
        extractor: Option<&dyn PageTextExtractor>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file_type = match FileType::from_path(path) {
            Some(file_type) => file_type,
            None => FileType::sniff(&read_prefix(path)?),
        };
        Self::open_as(path, file_type, options, extractor)
    }

    /// Open the file a persistence record points at.
    pub fn open_record(
        record: &DocumentRecord,
        options: &LoadOptions,
        extractor: Option<&dyn PageTextExtractor>,
    ) -> Result<Self> {
        Self::open_as(&record.file_path, record.file_type, options, extractor)
    }

    fn open_as(
        path: &Path,
        file_type: FileType,
        options: &LoadOptions,
        extractor: Option<&dyn PageTextExtractor>,
    ) -> Result<Self> {
        debug!("opening {} as {}", path.display(), file_type);
        let source = DocumentSource::read(path, file_type, extractor)?;
        let mut doc = Self::load(source, options)?;

        if doc.metadata.title.is_empty()
            && let Some(stem) = path.file_stem()
        {
            doc.metadata.title = stem.to_string_lossy().into_owned();
        }
        Ok(doc)
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn toc(&self) -> &[TocEntry] {
        &self.toc
    }

    /// Chapters in reading order; empty for non-package sources.
    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Shared handle to the full text.
    pub fn shared_text(&self) -> Arc<str> {
        Arc::clone(&self.text)
    }

    /// Index of the chapter containing byte `offset`.
    pub fn chapter_at(&self, offset: usize) -> Option<usize> {
        self.chapters
            .partition_point(|c| c.start_offset <= offset)
            .checked_sub(1)
    }
}

fn load_package(data: &[u8], options: &LoadOptions) -> Result<Package> {
    match options.extract_mode {
        ExtractMode::Scratch => {
            let tree = match &options.scratch_root {
                Some(root) => ScratchTree::extract_in(data, root)?,
                None => ScratchTree::extract(data)?,
            };
            debug!("package extracted to {}", tree.path().display());
            epub::parse_package(&tree)
        }
        ExtractMode::InMemory => {
            let tree = archive::extract(data)?;
            epub::parse_package(&tree)
        }
    }
}

fn read_prefix(path: &Path) -> Result<Vec<u8>> {
    use std::io::Read;

    let mut prefix = Vec::with_capacity(64);
    fs::File::open(path)?.take(64).read_to_end(&mut prefix)?;
    Ok(prefix)
}

/// Load a document on a background thread.
///
/// The result arrives on the returned channel once extraction and parsing
/// finish; there is no partial delivery.
pub fn spawn_load(source: DocumentSource, options: LoadOptions) -> Result<Receiver<Result<Document>>> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::Builder::new()
        .name("vellum-load".into())
        .spawn(move || {
            // The receiver may have been dropped; nothing to report then.
            let _ = tx.send(Document::load(source, &options));
        })?;
    Ok(rx)
}
