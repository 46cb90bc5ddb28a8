use log::{debug, info, warn};
use percent_encoding::percent_decode_str;

use crate::archive::FileTree;
use crate::book::{Chapter, Metadata, TocEntry};
use crate::error::{Error, Result};
use crate::util::{archive_dir, archive_file_name, decode_markup, join_archive_path, normalize_archive_path};

use super::markup::{extract_heading, html_to_text};
use super::parser::{CONTAINER_PATH, OpfData, parse_container_xml, parse_nav_toc, parse_ncx, parse_opf};

/// Separator placed between chapters in the concatenated text.
pub const CHAPTER_SEPARATOR: &str = "\n\n";

/// A parsed package: metadata, TOC, chapters, and their concatenation.
///
/// `chapters[i].start_offset` is the byte offset of chapter `i` in `text`,
/// and `text` is exactly the chapter contents joined by [`CHAPTER_SEPARATOR`].
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub metadata: Metadata,
    pub toc: Vec<TocEntry>,
    pub chapters: Vec<Chapter>,
    pub text: String,
}

/// A content document resolved from the spine (or the fallback scan).
struct Resolved {
    path: String,
    markup: String,
}

/// Parse an extracted package into ordered chapters.
///
/// Only a missing root descriptor is fatal. Spine items that cannot be
/// resolved to a readable document are skipped, and an unreadable TOC just
/// means chapters are titled from their headings instead.
///
/// # Example
///
/// ```no_run
/// use vellum::archive::{self, FileTree};
/// use vellum::epub::parse_package;
///
/// let data = std::fs::read("book.epub")?;
/// let tree = archive::extract(&data)?;
/// let package = parse_package(&tree)?;
/// for chapter in &package.chapters {
///     println!("{} @ {}", chapter.title, chapter.start_offset);
/// }
/// # Ok::<(), vellum::Error>(())
/// ```
pub fn parse_package<T: FileTree + ?Sized>(tree: &T) -> Result<Package> {
    // 1. Locate and parse the package descriptor
    let opf_path = find_opf_path(tree)?;
    let opf_dir = archive_dir(&opf_path);
    let opf = read_opf(tree, &opf_path);

    // 2. Table of contents (NCX, else EPUB 3 nav)
    let toc = read_toc(tree, &opf, &opf_dir);

    // 3. Resolve the spine in reading order
    let mut documents: Vec<Resolved> = opf
        .spine_ids
        .iter()
        .filter_map(|id| {
            let Some(item) = opf.manifest.get(id) else {
                warn!("epub: spine idref '{}' not in manifest, skipping", id);
                return None;
            };
            let resolved = resolve_href(tree, &opf_dir, &item.href);
            if resolved.is_none() {
                warn!("epub: could not resolve spine item '{}' ({}), skipping", id, item.href);
            }
            resolved
        })
        .collect();

    // 4. Fall back to every markup file in the archive
    if documents.is_empty() {
        info!("epub: spine yielded no chapters, scanning archive for markup files");
        documents = scan_markup_files(tree);
    }

    let chapters = build_chapters(documents, &toc);
    let text = concatenate(&chapters);

    debug!(
        "epub: {} chapters, {} bytes of text from {}",
        chapters.len(),
        text.len(),
        opf_path
    );

    Ok(Package {
        metadata: opf.metadata,
        toc,
        chapters,
        text,
    })
}

/// Parse an extracted package into its ordered chapter list.
pub fn parse_chapters<T: FileTree + ?Sized>(tree: &T) -> Result<Vec<Chapter>> {
    parse_package(tree).map(|package| package.chapters)
}

/// Descriptor path from container.xml, else the first `.opf` in the tree.
fn find_opf_path<T: FileTree + ?Sized>(tree: &T) -> Result<String> {
    if let Some(bytes) = tree.read_file(CONTAINER_PATH) {
        match parse_container_xml(&bytes) {
            Ok(path) => {
                let path = normalize_archive_path(&path);
                if tree.contains_file(&path) {
                    return Ok(path);
                }
                warn!("epub: container points at missing descriptor '{}'", path);
            }
            Err(e) => warn!("epub: unusable container.xml: {}", e),
        }
    } else {
        debug!("epub: no {}, searching for a package descriptor", CONTAINER_PATH);
    }

    tree.file_paths()
        .into_iter()
        .find(|path| path.to_ascii_lowercase().ends_with(".opf"))
        .ok_or(Error::MissingDescriptor)
}

/// Parse the descriptor; a malformed one yields an empty spine so the
/// archive scan still runs.
fn read_opf<T: FileTree + ?Sized>(tree: &T, opf_path: &str) -> OpfData {
    let Some(bytes) = tree.read_file(opf_path) else {
        return OpfData::default();
    };
    match parse_opf(&decode_markup(&bytes)) {
        Ok(opf) => opf,
        Err(e) => {
            warn!("epub: could not parse {}: {}", opf_path, e);
            OpfData::default()
        }
    }
}

fn read_toc<T: FileTree + ?Sized>(tree: &T, opf: &OpfData, opf_dir: &str) -> Vec<TocEntry> {
    let sources: [(Option<&str>, fn(&str) -> Result<Vec<TocEntry>>); 2] = [
        (opf.ncx_href.as_deref(), parse_ncx),
        (opf.nav_href.as_deref(), parse_nav_toc),
    ];

    for (href, parse) in sources {
        let Some(href) = href else { continue };
        let path = join_archive_path(opf_dir, href);
        let Some(bytes) = tree.read_file(&path) else {
            warn!("epub: TOC file '{}' not found", path);
            continue;
        };
        match parse(&decode_markup(&bytes)) {
            Ok(toc) if !toc.is_empty() => return toc,
            Ok(_) => debug!("epub: TOC file '{}' has no entries", path),
            Err(e) => warn!("epub: could not parse TOC '{}': {}", path, e),
        }
    }
    Vec::new()
}

/// Try the raw href, then its percent-decoded form (both relative to the
/// descriptor), then the decoded form relative to the archive root.
fn resolve_href<T: FileTree + ?Sized>(tree: &T, opf_dir: &str, href: &str) -> Option<Resolved> {
    let decoded = percent_decode_str(href).decode_utf8_lossy();
    let candidates = [
        join_archive_path(opf_dir, href),
        join_archive_path(opf_dir, &decoded),
        join_archive_path("", &decoded),
    ];

    candidates.into_iter().find_map(|path| {
        let bytes = tree.read_file(&path)?;
        Some(Resolved {
            markup: decode_markup(&bytes).into_owned(),
            path,
        })
    })
}

fn scan_markup_files<T: FileTree + ?Sized>(tree: &T) -> Vec<Resolved> {
    let mut paths: Vec<String> = tree
        .file_paths()
        .into_iter()
        .filter(|path| {
            let lower = path.to_ascii_lowercase();
            [".html", ".xhtml", ".htm"].iter().any(|ext| lower.ends_with(ext))
        })
        .collect();
    paths.sort();

    paths
        .into_iter()
        .filter_map(|path| {
            let bytes = tree.read_file(&path)?;
            Some(Resolved {
                markup: decode_markup(&bytes).into_owned(),
                path,
            })
        })
        .collect()
}

fn build_chapters(documents: Vec<Resolved>, toc: &[TocEntry]) -> Vec<Chapter> {
    let mut chapters = Vec::with_capacity(documents.len());
    let mut numbered = 0usize;
    let mut offset = 0usize;

    for doc in documents {
        let content = html_to_text(&doc.markup);
        if !content.is_empty() {
            numbered += 1;
        }

        let title = toc_title(toc, &doc.path)
            .or_else(|| extract_heading(&doc.markup))
            .unwrap_or_else(|| {
                if content.is_empty() {
                    "Untitled".to_string()
                } else {
                    format!("Chapter {}", numbered)
                }
            });

        if !chapters.is_empty() {
            offset += CHAPTER_SEPARATOR.len();
        }

        let len = content.len();
        chapters.push(Chapter {
            title,
            content,
            source_file: doc.path,
            start_offset: offset,
        });
        offset += len;
    }

    chapters
}

/// Title of the first TOC entry whose file name contains, or is contained
/// in, the document's file name.
fn toc_title(toc: &[TocEntry], path: &str) -> Option<String> {
    let file = archive_file_name(path);
    if file.is_empty() {
        return None;
    }

    toc.iter()
        .find(|entry| {
            let href = percent_decode_str(&entry.href).decode_utf8_lossy();
            let target = archive_file_name(&href);
            !target.is_empty() && (target.contains(file) || file.contains(target))
        })
        .map(|entry| entry.title.clone())
}

fn concatenate(chapters: &[Chapter]) -> String {
    chapters
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join(CHAPTER_SEPARATOR)
}
