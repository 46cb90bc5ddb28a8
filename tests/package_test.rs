//! Package loading tests.
//!
//! Archives are assembled in memory, either from bare local headers or with
//! the `zip` crate, then parsed through both extraction modes.

mod common;

use std::io::{Cursor, Write};

use common::{ArchiveBuilder, CONTAINER_XML, opf, xhtml};
use vellum::archive::{self, FileTree, ScratchTree};
use vellum::epub::{CHAPTER_SEPARATOR, parse_chapters, parse_package};
use vellum::{Document, DocumentSource, Error, LoadOptions, SourceKind};
use zip::write::SimpleFileOptions;

// ============================================================================
// Spine parsing
// ============================================================================

#[test]
fn test_three_entry_archive_two_chapters() {
    let chapter = xhtml("Chapter", "<h1>The Start</h1><p>It was a dark night.</p>");
    let data = ArchiveBuilder::new()
        .stored("META-INF/container.xml", CONTAINER_XML.as_bytes())
        .stored(
            "OEBPS/content.opf",
            opf("Two Parts", &[("one", "chapter.xhtml"), ("two", "chapter.xhtml")], &["one", "two"]).as_bytes(),
        )
        .deflated("OEBPS/chapter.xhtml", chapter.as_bytes())
        .build();

    let tree = archive::extract(&data).unwrap();
    assert_eq!(tree.len(), 3);

    let chapters = parse_chapters(&tree).unwrap();
    assert_eq!(chapters.len(), 2);
    assert_eq!(chapters[0].start_offset, 0);
    assert_eq!(chapters[1].start_offset, chapters[0].content.len() + 2);
    assert_eq!(chapters[0].content, "The Start\n\nIt was a dark night.");
    assert_eq!(chapters[0].title, "The Start");
}

#[test]
fn test_offsets_index_full_text() {
    let data = ArchiveBuilder::new()
        .stored("META-INF/container.xml", CONTAINER_XML.as_bytes())
        .stored(
            "OEBPS/content.opf",
            opf(
                "Offsets",
                &[("a", "text/a.xhtml"), ("b", "text/b.xhtml"), ("c", "text/c.xhtml")],
                &["a", "b", "c"],
            )
            .as_bytes(),
        )
        .deflated("OEBPS/text/a.xhtml", xhtml("A", "<p>Alpha paragraph.</p>").as_bytes())
        .deflated("OEBPS/text/b.xhtml", xhtml("B", "<p>Caf&#233; au lait.</p>").as_bytes())
        .stored("OEBPS/text/c.xhtml", xhtml("C", "<p>Gamma.</p><p>Delta.</p>").as_bytes())
        .build();

    let package = parse_package(&archive::extract(&data).unwrap()).unwrap();
    assert_eq!(package.chapters.len(), 3);

    let total: usize = package.chapters.iter().map(|c| c.content.len()).sum::<usize>()
        + CHAPTER_SEPARATOR.len() * (package.chapters.len() - 1);
    assert_eq!(total, package.text.len());

    for chapter in &package.chapters {
        let end = chapter.start_offset + chapter.content.len();
        assert_eq!(&package.text[chapter.start_offset..end], chapter.content);
    }
    assert_eq!(package.chapters[1].content, "Café au lait.");
}

#[test]
fn test_metadata_and_toc_titles() {
    let opf_xml = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Navigated</dc:title>
    <dc:creator>Jane Doe</dc:creator>
    <dc:language>fr</dc:language>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="c1" href="c1.xhtml" media-type="application/xhtml+xml"/>
    <item id="c2" href="c2.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx"><itemref idref="c1"/><itemref idref="c2"/></spine>
</package>"#;
    let ncx = r#"<?xml version="1.0"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/">
  <navMap>
    <navPoint id="p1"><navLabel><text>Arrival</text></navLabel><content src="c1.xhtml"/></navPoint>
    <navPoint id="p2"><navLabel><text>Departure</text></navLabel><content src="c2.xhtml#start"/></navPoint>
  </navMap>
</ncx>"#;

    let data = ArchiveBuilder::new()
        .stored("META-INF/container.xml", CONTAINER_XML.as_bytes())
        .stored("OEBPS/content.opf", opf_xml.as_bytes())
        .stored("OEBPS/toc.ncx", ncx.as_bytes())
        .deflated("OEBPS/c1.xhtml", xhtml("x", "<p>One.</p>").as_bytes())
        .deflated("OEBPS/c2.xhtml", xhtml("y", "<p>Two.</p>").as_bytes())
        .build();

    let package = parse_package(&archive::extract(&data).unwrap()).unwrap();
    assert_eq!(package.metadata.title, "Navigated");
    assert_eq!(package.metadata.authors, vec!["Jane Doe"]);
    assert_eq!(package.metadata.language, "fr");
    assert_eq!(package.toc.len(), 2);

    let titles: Vec<_> = package.chapters.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["Arrival", "Departure"]);
}

// ============================================================================
// Fallbacks
// ============================================================================

#[test]
fn test_descriptor_found_without_container() {
    let data = ArchiveBuilder::new()
        .stored("book/package.opf", opf("Loose", &[("c", "c.xhtml")], &["c"]).as_bytes())
        .stored("book/c.xhtml", xhtml("Loose", "<p>Body text.</p>").as_bytes())
        .build();

    let package = parse_package(&archive::extract(&data).unwrap()).unwrap();
    assert_eq!(package.metadata.title, "Loose");
    assert_eq!(package.text, "Body text.");
}

#[test]
fn test_missing_descriptor() {
    let data = ArchiveBuilder::new()
        .stored("c.xhtml", xhtml("x", "<p>Orphan.</p>").as_bytes())
        .build();

    let result = parse_package(&archive::extract(&data).unwrap());
    assert!(matches!(result, Err(Error::MissingDescriptor)));
}

#[test]
fn test_unresolvable_spine_scans_markup_files() {
    let data = ArchiveBuilder::new()
        .stored("META-INF/container.xml", CONTAINER_XML.as_bytes())
        .stored("OEBPS/content.opf", opf("Broken", &[("c", "missing.xhtml")], &["c"]).as_bytes())
        .stored("OEBPS/b.html", xhtml("B", "<p>Second.</p>").as_bytes())
        .stored("OEBPS/a.xhtml", xhtml("A", "<p>First.</p>").as_bytes())
        .stored("OEBPS/style.css", b"p { margin: 0 }")
        .build();

    let chapters = parse_chapters(&archive::extract(&data).unwrap()).unwrap();
    let sources: Vec<_> = chapters.iter().map(|c| c.source_file.as_str()).collect();
    assert_eq!(sources, vec!["OEBPS/a.xhtml", "OEBPS/b.html"]);
}

#[test]
fn test_percent_encoded_href() {
    let data = ArchiveBuilder::new()
        .stored("META-INF/container.xml", CONTAINER_XML.as_bytes())
        .stored("OEBPS/content.opf", opf("Spaces", &[("c", "my%20chapter.xhtml")], &["c"]).as_bytes())
        .deflated("OEBPS/my chapter.xhtml", xhtml("Spaced", "<p>Found.</p>").as_bytes())
        .build();

    let chapters = parse_chapters(&archive::extract(&data).unwrap()).unwrap();
    assert_eq!(chapters.len(), 1);
    assert_eq!(chapters[0].source_file, "OEBPS/my chapter.xhtml");
}

// ============================================================================
// Extraction modes
// ============================================================================

fn zip_crate_package() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    writer.start_file("mimetype", stored).unwrap();
    writer.write_all(b"application/epub+zip").unwrap();
    writer.start_file("META-INF/container.xml", deflated).unwrap();
    writer.write_all(CONTAINER_XML.as_bytes()).unwrap();
    writer.start_file("OEBPS/content.opf", deflated).unwrap();
    writer
        .write_all(opf("Zipped", &[("a", "a.xhtml"), ("b", "b.xhtml")], &["a", "b"]).as_bytes())
        .unwrap();
    writer.start_file("OEBPS/a.xhtml", deflated).unwrap();
    writer
        .write_all(xhtml("A", &"<p>The first chapter goes on.</p>".repeat(40)).as_bytes())
        .unwrap();
    writer.start_file("OEBPS/b.xhtml", deflated).unwrap();
    writer.write_all(xhtml("B", "<p>The end.</p>").as_bytes()).unwrap();

    writer.finish().unwrap().into_inner()
}

#[test]
fn test_zip_crate_archive_loads() {
    let data = zip_crate_package();
    let tree = archive::extract(&data).unwrap();
    assert!(tree.contains_file("OEBPS/a.xhtml"));

    let package = parse_package(&tree).unwrap();
    assert_eq!(package.metadata.title, "Zipped");
    assert_eq!(package.chapters.len(), 2);
    assert_eq!(package.chapters[1].content, "The end.");
}

#[test]
fn test_scratch_and_memory_modes_agree() {
    let data = zip_crate_package();

    let scratch = Document::load(DocumentSource::Package(data.clone()), &LoadOptions::default()).unwrap();
    let memory = Document::load(DocumentSource::Package(data), &LoadOptions::in_memory()).unwrap();

    assert_eq!(scratch.kind(), SourceKind::Package);
    assert_eq!(scratch.text(), memory.text());
    assert_eq!(scratch.chapters(), memory.chapters());
    assert_eq!(scratch.metadata().authors, vec!["Test Author"]);
}

#[test]
fn test_scratch_directory_removed_on_drop() {
    let data = zip_crate_package();
    let tree = ScratchTree::extract(&data).unwrap();
    let path = tree.path().to_path_buf();

    assert!(path.join("OEBPS/content.opf").is_file());
    assert_eq!(tree.file_paths().len(), 5);

    drop(tree);
    assert!(!path.exists());
}

#[test]
fn test_scratch_directory_removed_after_load() {
    let root = tempfile::TempDir::new().unwrap();
    let options = LoadOptions::default().with_scratch_root(root.path());

    let orphan = ArchiveBuilder::new()
        .stored("c.xhtml", xhtml("x", "<p>Orphan.</p>").as_bytes())
        .build();
    let result = Document::load(DocumentSource::Package(orphan), &options);
    assert!(matches!(result, Err(Error::MissingDescriptor)));
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);

    let doc = Document::load(DocumentSource::Package(zip_crate_package()), &options).unwrap();
    assert_eq!(doc.metadata().title, "Zipped");
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[test]
fn test_unwritable_entry_skipped_in_scratch_mode() {
    // "junk" is written as a file, so "junk/inner.txt" has no directory to land in.
    let data = ArchiveBuilder::new()
        .stored("book.opf", opf("Clash", &[("c", "c.xhtml")], &["c"]).as_bytes())
        .stored("c.xhtml", xhtml("C", "<p>Hello.</p>").as_bytes())
        .stored("junk", b"a plain file")
        .stored("junk/inner.txt", b"nested")
        .build();

    for options in [LoadOptions::default(), LoadOptions::in_memory()] {
        let doc = Document::load(DocumentSource::Package(data.clone()), &options).unwrap();
        assert_eq!(doc.text(), "Hello.");
    }
}

#[test]
fn test_unreadable_archive_is_format_error() {
    let data = b"this is not a zip archive at all".to_vec();
    for options in [LoadOptions::default(), LoadOptions::in_memory()] {
        let result = Document::load(DocumentSource::Package(data.clone()), &options);
        assert!(matches!(result, Err(Error::Format(_))));
    }
}

#[test]
fn test_package_without_text_is_empty_extraction() {
    let data = ArchiveBuilder::new()
        .stored("META-INF/container.xml", CONTAINER_XML.as_bytes())
        .stored("OEBPS/content.opf", opf("Blank", &[("c", "c.xhtml")], &["c"]).as_bytes())
        .stored("OEBPS/c.xhtml", b"<html><body><p>   </p></body></html>")
        .build();

    let result = Document::load(DocumentSource::Package(data), &LoadOptions::in_memory());
    assert!(matches!(result, Err(Error::EmptyExtraction)));
}

#[test]
fn test_open_from_disk() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("novel.epub");
    std::fs::write(&path, zip_crate_package()).unwrap();

    let doc = Document::open(&path).unwrap();
    assert_eq!(doc.metadata().title, "Zipped");
    assert_eq!(doc.chapter_at(doc.chapters()[1].start_offset), Some(1));
}
