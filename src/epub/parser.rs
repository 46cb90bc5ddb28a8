//! EPUB parsing utilities (container.xml, OPF, NCX, EPUB 3 nav)

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::book::{Metadata, TocEntry};
use crate::epub::markup::resolve_entity;
use crate::error::{Error, Result};
use crate::util::strip_bom;

/// Well-known location of the container descriptor.
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

/// A manifest `<item>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub href: String,
    pub media_type: String,
    pub properties: Option<String>,
}

/// Parsed OPF package data.
#[derive(Debug, Clone, Default)]
pub struct OpfData {
    pub metadata: Metadata,
    /// Maps manifest id -> item
    pub manifest: HashMap<String, ManifestItem>,
    pub spine_ids: Vec<String>,
    pub ncx_href: Option<String>,
    pub nav_href: Option<String>,
}

/// Parse META-INF/container.xml to find the OPF path.
pub fn parse_container_xml(bytes: &[u8]) -> Result<String> {
    let content = String::from_utf8(strip_bom(bytes).to_vec())?;

    let mut reader = Reader::from_str(&content);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e))
                if local_name(e.name().as_ref()) == b"rootfile" =>
            {
                if let Some(path) = attr_string(&e, b"full-path")?
                    && !path.is_empty()
                {
                    return Ok(path);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    Err(Error::MissingDescriptor)
}

/// Parse OPF package document.
pub fn parse_opf(content: &str) -> Result<OpfData> {
    // Text is trimmed per field; trimming events would eat spaces around entities.
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(false);

    let mut opf = OpfData::default();
    let mut toc_id: Option<String> = None;

    let mut in_metadata = false;
    let mut current_element: Option<Vec<u8>> = None;
    let mut buf_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                match local {
                    b"metadata" => in_metadata = true,
                    b"title" | b"creator" | b"language" if in_metadata => {
                        current_element = Some(local.to_vec());
                        buf_text.clear();
                    }
                    _ => read_opf_element(&e, &mut opf, &mut toc_id)?,
                }
            }
            Ok(Event::Empty(e)) => read_opf_element(&e, &mut opf, &mut toc_id)?,
            Ok(Event::Text(e)) => {
                if current_element.is_some() {
                    buf_text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if current_element.is_some()
                    && let Some(c) = resolve_entity(&String::from_utf8_lossy(e.as_ref()))
                {
                    buf_text.push(c);
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                if local == b"metadata" {
                    in_metadata = false;
                }

                if let Some(elem) = current_element.take() {
                    let value = buf_text.trim().to_string();
                    match elem.as_slice() {
                        b"title" if opf.metadata.title.is_empty() => opf.metadata.title = value,
                        b"creator" if !value.is_empty() => opf.metadata.authors.push(value),
                        b"language" if opf.metadata.language.is_empty() => {
                            opf.metadata.language = value
                        }
                        _ => {}
                    }
                    buf_text.clear();
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    // NCX: spine toc attribute first, then any manifest item of the NCX media type.
    opf.ncx_href = toc_id
        .and_then(|id| opf.manifest.get(&id))
        .or_else(|| {
            let mut ncx: Vec<_> = opf
                .manifest
                .iter()
                .filter(|(_, item)| item.media_type == NCX_MEDIA_TYPE)
                .collect();
            ncx.sort_by(|a, b| a.0.cmp(b.0));
            ncx.first().map(|(_, item)| *item)
        })
        .map(|item| item.href.clone());

    // EPUB 3 navigation document
    let mut nav: Vec<_> = opf
        .manifest
        .iter()
        .filter(|(_, item)| {
            item.properties
                .as_ref()
                .is_some_and(|props| props.split_ascii_whitespace().any(|p| p == "nav"))
        })
        .collect();
    nav.sort_by(|a, b| a.0.cmp(b.0));
    opf.nav_href = nav.first().map(|(_, item)| item.href.clone());

    Ok(opf)
}

/// Handle `<item>`, `<itemref>` and `<spine>`, whether empty or not.
fn read_opf_element(
    e: &BytesStart<'_>,
    opf: &mut OpfData,
    toc_id: &mut Option<String>,
) -> Result<()> {
    let name = e.name();
    match local_name(name.as_ref()) {
        b"item" => {
            let mut id = String::new();
            let mut item = ManifestItem {
                href: String::new(),
                media_type: String::new(),
                properties: None,
            };

            for attr in e.attributes().flatten() {
                let value = String::from_utf8(attr.value.to_vec())?;
                match attr.key.as_ref() {
                    b"id" => id = value,
                    b"href" => item.href = value,
                    b"media-type" => item.media_type = value,
                    b"properties" => item.properties = Some(value),
                    _ => {}
                }
            }

            if !id.is_empty() && !item.href.is_empty() {
                opf.manifest.insert(id, item);
            }
        }
        b"itemref" => {
            if let Some(idref) = attr_string(e, b"idref")? {
                opf.spine_ids.push(idref);
            }
        }
        b"spine" => {
            if let Some(id) = attr_string(e, b"toc")? {
                *toc_id = Some(id);
            }
        }
        _ => {}
    }
    Ok(())
}

/// Parse NCX table of contents, flattened depth-first.
pub fn parse_ncx(content: &str) -> Result<Vec<TocEntry>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(false);

    // One label per open navPoint; the label precedes its <content>.
    let mut labels: Vec<Option<String>> = Vec::new();
    let mut in_text = false;
    let mut entries = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"navPoint" => labels.push(None),
                    b"text" => in_text = true,
                    b"content" => push_ncx_entry(&e, &mut labels, &mut entries)?,
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                if local_name(e.name().as_ref()) == b"content" {
                    push_ncx_entry(&e, &mut labels, &mut entries)?;
                }
            }
            Ok(Event::Text(e)) => {
                if in_text && let Some(label) = labels.last_mut() {
                    label
                        .get_or_insert_with(String::new)
                        .push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if in_text
                    && let Some(label) = labels.last_mut()
                    && let Some(c) = resolve_entity(&String::from_utf8_lossy(e.as_ref()))
                {
                    label.get_or_insert_with(String::new).push(c);
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"text" => in_text = false,
                    b"navPoint" => {
                        labels.pop();
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    Ok(entries)
}

fn push_ncx_entry(
    e: &BytesStart<'_>,
    labels: &mut [Option<String>],
    entries: &mut Vec<TocEntry>,
) -> Result<()> {
    let Some(src) = attr_string(e, b"src")? else {
        return Ok(());
    };
    if let Some(Some(label)) = labels.last_mut().map(Option::take) {
        let title = collapse_whitespace(&label);
        if !title.is_empty() {
            entries.push(TocEntry::new(title, src));
        }
    }
    Ok(())
}

/// Parse the `toc` navigation list of an EPUB 3 nav document.
pub fn parse_nav_toc(content: &str) -> Result<Vec<TocEntry>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = false;

    let mut nav_depth = 0usize;
    let mut anchor: Option<(String, String)> = None;
    let mut entries = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"nav" if nav_depth > 0 => nav_depth += 1,
                    b"nav" => {
                        let is_toc = e.attributes().flatten().any(|attr| {
                            local_name(attr.key.as_ref()) == b"type"
                                && attr
                                    .value
                                    .split(|b| b.is_ascii_whitespace())
                                    .any(|v| v == b"toc")
                        });
                        if is_toc {
                            nav_depth = 1;
                        }
                    }
                    b"a" if nav_depth > 0 => {
                        anchor = attr_string(&e, b"href")?.map(|href| (href, String::new()));
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if let Some((_, text)) = anchor.as_mut() {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if let Some((_, text)) = anchor.as_mut()
                    && let Some(c) = resolve_entity(&String::from_utf8_lossy(e.as_ref()))
                {
                    text.push(c);
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"nav" if nav_depth > 0 => nav_depth -= 1,
                    b"a" => {
                        if let Some((href, text)) = anchor.take() {
                            let title = collapse_whitespace(&text);
                            if !title.is_empty() {
                                entries.push(TocEntry::new(title, href));
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    Ok(entries)
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

/// Extract local name from namespaced XML name (e.g., "dc:title" -> "title").
fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

/// Value of the attribute `key`, if present.
fn attr_string(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == key {
            return Ok(Some(String::from_utf8(attr.value.to_vec())?));
        }
    }
    Ok(None)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
