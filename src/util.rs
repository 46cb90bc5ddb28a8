//! Text decoding and archive path helpers shared by the loaders.

use std::borrow::Cow;

/// Decode bytes to a string, handling various encodings.
///
/// This function:
/// 1. First tries UTF-8 (handles BOM automatically via encoding_rs)
/// 2. If malformed, tries the hint encoding (from `<?xml encoding="..."?>`)
/// 3. Falls back to Windows-1252 (common in old ebooks and plain-text files)
///
/// Uses `Cow<str>` to avoid allocation when the input is valid UTF-8.
pub fn decode_text<'a>(bytes: &'a [u8], hint_encoding: Option<&str>) -> Cow<'a, str> {
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);

    if !malformed {
        return result;
    }

    if let Some(name) = hint_encoding
        && let Some(encoding) = encoding_rs::Encoding::for_label(name.as_bytes())
    {
        let (result, _, _) = encoding.decode(bytes);
        return result;
    }

    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    result
}

/// Decode a markup document, honouring its XML declaration when UTF-8 fails.
pub fn decode_markup(bytes: &[u8]) -> Cow<'_, str> {
    decode_text(bytes, extract_xml_encoding(bytes))
}

/// Strip UTF-8 BOM if present.
pub fn strip_bom(data: &[u8]) -> &[u8] {
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &data[3..]
    } else {
        data
    }
}

/// Extract encoding from XML declaration.
///
/// Parses `<?xml ... encoding="..." ?>` in the first 100 bytes and returns
/// the encoding name if found.
pub fn extract_xml_encoding(bytes: &[u8]) -> Option<&str> {
    let check_len = bytes.len().min(100);
    let prefix = &bytes[..check_len];

    let xml_start = memchr::memmem::find(prefix, b"<?xml")?;
    let after_xml = &prefix[xml_start..];

    let enc_pos = after_xml
        .windows(9)
        .position(|w| w.eq_ignore_ascii_case(b"encoding="))?;
    let after_enc = &after_xml[enc_pos + 9..];

    let &quote = after_enc.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }

    let value_end = after_enc[1..].iter().position(|&b| b == quote)? + 1;
    std::str::from_utf8(&after_enc[1..value_end]).ok()
}

/// Join an href onto a base directory inside an archive, collapsing `.` and
/// `..` segments and dropping any `#fragment`.
///
/// `base_dir` is a directory path (`"OEBPS/"`, `"OEBPS"`, or `""`).
///
/// ```ignore
/// assert_eq!(join_archive_path("OEBPS/text/", "../images/a.png"), "OEBPS/images/a.png");
/// assert_eq!(join_archive_path("OEBPS/", "/ch1.xhtml"), "ch1.xhtml");
/// ```
pub fn join_archive_path(base_dir: &str, href: &str) -> String {
    let href = strip_fragment(href);

    // Absolute hrefs are relative to the archive root.
    if let Some(rooted) = href.strip_prefix('/') {
        return normalize_archive_path(rooted);
    }

    let mut stack: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    stack.join("/")
}

/// Normalize an archive path: forward slashes, no leading `./` or `/`,
/// `.`/`..` segments collapsed.
pub fn normalize_archive_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    join_archive_path("", path.trim_start_matches('/'))
}

/// Directory portion of an archive path, with a trailing slash (or empty).
pub fn archive_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(pos) => path[..=pos].to_string(),
        None => String::new(),
    }
}

/// Final path segment of an archive path.
pub fn archive_file_name(path: &str) -> &str {
    let path = strip_fragment(path);
    path.rsplit('/').next().unwrap_or(path)
}

/// Remove a trailing `#fragment`.
pub fn strip_fragment(href: &str) -> &str {
    href.split('#').next().unwrap_or(href)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_bom() {
        let with_bom = &[0xEF, 0xBB, 0xBF, b'h', b'i'];
        assert_eq!(strip_bom(with_bom), b"hi");
        assert_eq!(strip_bom(b"hello"), b"hello");
        assert_eq!(strip_bom(&[]), &[] as &[u8]);

        // Partial BOM (not stripped)
        let partial = &[0xEF, 0xBB, b'x'];
        assert_eq!(strip_bom(partial), partial);
    }

    #[test]
    fn test_decode_text_utf8() {
        assert_eq!(decode_text("caf\u{e9}".as_bytes(), None), "caf\u{e9}");
    }

    #[test]
    fn test_decode_text_falls_back_to_windows_1252() {
        // 0x93/0x94 are curly double quotes in CP1252 and invalid UTF-8.
        let bytes = b"\x93Hi\x94";
        assert_eq!(decode_text(bytes, None), "\u{201c}Hi\u{201d}");
    }

    #[test]
    fn test_decode_text_uses_hint() {
        let bytes = b"caf\xe9";
        assert_eq!(decode_text(bytes, Some("iso-8859-1")), "caf\u{e9}");
    }

    #[test]
    fn test_extract_xml_encoding() {
        assert_eq!(
            extract_xml_encoding(br#"<?xml version="1.0" encoding="UTF-8"?><a/>"#),
            Some("UTF-8")
        );
        assert_eq!(
            extract_xml_encoding(b"<?xml version='1.0' encoding='windows-1252'?>"),
            Some("windows-1252")
        );
        assert_eq!(extract_xml_encoding(b"<?xml version=\"1.0\"?>"), None);
        assert_eq!(extract_xml_encoding(b"<html>"), None);
    }

    #[test]
    fn test_join_archive_path() {
        assert_eq!(join_archive_path("OEBPS/", "ch1.xhtml"), "OEBPS/ch1.xhtml");
        assert_eq!(join_archive_path("OEBPS", "ch1.xhtml#top"), "OEBPS/ch1.xhtml");
        assert_eq!(join_archive_path("", "text/ch1.xhtml"), "text/ch1.xhtml");
        assert_eq!(
            join_archive_path("OEBPS/text/", "../images/a.png"),
            "OEBPS/images/a.png"
        );
        assert_eq!(join_archive_path("OEBPS/", "./ch1.xhtml"), "OEBPS/ch1.xhtml");
        assert_eq!(join_archive_path("OEBPS/", "/ch1.xhtml"), "ch1.xhtml");
    }

    #[test]
    fn test_normalize_archive_path() {
        assert_eq!(normalize_archive_path("./OEBPS/ch1.xhtml"), "OEBPS/ch1.xhtml");
        assert_eq!(normalize_archive_path("OEBPS\\ch1.xhtml"), "OEBPS/ch1.xhtml");
        assert_eq!(normalize_archive_path("/META-INF/container.xml"), "META-INF/container.xml");
    }

    #[test]
    fn test_archive_dir_and_file_name() {
        assert_eq!(archive_dir("OEBPS/content.opf"), "OEBPS/");
        assert_eq!(archive_dir("content.opf"), "");
        assert_eq!(archive_file_name("OEBPS/text/ch1.xhtml#s1"), "ch1.xhtml");
        assert_eq!(archive_file_name("ch1.xhtml"), "ch1.xhtml");
    }
}
