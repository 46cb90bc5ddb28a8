//! RTF to plain text.
//!
//! Only the text-bearing parts of the format are interpreted: paragraph and
//! line controls, tabs, hex and Unicode escapes, and escaped braces.
//! Formatting groups such as the font table, stylesheet, and `{\*...}`
//! destinations are dropped wholesale.

use log::debug;

/// Groups whose content is never body text.
const SKIPPED_DESTINATIONS: &[&str] = &[
    "fonttbl", "colortbl", "stylesheet", "info", "pict", "header", "footer", "headerl",
    "headerr", "footerl", "footerr", "listtable", "listoverridetable", "rsidtbl", "generator",
    "themedata", "colorschememapping", "latentstyles", "datastore", "xmlnstbl",
];

#[derive(Debug, Clone, Copy)]
struct Group {
    skip: bool,
    /// Characters to drop after a `\uN` escape (`\ucN`).
    uc_skip: usize,
}

/// Extract plain text from an RTF document.
///
/// `\par` becomes a paragraph break (`"\n\n"`), `\line` a single newline,
/// `\tab` a tab. Input that does not start with `{\rtf` is returned as-is,
/// decoded like a plain-text file.
pub fn rtf_to_text(data: &[u8]) -> String {
    let trimmed = data.trim_ascii_start();
    if !trimmed.starts_with(b"{\\rtf") {
        debug!("rtf: no {{\\rtf header, treating as plain text");
        return crate::util::decode_text(data, None).into_owned();
    }

    let mut out = String::with_capacity(data.len() / 2);
    let mut stack: Vec<Group> = Vec::new();
    let mut current = Group { skip: false, uc_skip: 1 };
    // Characters still to drop after a \u escape.
    let mut pending_skip = 0usize;
    let mut i = 0;

    while i < data.len() {
        let b = data[i];
        match b {
            b'{' => {
                stack.push(current);
                pending_skip = 0;
                i += 1;
            }
            b'}' => {
                current = stack.pop().unwrap_or(Group { skip: false, uc_skip: 1 });
                pending_skip = 0;
                i += 1;
            }
            b'\\' => {
                let (control, next) = read_control(data, i + 1);
                i = next;
                match control {
                    Control::Symbol(c) => {
                        if !consume_skip(&mut pending_skip) && !current.skip {
                            out.push(c);
                        }
                    }
                    Control::Hex(byte) => {
                        if !consume_skip(&mut pending_skip) && !current.skip {
                            out.push(windows_1252(byte));
                        }
                    }
                    Control::Destination => current.skip = true,
                    Control::Word(word, param) => {
                        if SKIPPED_DESTINATIONS.contains(&word.as_str()) {
                            current.skip = true;
                            continue;
                        }
                        if current.skip {
                            continue;
                        }
                        match word.as_str() {
                            "par" | "sect" | "page" => out.push_str("\n\n"),
                            "line" => out.push('\n'),
                            "tab" => out.push('\t'),
                            "emdash" => out.push('\u{2014}'),
                            "endash" => out.push('\u{2013}'),
                            "lquote" => out.push('\u{2018}'),
                            "rquote" => out.push('\u{2019}'),
                            "ldblquote" => out.push('\u{201C}'),
                            "rdblquote" => out.push('\u{201D}'),
                            "bullet" => out.push('\u{2022}'),
                            "uc" => current.uc_skip = param.unwrap_or(1).max(0) as usize,
                            "u" => {
                                if let Some(code) = param {
                                    // Negative values encode code points above 0x7FFF.
                                    let code = if code < 0 { code + 65536 } else { code };
                                    if let Some(c) = u32::try_from(code).ok().and_then(char::from_u32) {
                                        out.push(c);
                                    }
                                    pending_skip = current.uc_skip;
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
            b'\r' | b'\n' => i += 1,
            _ => {
                // Plain run up to the next special byte.
                let end = data[i..]
                    .iter()
                    .position(|&c| matches!(c, b'{' | b'}' | b'\\' | b'\r' | b'\n'))
                    .map_or(data.len(), |p| i + p);
                if !current.skip {
                    let run = crate::util::decode_text(&data[i..end], None);
                    for c in run.chars() {
                        if !consume_skip(&mut pending_skip) {
                            out.push(c);
                        }
                    }
                }
                i = end;
            }
        }
    }

    out
}

enum Control {
    Word(String, Option<i32>),
    Symbol(char),
    Hex(u8),
    Destination,
}

/// Parse the control sequence following a backslash at `start`.
fn read_control(data: &[u8], start: usize) -> (Control, usize) {
    let Some(&first) = data.get(start) else {
        return (Control::Word(String::new(), None), start);
    };

    if first.is_ascii_alphabetic() {
        let mut end = start;
        while end < data.len() && data[end].is_ascii_alphabetic() {
            end += 1;
        }
        let word = String::from_utf8_lossy(&data[start..end]).into_owned();

        let num_start = end;
        if end < data.len() && data[end] == b'-' {
            end += 1;
        }
        while end < data.len() && data[end].is_ascii_digit() {
            end += 1;
        }
        let param = std::str::from_utf8(&data[num_start..end])
            .ok()
            .and_then(|s| s.parse().ok());

        // A single space delimiter belongs to the control word.
        if end < data.len() && data[end] == b' ' {
            end += 1;
        }
        return (Control::Word(word, param), end);
    }

    match first {
        b'\'' => {
            let hex = data.get(start + 1..start + 3);
            let byte = hex
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            match byte {
                Some(byte) => (Control::Hex(byte), start + 3),
                None => (Control::Word(String::new(), None), start + 1),
            }
        }
        b'*' => (Control::Destination, start + 1),
        b'~' => (Control::Symbol('\u{00A0}'), start + 1),
        b'-' | b'_' => (Control::Word(String::new(), None), start + 1),
        b'\r' | b'\n' => (Control::Word("par".into(), None), start + 1),
        other => (Control::Symbol(other as char), start + 1),
    }
}

fn consume_skip(pending: &mut usize) -> bool {
    if *pending > 0 {
        *pending -= 1;
        true
    } else {
        false
    }
}

fn windows_1252(byte: u8) -> char {
    let bytes = [byte];
    let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
    decoded.chars().next().unwrap_or('\u{FFFD}')
}
