//! Markup to plain reading text.
//!
//! [`html_to_text`] is a small tag-stripping state machine rather than a chain
//! of pattern substitutions, so its output never depends on substitution
//! order:
//!
//! - **Text**: characters are copied, `&entity;` references decoded.
//! - **Tag**: everything up to the closing `>` (quotes respected) is buffered,
//!   then classified: block ends become paragraph breaks, `<br>` becomes a
//!   space, `<script>`/`<style>`/`<head>` switch to raw-skip.
//! - **Raw**: content is dropped until the matching end tag.
//! - **Comment**: dropped until `-->`.
//!
//! Paragraph breaks are recorded by starting a new output paragraph, never as
//! a marker character, so every decoded input character survives. Whitespace
//! is collapsed afterwards and paragraphs are joined with a single blank line
//! (`"\n\n"`).

use memchr::memmem;

/// Closing any of these ends a paragraph.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "h1", "h2", "h3", "h4", "h5", "h6", "li", "blockquote", "section", "article",
    "tr", "pre", "header", "footer", "aside", "figure", "figcaption", "table", "ul", "ol", "dl",
    "dd", "dt", "nav", "body",
];

/// Elements whose content is never reading text.
const RAW_TAGS: &[&str] = &["script", "style", "head"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    Tag { quote: Option<char> },
    Raw(&'static str),
    Comment,
}

/// Text collected so far, split at paragraph breaks.
#[derive(Debug, Default)]
struct Paragraphs {
    done: Vec<String>,
    current: String,
}

impl Paragraphs {
    fn push(&mut self, c: char) {
        self.current.push(c);
    }

    fn break_paragraph(&mut self) {
        self.done.push(std::mem::take(&mut self.current));
    }

    fn finish(mut self) -> String {
        self.break_paragraph();
        finish_paragraphs(&self.done)
    }
}

/// Convert an HTML/XHTML document to plain text with paragraph breaks.
pub fn html_to_text(html: &str) -> String {
    let mut text = Paragraphs::default();
    let mut tag = String::new();
    let mut state = State::Text;
    let mut i = 0;

    while let Some(ch) = html[i..].chars().next() {
        let rest = &html[i..];
        let mut advance = ch.len_utf8();

        match state {
            State::Text => match ch {
                '<' if rest.starts_with("<!--") => {
                    state = State::Comment;
                    advance = 4;
                }
                '<' if rest[1..].starts_with(|c: char| c.is_ascii_alphabetic() || "/!?".contains(c)) => {
                    tag.clear();
                    state = State::Tag { quote: None };
                }
                '&' => match decode_entity_at(rest) {
                    Some((decoded, len)) => {
                        text.push(decoded);
                        advance = len;
                    }
                    None => text.push('&'),
                },
                _ => text.push(ch),
            },
            State::Tag { quote } => match (ch, quote) {
                ('>', None) => {
                    state = apply_tag(&tag, &mut text);
                }
                ('"' | '\'', None) => {
                    tag.push(ch);
                    state = State::Tag { quote: Some(ch) };
                }
                (c, Some(q)) if c == q => {
                    tag.push(ch);
                    state = State::Tag { quote: None };
                }
                _ => tag.push(ch),
            },
            State::Raw(name) => {
                if ch == '<' && is_end_tag_of(rest, name) {
                    tag.clear();
                    state = State::Tag { quote: None };
                }
            }
            State::Comment => {
                if rest.starts_with("-->") {
                    state = State::Text;
                    advance = 3;
                }
            }
        }

        i += advance;
    }

    text.finish()
}

/// Classify a completed tag (contents between `<` and `>`) and return the
/// state that follows it.
fn apply_tag(tag: &str, out: &mut Paragraphs) -> State {
    if tag.starts_with('!') || tag.starts_with('?') {
        return State::Text;
    }

    let closing = tag.starts_with('/');
    let self_closing = tag.ends_with('/');
    let name = tag_name(tag);

    if closing {
        if BLOCK_TAGS.contains(&name.as_str()) {
            out.break_paragraph();
        }
        return State::Text;
    }

    match name.as_str() {
        "br" => out.push(' '),
        "hr" => out.break_paragraph(),
        _ if !self_closing => {
            if let Some(&raw) = RAW_TAGS.iter().find(|t| **t == name) {
                return State::Raw(raw);
            }
        }
        _ => {}
    }
    State::Text
}

/// Lowercased local name of a tag body such as `/html:p class="x"`.
fn tag_name(tag: &str) -> String {
    let body = tag.trim_start_matches('/');
    let end = body
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(body.len());
    let qualified = &body[..end];
    let local = qualified.rsplit(':').next().unwrap_or(qualified);
    local.to_ascii_lowercase()
}

fn is_end_tag_of(rest: &str, name: &str) -> bool {
    let Some(after) = rest.strip_prefix("</") else {
        return false;
    };
    after.len() >= name.len()
        && after.as_bytes()[..name.len()].eq_ignore_ascii_case(name.as_bytes())
        && after[name.len()..].starts_with(|c: char| c == '>' || c.is_whitespace())
}

/// Collapse whitespace runs to single spaces and join non-empty paragraphs
/// with one blank line.
fn finish_paragraphs(paragraphs: &[String]) -> String {
    let mut out = String::new();
    for paragraph in paragraphs {
        let mut words = paragraph.split_whitespace().peekable();
        if words.peek().is_none() {
            continue;
        }
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        for (n, word) in words.enumerate() {
            if n > 0 {
                out.push(' ');
            }
            out.push_str(word);
        }
    }
    out
}

/// Decode an `&name;` reference at the start of `s`, returning the character
/// and the number of bytes consumed.
fn decode_entity_at(s: &str) -> Option<(char, usize)> {
    let body = &s[1..];
    let end = body
        .char_indices()
        .take(12)
        .find(|&(_, c)| c == ';')
        .map(|(pos, _)| pos)?;
    let name = &body[..end];
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '#') {
        return None;
    }
    resolve_entity(name).map(|c| (c, end + 2))
}

/// Resolve a named or numeric character reference (without `&` and `;`).
///
/// Covers the XML built-ins, `nbsp`, typographic quotes and dashes, and any
/// decimal (`#8217`) or hex (`#x2019`) code point.
pub fn resolve_entity(entity: &str) -> Option<char> {
    let named = match entity {
        "nbsp" => ' ',
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "hellip" => '\u{2026}',
        "ldquo" => '\u{201C}',
        "rdquo" => '\u{201D}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        _ => {
            let code = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse::<u32>().ok()?
            };
            return char::from_u32(code);
        }
    };
    Some(named)
}

/// Text of the document's most prominent heading: the first `<h1>`, else
/// `<h2>`, else `<h3>`, else `<title>`. Empty headings are ignored.
pub fn extract_heading(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    ["h1", "h2", "h3", "title"]
        .iter()
        .find_map(|name| element_text(html, &lower, name))
}

fn element_text(html: &str, lower: &str, name: &str) -> Option<String> {
    let open = format!("<{}", name);
    let close = format!("</{}", name);
    let finder = memmem::Finder::new(open.as_bytes());

    for start in finder.find_iter(lower.as_bytes()) {
        let after_name = start + open.len();
        // Reject prefixes of longer names such as <h1x> or <titles>.
        if !lower[after_name..].starts_with(|c: char| c == '>' || c.is_whitespace()) {
            continue;
        }
        let content_start = after_name + lower[after_name..].find('>')? + 1;
        let content_end = content_start + memmem::find(&lower.as_bytes()[content_start..], close.as_bytes())?;
        let text = html_to_text(&html[content_start..content_end]);
        let title = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !title.is_empty() {
            return Some(title);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraphs_and_inline_tags() {
        let html = "<html><body><p>First <em>para</em>graph.</p>\n<p>Second\n   line.</p></body></html>";
        assert_eq!(html_to_text(html), "First paragraph.\n\nSecond line.");
    }

    #[test]
    fn test_script_style_and_head_removed() {
        let html = r#"<html><head><title>Ignored</title><style>p { color: red; }</style></head>
<body><script type="text/javascript">if (a < b) { alert("<p>"); }</script><p>Visible</p></body></html>"#;
        assert_eq!(html_to_text(html), "Visible");
    }

    #[test]
    fn test_line_breaks_become_spaces() {
        assert_eq!(html_to_text("<p>one<br/>two<br>three</p>"), "one two three");
    }

    #[test]
    fn test_entities_decoded() {
        let html = "<p>&ldquo;Fish &amp; chips,&rdquo; she said&hellip; &mdash; &#39;ok&#x27; &lt;p&gt;</p>";
        assert_eq!(
            html_to_text(html),
            "\u{201C}Fish & chips,\u{201D} she said\u{2026} \u{2014} 'ok' <p>"
        );
    }

    #[test]
    fn test_unknown_entity_left_alone() {
        assert_eq!(html_to_text("<p>AT&T &bogus; a & b</p>"), "AT&T &bogus; a & b");
    }

    #[test]
    fn test_comments_and_doctype_removed() {
        let html = "<!DOCTYPE html><?xml version=\"1.0\"?><p>a<!-- <p>hidden</p> -->b</p>";
        assert_eq!(html_to_text(html), "ab");
    }

    #[test]
    fn test_quoted_gt_inside_attribute() {
        assert_eq!(html_to_text(r#"<p title="a > b">text</p>"#), "text");
    }

    #[test]
    fn test_stray_less_than_is_text() {
        assert_eq!(html_to_text("<p>1 < 2</p>"), "1 < 2");
    }

    #[test]
    fn test_no_more_than_one_blank_line() {
        let html = "<div><div><p>a</p></div></div><hr/><p></p><p>b</p>";
        assert_eq!(html_to_text(html), "a\n\nb");
    }

    #[test]
    fn test_private_use_characters_kept() {
        assert_eq!(html_to_text("<p>icon\u{E000}glyph</p>"), "icon\u{E000}glyph");
        assert_eq!(html_to_text("<p>\u{E001}</p><p>b&#xE000;</p>"), "\u{E001}\n\nb\u{E000}");
    }

    #[test]
    fn test_namespaced_and_uppercase_tags() {
        assert_eq!(html_to_text("<html:P>a</html:P><P>b</P>"), "a\n\nb");
        assert_eq!(html_to_text("<SCRIPT>x</SCRIPT><p>y</p>"), "y");
    }

    #[test]
    fn test_resolve_entity() {
        assert_eq!(resolve_entity("apos"), Some('\''));
        assert_eq!(resolve_entity("nbsp"), Some(' '));
        assert_eq!(resolve_entity("rsquo"), Some('\u{2019}'));
        assert_eq!(resolve_entity("#65"), Some('A'));
        assert_eq!(resolve_entity("#x2019"), Some('\u{2019}'));
        assert_eq!(resolve_entity("invalid"), None);
        assert_eq!(resolve_entity("#xZZ"), None);
    }

    #[test]
    fn test_extract_heading_priority() {
        let html = "<html><head><title>Book Title</title></head><body><h2>Sub</h2><h1 class=\"c\">Main <em>Heading</em></h1></body></html>";
        assert_eq!(extract_heading(html).as_deref(), Some("Main Heading"));

        let html = "<html><head><title>Only Title</title></head><body><p>x</p></body></html>";
        assert_eq!(extract_heading(html).as_deref(), Some("Only Title"));

        assert_eq!(extract_heading("<p>no heading</p>"), None);
        assert_eq!(extract_heading("<h1> </h1><h2>Fallback</h2>").as_deref(), Some("Fallback"));
    }

    #[test]
    fn test_extract_heading_ignores_longer_names() {
        assert_eq!(extract_heading("<header>x</header><h1>Real</h1>").as_deref(), Some("Real"));
    }
}
