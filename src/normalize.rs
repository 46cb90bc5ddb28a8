//! Cleanup of extracted page text (PDF, plain text, RTF) into continuous prose.
//!
//! Source text usually arrives hard-wrapped at a fixed width, with one string
//! per page. [`normalize`] joins the pages and unwraps the lines while keeping
//! paragraph breaks, scene breaks, and speaker turns.
//!
//! Paragraph and scene breaks are tracked as a list of blocks rather than as
//! marker characters, so any input text (`###`, private-use glyphs from icon
//! fonts) passes through untouched.

use std::sync::LazyLock;

use regex::Regex;

/// Canonical rendering of a scene break.
pub const SCENE_BREAK: &str = "* * *";

/// A line holding only `* * *`, `***`, or a run of three or more dashes.
static SCENE_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*(?:\*(?:[ \t]*\*){2,}|-{3,})[ \t]*$").unwrap());

static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]{2,}").unwrap());

/// A closing quote, an optional short attribution (`he said.`), then the next
/// opening quote on the same line.
static DIALOGUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^\s"]")((?: [A-Za-z][^"\n]{0,40}?[.!?,])?) +""#).unwrap()
});

#[derive(Debug, PartialEq)]
enum Block {
    Paragraph(String),
    SceneBreak,
}

/// Join per-page text and clean it up for reading.
///
/// Steps, in order: page join with a blank line, line-ending and quote
/// normalization, splitting into blocks at scene-break lines and blank
/// lines, unwrapping of the remaining single newlines, space collapsing, and
/// the dialogue line-break heuristic. Blocks are rejoined with exactly one
/// blank line between them.
///
/// The dialogue heuristic is best-effort: a quoted phrase followed by another
/// quoted phrase on the same line is split even when it is not speech.
///
/// ```
/// use vellum::normalize::normalize;
///
/// assert_eq!(normalize(&["Hello\nworld.\n\nNew para."]), "Hello world.\n\nNew para.");
/// ```
pub fn normalize<S: AsRef<str>>(pages: &[S]) -> String {
    let joined = pages
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n\n");

    // 1. Line endings
    let text = joined.replace("\r\n", "\n").replace('\r', "\n");

    // 2. Quotes
    let text = normalize_quotes(&text);

    // 3-6. Scene breaks, paragraphs, unwrapping, spaces
    let blocks = split_blocks(&text);

    blocks
        .iter()
        .map(|block| match block {
            Block::Paragraph(text) => text.as_str(),
            Block::SceneBreak => SCENE_BREAK,
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Typographic quotes and primes to ASCII.
fn normalize_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' | '\u{00AB}' | '\u{00BB}' => '"',
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => '\'',
            other => other,
        })
        .collect()
}

/// Scene-break lines become their own block, blank lines end a paragraph,
/// and every other line is unwrapped into the paragraph it belongs to.
fn split_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current = String::new();

    for line in text.split('\n') {
        if SCENE_BREAK_RE.is_match(line) {
            finish_paragraph(&mut current, &mut blocks);
            blocks.push(Block::SceneBreak);
        } else if line.trim_matches([' ', '\t']).is_empty() {
            finish_paragraph(&mut current, &mut blocks);
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(line);
        }
    }
    finish_paragraph(&mut current, &mut blocks);

    blocks
}

fn finish_paragraph(current: &mut String, blocks: &mut Vec<Block>) {
    let collapsed = SPACES_RE.replace_all(current.as_str(), " ");
    let trimmed = collapsed.trim_matches([' ', '\t']);
    if !trimmed.is_empty() {
        // 7. Speaker turns
        let split = DIALOGUE_RE.replace_all(trimmed, "$1$2\n\"");
        blocks.push(Block::Paragraph(split.into_owned()));
    }
    current.clear();
}
