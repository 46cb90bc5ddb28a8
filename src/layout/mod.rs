//! Layout configuration and the text-frame measurement oracle.
//!
//! Pagination never shapes text itself. It asks a [`FrameMeasurer`] how much
//! of the remaining text fits one frame and trusts the answer; the platform's
//! typesetter normally plays that role. [`MonospaceMeasurer`] is a
//! deterministic stand-in for hosts without one (the CLI, tests, benches).

mod engine;
mod paginate;

pub use engine::{PaginationResult, Paginator};
pub use paginate::{CancelToken, PageSet, paginate};

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Font and viewport parameters for one pagination run.
///
/// Every field has a default, so a JSON file only needs the fields it changes:
///
/// ```
/// use vellum::LayoutConfig;
///
/// let config = LayoutConfig::from_json_str(r#"{ "font_size": 22.0 }"#)?;
/// assert_eq!(config.font_size, 22.0);
/// assert_eq!(config.margin, LayoutConfig::default().margin);
/// # Ok::<(), vellum::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub font_family: String,
    /// Font size in points.
    pub font_size: f64,
    /// Line height as a multiple of the font size.
    pub line_spacing: f64,
    /// Horizontal margin, applied on both sides.
    pub margin: f64,
    pub viewport_width: f64,
    pub viewport_height: f64,
    /// Vertical space taken by reader chrome (toolbars, page indicator).
    pub chrome_height: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            font_family: "Georgia".to_string(),
            font_size: 18.0,
            line_spacing: 1.5,
            margin: 20.0,
            viewport_width: 390.0,
            viewport_height: 844.0,
            chrome_height: 100.0,
        }
    }
}

impl LayoutConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: LayoutConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check that every dimension is finite and leaves a non-empty frame.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("font_size", self.font_size),
            ("line_spacing", self.line_spacing),
            ("viewport_width", self.viewport_width),
            ("viewport_height", self.viewport_height),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::InvalidConfig(format!("{name} must be positive, got {value}")));
            }
        }

        let non_negative = [("margin", self.margin), ("chrome_height", self.chrome_height)];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidConfig(format!("{name} must not be negative, got {value}")));
            }
        }

        let frame = self.frame();
        if frame.width <= 0.0 || frame.height <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "margins and chrome leave no room for text ({} x {})",
                frame.width, frame.height
            )));
        }
        Ok(())
    }

    /// The text rectangle: viewport minus both margins and the chrome.
    pub fn frame(&self) -> FrameSize {
        FrameSize {
            width: self.viewport_width - 2.0 * self.margin,
            height: self.viewport_height - self.chrome_height,
        }
    }

    pub fn text_style(&self) -> TextStyle {
        TextStyle {
            font_family: self.font_family.clone(),
            font_size: self.font_size,
            line_spacing: self.line_spacing,
        }
    }
}

/// Typography handed to the measurement oracle.
#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub font_family: String,
    pub font_size: f64,
    pub line_spacing: f64,
}

impl TextStyle {
    /// Height of one line.
    pub fn line_height(&self) -> f64 {
        self.font_size * self.line_spacing
    }
}

/// Size of the rectangle text is fitted into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSize {
    pub width: f64,
    pub height: f64,
}

/// Text-frame measurement oracle.
///
/// Returns the byte length of the longest prefix of `text` that fits inside
/// `frame` when set in `style`. It must be deterministic for a fixed input so
/// pagination can restart from any offset. A result of 0 means nothing fits;
/// results past the end of `text` or inside a character are tolerated and
/// corrected by the caller.
pub trait FrameMeasurer: Send + Sync {
    fn fit(&self, text: &str, style: &TextStyle, frame: FrameSize) -> usize;
}

impl<F> FrameMeasurer for F
where
    F: Fn(&str, &TextStyle, FrameSize) -> usize + Send + Sync,
{
    fn fit(&self, text: &str, style: &TextStyle, frame: FrameSize) -> usize {
        self(text, style, frame)
    }
}

/// Fixed-advance word-wrapping oracle.
///
/// Every character advances `font_size * advance_ratio`; lines are
/// `font_size * line_spacing` tall. Words wrap to the next line, words longer
/// than a line are broken, and `\n` always ends a line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonospaceMeasurer {
    pub advance_ratio: f64,
}

impl Default for MonospaceMeasurer {
    fn default() -> Self {
        Self { advance_ratio: 0.5 }
    }
}

impl MonospaceMeasurer {
    pub fn new(advance_ratio: f64) -> Self {
        Self { advance_ratio }
    }

    /// Columns and rows available in `frame`.
    pub fn grid(&self, style: &TextStyle, frame: FrameSize) -> (usize, usize) {
        let advance = style.font_size * self.advance_ratio;
        let line_height = style.line_height();
        if advance <= 0.0 || line_height <= 0.0 {
            return (0, 0);
        }
        let cols = (frame.width / advance).floor().max(0.0) as usize;
        let rows = (frame.height / line_height).floor().max(0.0) as usize;
        (cols, rows)
    }
}

impl FrameMeasurer for MonospaceMeasurer {
    fn fit(&self, text: &str, style: &TextStyle, frame: FrameSize) -> usize {
        let (cols, rows) = self.grid(style, frame);
        if cols == 0 || rows == 0 {
            return 0;
        }

        let mut row = 0usize;
        let mut col = 0usize;
        let mut chars = text.char_indices().peekable();

        while let Some(&(i, c)) = chars.peek() {
            if c == '\n' {
                chars.next();
                row += 1;
                col = 0;
                if row >= rows {
                    return i + 1;
                }
                continue;
            }

            if c.is_whitespace() {
                chars.next();
                // Leading spaces on a wrapped line take no room.
                if col > 0 {
                    if col + 1 > cols {
                        row += 1;
                        col = 0;
                        if row >= rows {
                            return i + c.len_utf8();
                        }
                    } else {
                        col += 1;
                    }
                }
                continue;
            }

            let mut word = Vec::new();
            while let Some(&(j, w)) = chars.peek() {
                if w.is_whitespace() {
                    break;
                }
                word.push(j);
                chars.next();
            }

            if col > 0 && col + word.len() > cols {
                row += 1;
                col = 0;
                if row >= rows {
                    return i;
                }
            }

            for j in word {
                if col == cols {
                    row += 1;
                    col = 0;
                    if row >= rows {
                        return j;
                    }
                }
                col += 1;
            }
        }

        text.len()
    }
}
