//! EPUB package support: descriptor parsing, markup stripping, and chapter
//! assembly over an extracted file tree.

pub mod markup;
pub mod parser;
mod reader;

pub use reader::{CHAPTER_SEPARATOR, Package, parse_chapters, parse_package};
