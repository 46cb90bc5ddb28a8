//! Minimal ZIP reader driven by local file headers.
//!
//! The reader never consults the central directory: it scans the buffer for
//! local-header signatures, decodes each entry in place, and stops at the
//! first central-directory record. Junk between entries is skipped one byte
//! at a time, and a truncated tail ends the scan without failing.

mod tree;

pub use tree::{DirTree, FileTree, ScratchTree, VirtualTree};

use std::fs;
use std::io::{self, Read};
use std::ops::Range;
use std::path::{Component, Path};

use log::{debug, warn};
use memchr::memmem;

use crate::error::{Error, Result};
use crate::util::normalize_archive_path;

/// Local file header signature (`PK\x03\x04`).
pub const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
/// Central directory file header signature (`PK\x01\x02`).
pub const CENTRAL_DIR_SIG: u32 = 0x0201_4b50;
const DATA_DESCRIPTOR_SIG: u32 = 0x0807_4b50;

const LOCAL_HEADER_LEN: usize = 30;
const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

// Cap on up-front allocation driven by an untrusted size field.
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

#[inline]
fn le_u16(d: &[u8], o: usize) -> u16 {
    u16::from_le_bytes([d[o], d[o + 1]])
}

#[inline]
fn le_u32(d: &[u8], o: usize) -> u32 {
    u32::from_le_bytes([d[o], d[o + 1], d[o + 2], d[o + 3]])
}

/// Compression method declared in a local header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// Method 0: bytes are stored verbatim.
    Stored,
    /// Method 8: raw DEFLATE stream.
    Deflate,
    /// Anything else; such entries are skipped.
    Unsupported(u16),
}

impl From<u16> for CompressionMethod {
    fn from(method: u16) -> Self {
        match method {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            other => CompressionMethod::Unsupported(other),
        }
    }
}

/// A single entry located by scanning local file headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Normalized path; directories keep a trailing `/`.
    pub path: String,
    pub method: CompressionMethod,
    /// Byte range of the entry's compressed data in the archive buffer.
    pub data: Range<usize>,
    pub declared_size: u64,
}

impl ArchiveEntry {
    /// Whether this entry is a directory marker.
    pub fn is_dir(&self) -> bool {
        self.path.ends_with('/')
    }

    /// Decode the entry's bytes from the archive buffer it was scanned from.
    pub fn decode(&self, archive: &[u8]) -> io::Result<Vec<u8>> {
        let raw = archive.get(self.data.clone()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "entry data out of bounds")
        })?;

        match self.method {
            CompressionMethod::Stored => Ok(raw.to_vec()),
            CompressionMethod::Deflate => inflate(raw, self.declared_size),
            CompressionMethod::Unsupported(method) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("Unsupported compression method: {}", method),
            )),
        }
    }
}

/// Inflate a raw DEFLATE stream (no zlib/gzip wrapper).
pub fn inflate(compressed: &[u8], size_hint: u64) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(size_hint.min(MAX_PREALLOC) as usize);
    flate2::read::DeflateDecoder::new(compressed).read_to_end(&mut out)?;
    Ok(out)
}

/// Iterator over the local file headers of a ZIP buffer.
///
/// Created by [`entries`].
pub struct LocalHeaders<'a> {
    data: &'a [u8],
    pos: usize,
    finished: bool,
}

/// Scan `data` for local file headers.
pub fn entries(data: &[u8]) -> LocalHeaders<'_> {
    LocalHeaders {
        data,
        pos: 0,
        finished: false,
    }
}

impl Iterator for LocalHeaders<'_> {
    type Item = ArchiveEntry;

    fn next(&mut self) -> Option<ArchiveEntry> {
        while !self.finished {
            let Some(found) = memmem::find(&self.data[self.pos..], b"PK") else {
                self.finished = true;
                break;
            };
            let at = self.pos + found;
            if at + 4 > self.data.len() {
                self.finished = true;
                break;
            }

            match le_u32(self.data, at) {
                CENTRAL_DIR_SIG => {
                    self.finished = true;
                }
                LOCAL_HEADER_SIG => match self.read_local_header(at) {
                    Some((entry, next)) => {
                        self.pos = next;
                        match entry {
                            Some(entry) => return Some(entry),
                            None => continue,
                        }
                    }
                    None => {
                        debug!("zip: truncated local header at offset {}", at);
                        self.finished = true;
                    }
                },
                _ => self.pos = at + 1,
            }
        }
        None
    }
}

impl LocalHeaders<'_> {
    /// Parse the local header at `at`.
    ///
    /// Returns `None` when the buffer ends before the entry does. Otherwise
    /// returns the entry (or `None` for an entry that has to be passed over)
    /// together with the offset just past it.
    fn read_local_header(&self, at: usize) -> Option<(Option<ArchiveEntry>, usize)> {
        let d = self.data;
        if at + LOCAL_HEADER_LEN > d.len() {
            return None;
        }

        let flags = le_u16(d, at + 6);
        let method = CompressionMethod::from(le_u16(d, at + 8));
        let mut compressed_size = le_u32(d, at + 18) as usize;
        let mut declared_size = le_u32(d, at + 22) as u64;
        let name_len = le_u16(d, at + 26) as usize;
        let extra_len = le_u16(d, at + 28) as usize;

        let name_start = at + LOCAL_HEADER_LEN;
        let name_end = name_start + name_len;
        let data_start = name_end + extra_len;
        if data_start > d.len() {
            return None;
        }

        let raw_name = String::from_utf8_lossy(&d[name_start..name_end]);
        let mut path = normalize_archive_path(&raw_name);
        if raw_name.ends_with('/') || raw_name.ends_with('\\') {
            path.push('/');
        }

        let streamed = flags & FLAG_DATA_DESCRIPTOR != 0 && compressed_size == 0;
        let mut next = if streamed {
            if method != CompressionMethod::Deflate {
                // No way to find the end of a stored stream without sizes.
                warn!("zip: cannot size streamed entry {:?}, stopping scan", path);
                return None;
            }
            compressed_size = deflate_stream_len(&d[data_start..])?;
            data_start + compressed_size
        } else {
            let end = data_start.checked_add(compressed_size)?;
            if end > d.len() {
                return None;
            }
            end
        };

        if flags & FLAG_DATA_DESCRIPTOR != 0 {
            let (len, uncompressed) = read_data_descriptor(d, next);
            if streamed && let Some(size) = uncompressed {
                declared_size = size;
            }
            next += len;
        }

        if path.is_empty() || path == "/" {
            debug!("zip: skipping unnamed entry at offset {}", at);
            return Some((None, next));
        }

        Some((
            Some(ArchiveEntry {
                path,
                method,
                data: data_start..data_start + compressed_size,
                declared_size,
            }),
            next,
        ))
    }
}

/// Number of compressed bytes consumed by the DEFLATE stream at the start of
/// `data`, or `None` if the stream is corrupt or truncated.
fn deflate_stream_len(data: &[u8]) -> Option<usize> {
    let mut decoder = flate2::bufread::DeflateDecoder::new(data);
    io::copy(&mut decoder, &mut io::sink()).ok()?;
    Some(decoder.total_in() as usize)
}

/// Length of the data descriptor at `at` and its uncompressed-size field.
fn read_data_descriptor(d: &[u8], at: usize) -> (usize, Option<u64>) {
    let signed = at + 4 <= d.len() && le_u32(d, at) == DATA_DESCRIPTOR_SIG;
    let base = if signed { at + 4 } else { at };
    let len = if signed { 16 } else { 12 };
    if base + 12 > d.len() {
        return (d.len().saturating_sub(at), None);
    }
    (len, Some(le_u32(d, base + 8) as u64))
}

/// Extract every readable entry of `data` into an in-memory tree.
///
/// Entries with unsupported compression or corrupt data are skipped. A
/// truncated archive yields the entries found before the truncation. Fails
/// with [`Error::Format`] only when no local header is found at all.
pub fn extract(data: &[u8]) -> Result<VirtualTree> {
    let mut tree = VirtualTree::new();
    let mut seen = 0usize;

    for entry in entries(data) {
        seen += 1;
        if entry.is_dir() {
            tree.insert_dir(&entry.path);
            continue;
        }

        match entry.decode(data) {
            Ok(bytes) => {
                if bytes.len() as u64 != entry.declared_size {
                    warn!(
                        "zip: {} inflated to {} bytes, header declared {}",
                        entry.path,
                        bytes.len(),
                        entry.declared_size
                    );
                }
                tree.insert_file(entry.path, bytes);
            }
            Err(e) => warn!("zip: skipping {}: {}", entry.path, e),
        }
    }

    if seen == 0 {
        return Err(Error::Format("no zip local file headers found".into()));
    }

    debug!("zip: extracted {} files from {} entries", tree.len(), seen);
    Ok(tree)
}

/// Extract every readable entry of `data` beneath `dir`.
///
/// Returns the number of files written. Entries whose paths would escape
/// `dir`, and entries the filesystem refuses, are skipped.
pub fn extract_to_dir(data: &[u8], dir: &Path) -> Result<usize> {
    let mut seen = 0usize;
    let mut written = 0usize;

    for entry in entries(data) {
        seen += 1;
        if !is_contained(&entry.path) {
            warn!("zip: refusing to write entry outside scratch dir: {}", entry.path);
            continue;
        }

        let target = dir.join(entry.path.trim_end_matches('/'));
        if entry.is_dir() {
            if let Err(e) = fs::create_dir_all(&target) {
                warn!("zip: skipping directory {}: {}", entry.path, e);
            }
            continue;
        }

        let bytes = match entry.decode(data) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("zip: skipping {}: {}", entry.path, e);
                continue;
            }
        };
        if let Some(parent) = target.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warn!("zip: skipping {}: {}", entry.path, e);
            continue;
        }
        if let Err(e) = fs::write(&target, bytes) {
            warn!("zip: skipping {}: {}", entry.path, e);
            continue;
        }
        written += 1;
    }

    if seen == 0 {
        return Err(Error::Format("no zip local file headers found".into()));
    }
    Ok(written)
}

/// Whether a normalized entry path stays inside its extraction root.
fn is_contained(path: &str) -> bool {
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
