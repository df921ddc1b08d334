//! Streaming gzip NDJSON access.
//!
//! Packs and the line-delimited registry are read through a decompression
//! pipe feeding a line reader: only the current line is held in memory.
//! Concatenated gzip members are accepted since append-only producers write
//! one member per append.

use crate::universe::error::{Result, UniverseError};
use flate2::read::MultiGzDecoder;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Line iterator over a gzip-compressed file.
///
/// Lines are raw bytes without their terminator, so a rewriter can carry a
/// line through unchanged even when it is not valid UTF-8. Yields
/// `Err(UniverseError::Decompress)` once if the stream breaks, then ends.
pub struct GzLines {
    path: PathBuf,
    reader: BufReader<MultiGzDecoder<File>>,
    buf: Vec<u8>,
    failed: bool,
}

impl GzLines {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| UniverseError::io(&path, e))?;
        Ok(Self {
            reader: BufReader::new(MultiGzDecoder::new(file)),
            path,
            buf: Vec::with_capacity(4096),
            failed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for GzLines {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
                    self.buf.pop();
                }
                Some(Ok(std::mem::take(&mut self.buf)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(UniverseError::Decompress {
                    path: self.path.clone(),
                    source: e,
                }))
            }
        }
    }
}

/// `true` for an empty or whitespace-only line.
pub fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

/// Decode one NDJSON line. `None` when the bytes are not UTF-8 or not JSON
/// of the requested shape.
pub fn parse_json_line<T: DeserializeOwned>(line: &[u8]) -> Option<T> {
    let text = std::str::from_utf8(line).ok()?;
    serde_json::from_str(text).ok()
}

/// Parse a whole gzip-compressed JSON document.
pub fn read_gzip_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| UniverseError::io(path, e))?;
    let reader = BufReader::new(MultiGzDecoder::new(file));
    serde_json::from_reader(reader).map_err(|e| {
        if e.is_io() {
            UniverseError::Decompress {
                path: path.to_path_buf(),
                source: e.into(),
            }
        } else {
            UniverseError::json(path, e)
        }
    })
}

/// Parse a whole plain JSON document.
pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| UniverseError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| UniverseError::json(path, e))
}

/// Read an optional JSON input. Absent or unparsable documents yield `None`
/// (the latter with a warning) so report-style tools can degrade gracefully.
pub fn read_json_lenient(path: impl AsRef<Path>) -> Option<Value> {
    let path = path.as_ref();
    if !path.exists() {
        return None;
    }
    match read_json::<Value>(path) {
        Ok(doc) => Some(doc),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable optional input");
            None
        }
    }
}

/// Gzip variant of [`read_json_lenient`].
pub fn read_gzip_json_lenient(path: impl AsRef<Path>) -> Option<Value> {
    let path = path.as_ref();
    if !path.exists() {
        return None;
    }
    match read_gzip_json::<Value>(path) {
        Ok(doc) => Some(doc),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable optional input");
            None
        }
    }
}
