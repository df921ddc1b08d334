//! Atomic Publish
//!
//! Every artifact this crate materializes goes through here. Bytes are written
//! to a sibling temp file in the destination directory, synced, then renamed
//! over the destination. The rename is the commit point: a reader of the
//! destination sees either the previous content or the new content, never a
//! partial file, and a crash before the rename leaves the destination as it was.
//!
//! # Usage
//!
//! ```ignore
//! publish_json_pretty(&report_path, &report)?;
//!
//! let mut staged = GzipStagedFile::create(&registry_path)?;
//! for row in rows { writeln!(staged, "{}", row)?; }
//! staged.commit()?;
//! ```

use crate::universe::error::{Result, UniverseError};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

fn parent_dir(dest: &Path) -> PathBuf {
    match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// An output staged next to its destination. Dropping it without calling
/// [`StagedFile::commit`] discards the temp file and leaves the destination
/// untouched.
pub struct StagedFile {
    dest: PathBuf,
    temp: NamedTempFile,
}

impl StagedFile {
    pub fn create(dest: impl AsRef<Path>) -> Result<Self> {
        let dest = dest.as_ref().to_path_buf();
        let dir = parent_dir(&dest);
        fs::create_dir_all(&dir).map_err(|e| UniverseError::publish(&dest, e))?;

        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());
        let temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", name))
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| UniverseError::publish(&dest, e))?;

        Ok(Self { dest, temp })
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Path of the temp file while staged.
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    pub fn commit(mut self) -> Result<()> {
        let dest = self.dest;
        self.temp
            .flush()
            .and_then(|_| self.temp.as_file().sync_all())
            .map_err(|e| UniverseError::publish(&dest, e))?;
        self.temp
            .persist(&dest)
            .map_err(|e| UniverseError::publish(&dest, e.error))?;
        debug!(path = %dest.display(), "published");
        Ok(())
    }
}

impl Write for StagedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

/// Streamed gzip output committed with the same write-then-rename sequence.
pub struct GzipStagedFile {
    encoder: GzEncoder<BufWriter<StagedFile>>,
}

impl GzipStagedFile {
    pub fn create(dest: impl AsRef<Path>) -> Result<Self> {
        let staged = StagedFile::create(dest)?;
        Ok(Self {
            encoder: GzEncoder::new(BufWriter::new(staged), Compression::default()),
        })
    }

    pub fn commit(self) -> Result<()> {
        let dest = self.encoder.get_ref().get_ref().dest().to_path_buf();
        let staged = self
            .encoder
            .finish()
            .and_then(|buffered| buffered.into_inner().map_err(|e| e.into_error()))
            .map_err(|e| UniverseError::publish(&dest, e))?;
        staged.commit()
    }
}

impl Write for GzipStagedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

/// Atomically replace `dest` with `bytes`.
pub fn publish_bytes(dest: impl AsRef<Path>, bytes: &[u8]) -> Result<()> {
    let dest = dest.as_ref();
    let mut staged = StagedFile::create(dest)?;
    staged
        .write_all(bytes)
        .map_err(|e| UniverseError::publish(dest, e))?;
    staged.commit()
}

/// Pretty JSON with a trailing newline, for human/CI-facing reports.
pub fn publish_json_pretty<T: Serialize>(dest: impl AsRef<Path>, value: &T) -> Result<()> {
    let dest = dest.as_ref();
    let mut bytes = serde_json::to_vec_pretty(value).map_err(|e| UniverseError::json(dest, e))?;
    bytes.push(b'\n');
    publish_bytes(dest, &bytes)
}

/// Compact JSON, gzip-compressed in memory, then published.
pub fn publish_gzip_json<T: Serialize>(dest: impl AsRef<Path>, value: &T) -> Result<()> {
    let dest = dest.as_ref();
    let mut json = serde_json::to_vec(value).map_err(|e| UniverseError::json(dest, e))?;
    json.push(b'\n');
    let compressed = gzip_bytes(&json).map_err(|e| UniverseError::publish(dest, e))?;
    publish_bytes(dest, &compressed)
}

pub fn gzip_bytes(raw: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw)?;
    encoder.finish()
}

/// Copy `src` into `out`, returning the last byte copied.
fn copy_tracking_last(src: &mut impl Read, out: &mut impl Write) -> io::Result<Option<u8>> {
    let mut buf = vec![0u8; 64 * 1024];
    let mut last = None;
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => return Ok(last),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        out.write_all(&buf[..n])?;
        last = Some(buf[n - 1]);
    }
}

/// Publish `dest` as its current content followed by `lines`, one per line.
/// The existing file is streamed into the staged copy, so the first bytes of
/// the result are exactly the previous content. A final line missing its
/// terminator gets one before the new lines start.
pub fn publish_appended_lines(dest: impl AsRef<Path>, lines: &[String]) -> Result<()> {
    let dest = dest.as_ref();
    let mut staged = StagedFile::create(dest)?;

    let last = match File::open(dest) {
        Ok(mut existing) => {
            copy_tracking_last(&mut existing, &mut staged).map_err(|e| UniverseError::io(dest, e))?
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(UniverseError::io(dest, e)),
    };

    {
        let mut out = BufWriter::new(&mut staged);
        if !lines.is_empty() && matches!(last, Some(b) if b != b'\n') {
            out.write_all(b"\n")
                .map_err(|e| UniverseError::publish(dest, e))?;
        }
        for line in lines {
            out.write_all(line.as_bytes())
                .and_then(|_| out.write_all(b"\n"))
                .map_err(|e| UniverseError::publish(dest, e))?;
        }
        out.flush().map_err(|e| UniverseError::publish(dest, e))?;
    }

    staged.commit()
}
