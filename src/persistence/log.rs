//! Durable Log Module
//!
//! Append-only file of mutation records. Every append is written as a single
//! line and synced to stable storage before it returns.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{CacheError, Result};
use crate::persistence::LogRecord;

// == Durable Log ==
/// Writer half of the durable log.
///
/// The file handle is released when the log is closed or dropped.
#[derive(Debug)]
pub struct DurableLog {
    file: File,
    path: PathBuf,
    /// Length of the file up to the end of the last complete record
    committed_len: u64,
    /// Set when a write failed part-way; the next append first cuts the file
    /// back to `committed_len`
    torn: bool,
}

impl DurableLog {
    // == Open ==
    /// Opens (creating if needed) the log at `path` for appending.
    ///
    /// Missing parent directories are created. If a previous crash left a
    /// partial last line it is truncated away, so it can neither be mistaken
    /// for a complete record nor glued to the next one.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let len = file.metadata()?.len();
        let committed_len = complete_prefix_len(&mut file, len)?;
        if committed_len < len {
            warn!(
                path = %path.display(),
                dropped_bytes = len - committed_len,
                "Durable log ends with a partial record, truncating it"
            );
            file.set_len(committed_len)?;
            file.sync_data()?;
        }

        debug!(path = %path.display(), "Durable log opened for append");
        Ok(Self {
            file,
            path,
            committed_len,
            torn: false,
        })
    }

    // == Append ==
    /// Writes one record and syncs it to disk.
    ///
    /// A successful return means the record survives a crash. On error the
    /// caller must not apply the mutation.
    pub fn append(&mut self, record: &LogRecord) -> Result<()> {
        let line = record.encode()?;
        if self.torn {
            self.discard_partial()?;
        }

        if let Err(e) = self.write_line(line.as_bytes()) {
            self.torn = true;
            // Best effort now; retried before the next append if it fails
            if self.discard_partial().is_err() {
                warn!(path = %self.path.display(), "Could not roll back a partial record");
            }
            return Err(e.into());
        }
        self.committed_len += line.len() as u64;
        Ok(())
    }

    fn write_line(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)?;
        self.file.sync_data()
    }

    /// Cuts off whatever a failed append left past the last complete record.
    fn discard_partial(&mut self) -> io::Result<()> {
        self.file.set_len(self.committed_len)?;
        self.file.sync_data()?;
        self.torn = false;
        Ok(())
    }

    // == Read All ==
    /// Opens the log at `path` from the beginning for replay.
    ///
    /// Each call starts a fresh pass. A missing file reads as an empty log.
    pub fn read_all(path: impl AsRef<Path>) -> Result<LogReader> {
        let path = path.as_ref();
        let reader = match File::open(path) {
            Ok(file) => Some(BufReader::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(CacheError::Io(e)),
        };
        Ok(LogReader {
            reader,
            line_no: 0,
            buf: Vec::new(),
        })
    }

    // == Close ==
    /// Flushes file metadata to disk and releases the handle.
    pub fn close(mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        debug!(path = %self.path.display(), "Durable log closed");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub(crate) fn from_file_for_test(file: File, path: PathBuf) -> Self {
        let committed_len = file.metadata().map(|m| m.len()).unwrap_or(0);
        Self {
            file,
            path,
            committed_len,
            torn: false,
        }
    }
}

/// Offset just past the last `\n` in the first `len` bytes of `file`.
fn complete_prefix_len(file: &mut File, len: u64) -> io::Result<u64> {
    let mut chunk = [0u8; 4096];
    let mut end = len;
    while end > 0 {
        let start = end.saturating_sub(chunk.len() as u64);
        let buf = &mut chunk[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(buf)?;
        if let Some(pos) = buf.iter().rposition(|&b| b == b'\n') {
            return Ok(start + pos as u64 + 1);
        }
        end = start;
    }
    Ok(0)
}

// == Log Reader ==
/// Lazy, finite iterator over the records of a log, in append order.
///
/// Undecodable lines yield `CorruptRecord` and iteration continues with the
/// next line. A final line without its `\n` is a torn write and is always
/// `CorruptRecord`, even when its prefix happens to decode. An I/O error is
/// yielded once and ends the iteration.
#[derive(Debug)]
pub struct LogReader {
    reader: Option<BufReader<File>>,
    line_no: u64,
    buf: Vec<u8>,
}

impl LogReader {
    /// Number of lines consumed so far, blank lines included.
    pub fn lines_read(&self) -> u64 {
        self.line_no
    }
}

impl Iterator for LogReader {
    type Item = Result<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let reader = self.reader.as_mut()?;
            self.buf.clear();
            match reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.reader = None;
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    self.reader = None;
                    return Some(Err(CacheError::Io(e)));
                }
            }
            self.line_no += 1;

            let line = match std::str::from_utf8(&self.buf) {
                Ok(line) => line,
                Err(e) => {
                    return Some(Err(CacheError::CorruptRecord {
                        line: self.line_no,
                        reason: format!("invalid UTF-8: {}", e),
                    }))
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            if !line.ends_with('\n') {
                return Some(Err(CacheError::CorruptRecord {
                    line: self.line_no,
                    reason: "unterminated final record".to_string(),
                }));
            }

            return Some(LogRecord::decode(line).map_err(|reason| CacheError::CorruptRecord {
                line: self.line_no,
                reason,
            }));
        }
    }
}
