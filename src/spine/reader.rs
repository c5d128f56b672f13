//! Spine readers: one-shot replay and polling tail.
//!
//! Neither reader sorts, buffers out of order or drops duplicates. Lines come
//! back in physical file order; malformed lines are counted, logged and
//! skipped.

use anyhow::{Context, Result};
use std::fs::{self, File, Metadata};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::event::SpineEvent;
use crate::logging::{log_malformed_line, log_rotation, obj, v_str, Domain, Level};

/// Upper bound on lines consumed by a single tail poll.
pub const MAX_LINES_PER_POLL: usize = 4096;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub lines: u64,
    pub events: u64,
    pub malformed: u64,
    pub rotations: u64,
}

fn decode_line(bytes: &[u8], offset: u64, stats: &mut ReaderStats) -> Option<SpineEvent> {
    stats.lines += 1;
    let text = match std::str::from_utf8(bytes) {
        Ok(t) => t.trim(),
        Err(_) => {
            stats.malformed += 1;
            log_malformed_line(offset, "line is not valid utf-8");
            return None;
        }
    };
    if text.is_empty() {
        return None;
    }
    match SpineEvent::parse(text, offset) {
        Ok(event) => {
            stats.events += 1;
            Some(event)
        }
        Err(err) => {
            stats.malformed += 1;
            log_malformed_line(offset, &err.to_string());
            None
        }
    }
}

// =============================================================================
// Bounded reader (replay)
// =============================================================================

/// Finite reader: yields every event up to end-of-file, then stops.
pub struct SpineReader<R> {
    reader: R,
    offset: u64,
    buf: Vec<u8>,
    stats: ReaderStats,
    error: Option<io::Error>,
}

impl SpineReader<BufReader<File>> {
    /// Open a spine for replay. The input is mandatory, so a missing file
    /// is an error here rather than an empty sequence.
    pub fn replay(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("cannot open spine {}", path.display()))?;
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: BufRead> SpineReader<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader,
            offset: 0,
            buf: Vec::new(),
            stats: ReaderStats::default(),
            error: None,
        }
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// I/O error that ended the sequence early, if any. Callers must check
    /// this after iteration; a silently truncated replay is not a replay.
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }
}

impl<R: BufRead> Iterator for SpineReader<R> {
    type Item = SpineEvent;

    fn next(&mut self) -> Option<SpineEvent> {
        loop {
            self.buf.clear();
            let n = match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(n) => n,
                Err(err) => {
                    self.error = Some(err);
                    return None;
                }
            };
            let line_offset = self.offset;
            self.offset += n as u64;
            if let Some(event) = decode_line(&self.buf, line_offset, &mut self.stats) {
                return Some(event);
            }
        }
    }
}

// =============================================================================
// Unbounded reader (tail)
// =============================================================================

/// Polling tail over a spine that may not exist yet.
///
/// Each [`SpineTail::poll`] returns the complete lines appended since the
/// previous call. A trailing line without its newline is left for the next
/// poll so a half-written record is never parsed.
#[derive(Debug)]
pub struct SpineTail {
    path: PathBuf,
    offset: u64,
    inode: Option<u64>,
    backlog: bool,
    waiting_logged: bool,
    stats: ReaderStats,
}

impl SpineTail {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            inode: None,
            backlog: false,
            waiting_logged: false,
            stats: ReaderStats::default(),
        }
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Start at the current end of the spine (offset 0 if it does not exist).
    pub fn from_end(path: impl Into<PathBuf>) -> Self {
        let tail = Self::new(path);
        match fs::metadata(&tail.path) {
            Ok(meta) => {
                let inode = file_identity(&meta);
                let mut tail = tail.with_offset(meta.len());
                tail.inode = inode;
                tail
            }
            Err(_) => tail,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// True when the last poll stopped at the line cap rather than at EOF.
    pub fn has_backlog(&self) -> bool {
        self.backlog
    }

    pub fn poll(&mut self) -> io::Result<Vec<SpineEvent>> {
        self.backlog = false;
        let meta = match fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                if !self.waiting_logged {
                    crate::logging::log(
                        Level::Info,
                        Domain::Spine,
                        "waiting_for_spine",
                        obj(&[("path", v_str(&self.path.to_string_lossy()))]),
                    );
                    self.waiting_logged = true;
                }
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };
        self.waiting_logged = false;

        let identity = file_identity(&meta);
        let replaced = matches!((self.inode, identity), (Some(prev), Some(now)) if prev != now);
        if replaced || meta.len() < self.offset {
            log_rotation(&self.path.to_string_lossy(), self.offset);
            self.stats.rotations += 1;
            self.offset = 0;
        }
        self.inode = identity;

        if meta.len() == self.offset {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        self.read_batch(&mut BufReader::new(file))
    }

    /// Decode complete lines from `reader`, which must be positioned at
    /// `self.offset`. The offset only moves past lines that were consumed;
    /// a read error after the first line ends the batch early so those
    /// events are still returned and the next poll resumes right after them.
    fn read_batch<R: BufRead>(&mut self, reader: &mut R) -> io::Result<Vec<SpineEvent>> {
        let mut buf = Vec::new();
        let mut events = Vec::new();
        let mut consumed = 0usize;

        loop {
            if consumed >= MAX_LINES_PER_POLL {
                self.backlog = true;
                break;
            }
            buf.clear();
            let n = match reader.read_until(b'\n', &mut buf) {
                Ok(n) => n,
                Err(err) if consumed == 0 => return Err(err),
                Err(err) => {
                    crate::logging::log(
                        Level::Warn,
                        Domain::Spine,
                        "read_error",
                        obj(&[
                            ("offset", serde_json::json!(self.offset)),
                            ("error", v_str(&err.to_string())),
                        ]),
                    );
                    break;
                }
            };
            if n == 0 || buf.last() != Some(&b'\n') {
                break;
            }
            let line_offset = self.offset;
            self.offset += n as u64;
            consumed += 1;
            if let Some(event) = decode_line(&buf, line_offset, &mut self.stats) {
                events.push(event);
            }
        }

        Ok(events)
    }
}

#[cfg(unix)]
fn file_identity(meta: &Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ino())
}

#[cfg(not(unix))]
fn file_identity(_meta: &Metadata) -> Option<u64> {
    None
}
