//! Append-only record files and resume logic.
//!
//! One file per `(symbol, period)` at `{dir}/{symbol}_{minutes}.txt`, one bar
//! per line. The only read of existing state is the timestamp on the last
//! line, found by reading backwards from the end of the file.

use crate::domain::bar::{parse_timestamp, FIELD_SEPARATOR};
use crate::domain::{Bar, Period};
use chrono::NaiveDateTime;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt record in {path}: '{line}'")]
    CorruptRecord { path: PathBuf, line: String },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> LedgerError + '_ {
    move |source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    }
}

const TAIL_BLOCK: usize = 4096;

/// Last non-empty line of `path`, or `None` for an empty or blank file.
///
/// Reads fixed-size blocks backwards from the end, so the cost does not
/// depend on the file length.
pub fn last_line(path: &Path) -> io::Result<Option<String>> {
    let mut file = File::open(path)?;
    let mut pos = file.seek(SeekFrom::End(0))?;
    let mut tail: Vec<u8> = Vec::new();
    let mut block = [0u8; TAIL_BLOCK];

    loop {
        let trimmed = tail
            .iter()
            .rposition(|b| !b.is_ascii_whitespace())
            .map_or(0, |i| i + 1);
        let body = &tail[..trimmed];

        if let Some(newline) = body.iter().rposition(|&b| b == b'\n') {
            return Ok(Some(String::from_utf8_lossy(&body[newline + 1..]).into_owned()));
        }
        if pos == 0 {
            return Ok((!body.is_empty()).then(|| String::from_utf8_lossy(body).into_owned()));
        }

        let step = pos.min(TAIL_BLOCK as u64) as usize;
        pos -= step as u64;
        file.seek(SeekFrom::Start(pos))?;
        file.read_exact(&mut block[..step])?;

        let mut joined = Vec::with_capacity(step + tail.len());
        joined.extend_from_slice(&block[..step]);
        joined.extend_from_slice(&tail);
        tail = joined;
    }
}

/// Record directory plus the append/truncate policy for a run.
#[derive(Debug, Clone)]
pub struct Ledger {
    dir: PathBuf,
    append: bool,
}

impl Ledger {
    pub fn new(dir: impl Into<PathBuf>, append: bool) -> Self {
        Self {
            dir: dir.into(),
            append,
        }
    }

    pub fn record_path(&self, symbol: &str, period: Period) -> PathBuf {
        self.dir
            .join(format!("{symbol}_{}.txt", period.total_minutes()))
    }

    /// Timestamp of the last record, if the file exists and is not blank.
    pub fn last_timestamp(path: &Path) -> Result<Option<NaiveDateTime>, LedgerError> {
        let Some(line) = last_line(path).map_err(io_err(path))? else {
            return Ok(None);
        };
        let corrupt = || LedgerError::CorruptRecord {
            path: path.to_path_buf(),
            line: line.clone(),
        };
        let field = line.split(FIELD_SEPARATOR).nth(1).ok_or_else(corrupt)?;
        parse_timestamp(field).map(Some).map_err(|_| corrupt())
    }

    /// Open the record for `symbol`/`period` and work out where to resume.
    ///
    /// In append mode an existing record resumes one period after its last
    /// line; otherwise the file is truncated and `start` is used.
    pub fn open(
        &self,
        symbol: &str,
        period: Period,
        start: NaiveDateTime,
    ) -> Result<RecordWriter, LedgerError> {
        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;
        let path = self.record_path(symbol, period);

        let (file, resume) = if self.append && path.exists() {
            let resume = match Self::last_timestamp(&path)? {
                // Nothing can follow a record that ends at the calendar limit.
                Some(last) => last
                    .checked_add_signed(period.duration())
                    .unwrap_or(NaiveDateTime::MAX),
                None => start,
            };
            let file = OpenOptions::new()
                .append(true)
                .open(&path)
                .map_err(io_err(&path))?;
            debug!(path = %path.display(), %resume, "appending to record");
            (file, resume)
        } else {
            let file = File::create(&path).map_err(io_err(&path))?;
            (file, start)
        };

        Ok(RecordWriter {
            path,
            writer: Some(BufWriter::new(file)),
            resume,
            written: 0,
            dropped: 0,
        })
    }
}

/// Buffered writer for one record file.
///
/// `finish` flushes and reports errors; dropping an unfinished writer still
/// flushes what was buffered.
pub struct RecordWriter {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    resume: NaiveDateTime,
    written: usize,
    dropped: usize,
}

impl RecordWriter {
    /// First timestamp this record accepts.
    pub fn resume_point(&self) -> NaiveDateTime {
        self.resume
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one bar; returns `false` if it predates the resume point.
    pub fn append(&mut self, bar: &Bar) -> Result<bool, LedgerError> {
        if bar.timestamp < self.resume {
            self.dropped += 1;
            return Ok(false);
        }
        let Some(writer) = self.writer.as_mut() else {
            return Ok(false);
        };
        writeln!(writer, "{bar}").map_err(io_err(&self.path))?;
        self.written += 1;
        Ok(true)
    }

    /// Flush and close; returns the number of bars written.
    pub fn finish(mut self) -> Result<usize, LedgerError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(io_err(&self.path))?;
        }
        if self.dropped > 0 {
            debug!(path = %self.path.display(), dropped = self.dropped, "ignored bars before resume point");
        }
        Ok(self.written)
    }
}

impl Drop for RecordWriter {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!(path = %self.path.display(), error = %e, "failed to flush record");
            }
        }
    }
}
