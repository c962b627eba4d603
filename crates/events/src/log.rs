use crate::error::EventLogError;
use crate::grammar::{format_line, parse_line};
use core_types::TradeRecord;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

/// The records parsed out of one read, plus the number of lines that did not parse.
#[derive(Debug, Default, Clone)]
pub struct LogBatch {
    pub records: Vec<TradeRecord>,
    pub malformed: usize,
}

impl LogBatch {
    fn push_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        match parse_line(line) {
            Ok(record) => self.records.push(record),
            Err(e) => {
                debug!(error = %e, line, "Skipping malformed event line");
                self.malformed += 1;
            }
        }
    }

    fn from_text(text: &str) -> Self {
        let mut batch = Self::default();
        for line in text.lines() {
            batch.push_line(line);
        }
        batch
    }
}

/// Writer side of the log. Only the producer appends.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one complete line for `record`.
    ///
    /// The line and its newline go out in a single write on a file opened in
    /// append mode, so readers never see two records interleaved.
    pub async fn append(&self, record: &TradeRecord) -> Result<(), EventLogError> {
        let mut line = format_line(record);
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io(e))?;
        file.write_all(line.as_bytes()).await.map_err(|e| self.io(e))?;
        file.flush().await.map_err(|e| self.io(e))?;
        Ok(())
    }

    /// Parses the whole file, including a trailing line without newline.
    pub async fn read_all(&self) -> Result<LogBatch, EventLogError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.io(e))?;
        Ok(LogBatch::from_text(&text))
    }

    fn io(&self, source: std::io::Error) -> EventLogError {
        EventLogError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Reader side of the log: remembers how far it has consumed so each read only
/// touches bytes appended since the previous one.
#[derive(Debug, Clone)]
pub struct LogCursor {
    path: PathBuf,
    offset: u64,
}

impl LogCursor {
    /// A cursor at the start of the file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads every complete line appended since the last call.
    ///
    /// A trailing line still missing its newline is left for the next call. A
    /// file that does not exist yet reads as empty, and a file shorter than the
    /// cursor is assumed to have been replaced and is read from the start.
    pub async fn read_new(&mut self) -> Result<LogBatch, EventLogError> {
        let len = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.offset = 0;
                return Ok(LogBatch::default());
            }
            Err(e) => return Err(self.io(e)),
        };

        if len < self.offset {
            warn!(
                path = %self.path.display(),
                offset = self.offset,
                len,
                "Event log shrank; reading it again from the start"
            );
            self.offset = 0;
        }
        if len == self.offset {
            return Ok(LogBatch::default());
        }

        let mut file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| self.io(e))?;
        file.seek(SeekFrom::Start(self.offset))
            .await
            .map_err(|e| self.io(e))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.map_err(|e| self.io(e))?;

        let Some(last_newline) = buf.iter().rposition(|b| *b == b'\n') else {
            return Ok(LogBatch::default());
        };
        let complete = &buf[..=last_newline];
        self.offset += complete.len() as u64;

        Ok(LogBatch::from_text(&String::from_utf8_lossy(complete)))
    }

    fn io(&self, source: std::io::Error) -> EventLogError {
        EventLogError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
