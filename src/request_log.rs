//! Opt-in NDJSON side-log of raw backend request/response pairs.
//!
//! This is a diagnostics channel, separate from the artifact sink. It sits
//! outside the temporal-isolation boundary, so wall-clock timestamps are
//! allowed here (and useful when correlating with server logs).

use crate::error::Result;
use serde_json::{json, Value};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Appends one JSON line per backend round-trip.
pub struct RequestLogger {
    path: PathBuf,
    file: File,
    counter: u64,
}

impl RequestLogger {
    /// Create the log file (and parent directories) and open it for append.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file,
            counter: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries_logged(&self) -> u64 {
        self.counter
    }

    /// Log one request/response round-trip.
    pub fn log(&mut self, request: &Value, response: &Value) -> Result<()> {
        self.counter += 1;
        let entry = json!({
            "request_id": self.counter,
            "logged_at": chrono::Utc::now().to_rfc3339(),
            "request": request,
            "response": response,
        });
        serde_json::to_writer(&mut self.file, &entry)?;
        self.file.write_all(b"\n")?;
        self.file.flush()?;
        Ok(())
    }
}
