//! Append-only artifact sinks.
//!
//! One self-contained JSON object per line, flushed before `append`
//! returns, never rewritten. This is what allows a long-running campaign to
//! be safely interrupted and partially analyzed.

use crate::error::Result;
use crate::record::InteractionRecord;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Destination for finished interaction records.
pub trait ArtifactSink {
    /// Append one record as a single JSON line and flush it to the
    /// destination before returning.
    fn append(&mut self, record: &InteractionRecord) -> Result<()>;

    /// Number of records appended so far.
    fn records_written(&self) -> usize;
}

/// NDJSON file sink.
pub struct JsonlSink {
    path: PathBuf,
    file: File,
    written: usize,
}

impl JsonlSink {
    /// Open the sink for append, creating the file and parent directories.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ArtifactSink for JsonlSink {
    fn append(&mut self, record: &InteractionRecord) -> Result<()> {
        serde_json::to_writer(&mut self.file, record)?;
        self.file.write_all(b"\n")?;
        self.file.flush()?;
        self.written += 1;
        Ok(())
    }

    fn records_written(&self) -> usize {
        self.written
    }
}

/// In-memory sink for tests: keeps the serialized lines.
#[derive(Default)]
pub struct MemorySink {
    pub lines: Vec<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactSink for MemorySink {
    fn append(&mut self, record: &InteractionRecord) -> Result<()> {
        self.lines.push(serde_json::to_string(record)?);
        Ok(())
    }

    fn records_written(&self) -> usize {
        self.lines.len()
    }
}
