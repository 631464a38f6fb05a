// Usage logger
// Appends one CSV row per completed exchange

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::types::UsageRecord;

pub struct UsageLogger {
    path: PathBuf,
    /// Serializes appends so rows from concurrent requests never interleave
    write_lock: Mutex<()>,
}

impl UsageLogger {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record, writing the header first when the file is new or empty
    pub fn log(&self, record: &UsageRecord) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Usage log lock poisoned"))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create usage log directory: {}", parent.display())
            })?;
        }

        let needs_header = fs::metadata(&self.path)
            .map(|meta| meta.len() == 0)
            .unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open usage log: {}", self.path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer
            .serialize(record)
            .context("Failed to write usage record")?;
        writer.flush().context("Failed to flush usage log")?;

        tracing::debug!(
            session_id = %record.session_id,
            total_chars = record.total_chars,
            "Logged usage"
        );
        Ok(())
    }

    /// Log without failing the caller; write errors are reported and dropped
    pub fn record(&self, record: &UsageRecord) {
        if let Err(e) = self.log(record) {
            tracing::warn!(error = %e, path = %self.path.display(), "Error logging usage");
        }
    }

    /// Read every record back (reporting and tests)
    pub fn read_records(&self) -> Result<Vec<UsageRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Failed to read usage log: {}", self.path.display()))?;

        reader
            .deserialize()
            .collect::<Result<Vec<UsageRecord>, _>>()
            .context("Failed to parse usage log")
    }
}
