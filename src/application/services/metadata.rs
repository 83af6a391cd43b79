//! Export history kept next to the exported tree.

use std::path::Path;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::application::error_ext::JsonResultExt;
use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::infrastructure::traits::FileSystem;

/// Number of runs kept in `export_history`.
pub const HISTORY_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub pages: usize,
    pub errors: usize,
}

/// Summary of the last export plus a rolling history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportMetadata {
    pub last_export: String,
    pub pages_exported: usize,
    pub errors: usize,
    pub duration_seconds: f64,
    pub cancelled: bool,
    pub structure_fingerprint: Option<String>,
    pub failed: Vec<String>,
    pub export_history: Vec<HistoryEntry>,
}

/// Figures of one finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStats {
    pub finished_at: DateTime<Local>,
    pub pages: usize,
    pub errors: usize,
    pub duration_seconds: f64,
    pub cancelled: bool,
    pub fingerprint: Option<String>,
    pub failed: Vec<String>,
}

impl ExportMetadata {
    /// Read metadata; `Ok(None)` if the file does not exist.
    pub fn load(fs: &dyn FileSystem, path: &Path) -> ApplicationResult<Option<Self>> {
        if !fs.exists(path) {
            return Ok(None);
        }
        let content = fs
            .read_to_string(path)
            .with_path_context("read export metadata", path)?;
        serde_json::from_str(&content)
            .with_decode_context(path)
            .map(Some)
    }

    /// Record a run: previous history is kept (last entries only), an
    /// unreadable previous file starts a fresh history.
    pub fn record(fs: &dyn FileSystem, path: &Path, stats: RunStats) -> ApplicationResult<Self> {
        let previous = match Self::load(fs, path) {
            Ok(previous) => previous.unwrap_or_default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable export metadata");
                Self::default()
            }
        };

        let timestamp = stats.finished_at.to_rfc3339();
        let mut history = previous.export_history;
        history.push(HistoryEntry {
            timestamp: timestamp.clone(),
            pages: stats.pages,
            errors: stats.errors,
        });
        let excess = history.len().saturating_sub(HISTORY_LEN);
        history.drain(..excess);

        let metadata = Self {
            last_export: timestamp,
            pages_exported: stats.pages,
            errors: stats.errors,
            duration_seconds: stats.duration_seconds,
            cancelled: stats.cancelled,
            structure_fingerprint: stats.fingerprint,
            failed: stats.failed,
            export_history: history,
        };

        let json = serde_json::to_string_pretty(&metadata).map_err(|e| ApplicationError::Decode {
            context: "export metadata".to_string(),
            message: e.to_string(),
        })?;
        fs.write(path, &format!("{json}\n"))
            .with_path_context("write export metadata", path)?;
        debug!(path = %path.display(), runs = metadata.export_history.len(), "export metadata written");
        Ok(metadata)
    }

    /// Most recent `n` history entries, oldest first.
    pub fn recent(&self, n: usize) -> &[HistoryEntry] {
        let start = self.export_history.len().saturating_sub(n);
        &self.export_history[start..]
    }
}
