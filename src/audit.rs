//! Append-only audit log of every mutating action
//!
//! One JSON object per line. Entries are never rewritten or deleted;
//! the file is opened in append mode for every write so interleaved
//! processes stay line-atomic as far as the OS allows.

use chrono::Utc;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    BackupCreated,
    FileModified,
    RollbackPerformed,
    TestVerified,
    TestFailed,
    BackupDeleted,
}

#[derive(Debug, Serialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub action: AuditAction,
    pub target_path: String,
    pub details: String,
    pub actor: String,
    pub pid: u32,
}

pub struct AuditLogger {
    path: PathBuf,
    actor: String,
}

impl AuditLogger {
    pub fn new(path: PathBuf) -> Self {
        let actor = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());
        Self { path, actor }
    }

    /// Append one entry. The log is the authoritative trail for file
    /// mutations, so callers decide whether a write failure is fatal.
    pub fn log(&self, action: AuditAction, target: &Path, details: &str) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create audit log directory: {}", e))?;
            }
        }

        let entry = AuditEntry {
            timestamp: Utc::now().to_rfc3339(),
            action,
            target_path: target.display().to_string(),
            details: details.to_string(),
            actor: self.actor.clone(),
            pid: std::process::id(),
        };

        let line = serde_json::to_string(&entry)
            .map_err(|e| format!("Failed to serialize audit entry: {}", e))?;

        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| format!("Failed to open audit log {}: {}", self.path.display(), e))?;

        writeln!(file, "{}", line).map_err(|e| format!("Failed to append audit entry: {}", e))
    }

    /// Best-effort variant for entries that must not fail the attempt.
    pub fn record(&self, action: AuditAction, target: &Path, details: &str) {
        if let Err(e) = self.log(action, target, details) {
            eprintln!("  Warning: audit log write failed: {}", e);
        }
    }
}
