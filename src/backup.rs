//! Timestamped file backups with retention
//!
//! A backup is taken before the first write to a file in an attempt and
//! is the exact byte source for rollback. Retention prunes by age and by
//! per-original count; a verified success discards its backup eagerly.

use crate::audit::{AuditAction, AuditLogger};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Serialize)]
pub struct BackupRecord {
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    pub timestamp_ms: i64,
    pub size_bytes: u64,
}

pub struct BackupStore {
    dir: PathBuf,
    retention_days: i64,
    max_per_file: usize,
}

impl BackupStore {
    pub fn new(dir: PathBuf, retention_days: i64, max_per_file: usize) -> Self {
        Self {
            dir,
            retention_days,
            max_per_file: max_per_file.max(1),
        }
    }

    /// Copy the file's current bytes to `{basename}.{timestamp_ms}.bak`.
    pub fn create_backup(
        &self,
        original: &Path,
        audit: &AuditLogger,
    ) -> Result<BackupRecord, String> {
        let bytes = fs::read(original)
            .map_err(|e| format!("Failed to read {} for backup: {}", original.display(), e))?;

        fs::create_dir_all(&self.dir)
            .map_err(|e| format!("Failed to create backup directory: {}", e))?;

        let basename = original
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| format!("No file name in {}", original.display()))?;

        // Bump the timestamp on collision so two backups in the same
        // millisecond never overwrite each other.
        let mut timestamp_ms = Utc::now().timestamp_millis();
        let mut backup_path = self.dir.join(format!("{}.{}.bak", basename, timestamp_ms));
        while backup_path.exists() {
            timestamp_ms += 1;
            backup_path = self.dir.join(format!("{}.{}.bak", basename, timestamp_ms));
        }

        fs::write(&backup_path, &bytes)
            .map_err(|e| format!("Failed to write backup {}: {}", backup_path.display(), e))?;

        let record = BackupRecord {
            original_path: original.to_path_buf(),
            backup_path,
            timestamp_ms,
            size_bytes: bytes.len() as u64,
        };

        audit.record(
            AuditAction::BackupCreated,
            original,
            &format!(
                "backup {} ({} bytes)",
                record.backup_path.display(),
                record.size_bytes
            ),
        );

        Ok(record)
    }

    /// Remove one backup after a verified success.
    pub fn discard(&self, record: &BackupRecord, audit: &AuditLogger) -> Result<(), String> {
        fs::remove_file(&record.backup_path).map_err(|e| {
            format!(
                "Failed to delete backup {}: {}",
                record.backup_path.display(),
                e
            )
        })?;
        audit.record(
            AuditAction::BackupDeleted,
            &record.original_path,
            &format!("discarded {}", record.backup_path.display()),
        );
        Ok(())
    }

    /// Apply age- and count-based retention. Returns how many backups
    /// were removed.
    pub fn prune(&self, audit: &AuditLogger) -> Result<usize, String> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let mut by_original: HashMap<String, Vec<(i64, PathBuf)>> = HashMap::new();
        for entry in WalkDir::new(&self.dir).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some((base, timestamp_ms)) = parse_backup_name(&name) {
                by_original
                    .entry(base)
                    .or_default()
                    .push((timestamp_ms, entry.path().to_path_buf()));
            }
        }

        let now_ms = Utc::now().timestamp_millis();
        let cutoff_ms = now_ms - self.retention_days * MS_PER_DAY;
        let mut removed = 0;

        for (_, mut backups) in by_original {
            // Newest first; everything past max_per_file or older than the
            // retention window goes.
            backups.sort_by(|a, b| b.0.cmp(&a.0));
            for (idx, (timestamp_ms, path)) in backups.iter().enumerate() {
                let expired = self.retention_days > 0 && *timestamp_ms < cutoff_ms;
                let over_cap = idx >= self.max_per_file;
                if !expired && !over_cap {
                    continue;
                }
                if fs::remove_file(path).is_ok() {
                    removed += 1;
                    audit.record(
                        AuditAction::BackupDeleted,
                        path,
                        if over_cap { "over per-file cap" } else { "expired" },
                    );
                }
            }
        }

        Ok(removed)
    }
}

/// Parse `{basename}.{timestamp_ms}.bak` into (basename, timestamp).
fn parse_backup_name(name: &str) -> Option<(String, i64)> {
    let stem = name.strip_suffix(".bak")?;
    let (base, timestamp) = stem.rsplit_once('.')?;
    let timestamp_ms: i64 = timestamp.parse().ok()?;
    if base.is_empty() {
        return None;
    }
    Some((base.to_string(), timestamp_ms))
}
