//! Atomic file mutation with write verification and rollback
//!
//! The target file is only ever replaced by a fully-written, read-back-
//! verified temporary sibling, so its visible content is either the
//! pre-mutation original or the complete candidate, never a mixture.

use crate::audit::{AuditAction, AuditLogger};
use crate::backup::BackupRecord;
use std::fs;
use std::path::Path;

/// Write candidate content over `target`. The backup must already exist;
/// it is referenced in the audit trail and is the rollback source.
pub fn write_verified(
    target: &Path,
    content: &str,
    backup: &BackupRecord,
    audit: &AuditLogger,
) -> Result<(), String> {
    atomic_write(target, content.as_bytes())?;
    audit.record(
        AuditAction::FileModified,
        target,
        &format!(
            "wrote {} bytes, backup {}",
            content.len(),
            backup.backup_path.display()
        ),
    );
    Ok(())
}

/// Restore the backup's exact bytes over the target.
pub fn rollback(record: &BackupRecord, audit: &AuditLogger) -> Result<(), String> {
    let bytes = fs::read(&record.backup_path).map_err(|e| {
        format!(
            "Failed to read backup {}: {}",
            record.backup_path.display(),
            e
        )
    })?;

    atomic_write(&record.original_path, &bytes)?;
    audit.record(
        AuditAction::RollbackPerformed,
        &record.original_path,
        &format!("restored {} bytes from backup", bytes.len()),
    );
    Ok(())
}

/// Write to a temporary sibling, read it back and byte-compare, then
/// rename over the target. Any failure discards the temp file and leaves
/// the target untouched.
fn atomic_write(target: &Path, bytes: &[u8]) -> Result<(), String> {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| format!("No file name in {}", target.display()))?;
    let tmp_path = target.with_file_name(format!("{}.tmp.{}", file_name, std::process::id()));

    if let Err(e) = fs::write(&tmp_path, bytes) {
        let _ = fs::remove_file(&tmp_path);
        return Err(format!("Failed to write temp file: {}", e));
    }

    // Write verification: the bytes on disk must match exactly before the
    // target is replaced.
    match fs::read(&tmp_path) {
        Ok(written) if written == bytes => {}
        Ok(_) => {
            let _ = fs::remove_file(&tmp_path);
            return Err("Write verification failed: temp file content mismatch".to_string());
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            return Err(format!("Write verification failed: {}", e));
        }
    }

    if let Err(e) = fs::rename(&tmp_path, target) {
        let _ = fs::remove_file(&tmp_path);
        return Err(format!("Failed to replace {}: {}", target.display(), e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupStore;

    fn setup() -> (tempfile::TempDir, AuditLogger, BackupStore) {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLogger::new(dir.path().join("audit.log"));
        let store = BackupStore::new(dir.path().join("backups"), 7, 5);
        (dir, audit, store)
    }

    #[test]
    fn test_write_replaces_content_completely() {
        let (dir, audit, store) = setup();
        let target = dir.path().join("a.spec.ts");
        fs::write(&target, "old content").unwrap();

        let backup = store.create_backup(&target, &audit).unwrap();
        write_verified(&target, "new content", &backup, &audit).unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "new content");
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let (dir, audit, store) = setup();
        let target = dir.path().join("a.spec.ts");
        fs::write(&target, "old").unwrap();

        let backup = store.create_backup(&target, &audit).unwrap();
        write_verified(&target, "new", &backup, &audit).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_rollback_restores_exact_bytes() {
        let (dir, audit, store) = setup();
        let target = dir.path().join("a.spec.ts");
        let original_bytes = b"original\nwith lines\n".to_vec();
        fs::write(&target, &original_bytes).unwrap();

        let backup = store.create_backup(&target, &audit).unwrap();
        write_verified(&target, "candidate that failed verification", &backup, &audit).unwrap();
        rollback(&backup, &audit).unwrap();

        assert_eq!(fs::read(&target).unwrap(), original_bytes);
    }

    #[test]
    fn test_failed_write_leaves_original_unchanged() {
        let (dir, audit, store) = setup();
        let target = dir.path().join("a.spec.ts");
        fs::write(&target, "original").unwrap();
        let backup = store.create_backup(&target, &audit).unwrap();

        // Block the deterministic temp sibling with a directory so the
        // temp write cannot succeed.
        let tmp_path = dir
            .path()
            .join(format!("a.spec.ts.tmp.{}", std::process::id()));
        fs::create_dir_all(&tmp_path).unwrap();

        let result = write_verified(&target, "candidate", &backup, &audit);
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&target).unwrap(), "original");
    }
}
