use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Truncate a string to `max` characters (Unicode-safe).
pub fn truncate(s: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }

    let char_count = s.chars().count();
    if char_count <= max {
        return s.to_string();
    }

    if max <= 3 {
        return s.chars().take(max).collect();
    }

    let truncated: String = s.chars().take(max - 3).collect();
    format!("{}...", truncated)
}

#[derive(Debug)]
pub struct CommandRunResult {
    pub status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

/// Run a child process, capturing combined output, killing it at `timeout`.
pub fn run_command_with_timeout(
    command: &mut Command,
    timeout: Duration,
) -> Result<CommandRunResult, String> {
    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("Failed to start command: {}", e))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| "Failed to capture stdout".to_string())?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| "Failed to capture stderr".to_string())?;

    let stdout_handle = thread::spawn(move || {
        let mut buf = Vec::new();
        let mut reader = BufReader::new(stdout);
        let _ = reader.read_to_end(&mut buf);
        buf
    });
    let stderr_handle = thread::spawn(move || {
        let mut buf = Vec::new();
        let mut reader = BufReader::new(stderr);
        let _ = reader.read_to_end(&mut buf);
        buf
    });

    let start = Instant::now();
    let mut timed_out = false;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                if start.elapsed() >= timeout {
                    timed_out = true;
                    let _ = child.kill();
                    match child.wait() {
                        Ok(status) => break Some(status),
                        Err(_) => break None,
                    }
                }
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => return Err(format!("Failed to wait for command: {}", e)),
        }
    };

    let stdout_bytes = stdout_handle.join().unwrap_or_default();
    let stderr_bytes = stderr_handle.join().unwrap_or_default();

    Ok(CommandRunResult {
        status,
        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        timed_out,
    })
}

/// Resolve a path from the results document against the allow-listed test
/// root. The file must exist, must not be a symlink, and must canonicalize
/// to somewhere inside the test root.
pub fn resolve_test_path(test_root: &Path, candidate: &Path) -> Result<PathBuf, String> {
    if candidate.as_os_str().is_empty() {
        return Err("Test file path is empty".to_string());
    }

    let root = test_root
        .canonicalize()
        .map_err(|e| format!("Failed to resolve test root {}: {}", test_root.display(), e))?;

    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    let meta = joined
        .symlink_metadata()
        .map_err(|e| format!("Test file not accessible: {}: {}", joined.display(), e))?;
    if meta.file_type().is_symlink() {
        return Err(format!(
            "Symlinked test files are not allowed: {}",
            joined.display()
        ));
    }

    let resolved = joined
        .canonicalize()
        .map_err(|e| format!("Failed to resolve {}: {}", joined.display(), e))?;

    if !resolved.starts_with(&root) {
        return Err(format!(
            "Test file escapes the test directory: {}",
            candidate.display()
        ));
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::{resolve_test_path, run_command_with_timeout, truncate};
    use std::fs;
    use std::path::PathBuf;
    use std::process::Command;
    use std::time::Duration;

    #[test]
    fn test_truncate_unicode_safe() {
        let input = "ééééé";
        assert_eq!(truncate(input, 4), "é...");
    }

    #[test]
    fn test_truncate_small_max() {
        let input = "こんにちは";
        assert_eq!(truncate(input, 3), "こんに");
        assert_eq!(truncate(input, 0), "");
    }

    #[test]
    fn test_resolve_test_path_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("login.spec.ts"), "test").unwrap();

        let resolved = resolve_test_path(dir.path(), &PathBuf::from("login.spec.ts")).unwrap();
        assert!(resolved.ends_with("login.spec.ts"));
    }

    #[test]
    fn test_resolve_test_path_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("tests");
        fs::create_dir_all(&inner).unwrap();
        fs::write(dir.path().join("outside.spec.ts"), "test").unwrap();

        let err = resolve_test_path(&inner, &PathBuf::from("../outside.spec.ts")).unwrap_err();
        assert!(err.contains("escapes"));
    }

    #[test]
    fn test_resolve_test_path_rejects_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_test_path(dir.path(), &PathBuf::from("nope.spec.ts")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_test_path_rejects_symlink() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("real.spec.ts"), "test").unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("real.spec.ts"),
            dir.path().join("link.spec.ts"),
        )
        .unwrap();

        let err = resolve_test_path(dir.path(), &PathBuf::from("link.spec.ts")).unwrap_err();
        assert!(err.contains("Symlinked"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_command_times_out() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let result = run_command_with_timeout(&mut cmd, Duration::from_millis(200)).unwrap();
        assert!(result.timed_out);
    }
}
