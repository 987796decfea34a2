//! Runtime configuration, sourced from the environment at startup
//!
//! Every knob has a default; invalid values fail startup rather than
//! degrading silently. The OpenRouter API key resolves env-first, then
//! the system keychain.

use keyring::Entry;
use std::path::PathBuf;
use std::time::Duration;

const KEYRING_SERVICE: &str = "testmend";
const KEYRING_USERNAME: &str = "openrouter_api_key";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub max_retries: u32,
    pub request_timeout: Duration,
    pub calls_per_minute: u32,
    pub max_file_bytes: u64,
    pub prompt_max_chars: usize,
    /// Allow-listed root for test files; nothing outside it is ever touched.
    pub test_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub audit_log: PathBuf,
    pub error_report: PathBuf,
    pub retention_days: i64,
    pub max_backups_per_file: usize,
    pub test_command: String,
    pub verify_timeout: Duration,
}

fn keyring_entry() -> Result<Entry, keyring::Error> {
    Entry::new(KEYRING_SERVICE, KEYRING_USERNAME)
}

fn read_keyring_key() -> Result<Option<String>, keyring::Error> {
    let entry = keyring_entry()?;
    match entry.get_password() {
        Ok(key) => Ok(Some(key)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Store the API key in the system keychain and verify the write.
pub fn store_api_key(key: &str) -> Result<(), String> {
    let entry = keyring_entry().map_err(|e| format!("Keychain unavailable: {}", e))?;
    entry
        .set_password(key)
        .map_err(|e| format!("Failed to store API key in system keychain: {}", e))?;

    match read_keyring_key() {
        Ok(Some(stored)) if stored == key => Ok(()),
        _ => Err(
            "API key verification failed: key was not persisted to keychain. \
             You can set the OPENROUTER_API_KEY environment variable instead."
                .to_string(),
        ),
    }
}

/// Resolve the OpenRouter API key: environment variable takes precedence,
/// then the system keychain.
fn resolve_api_key() -> Result<String, String> {
    if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
        if !key.trim().is_empty() {
            return Ok(key);
        }
    }

    match read_keyring_key() {
        Ok(Some(key)) => return Ok(key),
        Ok(None) => {}
        Err(err) => {
            eprintln!(
                "  Warning: Failed to read API key from system keychain: {}",
                err
            );
        }
    }

    Err("OPENROUTER_API_KEY is not set and no key is stored in the system keychain".to_string())
}

/// Validate API key format (OpenRouter keys start with sk-)
pub fn validate_api_key_format(key: &str) -> bool {
    key.starts_with("sk-")
}

fn env_u32(name: &str, default: u32) -> Result<u32, String> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("{} must be a non-negative integer, got {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

fn env_u64(name: &str, default: u64) -> Result<u64, String> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("{} must be a non-negative integer, got {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

fn env_path(name: &str, default: &str) -> PathBuf {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => PathBuf::from(raw),
        _ => PathBuf::from(default),
    }
}

impl Config {
    /// Load and validate configuration. Any error here aborts the run
    /// before a single test is processed.
    pub fn from_env() -> Result<Self, String> {
        let api_key = resolve_api_key()?;
        if !validate_api_key_format(&api_key) {
            return Err(
                "API key doesn't look like an OpenRouter key (should start with sk-)".to_string(),
            );
        }

        let max_retries = env_u32("TESTMEND_MAX_RETRIES", 3)?;
        let request_timeout_secs = env_u64("TESTMEND_REQUEST_TIMEOUT_SECS", 120)?;
        if request_timeout_secs == 0 {
            return Err("TESTMEND_REQUEST_TIMEOUT_SECS must be greater than zero".to_string());
        }

        let calls_per_minute = env_u32("TESTMEND_CALLS_PER_MINUTE", 10)?;
        if calls_per_minute == 0 {
            return Err("TESTMEND_CALLS_PER_MINUTE must be greater than zero".to_string());
        }

        let max_file_bytes = env_u64("TESTMEND_MAX_FILE_BYTES", 256 * 1024)?;
        if max_file_bytes == 0 {
            return Err("TESTMEND_MAX_FILE_BYTES must be greater than zero".to_string());
        }

        let prompt_max_chars = env_u64("TESTMEND_PROMPT_MAX_CHARS", 8000)? as usize;
        if prompt_max_chars < 200 {
            return Err("TESTMEND_PROMPT_MAX_CHARS must be at least 200".to_string());
        }

        let retention_days = env_u64("TESTMEND_RETENTION_DAYS", 7)? as i64;
        let max_backups_per_file = env_u64("TESTMEND_MAX_BACKUPS_PER_FILE", 5)? as usize;
        if max_backups_per_file == 0 {
            return Err("TESTMEND_MAX_BACKUPS_PER_FILE must be greater than zero".to_string());
        }

        let verify_timeout_secs = env_u64("TESTMEND_VERIFY_TIMEOUT_SECS", 180)?;
        if verify_timeout_secs == 0 {
            return Err("TESTMEND_VERIFY_TIMEOUT_SECS must be greater than zero".to_string());
        }

        let test_command = match std::env::var("TESTMEND_TEST_COMMAND") {
            Ok(raw) if !raw.trim().is_empty() => raw,
            _ => "npx playwright test".to_string(),
        };

        Ok(Self {
            api_key,
            max_retries,
            request_timeout: Duration::from_secs(request_timeout_secs),
            calls_per_minute,
            max_file_bytes,
            prompt_max_chars,
            test_dir: env_path("TESTMEND_TEST_DIR", "tests"),
            backup_dir: env_path("TESTMEND_BACKUP_DIR", ".testmend/backups"),
            audit_log: env_path("TESTMEND_AUDIT_LOG", ".testmend/audit.log"),
            error_report: env_path("TESTMEND_ERROR_REPORT", ".testmend/error-report.json"),
            retention_days,
            max_backups_per_file,
            test_command,
            verify_timeout: Duration::from_secs(verify_timeout_secs),
        })
    }
}

/// Interactive prompt to store the API key in the system keychain.
pub fn setup_api_key_interactive() -> Result<(), String> {
    use std::io::{self, Write};

    println!();
    println!("  testmend uses OpenRouter for analysis (BYOK).");
    println!();
    println!("  1. Get an API key at: https://openrouter.ai/keys");
    println!("  2. Paste it below (saved in your system keychain)");
    println!();
    print!("  API Key: ");
    io::stdout().flush().map_err(|e| e.to_string())?;

    let mut key = String::new();
    io::stdin().read_line(&mut key).map_err(|e| e.to_string())?;
    let key = key.trim().to_string();

    if key.is_empty() {
        return Err("No API key provided".to_string());
    }

    if !validate_api_key_format(&key) {
        println!();
        println!("  Warning: Key doesn't look like an OpenRouter key (should start with sk-)");
        println!("     Saving anyway...");
    }

    store_api_key(&key)?;
    println!();
    println!("  + API key saved.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_api_key_format() {
        assert!(validate_api_key_format("sk-or-v1-abc123"));
        assert!(!validate_api_key_format("pk-abc123"));
        assert!(!validate_api_key_format(""));
    }

    #[test]
    fn test_env_u32_rejects_garbage() {
        std::env::set_var("TESTMEND_TEST_ENV_U32", "not-a-number");
        let err = env_u32("TESTMEND_TEST_ENV_U32", 3).unwrap_err();
        assert!(err.contains("TESTMEND_TEST_ENV_U32"));
        std::env::remove_var("TESTMEND_TEST_ENV_U32");
    }

    #[test]
    fn test_env_u32_default_when_unset() {
        std::env::remove_var("TESTMEND_TEST_ENV_U32_UNSET");
        assert_eq!(env_u32("TESTMEND_TEST_ENV_U32_UNSET", 7).unwrap(), 7);
    }

    #[test]
    fn test_env_path_default() {
        std::env::remove_var("TESTMEND_TEST_ENV_PATH");
        assert_eq!(
            env_path("TESTMEND_TEST_ENV_PATH", ".testmend/backups"),
            PathBuf::from(".testmend/backups")
        );
    }
}
