//! Failure classification: skip/heal gate and error typing
//!
//! Infrastructure failures (network, certificates, DNS) are skipped
//! outright since no code fix can address them. Everything else gets a
//! keyword-derived error type, defaulting to Unknown, and stays eligible
//! for healing.

use crate::results::RawFailure;
use crate::util::resolve_test_path;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Failures whose error text contains any of these indicate environment
/// problems, not test-code defects. First match wins, checked before
/// error typing.
const SKIP_KEYWORDS: &[&str] = &[
    "network error",
    "infrastructure",
    "connection refused",
    "connection_refused",
    "econnrefused",
    "port",
    "certificate",
    "ssl",
    "dns",
    "proxy",
    "socket hang up",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Timeout,
    StrictMode,
    Assertion,
    NotFound,
    Unknown,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Timeout => "timeout",
            ErrorType::StrictMode => "strict_mode",
            ErrorType::Assertion => "assertion",
            ErrorType::NotFound => "not_found",
            ErrorType::Unknown => "unknown",
        }
    }
}

/// One failing test, classified and (when healable) path-validated.
#[derive(Debug, Clone)]
pub struct TestFailure {
    pub file_path: PathBuf,
    pub title: String,
    pub error_message: String,
    pub error_type: ErrorType,
}

#[derive(Debug)]
pub struct Classified {
    pub failure: TestFailure,
    pub healable: bool,
    pub skip_reason: Option<String>,
}

/// Derive the error type by first keyword match over the lowercased text.
pub fn classify_error_type(error_message: &str) -> ErrorType {
    let text = error_message.to_lowercase();
    if text.contains("timeout") || text.contains("timed out") {
        ErrorType::Timeout
    } else if text.contains("strict mode") || text.contains("resolved to") {
        ErrorType::StrictMode
    } else if text.contains("expect") || text.contains("assertion") {
        ErrorType::Assertion
    } else if text.contains("not found") || text.contains("no such element") {
        ErrorType::NotFound
    } else {
        ErrorType::Unknown
    }
}

/// Return the matched skip keyword, if any.
fn skip_keyword(error_message: &str) -> Option<&'static str> {
    let text = error_message.to_lowercase();
    SKIP_KEYWORDS.iter().copied().find(|kw| text.contains(kw))
}

/// Classify one raw failure. Infra keywords skip; otherwise the file path
/// must resolve inside `test_root` (symlinks rejected) before the failure
/// is considered healable.
pub fn classify(raw: &RawFailure, test_root: &Path) -> Classified {
    let error_type = classify_error_type(&raw.error_message);

    if let Some(keyword) = skip_keyword(&raw.error_message) {
        return Classified {
            failure: TestFailure {
                file_path: PathBuf::from(&raw.file),
                title: raw.title.clone(),
                error_message: raw.error_message.clone(),
                error_type,
            },
            healable: false,
            skip_reason: Some(format!(
                "Environment failure ({}) - a code fix cannot address this",
                keyword
            )),
        };
    }

    match resolve_test_path(test_root, Path::new(&raw.file)) {
        Ok(resolved) => Classified {
            failure: TestFailure {
                file_path: resolved,
                title: raw.title.clone(),
                error_message: raw.error_message.clone(),
                error_type,
            },
            healable: true,
            skip_reason: None,
        },
        Err(reason) => Classified {
            failure: TestFailure {
                file_path: PathBuf::from(&raw.file),
                title: raw.title.clone(),
                error_message: raw.error_message.clone(),
                error_type,
            },
            healable: false,
            skip_reason: Some(reason),
        },
    }
}
