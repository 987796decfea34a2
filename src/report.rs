//! Run-level result records: healing attempts, the aggregate report, and
//! the machine-readable error report for attempts that ended NotFixed.

use crate::backup::BackupRecord;
use crate::classify::{ErrorType, TestFailure};
use crate::validate::Validation;
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// One pass of the pipeline for a single failing test. Created when
/// processing starts, mutated through the stages, immutable once pushed
/// into the report.
#[derive(Debug)]
pub struct HealingAttempt {
    pub failure: TestFailure,
    pub skipped: bool,
    pub skip_reason: Option<String>,
    /// Unmodified service response, for diagnostics.
    pub raw_analysis: Option<String>,
    pub candidate_code: Option<String>,
    pub validation: Option<Validation>,
    pub backup: Option<BackupRecord>,
    pub applied: bool,
    pub verified: bool,
    pub failure_reason: Option<String>,
    pub injection_flags: Vec<String>,
}

impl HealingAttempt {
    pub fn new(failure: TestFailure) -> Self {
        Self {
            failure,
            skipped: false,
            skip_reason: None,
            raw_analysis: None,
            candidate_code: None,
            validation: None,
            backup: None,
            applied: false,
            verified: false,
            failure_reason: None,
            injection_flags: Vec::new(),
        }
    }

    pub fn skip(mut self, reason: String) -> Self {
        self.skipped = true;
        self.skip_reason = Some(reason);
        self
    }

    /// Terminal NotFixed: processing stopped at some stage.
    pub fn not_fixed(&self) -> bool {
        !self.skipped && self.failure_reason.is_some()
    }

    pub fn outcome_label(&self) -> &'static str {
        if self.skipped {
            "skipped"
        } else if self.verified {
            "verified"
        } else if self.applied {
            "applied"
        } else if self.failure_reason.is_some() {
            "not fixed"
        } else {
            "analyzed"
        }
    }
}

#[derive(Debug)]
pub struct HealingReport {
    pub run_id: Uuid,
    pub total: usize,
    pub fixed: usize,
    pub verified: usize,
    pub skipped: usize,
    pub success_rate: f64,
    pub duration_ms: u64,
    pub tests: Vec<HealingAttempt>,
}

impl HealingReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            total: 0,
            fixed: 0,
            verified: 0,
            skipped: 0,
            success_rate: 0.0,
            duration_ms: 0,
            tests: Vec::new(),
        }
    }

    /// Append a finished attempt and fold it into the counts.
    pub fn push(&mut self, attempt: HealingAttempt) {
        self.total += 1;
        if attempt.skipped {
            self.skipped += 1;
        }
        if attempt.applied {
            self.fixed += 1;
        }
        if attempt.verified {
            self.verified += 1;
        }
        self.tests.push(attempt);
    }

    /// Called exactly once at the end of the run.
    pub fn finalize(&mut self, duration_ms: u64) {
        self.duration_ms = duration_ms;
        self.success_rate = if self.total > 0 {
            self.verified as f64 / self.total as f64
        } else {
            0.0
        };
    }
}

impl Default for HealingReport {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct ErrorReportDocument {
    generated_at: String,
    failures: Vec<ErrorReportEntry>,
}

#[derive(Serialize)]
struct ErrorReportEntry {
    file: String,
    title: String,
    error_type: ErrorType,
    error_summary: String,
    reason: String,
    hint: &'static str,
}

/// Static remediation hints per failure category.
fn remediation_hint(error_type: ErrorType) -> &'static str {
    match error_type {
        ErrorType::Timeout => {
            "Check that the awaited element still exists and consider a longer timeout for slow pages"
        }
        ErrorType::StrictMode => {
            "Narrow the locator so it resolves to exactly one element (role, test id, or text filter)"
        }
        ErrorType::Assertion => {
            "Compare the expected value against the current UI copy and state"
        }
        ErrorType::NotFound => {
            "The element id/class/test-id likely changed in the application; update the locator"
        }
        ErrorType::Unknown => "Inspect the full error output manually; no category matched",
    }
}

/// Write the error-report document for NotFixed attempts. Nothing is
/// written when every attempt succeeded or was skipped; returns whether
/// a file was produced.
pub fn write_error_report(path: &Path, report: &HealingReport) -> Result<bool, String> {
    let failures: Vec<ErrorReportEntry> = report
        .tests
        .iter()
        .filter(|attempt| attempt.not_fixed())
        .map(|attempt| ErrorReportEntry {
            file: attempt.failure.file_path.display().to_string(),
            title: attempt.failure.title.clone(),
            error_type: attempt.failure.error_type,
            error_summary: attempt
                .failure
                .error_message
                .lines()
                .next()
                .unwrap_or("")
                .to_string(),
            reason: attempt.failure_reason.clone().unwrap_or_default(),
            hint: remediation_hint(attempt.failure.error_type),
        })
        .collect();

    if failures.is_empty() {
        return Ok(false);
    }

    let document = ErrorReportDocument {
        generated_at: Utc::now().to_rfc3339(),
        failures,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create error report directory: {}", e))?;
        }
    }

    let json = serde_json::to_string_pretty(&document)
        .map_err(|e| format!("Failed to serialize error report: {}", e))?;
    fs::write(path, json)
        .map_err(|e| format!("Failed to write error report {}: {}", path.display(), e))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn failure(error_type: ErrorType) -> TestFailure {
        TestFailure {
            file_path: PathBuf::from("tests/login.spec.ts"),
            title: "logs in".to_string(),
            error_message: "Timeout 30000ms exceeded\nwaiting for locator".to_string(),
            error_type,
        }
    }

    #[test]
    fn test_report_counts_and_rate() {
        let mut report = HealingReport::new();

        let mut ok = HealingAttempt::new(failure(ErrorType::Timeout));
        ok.applied = true;
        ok.verified = true;
        report.push(ok);

        let mut bad = HealingAttempt::new(failure(ErrorType::Assertion));
        bad.failure_reason = Some("validation failed".to_string());
        report.push(bad);

        report.push(HealingAttempt::new(failure(ErrorType::Unknown)).skip("infra".to_string()));

        report.finalize(1234);
        assert_eq!(report.total, 3);
        assert_eq!(report.fixed, 1);
        assert_eq!(report.verified, 1);
        assert_eq!(report.skipped, 1);
        assert!((report.success_rate - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.duration_ms, 1234);
    }

    #[test]
    fn test_error_report_written_only_for_not_fixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("error-report.json");

        let mut clean = HealingReport::new();
        let mut ok = HealingAttempt::new(failure(ErrorType::Timeout));
        ok.verified = true;
        clean.push(ok);
        assert!(!write_error_report(&path, &clean).unwrap());
        assert!(!path.exists());

        let mut dirty = HealingReport::new();
        let mut bad = HealingAttempt::new(failure(ErrorType::Timeout));
        bad.failure_reason = Some("no qualifying code block".to_string());
        dirty.push(bad);
        assert!(write_error_report(&path, &dirty).unwrap());

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["failures"][0]["error_type"], "timeout");
        assert_eq!(json["failures"][0]["error_summary"], "Timeout 30000ms exceeded");
        assert!(json["failures"][0]["hint"]
            .as_str()
            .unwrap()
            .contains("timeout"));
    }

    #[test]
    fn test_skipped_attempts_are_not_in_error_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("error-report.json");

        let mut report = HealingReport::new();
        report.push(HealingAttempt::new(failure(ErrorType::Unknown)).skip("infra".to_string()));
        assert!(!write_error_report(&path, &report).unwrap());
    }

    #[test]
    fn test_outcome_labels() {
        let mut attempt = HealingAttempt::new(failure(ErrorType::Timeout));
        assert_eq!(attempt.outcome_label(), "analyzed");
        attempt.failure_reason = Some("x".to_string());
        assert_eq!(attempt.outcome_label(), "not fixed");
        attempt.failure_reason = None;
        attempt.applied = true;
        assert_eq!(attempt.outcome_label(), "applied");
        attempt.verified = true;
        assert_eq!(attempt.outcome_label(), "verified");
    }
}
