//! Healing orchestrator: the per-failure pipeline
//!
//! classify -> sanitize -> analyze -> extract -> validate -> write ->
//! verify -> keep or roll back. Failures are processed strictly one at
//! a time: verification re-runs the shared test runner and concurrent
//! writes to overlapping files would race.
//!
//! Every stage failure is converted into the attempt's failure_reason at
//! this boundary; nothing a component returns can abort the run.

use crate::ai::AnalysisClient;
use crate::apply;
use crate::audit::AuditLogger;
use crate::backup::BackupStore;
use crate::classify::classify;
use crate::config::Config;
use crate::extract::extract_candidate;
use crate::prompt::{build_user_prompt, HEAL_SYSTEM};
use crate::rate_limit::RateLimiter;
use crate::report::{HealingAttempt, HealingReport};
use crate::results::RawFailure;
use crate::sanitize::Sanitizer;
use crate::util::truncate;
use crate::validate::CodeValidator;
use crate::verify::VerificationRunner;
use std::fs;
use std::time::Instant;

pub struct HealingOrchestrator {
    config: Config,
    sanitizer: Sanitizer,
    validator: CodeValidator,
    client: AnalysisClient,
    limiter: RateLimiter,
    backups: BackupStore,
    audit: AuditLogger,
    runner: VerificationRunner,
    auto_fix: bool,
    verbose: bool,
}

impl HealingOrchestrator {
    pub fn new(config: Config, auto_fix: bool, verbose: bool) -> Self {
        let sanitizer = Sanitizer::new(config.prompt_max_chars);
        let validator = CodeValidator::new(config.max_file_bytes);
        let client = AnalysisClient::new(&config);
        let limiter = RateLimiter::per_minute(config.calls_per_minute);
        let backups = BackupStore::new(
            config.backup_dir.clone(),
            config.retention_days,
            config.max_backups_per_file,
        );
        let audit = AuditLogger::new(config.audit_log.clone());
        let runner =
            VerificationRunner::new(config.test_command.clone(), config.verify_timeout);

        Self {
            config,
            sanitizer,
            validator,
            client,
            limiter,
            backups,
            audit,
            runner,
            auto_fix,
            verbose,
        }
    }

    /// Process every failure sequentially and build the report. The run
    /// always completes; per-attempt failures never abort the remainder.
    pub async fn run(&mut self, failures: &[RawFailure]) -> HealingReport {
        let start = Instant::now();
        let mut report = HealingReport::new();

        for (idx, raw) in failures.iter().enumerate() {
            eprintln!(
                "  [{}/{}] {} ({})",
                idx + 1,
                failures.len(),
                raw.title,
                raw.file
            );
            let attempt = self.process_one(raw).await;
            eprintln!("      -> {}", attempt.outcome_label());
            report.push(attempt);
        }

        report.finalize(start.elapsed().as_millis() as u64);

        match self.backups.prune(&self.audit) {
            Ok(removed) if removed > 0 && self.verbose => {
                eprintln!("  Pruned {} old backup(s)", removed);
            }
            Ok(_) => {}
            Err(e) => eprintln!("  Warning: backup pruning failed: {}", e),
        }

        match crate::report::write_error_report(&self.config.error_report, &report) {
            Ok(true) => eprintln!(
                "  Error report written to {}",
                self.config.error_report.display()
            ),
            Ok(false) => {}
            Err(e) => eprintln!("  Warning: failed to write error report: {}", e),
        }

        report
    }

    /// One failure through the whole pipeline, ending in a terminal state.
    async fn process_one(&mut self, raw: &RawFailure) -> HealingAttempt {
        let classified = classify(raw, &self.config.test_dir);
        let mut attempt = HealingAttempt::new(classified.failure);

        if !classified.healable {
            let reason = classified
                .skip_reason
                .unwrap_or_else(|| "not healable".to_string());
            if self.verbose {
                eprintln!("      skipping: {}", reason);
            }
            return attempt.skip(reason);
        }

        let source = match fs::read_to_string(&attempt.failure.file_path) {
            Ok(source) => source,
            Err(e) => {
                attempt.failure_reason = Some(format!("Failed to read test file: {}", e));
                return attempt;
            }
        };
        if source.len() as u64 > self.config.max_file_bytes {
            attempt.failure_reason = Some(format!(
                "Test file too large to heal safely ({} > {} bytes)",
                source.len(),
                self.config.max_file_bytes
            ));
            return attempt;
        }

        // Sanitize everything that leaves the machine.
        let error_clean = self.sanitizer.sanitize(&attempt.failure.error_message);
        let source_clean = self.sanitizer.sanitize(&source);
        attempt.injection_flags = error_clean
            .injection_flags
            .iter()
            .chain(source_clean.injection_flags.iter())
            .cloned()
            .collect();
        for flag in &attempt.injection_flags {
            eprintln!(
                "  Warning: possible prompt-injection phrase in input: {:?}",
                flag
            );
        }

        let user_prompt =
            build_user_prompt(&attempt.failure, &error_clean.text, &source_clean.text);
        if self.verbose {
            eprintln!("      analyzing ({} chars of context)", user_prompt.len());
        }

        let analysis = match self
            .client
            .analyze(HEAL_SYSTEM, &user_prompt, &mut self.limiter)
            .await
        {
            Ok(analysis) => analysis,
            Err(reason) => {
                attempt.failure_reason = Some(reason);
                return attempt;
            }
        };
        attempt.raw_analysis = Some(analysis.clone());

        let candidate = match extract_candidate(&analysis) {
            Some(candidate) => candidate,
            None => {
                attempt.failure_reason =
                    Some("No code block qualified as a replacement file".to_string());
                return attempt;
            }
        };
        attempt.candidate_code = Some(candidate.clone());

        let validation = self.validator.validate(&candidate);
        let ok = validation.ok;
        if self.verbose {
            for issue in &validation.issues {
                eprintln!("      validation: {}", issue);
            }
        }
        attempt.validation = Some(validation);
        if !ok {
            let issues = attempt
                .validation
                .as_ref()
                .map(|v| v.issues.join("; "))
                .unwrap_or_default();
            attempt.failure_reason = Some(format!("Candidate rejected: {}", issues));
            return attempt;
        }

        // Analyze-only mode stops before anything touches disk.
        if !self.auto_fix {
            if self.verbose {
                eprintln!("      fix available (run with --auto-fix to apply)");
            }
            return attempt;
        }

        let backup = match self
            .backups
            .create_backup(&attempt.failure.file_path, &self.audit)
        {
            Ok(backup) => backup,
            Err(reason) => {
                attempt.failure_reason = Some(reason);
                return attempt;
            }
        };
        attempt.backup = Some(backup.clone());

        if let Err(reason) =
            apply::write_verified(&attempt.failure.file_path, &candidate, &backup, &self.audit)
        {
            // Backup stays on disk for manual recovery.
            attempt.failure_reason = Some(reason);
            return attempt;
        }
        attempt.applied = true;

        let result = self.runner.verify(&attempt.failure.file_path, &self.audit);
        if result.verified {
            attempt.verified = true;
            if let Err(e) = self.backups.discard(&backup, &self.audit) {
                eprintln!("  Warning: {}", e);
            }
            return attempt;
        }

        if self.verbose {
            eprintln!(
                "      verification output: {}",
                truncate(&result.output, 400)
            );
        }

        match apply::rollback(&backup, &self.audit) {
            Ok(()) => {
                attempt.applied = false;
                attempt.failure_reason =
                    Some("Fix did not verify; original file restored".to_string());
            }
            Err(e) => {
                eprintln!(
                    "  WARNING: rollback failed for {} - the file may still contain the \
                     unverified candidate. Backup: {}",
                    attempt.failure.file_path.display(),
                    backup.backup_path.display()
                );
                attempt.failure_reason = Some(format!(
                    "Fix did not verify and rollback failed: {}",
                    e
                ));
            }
        }
        attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorType;

    fn test_config(root: &std::path::Path) -> Config {
        Config {
            api_key: "sk-or-test".to_string(),
            max_retries: 0,
            request_timeout: std::time::Duration::from_secs(1),
            calls_per_minute: 10,
            max_file_bytes: 256 * 1024,
            prompt_max_chars: 8000,
            test_dir: root.join("tests"),
            backup_dir: root.join("backups"),
            audit_log: root.join("audit.log"),
            error_report: root.join("error-report.json"),
            retention_days: 7,
            max_backups_per_file: 5,
            test_command: "true".to_string(),
            verify_timeout: std::time::Duration::from_secs(5),
        }
    }

    fn raw(file: &str, message: &str) -> RawFailure {
        RawFailure {
            file: file.to_string(),
            title: "a failing test".to_string(),
            error_message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn test_skip_classification_never_calls_analysis() {
        // An infra-classified failure must terminate before the analysis
        // stage; with an unreachable test dir any later stage would fail
        // loudly instead of skipping.
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("tests")).unwrap();
        let mut orchestrator = HealingOrchestrator::new(test_config(dir.path()), true, false);

        let failures = vec![raw("login.spec.ts", "net::ERR_CONNECTION_REFUSED")];
        let report = orchestrator.run(&failures).await;

        assert_eq!(report.total, 1);
        assert_eq!(report.skipped, 1);
        let attempt = &report.tests[0];
        assert!(attempt.skipped);
        // No analysis happened, so nothing downstream was populated.
        assert!(attempt.raw_analysis.is_none());
        assert!(attempt.candidate_code.is_none());
        assert!(attempt.backup.is_none());
    }

    #[tokio::test]
    async fn test_unresolvable_path_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("tests")).unwrap();
        let mut orchestrator = HealingOrchestrator::new(test_config(dir.path()), true, false);

        let failures = vec![raw("../escape.spec.ts", "expect(1).toBe(2)")];
        let report = orchestrator.run(&failures).await;

        assert_eq!(report.total, 1);
        assert!(report.tests[0].skipped);
        assert_eq!(report.tests[0].failure.error_type, ErrorType::Assertion);
    }

    #[tokio::test]
    async fn test_run_completes_across_mixed_failures() {
        // One skip plus one attempt that dies at the analysis stage (the
        // key is fake and there is no network); the run still finishes
        // and reports both.
        let dir = tempfile::tempdir().unwrap();
        let tests_dir = dir.path().join("tests");
        fs::create_dir_all(&tests_dir).unwrap();
        fs::write(
            tests_dir.join("a.spec.ts"),
            "import { test, expect } from '@playwright/test';\ntest('a', async () => { expect(1).toBe(1); });\n",
        )
        .unwrap();

        let mut config = test_config(dir.path());
        config.request_timeout = std::time::Duration::from_millis(50);
        let mut orchestrator = HealingOrchestrator::new(config, false, false);

        let failures = vec![
            raw("a.spec.ts", "Timeout 30000ms exceeded"),
            raw("a.spec.ts", "certificate has expired"),
        ];
        let report = orchestrator.run(&failures).await;

        assert_eq!(report.total, 2);
        assert_eq!(report.skipped, 1);
        assert!(report.tests[0].failure_reason.is_some());
        assert!(!report.tests[0].applied);
    }
}
