//! testmend - self-healing for failing Playwright UI tests
//!
//! Reads the runner's JSON results document, asks an LLM for a corrected
//! version of each failing test file, applies it atomically with backup,
//! and verifies by re-running the single file. Without --auto-fix the run
//! is analyze-only and never touches disk.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use testmend::config::Config;
use testmend::heal::HealingOrchestrator;
use testmend::report::HealingReport;
use testmend::results::{collect_failures, parse_results};

#[derive(Parser, Debug)]
#[command(
    name = "testmend",
    about = "Self-healing for failing Playwright UI tests",
    version
)]
struct Args {
    /// Only heal failing tests whose file name contains this substring
    filter: Option<String>,

    /// Apply and verify fixes (default is analyze-only, no file mutation)
    #[arg(short = 'a', long)]
    auto_fix: bool,

    /// Surface internal diagnostic detail
    #[arg(short, long)]
    verbose: bool,

    /// Path to the test runner's JSON results document
    #[arg(long, default_value = "test-results.json")]
    results: PathBuf,

    /// Store the OpenRouter API key in the system keychain
    #[arg(long)]
    setup: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.setup {
        return testmend::config::setup_api_key_interactive()
            .map_err(|e| anyhow::anyhow!("Setup failed: {}", e));
    }

    // Startup failures (config, credentials, input document) exit
    // non-zero; per-attempt failures later never do.
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let content = fs::read_to_string(&args.results)
        .with_context(|| format!("Failed to read results document {}", args.results.display()))?;
    let document = parse_results(&content)?;

    let mut failures = collect_failures(&document);
    if let Some(filter) = &args.filter {
        failures.retain(|f| f.file.contains(filter.as_str()));
    }

    if failures.is_empty() {
        println!("  No failing tests to heal.");
        return Ok(());
    }

    eprintln!(
        "  Healing {} failing test(s){}",
        failures.len(),
        if args.auto_fix { "" } else { " (analyze-only)" }
    );

    let mut orchestrator = HealingOrchestrator::new(config, args.auto_fix, args.verbose);
    let report = orchestrator.run(&failures).await;

    print_summary(&report, args.auto_fix);
    Ok(())
}

fn print_summary(report: &HealingReport, auto_fix: bool) {
    let not_fixed = report.tests.iter().filter(|a| a.not_fixed()).count();

    println!();
    println!("  ┌─────────────────────────────────────────────┐");
    println!("  │  HEALING REPORT                             │");
    println!("  └─────────────────────────────────────────────┘");
    println!("  run {}", report.run_id);
    println!(
        "  {} total  │  {} applied  │  {} verified  │  {} skipped  │  {} not fixed",
        report.total, report.fixed, report.verified, report.skipped, not_fixed
    );
    println!(
        "  success rate {:.0}%  in {:.1}s",
        report.success_rate * 100.0,
        report.duration_ms as f64 / 1000.0
    );

    for attempt in &report.tests {
        println!(
            "    [{}] {} - {}",
            attempt.outcome_label(),
            attempt.failure.title,
            attempt
                .failure_reason
                .as_deref()
                .or(attempt.skip_reason.as_deref())
                .unwrap_or("ok")
        );
    }

    if !auto_fix && report.tests.iter().any(|a| a.candidate_code.is_some()) {
        println!();
        println!("  Run again with --auto-fix to apply the fixes above.");
    }
    println!();
}
