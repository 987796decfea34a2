//! Parser for the test runner's JSON results document
//!
//! The document is the Playwright JSON reporter shape: a tree of suites,
//! each naming its source file and carrying specs with per-attempt
//! results. A document missing required structure is rejected wholesale;
//! we never heal from a partially-understood run.

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RunDocument {
    pub suites: Vec<Suite>,
}

#[derive(Debug, Deserialize)]
pub struct Suite {
    pub file: String,
    #[serde(default)]
    pub title: String,
    pub specs: Vec<Spec>,
    /// Suites nest arbitrarily (describe blocks).
    #[serde(default)]
    pub suites: Vec<Suite>,
}

#[derive(Debug, Deserialize)]
pub struct Spec {
    pub title: String,
    pub ok: bool,
    #[serde(default)]
    pub tests: Vec<SpecTest>,
}

#[derive(Debug, Deserialize)]
pub struct SpecTest {
    #[serde(default)]
    pub results: Vec<SpecResult>,
}

#[derive(Debug, Deserialize)]
pub struct SpecResult {
    #[serde(default)]
    pub error: Option<ErrorObject>,
    #[serde(default)]
    pub errors: Vec<ErrorObject>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorObject {
    #[serde(default)]
    pub message: Option<String>,
}

/// One failing spec, before classification. The file path is raw text
/// from the document; it is validated later, never trusted here.
#[derive(Debug, Clone)]
pub struct RawFailure {
    pub file: String,
    pub title: String,
    pub error_message: String,
}

/// Parse the results document, rejecting anything structurally malformed.
pub fn parse_results(content: &str) -> Result<RunDocument> {
    serde_json::from_str(content).context("Malformed test results document")
}

/// Walk the suite tree and collect one failure per failing spec.
pub fn collect_failures(doc: &RunDocument) -> Vec<RawFailure> {
    let mut failures = Vec::new();
    for suite in &doc.suites {
        collect_from_suite(suite, &mut failures);
    }
    failures
}

fn collect_from_suite(suite: &Suite, failures: &mut Vec<RawFailure>) {
    for spec in &suite.specs {
        if spec.ok {
            continue;
        }
        failures.push(RawFailure {
            file: suite.file.clone(),
            title: spec.title.clone(),
            error_message: concat_error_messages(spec),
        });
    }
    for nested in &suite.suites {
        collect_from_suite(nested, failures);
    }
}

/// Concatenate every reported error fragment, in order, newline-joined.
fn concat_error_messages(spec: &Spec) -> String {
    let mut fragments: Vec<String> = Vec::new();
    for test in &spec.tests {
        for result in &test.results {
            if let Some(msg) = result.error.as_ref().and_then(|e| e.message.as_deref()) {
                if !msg.trim().is_empty() {
                    fragments.push(msg.to_string());
                }
            }
            for err in &result.errors {
                if let Some(msg) = err.message.as_deref() {
                    if !msg.trim().is_empty() && fragments.last().map(String::as_str) != Some(msg)
                    {
                        fragments.push(msg.to_string());
                    }
                }
            }
        }
    }
    fragments.join("\n")
}
