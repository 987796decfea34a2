//! Prompt assembly for the healing request
//!
//! The system prompt pins the output contract: one complete corrected
//! test file in a single fenced block. The user prompt carries only
//! sanitized text plus per-error-type hints.

use crate::classify::{ErrorType, TestFailure};

pub const HEAL_SYSTEM: &str = r#"You are a senior test automation engineer. A Playwright test is failing and you will produce a corrected version of the test file.

Rules:
1. Output the COMPLETE corrected test file in a single ```typescript code block
2. The file must keep its imports and test structure; change only what the failure requires
3. Prefer resilient locators (getByRole, getByTestId) over brittle CSS selectors
4. Do not invent new application behavior; fix the test, not the product
5. A short explanation before the code block is fine; nothing after it"#;

/// Build the user prompt from sanitized inputs.
pub fn build_user_prompt(
    failure: &TestFailure,
    sanitized_error: &str,
    sanitized_source: &str,
) -> String {
    let file_name = failure
        .file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "test.spec.ts".to_string());

    let mut prompt = format!(
        "Test: {}\nFile: {}\nFailure category: {}\n\nError output:\n```\n{}\n```\n\nCurrent test file:\n```typescript\n{}\n```",
        failure.title,
        file_name,
        failure.error_type.as_str(),
        sanitized_error,
        sanitized_source
    );

    if let Some(hints) = hint_lines(failure.error_type) {
        prompt.push_str("\n\nLikely causes for this category:\n");
        prompt.push_str(hints);
    }

    prompt.push_str("\n\nProduce the corrected test file now.");
    prompt
}

/// Type-specific analysis hints. Unknown gets none.
fn hint_lines(error_type: ErrorType) -> Option<&'static str> {
    match error_type {
        ErrorType::Timeout => Some(
            "- The awaited element never appears; the locator may be stale\n\
             - A navigation or network settle wait may be missing\n\
             - The timeout may simply be too short for this page",
        ),
        ErrorType::StrictMode => Some(
            "- The locator resolves to multiple elements; it needs narrowing\n\
             - Use .first()/.nth() only when order is guaranteed; prefer a more specific locator",
        ),
        ErrorType::Assertion => Some(
            "- The expected value may be outdated after a UI copy change\n\
             - The assertion may run before the UI settles; await the state first",
        ),
        ErrorType::NotFound => Some(
            "- The element id/class/test-id likely changed in the application\n\
             - Check for renamed routes or removed elements",
        ),
        ErrorType::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn failure(error_type: ErrorType) -> TestFailure {
        TestFailure {
            file_path: PathBuf::from("/repo/tests/login.spec.ts"),
            title: "logs in".to_string(),
            error_message: "raw".to_string(),
            error_type,
        }
    }

    #[test]
    fn test_prompt_includes_sanitized_sections() {
        let prompt = build_user_prompt(&failure(ErrorType::Timeout), "<path> timed out", "test('x', ...)");
        assert!(prompt.contains("Failure category: timeout"));
        assert!(prompt.contains("<path> timed out"));
        assert!(prompt.contains("Likely causes"));
    }

    #[test]
    fn test_unknown_type_gets_no_hints() {
        let prompt = build_user_prompt(&failure(ErrorType::Unknown), "odd", "test('x', ...)");
        assert!(!prompt.contains("Likely causes"));
    }

    #[test]
    fn test_prompt_uses_file_name_not_full_path() {
        let prompt = build_user_prompt(&failure(ErrorType::Assertion), "e", "s");
        assert!(prompt.contains("File: login.spec.ts"));
        assert!(!prompt.contains("/repo/tests"));
    }
}
