//! Acceptance checks on extracted candidate code
//!
//! Last line of defense before generated text can reach disk. Checks are
//! shallow and structural on purpose; this is not a parser. A hard
//! failure on any one of them means the file is never written.

use regex::Regex;

#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub ok: bool,
    pub issues: Vec<String>,
}

/// Constructs that must never appear in a test file we write: filesystem
/// deletion, process control, dynamic evaluation, shell access, and the
/// module imports that enable them.
const DANGEROUS_PATTERNS: &[&str] = &[
    "fs.unlink",
    "fs.rm",
    "rmsync",
    "rmdirsync",
    "rimraf",
    "process.exit",
    "process.kill",
    "execsync",
    "spawnsync",
    "child_process",
];

const DANGEROUS_MODULES: &str =
    r#"(?:require\s*\(\s*|from\s+)['"](?:node:)?(?:fs|child_process|os|path)(?:/[^'"]*)?['"]"#;

/// Bare eval/new Function, excluding Playwright's $eval/$$eval helpers.
const DYNAMIC_EVAL: &str = r"(?:^|[^\w$])eval\s*\(|new\s+Function\s*\(";

pub(crate) fn has_test_declaration(code: &str) -> bool {
    match Regex::new(r"\btest(?:\.\w+)?\s*\(|(?:^|[^\w$])it\s*\(|\bdescribe\s*\(") {
        Ok(re) => re.is_match(code),
        Err(_) => false,
    }
}

pub(crate) fn has_assertion(code: &str) -> bool {
    match Regex::new(r"\bexpect\s*\(") {
        Ok(re) => re.is_match(code),
        Err(_) => false,
    }
}

pub struct CodeValidator {
    max_file_bytes: u64,
    markdown_heading: Regex,
    dangerous_modules: Regex,
    dynamic_eval: Regex,
}

impl CodeValidator {
    pub fn new(max_file_bytes: u64) -> Self {
        Self {
            max_file_bytes,
            markdown_heading: Regex::new(r"(?m)^#{1,6}\s").unwrap(),
            dangerous_modules: Regex::new(DANGEROUS_MODULES).unwrap(),
            dynamic_eval: Regex::new(DYNAMIC_EVAL).unwrap(),
        }
    }

    /// Run every check. `ok` requires all hard checks to pass; soft
    /// findings are recorded as `warning:` issues without failing.
    pub fn validate(&self, candidate: &str) -> Validation {
        let mut issues = Vec::new();
        let mut ok = true;

        if candidate.trim().is_empty() {
            return Validation {
                ok: false,
                issues: vec!["Candidate code is empty".to_string()],
            };
        }

        if candidate.len() as u64 > self.max_file_bytes {
            ok = false;
            issues.push(format!(
                "Candidate exceeds the maximum file size ({} > {} bytes)",
                candidate.len(),
                self.max_file_bytes
            ));
        }

        if !has_test_declaration(candidate) {
            ok = false;
            issues.push("No test declaration found (test/it/describe)".to_string());
        }

        if !has_assertion(candidate) {
            issues.push("warning: no assertion found (expect)".to_string());
        }

        if let Some(issue) = unbalanced_delimiters(candidate) {
            ok = false;
            issues.push(issue);
        }

        if self.markdown_heading.is_match(candidate) || candidate.contains("**") {
            ok = false;
            issues.push(
                "Markdown markers present - extractor captured prose, not code".to_string(),
            );
        }

        let lowered = candidate.to_lowercase();
        for pattern in DANGEROUS_PATTERNS {
            if lowered.contains(pattern) {
                ok = false;
                issues.push(format!("Dangerous construct: {}", pattern));
            }
        }
        if self.dangerous_modules.is_match(candidate) {
            ok = false;
            issues.push("Dangerous module import (fs/child_process/os/path)".to_string());
        }
        if self.dynamic_eval.is_match(candidate) {
            ok = false;
            issues.push("Dynamic code evaluation (eval/new Function)".to_string());
        }

        Validation { ok, issues }
    }
}

fn unbalanced_delimiters(code: &str) -> Option<String> {
    let mut braces: i64 = 0;
    let mut parens: i64 = 0;
    for c in code.chars() {
        match c {
            '{' => braces += 1,
            '}' => braces -= 1,
            '(' => parens += 1,
            ')' => parens -= 1,
            _ => {}
        }
    }
    if braces != 0 {
        return Some(format!("Unbalanced braces (delta {})", braces));
    }
    if parens != 0 {
        return Some(format!("Unbalanced parentheses (delta {})", parens));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r#"import { test, expect } from '@playwright/test';

test('loads the page', async ({ page }) => {
  await page.goto('/');
  await expect(page.getByRole('heading')).toBeVisible();
});
"#;

    fn validator() -> CodeValidator {
        CodeValidator::new(256 * 1024)
    }

    #[test]
    fn test_accepts_well_formed_test_file() {
        let v = validator().validate(GOOD);
        assert!(v.ok, "issues: {:?}", v.issues);
        assert!(v.issues.is_empty());
    }

    #[test]
    fn test_rejects_empty() {
        assert!(!validator().validate("   \n").ok);
    }

    #[test]
    fn test_rejects_missing_test_declaration() {
        let v = validator().validate("const x = expect(1);\n(x)");
        assert!(!v.ok);
        assert!(v.issues.iter().any(|i| i.contains("test declaration")));
    }

    #[test]
    fn test_missing_assertion_is_soft_warning() {
        let code = "import { test } from '@playwright/test';\ntest('a', async () => { await page.goto('/'); });";
        let v = validator().validate(code);
        assert!(v.ok);
        assert!(v.issues.iter().any(|i| i.starts_with("warning:")));
    }

    #[test]
    fn test_rejects_markdown_prose() {
        let candidate = "### Root Cause\ntest('x', () => { expect(1).toBe(1); });\n**bold** not real code";
        let v = validator().validate(candidate);
        assert!(!v.ok);
        assert!(v.issues.iter().any(|i| i.contains("Markdown")));
    }

    #[test]
    fn test_rejects_unbalanced_braces() {
        let v = validator().validate("test('x', () => { expect(1).toBe(1);");
        assert!(!v.ok);
    }

    #[test]
    fn test_rejects_filesystem_deletion() {
        let code = format!("{}fs.rmSync('/tmp/x');\n", GOOD);
        let v = validator().validate(&code);
        assert!(!v.ok);
        assert!(v.issues.iter().any(|i| i.contains("Dangerous")));
    }

    #[test]
    fn test_rejects_dangerous_import() {
        let code = format!("import {{ exec }} from 'child_process';\n{}", GOOD);
        assert!(!validator().validate(&code).ok);
    }

    #[test]
    fn test_rejects_eval_but_allows_playwright_eval_helpers() {
        let with_eval = format!("{}eval('x');\n", GOOD);
        assert!(!validator().validate(&with_eval).ok);

        let with_helper = format!(
            "{}test('y', async ({{ page }}) => {{ await page.$eval('.a', el => el.textContent); }});\n",
            GOOD
        );
        let v = validator().validate(&with_helper);
        assert!(v.ok, "issues: {:?}", v.issues);
    }

    #[test]
    fn test_rejects_oversized_candidate() {
        let v = CodeValidator::new(16).validate(GOOD);
        assert!(!v.ok);
        assert!(v.issues.iter().any(|i| i.contains("maximum file size")));
    }
}
