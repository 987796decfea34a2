//! Candidate extraction from the service's free-form response
//!
//! A response usually explains itself with several fenced blocks where
//! only the final one is the intended complete file; earlier ones are
//! illustrative fragments. Naive first-match extraction silently applies
//! those fragments, so the last qualifying block wins.

use crate::validate::{has_assertion, has_test_declaration};
use regex::Regex;

/// Pull the candidate replacement file out of a raw response, if any.
pub fn extract_candidate(response: &str) -> Option<String> {
    if let Some(block) = last_qualifying_block(response) {
        return Some(block);
    }
    trailing_import_fallback(response)
}

/// Scan every fenced block and return the last one that looks like test
/// code rather than prose or an illustrative fragment.
fn last_qualifying_block(response: &str) -> Option<String> {
    let fence = Regex::new(r"(?s)```[\w-]*\r?\n(.*?)```").ok()?;

    let mut last = None;
    for caps in fence.captures_iter(response) {
        let body = caps.get(1)?.as_str();
        if qualifies(body) {
            last = Some(body.trim().to_string());
        }
    }
    last
}

fn qualifies(body: &str) -> bool {
    body.contains("import ") || has_test_declaration(body) || has_assertion(body)
}

/// No usable fence: take everything from the final start-of-line import
/// and close any braces the response left dangling.
fn trailing_import_fallback(response: &str) -> Option<String> {
    let import_line = Regex::new(r"(?m)^import\s").ok()?;
    let start = import_line.find_iter(response).last()?.start();
    let mut candidate = response[start..].trim().to_string();

    let opens = candidate.chars().filter(|c| *c == '{').count();
    let closes = candidate.chars().filter(|c| *c == '}').count();
    for _ in closes..opens {
        candidate.push_str("\n}");
    }

    Some(candidate)
}
