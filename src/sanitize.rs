//! Prompt sanitization before text leaves the machine
//!
//! Error output and test source are untrusted: they can carry local
//! machine detail (paths, addresses) and adversarial instructions aimed
//! at the model. Redaction rules run in a fixed order and the output is
//! always bounded, whatever the input size.

use crate::util::truncate;
use regex::Regex;
use url::Url;

/// Phrases that look like an attempt to steer the model. Detection is
/// warn-only: the sanitized text is still sent, the flags are surfaced
/// on the attempt and in diagnostics.
const INJECTION_PHRASES: &[&str] = &[
    "ignore previous instructions",
    "ignore all previous",
    "disregard the above",
    "you are now",
    "act as",
    "bypass security",
    "system prompt",
];

#[derive(Debug, Clone)]
pub struct Sanitized {
    pub text: String,
    /// Injection phrases detected in the raw input, if any.
    pub injection_flags: Vec<String>,
}

pub struct Sanitizer {
    max_chars: usize,
    abs_path: Regex,
    email: Regex,
    ipv4: Regex,
    http_url: Regex,
    fence_run: Regex,
}

impl Sanitizer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            // Common filesystem roots only; bare "/" would eat CSS selectors.
            abs_path: Regex::new(
                r"(?:[A-Za-z]:\\|/(?:home|Users|usr|var|tmp|etc|opt|private)/)[^\s'\x22()]*",
            )
            .unwrap(),
            email: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap(),
            ipv4: Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}(?::\d+)?\b").unwrap(),
            http_url: Regex::new(r"https?://[^\s'\x22<>()]+").unwrap(),
            fence_run: Regex::new(r"`{3,}").unwrap(),
        }
    }

    /// Apply all rules in order. Output is at most `max_chars` characters.
    pub fn sanitize(&self, input: &str) -> Sanitized {
        let injection_flags = detect_injection(input);

        let bounded = self.truncate_with_marker(input);
        let redacted = self.redact(&bounded);
        let escaped = self.fence_run.replace_all(&redacted, "``").into_owned();

        // Redaction placeholders can lengthen pathological input; the
        // bound must hold unconditionally.
        let text = if escaped.chars().count() > self.max_chars {
            truncate(&escaped, self.max_chars)
        } else {
            escaped
        };

        Sanitized {
            text,
            injection_flags,
        }
    }

    fn truncate_with_marker(&self, input: &str) -> String {
        let total = input.chars().count();
        if total <= self.max_chars {
            return input.to_string();
        }

        // Reserve room for the truncation marker inside the bound. The
        // marker length is estimated first, then rebuilt with the real
        // dropped-character count.
        let estimate = format!("\n[... {} characters truncated]", total - self.max_chars);
        let keep = self.max_chars.saturating_sub(estimate.chars().count());
        let marker = format!("\n[... {} characters truncated]", total - keep);
        let keep = self.max_chars.saturating_sub(marker.chars().count());
        let head: String = input.chars().take(keep).collect();
        format!("{}{}", head, marker)
    }

    fn redact(&self, input: &str) -> String {
        let step = self
            .http_url
            .replace_all(input, |caps: &regex::Captures| {
                let raw = &caps[0];
                if is_local_url(raw) {
                    raw.to_string()
                } else {
                    "<url>".to_string()
                }
            })
            .into_owned();

        let step = self.abs_path.replace_all(&step, "<path>").into_owned();
        let step = self.email.replace_all(&step, "<email>").into_owned();

        self.ipv4
            .replace_all(&step, |caps: &regex::Captures| {
                let raw = &caps[0];
                if raw.starts_with("127.") || raw.starts_with("0.0.0.0") {
                    raw.to_string()
                } else {
                    "<ip>".to_string()
                }
            })
            .into_owned()
    }
}

fn is_local_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => matches!(
            url.host_str(),
            Some("localhost") | Some("127.0.0.1") | Some("0.0.0.0") | Some("[::1]")
        ),
        Err(_) => false,
    }
}

fn detect_injection(input: &str) -> Vec<String> {
    let text = input.to_lowercase();
    INJECTION_PHRASES
        .iter()
        .filter(|phrase| text.contains(*phrase))
        .map(|phrase| phrase.to_string())
        .collect()
}
