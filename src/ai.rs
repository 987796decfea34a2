//! Analysis client for the external text-generation service (OpenRouter)
//!
//! One model, one call shape. Every dispatch is gated by the rate
//! limiter, raced against a timeout, and retried with exponential
//! backoff. Failures come back as plain strings; nothing here is allowed
//! to abort the run.

use crate::config::Config;
use crate::rate_limit::RateLimiter;
use crate::util::truncate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const MODEL_ID: &str = "anthropic/claude-sonnet-4";
const MAX_TOKENS: u32 = 8192;

const BACKOFF_BASE_SECS: u64 = 2;

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    content: String,
}

pub struct AnalysisClient {
    http: reqwest::Client,
    api_key: String,
    max_retries: u32,
    request_timeout: Duration,
}

impl AnalysisClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
            request_timeout: config.request_timeout,
        }
    }

    /// Request an analysis. Each dispatch (including retries) claims a
    /// rate-limiter slot first. Timeouts, transport errors, 429 and 5xx
    /// are retried with 2^attempt-second backoff; other statuses fail
    /// immediately.
    pub async fn analyze(
        &self,
        system: &str,
        user: &str,
        limiter: &mut RateLimiter,
    ) -> Result<String, String> {
        let request = ChatRequest {
            model: MODEL_ID.to_string(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            max_tokens: MAX_TOKENS,
            stream: false,
        };

        let mut attempt: u32 = 0;
        loop {
            limiter.acquire().await;

            match self.dispatch(&request).await {
                Ok(content) => return Ok(content),
                Err(CallError::Fatal(reason)) => return Err(reason),
                Err(CallError::Retryable(reason)) => {
                    if attempt >= self.max_retries {
                        return Err(format!(
                            "Analysis failed after {} retries: {}",
                            self.max_retries, reason
                        ));
                    }
                    attempt += 1;
                    let backoff = Duration::from_secs(BACKOFF_BASE_SECS.pow(attempt));
                    eprintln!(
                        "  Analysis call failed ({}). Retrying in {}s (attempt {}/{})",
                        reason,
                        backoff.as_secs(),
                        attempt,
                        self.max_retries
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn dispatch(&self, request: &ChatRequest) -> Result<String, CallError> {
        let send = self
            .http
            .post(OPENROUTER_URL)
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", "https://github.com/cameronspears/testmend")
            .header("X-Title", "testmend")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send();

        let response = match tokio::time::timeout(self.request_timeout, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(CallError::Retryable(format!("request failed: {}", e))),
            Err(_) => {
                return Err(CallError::Retryable(format!(
                    "timed out after {}s",
                    self.request_timeout.as_secs()
                )))
            }
        };

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CallError::Retryable(format!("failed to read response body: {}", e)))?;

        if status.is_success() {
            let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
                CallError::Fatal(format!("failed to parse service response: {}", e))
            })?;
            return parsed
                .choices
                .first()
                .map(|c| c.message.content.clone())
                .filter(|content| !content.trim().is_empty())
                .ok_or_else(|| CallError::Fatal("empty response from service".to_string()));
        }

        match status.as_u16() {
            429 => Err(CallError::Retryable("rate limited by service".to_string())),
            500..=599 => Err(CallError::Retryable(format!("server error {}", status))),
            401 => Err(CallError::Fatal(
                "invalid API key (service returned 401)".to_string(),
            )),
            _ => Err(CallError::Fatal(format!(
                "API error {}: {}",
                status,
                truncate(&text, 200)
            ))),
        }
    }
}

enum CallError {
    /// Worth another attempt: timeout, transport, 429, 5xx.
    Retryable(String),
    /// Not worth retrying: auth, malformed response, other 4xx.
    Fatal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_serializes_expected_shape() {
        let request = ChatRequest {
            model: MODEL_ID.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: "hi".to_string(),
            }],
            max_tokens: MAX_TOKENS,
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "anthropic/claude-sonnet-4");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_chat_response_parses_content() {
        let body = r#"{"choices": [{"message": {"content": "the fix"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, "the fix");
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let delays: Vec<u64> = (1..=3).map(|a| BACKOFF_BASE_SECS.pow(a)).collect();
        assert_eq!(delays, vec![2, 4, 8]);
    }
}
