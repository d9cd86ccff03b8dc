//! Shared POST-with-backoff loop used by every outbound provider.

use reqwest::{header, Client};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use super::types::{is_retryable_status, AiError};

/// Retry configuration for transient errors
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Per-request timeout override; `None` keeps the shared client's.
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(2000),
            timeout: None,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Delay before attempt `attempt` (1-based): base, 2x base, 4x base...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << (attempt - 1).min(16);
        self.base_delay * factor
    }
}

/// POST `body` as JSON and return the parsed JSON response.
///
/// Network failures and 429/502/503/504 are retried with exponential backoff.
/// Any other non-success status fails immediately with the provider's message.
pub async fn post_json_with_retry<B: Serialize + ?Sized>(
    client: &Client,
    endpoint: &str,
    headers: &header::HeaderMap,
    body: &B,
    policy: &RetryPolicy,
    tag: &str,
) -> Result<Value, AiError> {
    let mut last_error: Option<AiError> = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let delay = policy.delay_for(attempt);
            log::warn!(
                "[{}] Retry attempt {}/{} after {}ms delay",
                tag,
                attempt,
                policy.max_retries,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(endpoint).headers(headers.clone()).json(body);
        if let Some(timeout) = policy.timeout {
            request = request.timeout(timeout);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                if attempt < policy.max_retries {
                    log::warn!("[{}] Request failed (attempt {}): {}, will retry", tag, attempt + 1, e);
                }
                last_error = Some(AiError::new(format!("{} request failed: {}", tag, e)));
                continue;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = response.text().await.unwrap_or_default();
            let message = format!("{} API error: {}", tag, extract_error_message(&error_text));

            if is_retryable_status(status_code) && attempt < policy.max_retries {
                log::warn!(
                    "[{}] Received retryable status {} (attempt {}), will retry",
                    tag,
                    status,
                    attempt + 1
                );
                last_error = Some(AiError::with_status(message, status_code));
                continue;
            }
            return Err(AiError::with_status(message, status_code));
        }

        return response
            .json::<Value>()
            .await
            .map_err(|e| AiError::new(format!("Failed to parse {} response: {}", tag, e)));
    }

    Err(last_error.unwrap_or_else(|| AiError::new("Max retries exceeded")))
}

/// Pull a readable message out of the provider error shapes we see in practice:
/// `{"error": {"message": ..}}`, `{"error": ".."}`, `{"message": ..}`, or raw text.
pub fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(msg) = value.pointer("/error/message").and_then(Value::as_str) {
            return msg.to_string();
        }
        if let Some(msg) = value.get("error").and_then(Value::as_str) {
            return msg.to_string();
        }
        if let Some(msg) = value.get("message").and_then(Value::as_str) {
            return msg.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty error body".to_string()
    } else {
        trimmed.chars().take(300).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(8000));
    }

    #[test]
    fn test_extract_error_message_shapes() {
        assert_eq!(
            extract_error_message(r#"{"error":{"message":"invalid key","type":"auth"}}"#),
            "invalid key"
        );
        assert_eq!(extract_error_message(r#"{"error":"model not found"}"#), "model not found");
        assert_eq!(extract_error_message(r#"{"message":"Unauthorized"}"#), "Unauthorized");
        assert_eq!(extract_error_message("  Bad Gateway "), "Bad Gateway");
        assert_eq!(extract_error_message(""), "empty error body");
    }
}
