//! HTTP client for the chat backend.
//!
//! Two operations are used:
//!
//! | Operation | Endpoint | Retried |
//! |-----------|----------|---------|
//! | [`ask`](BackendClient::ask) | `POST /api/v1/chats/{chat}/completions` | No |
//! | [`session_messages`](BackendClient::session_messages) | `GET /api/v1/chats/{chat}/sessions/{session}/messages` | Yes |
//!
//! # Retry Strategy
//!
//! Only the idempotent history read is retried, with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! A question is never resent: a failed `ask` surfaces as
//! [`ChatError::Transport`] and the caller drops its placeholder message.
//!
//! # Timeouts
//!
//! An answer may stream for as long as the backend keeps sending, so `ask`
//! has no overall deadline. `timeout_secs` bounds the silence between two
//! chunks instead (enforced by the read loop, see
//! [`idle_timeout`](BackendClient::idle_timeout)) and the whole of each
//! history request.

use anyhow::{bail, Result};
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use std::time::Duration;

use kb_chat_core::models::{Message, Role};

use crate::config::BackendConfig;
use crate::error::ChatError;

/// Raw answer bytes as they arrive over the wire.
pub type ByteStream = BoxStream<'static, reqwest::Result<Bytes>>;

pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
    timeout: Duration,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key(),
            max_retries: config.max_retries,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Longest wait for the next chunk of an answer stream.
    pub fn idle_timeout(&self) -> Duration {
        self.timeout
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("Authorization", format!("Bearer {}", key)),
            None => req,
        }
    }

    /// Send a question and return the streaming response body.
    pub async fn ask(
        &self,
        chat_id: &str,
        session_id: &str,
        question: &str,
    ) -> Result<ByteStream, ChatError> {
        let url = format!("{}/api/v1/chats/{}/completions", self.base_url, chat_id);
        let body = serde_json::json!({
            "question": question,
            "session_id": session_id,
            "stream": true,
        });

        let resp = self
            .authorize(self.http.post(&url))
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(ChatError::Transport(format!(
                "backend returned {}: {}",
                status,
                body_text.trim()
            )));
        }

        tracing::info!(chat_id, session_id, "answer stream opened");
        Ok(resp.bytes_stream().boxed())
    }

    /// Fetch a session's stored messages. Sources are never included; see
    /// [`crate::history`] for reattaching them.
    pub async fn session_messages(&self, chat_id: &str, session_id: &str) -> Result<Vec<Message>> {
        let url = format!(
            "{}/api/v1/chats/{}/sessions/{}/messages",
            self.base_url, chat_id, session_id
        );

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let req = self.authorize(self.http.get(&url)).timeout(self.timeout);
            match req.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: Value = response.json().await?;
                        return parse_history(&json);
                    }

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        tracing::debug!(attempt, %status, "history fetch failed, retrying");
                        last_err = Some(anyhow::anyhow!(
                            "backend error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    // Client error (not 429): fail now
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("backend error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("history fetch failed after retries")))
    }
}

/// Parse a `{ code, message?, data }` history envelope.
///
/// `data` is either the message array itself or an object with a
/// `messages` array. Entries with an unknown role are skipped.
fn parse_history(json: &Value) -> Result<Vec<Message>> {
    let code = json.get("code").and_then(Value::as_i64).unwrap_or(0);
    if code != 0 {
        let message = json
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        bail!("backend error (code {}): {}", code, message);
    }

    let data = json.get("data");
    let items = data
        .and_then(Value::as_array)
        .or_else(|| data.and_then(|d| d.get("messages")).and_then(Value::as_array))
        .ok_or_else(|| anyhow::anyhow!("Invalid history response: missing message array"))?;

    Ok(items
        .iter()
        .filter_map(|item| {
            let role = match item.get("role").and_then(Value::as_str)? {
                "user" => Role::User,
                "assistant" => Role::Assistant,
                _ => return None,
            };
            let content = item
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Some(Message {
                role,
                content: content.to_string(),
                sources: Vec::new(),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn history_accepts_bare_array() {
        let msgs = parse_history(&json!({
            "code": 0,
            "data": [
                { "role": "user", "content": "q" },
                { "role": "assistant", "content": "a", "id": "m1" },
                { "role": "system", "content": "hidden" }
            ]
        }))
        .unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].role, Role::Assistant);
        assert!(msgs[1].sources.is_empty());
    }

    #[test]
    fn history_accepts_messages_object() {
        let msgs = parse_history(&json!({
            "code": 0,
            "data": { "messages": [{ "role": "assistant", "content": "a" }] }
        }))
        .unwrap();
        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn history_error_code_fails() {
        let err = parse_history(&json!({ "code": 102, "message": "no session" })).unwrap_err();
        assert!(err.to_string().contains("no session"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let mut cfg = crate::config::Config::minimal().backend;
        cfg.base_url = "http://localhost:9380/".into();
        let client = BackendClient::new(&cfg).unwrap();
        assert_eq!(client.base_url(), "http://localhost:9380");
    }
}
