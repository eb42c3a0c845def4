//! Outbound chat endpoint client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

/// The seam between the controller and whatever answers the chat. The
/// production impl speaks HTTP; tests script it.
///
/// `Ok(Some(text))` is a usable reply. `Ok(None)` means the endpoint
/// answered but gave nothing usable (error status, or a body without a
/// `response` field). `Err` is a transport or parse failure.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn ask(&self, message: &str) -> Result<Option<String>>;
}

/// JSON-over-HTTPS chat client: `POST {url}` with `{"message": ...}`,
/// expecting `{"response": ...}` back. No auth header is attached, no
/// local timeout or retry is applied; the transport's defaults stand.
pub struct ChatApi {
    client: reqwest::Client,
    url: String,
}

impl ChatApi {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl ChatBackend for ChatApi {
    async fn ask(&self, message: &str) -> Result<Option<String>> {
        let res = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&json!({ "message": message }))
            .send()
            .await
            .context("Failed to reach chat endpoint")?;

        if !res.status().is_success() {
            return Ok(None);
        }

        let body: Value = res
            .json()
            .await
            .context("Failed to parse chat endpoint response")?;

        let reply = body
            .get("response")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Ok(reply)
    }
}
