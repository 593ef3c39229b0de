use crate::config::SummarizerConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

/// Opaque completion service: a possibly-slow, possibly-failing function
/// from a prompt to text. Behind a trait so tests can substitute a stub
/// that captures its input.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<String>;
}

/// Anthropic messages-API backend.
pub struct AnthropicBackend {
    api_key: String,
    model: String,
    api_url: String,
    client: Client,
}

impl AnthropicBackend {
    pub fn new(config: &SummarizerConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            api_url: config.api_url.clone(),
            client,
        }
    }

    fn parse_response(json: &Value) -> Option<String> {
        json["content"].as_array().and_then(|blocks| {
            blocks.iter().find_map(|block| {
                if block["type"] == "text" {
                    block["text"].as_str().map(str::to_string)
                } else {
                    None
                }
            })
        })
    }
}

#[async_trait]
impl CompletionBackend for AnthropicBackend {
    async fn complete(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<String> {
        let payload = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "system": system,
            "messages": [{"role": "user", "content": prompt}],
        });

        let resp = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&payload)
            .send()
            .await
            .context("Failed to send request to summarization service")?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            if let Ok(error_json) = serde_json::from_str::<Value>(&error_text)
                && let Some(error) = error_json.get("error")
            {
                let kind = error["type"].as_str().unwrap_or("unknown");
                let message = error["message"].as_str().unwrap_or("Unknown error");
                anyhow::bail!("Summarization service error ({kind}): {message}");
            }
            anyhow::bail!("Summarization service error ({status}): {error_text}");
        }

        let json: Value = resp
            .json()
            .await
            .context("Failed to parse summarization service response")?;

        Self::parse_response(&json)
            .with_context(|| "Summarization service returned no text content")
    }
}
