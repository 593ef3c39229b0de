use crate::config::TelegramConfig;
use crate::notify::dedupe::DuplicateSendCache;
use crate::notify::{Notification, NotificationSink, split_text};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tokio::sync::Mutex;

/// Telegram's hard per-message length limit.
pub const MESSAGE_LIMIT: usize = 4096;

/// Delivers notifications to a fixed Telegram chat, suppressing texts that
/// were already sent within the duplicate-cache horizon.
pub struct TelegramSink {
    client: Client,
    api_base: String,
    token: String,
    chat_id: String,
    recent: Mutex<DuplicateSendCache>,
}

impl TelegramSink {
    pub fn new(config: &TelegramConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            chat_id: config.chat_id.clone(),
            recent: Mutex::new(DuplicateSendCache::default()),
        }
    }

    async fn post_message(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let resp = self
            .client
            .post(&url)
            .json(&json!({"chat_id": self.chat_id, "text": text}))
            .send()
            .await
            .context("Failed to send Telegram message")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram sendMessage returned status {status}: {body}");
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn send(&self, note: &Notification) -> Result<()> {
        {
            let mut recent = self.recent.lock().await;
            if recent.should_suppress(&note.text) {
                tracing::debug!("suppressing duplicate notification");
                return Ok(());
            }
        }

        for chunk in split_text(&note.text, MESSAGE_LIMIT) {
            self.post_message(&chunk).await?;
        }

        // Recorded only after a full send so a failed delivery can retry.
        self.recent.lock().await.record_sent(&note.text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sink(server: &MockServer) -> TelegramSink {
        TelegramSink::new(&TelegramConfig {
            token: "bot-token".into(),
            chat_id: "42".into(),
            api_base: server.uri(),
        })
    }

    #[tokio::test]
    async fn send_posts_to_the_configured_chat() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botbot-token/sendMessage"))
            .and(body_partial_json(serde_json::json!({"chat_id": "42"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        sink(&server)
            .send(&Notification::text("report body"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn identical_text_within_horizon_is_sent_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let sink = sink(&server);
        sink.send(&Notification::text("same report")).await.unwrap();
        sink.send(&Notification::text("same report")).await.unwrap();
    }

    #[tokio::test]
    async fn failed_delivery_is_not_recorded_as_sent() {
        let server = MockServer::start().await;
        let sink = sink(&server);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        assert!(sink.send(&Notification::text("report")).await.is_err());
        server.reset().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;
        sink.send(&Notification::text("report")).await.unwrap();
    }

    #[tokio::test]
    async fn long_text_is_chunked() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(2)
            .mount(&server)
            .await;

        let long = "paragraph one\n\n".repeat(400); // ~6000 bytes
        sink(&server).send(&Notification::text(long)).await.unwrap();
    }
}
