pub mod dedupe;
pub mod telegram;

pub use dedupe::DuplicateSendCache;
pub use telegram::TelegramSink;

use async_trait::async_trait;

/// Outbound value emitted by the pipeline; the sink decides delivery.
#[derive(Debug, Clone)]
pub struct Notification {
    pub text: String,
    pub is_error: bool,
}

impl Notification {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: format!("❌ {}", text.into()),
            is_error: true,
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, note: &Notification) -> anyhow::Result<()>;
}

/// Sink that only logs; used for dry runs and tests.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, note: &Notification) -> anyhow::Result<()> {
        if note.is_error {
            tracing::error!("notification: {}", note.text);
        } else {
            tracing::info!("notification: {}", note.text);
        }
        Ok(())
    }
}

/// Split text into chunks respecting UTF-8 character boundaries, preferring
/// paragraph breaks, then single newlines, then a hard cut.
pub fn split_text(text: &str, limit: usize) -> Vec<String> {
    if text.len() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.len() > limit {
        // Largest valid byte index <= limit that is a char boundary
        let mut split_at = limit;
        while split_at > 0 && !remaining.is_char_boundary(split_at) {
            split_at -= 1;
        }
        if split_at == 0 {
            // Degenerate case: single character wider than limit
            split_at = remaining
                .char_indices()
                .nth(1)
                .map_or(remaining.len(), |(i, _)| i);
        }

        if let Some(idx) = remaining[..split_at].rfind("\n\n") {
            chunks.push(remaining[..idx].trim().to_string());
            remaining = &remaining[idx + 2..];
            continue;
        }

        if let Some(idx) = remaining[..split_at].rfind('\n') {
            chunks.push(remaining[..idx].trim().to_string());
            remaining = &remaining[idx + 1..];
            continue;
        }

        chunks.push(remaining[..split_at].to_string());
        remaining = &remaining[split_at..];
    }

    if !remaining.is_empty() {
        chunks.push(remaining.trim().to_string());
    }

    chunks.into_iter().filter(|c| !c.is_empty()).collect()
}
