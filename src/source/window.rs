use crate::config::BotIdentity;
use crate::source::client::SourceClient;
use crate::source::types::Message;
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Pages backward through a channel's history until the requested window is
/// covered, keeping only messages authored by the configured bot identity.
///
/// The window is complete by construction: paging stops only once a page's
/// oldest message predates the cutoff (everything further back is older,
/// by the source's ordering guarantee) or the source has no more pages.
/// An empty window is a normal result, not an error.
///
/// Known limitation: a failed page fetch is indistinguishable from the end
/// of history and is treated as a graceful stop — the accumulated messages
/// are returned as a best-effort window and a warning is logged, so a
/// transient upstream outage can under-count.
#[derive(Clone)]
pub struct WindowFetcher {
    client: Arc<SourceClient>,
    bot: BotIdentity,
}

impl WindowFetcher {
    pub fn new(client: Arc<SourceClient>, bot: BotIdentity) -> Self {
        Self { client, bot }
    }

    fn is_bot_message(&self, message: &Message) -> bool {
        message.author.username == self.bot.name && message.author.discriminator == self.bot.tag
    }

    pub async fn fetch_window(&self, channel_id: &str, window: Duration) -> Vec<Message> {
        let cutoff = Utc::now() - window;
        let mut collected: Vec<Message> = Vec::new();
        let mut before: Option<String> = None;

        tracing::debug!(%channel_id, %cutoff, "fetching message window");

        loop {
            let page = match self.client.fetch_page(channel_id, before.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(
                        %channel_id,
                        error = %e,
                        "page fetch failed, returning best-effort window"
                    );
                    break;
                }
            };

            let Some(oldest) = page.last().cloned() else {
                break;
            };

            let kept_before = collected.len();
            collected.extend(
                page.into_iter()
                    .filter(|m| self.is_bot_message(m) && m.timestamp >= cutoff),
            );
            tracing::debug!(
                %channel_id,
                kept = collected.len() - kept_before,
                "processed message page"
            );

            // Pages are newest-first, so once the oldest entry crosses the
            // cutoff the remaining history is guaranteed older.
            if oldest.timestamp < cutoff {
                break;
            }
            before = Some(oldest.id);
        }

        tracing::info!(%channel_id, total = collected.len(), "window fetch complete");
        collected
    }
}
