use crate::config::{ChannelFilterConfig, SourceConfig};
use crate::errors::{BriefError, BriefResult};
use crate::source::types::{Channel, Message, TEXT_CHANNEL_KIND};
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;

/// Page size for message history requests — the source's maximum.
pub const PAGE_LIMIT: usize = 100;

/// Decides which guild channels participate in reporting.
#[derive(Debug, Clone)]
pub struct ChannelFilter {
    name_prefixes: Vec<String>,
    max_position: i64,
    exclude_substrings: Vec<String>,
    include_parents: HashSet<String>,
}

impl ChannelFilter {
    pub fn new(config: &ChannelFilterConfig) -> Self {
        Self {
            name_prefixes: config.name_prefixes.clone(),
            max_position: config.max_position,
            exclude_substrings: config.exclude_substrings.clone(),
            include_parents: config.include_parents.iter().cloned().collect(),
        }
    }

    pub fn matches(&self, channel: &Channel) -> bool {
        if channel.kind != TEXT_CHANNEL_KIND {
            return false;
        }
        let marked = self
            .name_prefixes
            .iter()
            .any(|p| channel.name.starts_with(p.as_str()));
        let excluded = self
            .exclude_substrings
            .iter()
            .any(|s| channel.name.contains(s.as_str()));
        let included_parent = channel
            .parent_id
            .as_deref()
            .is_some_and(|p| self.include_parents.contains(p));

        (marked && !excluded && channel.position < self.max_position) || included_parent
    }
}

/// REST client for the paginated, timestamp-ordered message source.
pub struct SourceClient {
    http: Client,
    api_base: String,
    token: String,
    guild_id: String,
    filter: ChannelFilter,
}

impl SourceClient {
    pub fn new(config: &SourceConfig) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            guild_id: config.guild_id.clone(),
            filter: ChannelFilter::new(&config.filter),
        }
    }

    /// Fetch the guild's channels and keep the ones that qualify for
    /// reporting.
    pub async fn list_channels(&self) -> BriefResult<Vec<Channel>> {
        let url = format!("{}/guilds/{}/channels", self.api_base, self.guild_id);
        let resp = self
            .http
            .get(&url)
            .header("Authorization", &self.token)
            .send()
            .await
            .map_err(|e| BriefError::transport(format!("channel list request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(BriefError::Transport {
                message: format!("channel list returned status {status}"),
                retryable: status.is_server_error() || status.as_u16() == 429,
            });
        }

        let channels: Vec<Channel> = resp
            .json()
            .await
            .map_err(|e| BriefError::transport(format!("invalid channel list payload: {e}")))?;

        let filtered: Vec<Channel> = channels
            .into_iter()
            .filter(|c| self.filter.matches(c))
            .collect();
        tracing::debug!("{} channels qualify for reporting", filtered.len());
        Ok(filtered)
    }

    /// Fetch one page of message history, newest first, anchored before the
    /// given message id when paging backward.
    pub async fn fetch_page(
        &self,
        channel_id: &str,
        before: Option<&str>,
    ) -> BriefResult<Vec<Message>> {
        let mut url = format!(
            "{}/channels/{}/messages?limit={}",
            self.api_base, channel_id, PAGE_LIMIT
        );
        if let Some(anchor) = before {
            url.push_str(&format!("&before={anchor}"));
        }

        let resp = self
            .http
            .get(&url)
            .header("Authorization", &self.token)
            .send()
            .await
            .map_err(|e| BriefError::transport(format!("message page request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(BriefError::Transport {
                message: format!("message page for {channel_id} returned status {status}"),
                retryable: status.is_server_error() || status.as_u16() == 429,
            });
        }

        resp.json()
            .await
            .map_err(|e| BriefError::transport(format!("invalid message page payload: {e}")))
    }
}
