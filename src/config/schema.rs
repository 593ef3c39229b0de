use crate::errors::BriefError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The bot account whose messages are harvested from the source.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BotIdentity {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tag: String,
}

/// Which guild channels qualify for reporting.
///
/// A text channel qualifies when its name starts with one of the marker
/// prefixes, its position is below the cap and its name contains none of
/// the excluded substrings — or when its parent category is explicitly
/// included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelFilterConfig {
    #[serde(default = "default_name_prefixes", rename = "namePrefixes")]
    pub name_prefixes: Vec<String>,
    #[serde(default = "default_max_position", rename = "maxPosition")]
    pub max_position: i64,
    #[serde(default, rename = "excludeSubstrings")]
    pub exclude_substrings: Vec<String>,
    #[serde(default, rename = "includeParents")]
    pub include_parents: Vec<String>,
}

fn default_name_prefixes() -> Vec<String> {
    ["🟡", "🔴", "🟠", "⚫"].map(String::from).to_vec()
}

fn default_max_position() -> i64 {
    30
}

impl Default for ChannelFilterConfig {
    fn default() -> Self {
        Self {
            name_prefixes: default_name_prefixes(),
            max_position: default_max_position(),
            exclude_substrings: Vec::new(),
            include_parents: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default, rename = "guildId")]
    pub guild_id: String,
    #[serde(default = "default_source_api_base", rename = "apiBase")]
    pub api_base: String,
    #[serde(default)]
    pub bot: BotIdentity,
    #[serde(default)]
    pub filter: ChannelFilterConfig,
}

fn default_source_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            guild_id: String::new(),
            api_base: default_source_api_base(),
            bot: BotIdentity::default(),
            filter: ChannelFilterConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    #[serde(default, rename = "apiKey")]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens", rename = "maxTokens")]
    pub max_tokens: u32,
    #[serde(default = "default_summarizer_api_url", rename = "apiUrl")]
    pub api_url: String,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            api_url: default_summarizer_api_url(),
        }
    }
}

fn default_model() -> String {
    "claude-3-haiku-20240307".to_string()
}

fn default_max_tokens() -> u32 {
    800
}

fn default_summarizer_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default, rename = "chatId")]
    pub chat_id: String,
    #[serde(default = "default_telegram_api_base", rename = "apiBase")]
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            chat_id: String::new(),
            api_base: default_telegram_api_base(),
        }
    }
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of the per-channel data tree. Defaults to `<home>/data`.
    #[serde(default, rename = "dataDir")]
    pub data_dir: Option<String>,
    /// How many summaries to keep per timeframe label.
    #[serde(default = "default_retention")]
    pub retention: HashMap<String, usize>,
    #[serde(default = "default_retention_fallback", rename = "retentionFallback")]
    pub retention_fallback: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            retention: default_retention(),
            retention_fallback: default_retention_fallback(),
        }
    }
}

fn default_retention() -> HashMap<String, usize> {
    HashMap::from([
        ("10m".to_string(), 24),
        ("1h".to_string(), 48),
        ("24h".to_string(), 30),
    ])
}

fn default_retention_fallback() -> usize {
    30
}

/// One scheduled sweep: generate reports for every qualifying channel on a
/// fixed cadence, delivering only when the window's message count meets the
/// timeframe's threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    pub timeframe: String,
    #[serde(rename = "everySecs")]
    pub every_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsConfig {
    #[serde(default = "default_sweeps")]
    pub sweeps: Vec<SweepConfig>,
    /// Minimum window message count before a report is delivered (it is
    /// always stored).
    #[serde(default = "default_thresholds")]
    pub thresholds: HashMap<String, usize>,
    #[serde(default = "default_threshold_fallback", rename = "thresholdFallback")]
    pub threshold_fallback: usize,
}

fn default_sweeps() -> Vec<SweepConfig> {
    vec![
        SweepConfig {
            timeframe: "1h".to_string(),
            every_secs: 3600,
        },
        SweepConfig {
            timeframe: "24h".to_string(),
            every_secs: 86400,
        },
    ]
}

fn default_thresholds() -> HashMap<String, usize> {
    HashMap::from([
        ("10m".to_string(), 3),
        ("1h".to_string(), 5),
        ("24h".to_string(), 10),
    ])
}

fn default_threshold_fallback() -> usize {
    5
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            sweeps: default_sweeps(),
            thresholds: default_thresholds(),
            threshold_fallback: default_threshold_fallback(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
}

impl Config {
    /// Validate what any source access needs.
    pub fn validate_source(&self) -> Result<(), BriefError> {
        let mut missing = Vec::new();
        if self.source.token.is_empty() {
            missing.push("source.token");
        }
        if self.source.guild_id.is_empty() {
            missing.push("source.guildId");
        }
        if self.source.bot.name.is_empty() {
            missing.push("source.bot.name");
        }
        require(missing)
    }

    /// Validate everything the report pipeline needs before any network or
    /// disk work starts. Missing credentials are fatal here and only here.
    pub fn validate(&self) -> Result<(), BriefError> {
        self.validate_source()?;
        let mut missing = Vec::new();
        if self.summarizer.api_key.is_empty() {
            missing.push("summarizer.apiKey");
        }
        require(missing)
    }

    /// Delivery additionally requires a Telegram destination.
    pub fn validate_for_delivery(&self) -> Result<(), BriefError> {
        self.validate()?;
        let mut missing = Vec::new();
        if self.telegram.token.is_empty() {
            missing.push("telegram.token");
        }
        if self.telegram.chat_id.is_empty() {
            missing.push("telegram.chatId");
        }
        require(missing)
    }

    pub fn retention_for(&self, timeframe: &str) -> usize {
        self.storage
            .retention
            .get(timeframe)
            .copied()
            .unwrap_or(self.storage.retention_fallback)
    }

    pub fn threshold_for(&self, timeframe: &str) -> usize {
        self.reports
            .thresholds
            .get(timeframe)
            .copied()
            .unwrap_or(self.reports.threshold_fallback)
    }
}

fn require(missing: Vec<&str>) -> Result<(), BriefError> {
    if missing.is_empty() {
        Ok(())
    } else {
        Err(BriefError::Config(format!(
            "missing required settings: {}",
            missing.join(", ")
        )))
    }
}
