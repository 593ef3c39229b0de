use crate::config::Config;
use crate::utils::newsbrief_home;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub fn get_config_path() -> Result<PathBuf> {
    Ok(newsbrief_home()?.join("config.json"))
}

/// Load config from the given path (or `<home>/config.json`), then apply
/// environment overrides for secrets. A missing file yields defaults so
/// env-only deployments work without any file on disk.
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.json"));
    let path = config_path.unwrap_or(default_path.as_path());

    let mut config = if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON from {}", path.display()))?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Secrets and the data root may come from the environment instead of the
/// config file; the environment wins when both are set.
fn apply_env_overrides(config: &mut Config) {
    let overrides: [(&str, &mut String); 5] = [
        ("DISCORD_TOKEN", &mut config.source.token),
        ("GUILD_ID", &mut config.source.guild_id),
        ("ANTHROPIC_API_KEY", &mut config.summarizer.api_key),
        ("TELEGRAM_BOT_TOKEN", &mut config.telegram.token),
        ("TELEGRAM_CHAT_ID", &mut config.telegram.chat_id),
    ];
    for (var, slot) in overrides {
        if let Ok(value) = std::env::var(var)
            && !value.is_empty()
        {
            *slot = value;
        }
    }
    if let Ok(dir) = std::env::var("NEWSBRIEF_DATA_DIR")
        && !dir.is_empty()
    {
        config.storage.data_dir = Some(dir);
    }
}

/// Resolve the data root: explicit config value, else `<home>/data`.
pub fn data_dir(config: &Config) -> Result<PathBuf> {
    match &config.storage.data_dir {
        Some(dir) => Ok(PathBuf::from(dir)),
        None => Ok(newsbrief_home()?.join("data")),
    }
}
