pub mod loader;
pub mod schema;

pub use loader::{data_dir, get_config_path, load_config};
pub use schema::{
    BotIdentity, ChannelFilterConfig, Config, ReportsConfig, SourceConfig, StorageConfig,
    SummarizerConfig, SweepConfig, TelegramConfig,
};
