pub mod client;
pub mod types;
pub mod window;

pub use client::{ChannelFilter, SourceClient, PAGE_LIMIT};
pub use types::{Author, Channel, Embed, EmbedField, Message};
pub use window::WindowFetcher;
