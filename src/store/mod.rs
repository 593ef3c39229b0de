pub mod message_log;
pub mod summary_store;

pub use message_log::{MessageLog, RECORD_DELIMITER};
pub use summary_store::{CleanupStats, Summary, SummaryContent, SummaryStore};
