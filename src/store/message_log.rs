use crate::errors::{BriefError, BriefResult};
use crate::utils::{atomic_write, safe_filename};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Separates formatted message records in log partitions and prompts.
pub const RECORD_DELIMITER: &str = "\n---\n";

/// Append-only, per-channel, per-day log of formatted messages.
///
/// A record's identity is its leading line (the formatted timestamp
/// header); re-ingesting an overlapping window is idempotent because
/// already-logged records are silently skipped. Records are never rewritten
/// or removed here.
pub struct MessageLog {
    data_dir: PathBuf,
}

impl MessageLog {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn partition_path(&self, channel: &str, day: NaiveDate) -> PathBuf {
        self.data_dir
            .join(safe_filename(channel))
            .join("messages")
            .join(format!("{}.txt", day.format("%Y-%m-%d")))
    }

    fn identity_key(record: &str) -> &str {
        record.lines().next().unwrap_or(record).trim()
    }

    fn split_records(blob: &str) -> impl Iterator<Item = &str> {
        blob.split(RECORD_DELIMITER)
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }

    /// Append the novel records from a delimited blob to the channel's
    /// partition for `day`, preserving arrival order. Returns how many
    /// records were actually written.
    ///
    /// The partition is replaced atomically, so a failed write leaves no
    /// truncated record behind.
    pub fn append(&self, channel: &str, day: NaiveDate, blob: &str) -> BriefResult<usize> {
        let incoming: Vec<&str> = Self::split_records(blob).collect();
        if incoming.is_empty() {
            return Ok(0);
        }

        let path = self.partition_path(channel, day);
        let existing = read_partition(&path)?;

        // The existing key set comes from scanning the partition itself;
        // partitions are bounded to a day of traffic, so no index is kept.
        let mut seen: HashSet<String> = Self::split_records(&existing)
            .map(|r| Self::identity_key(r).to_string())
            .collect();

        let mut content = existing;
        let mut written = 0usize;
        for record in incoming {
            let key = Self::identity_key(record);
            if !seen.insert(key.to_string()) {
                continue;
            }
            content.push_str(record);
            content.push_str(RECORD_DELIMITER);
            written += 1;
        }

        if written == 0 {
            tracing::debug!(%channel, %day, "no new messages to append");
            return Ok(0);
        }

        atomic_write(&path, &content)
            .map_err(|e| BriefError::Persistence(format!("append to {}: {e}", path.display())))?;
        tracing::info!(%channel, %day, written, "appended new messages to log");
        Ok(written)
    }

    /// Number of records currently in the channel's partition for `day`.
    pub fn record_count(&self, channel: &str, day: NaiveDate) -> BriefResult<usize> {
        let content = read_partition(&self.partition_path(channel, day))?;
        Ok(Self::split_records(&content).count())
    }
}

fn read_partition(path: &Path) -> BriefResult<String> {
    if !path.exists() {
        return Ok(String::new());
    }
    std::fs::read_to_string(path)
        .map_err(|e| BriefError::Persistence(format!("read {}: {e}", path.display())))
}
