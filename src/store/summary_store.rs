use crate::errors::{BriefError, BriefResult};
use crate::utils::{atomic_write, safe_filename};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Structured body of a generated report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryContent {
    pub headline: String,
    pub location: String,
    pub body: String,
}

impl SummaryContent {
    /// The delivery form: headline, dateline, blank line, body.
    pub fn render(&self) -> String {
        format!("{}\n{}\n\n{}", self.headline, self.location, self.body)
    }
}

/// A stored report. Immutable once persisted; history per channel and
/// timeframe is append-only, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub timeframe: String,
    pub channel: String,
    pub content: SummaryContent,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Collection {
    #[serde(default)]
    summaries: Vec<Summary>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupStats {
    pub files_removed: usize,
    pub bytes_freed: u64,
}

const COLLECTION_SUFFIX: &str = "_summaries.json";

/// Persistent per-channel, per-timeframe summary collections.
///
/// Each collection lives in
/// `<data>/<channel>/summaries/<timeframe>_summaries.json` as an ordered
/// list, newest first. `save` rejects exact duplicate periods and trims the
/// list to the timeframe's retention bound; `cleanup_older_than` removes
/// whole collection files by age so timeframes that stop receiving
/// summaries still get reclaimed eventually.
pub struct SummaryStore {
    data_dir: PathBuf,
    retention: HashMap<String, usize>,
    retention_fallback: usize,
    // save and the age sweep serialize per (channel, timeframe); the
    // duplicate-period check-then-insert is not atomic otherwise.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SummaryStore {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        retention: HashMap<String, usize>,
        retention_fallback: usize,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            retention,
            retention_fallback,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn retention_for(&self, timeframe: &str) -> usize {
        self.retention
            .get(timeframe)
            .copied()
            .unwrap_or(self.retention_fallback)
    }

    fn summaries_dir(&self, channel: &str) -> PathBuf {
        self.data_dir.join(safe_filename(channel)).join("summaries")
    }

    fn collection_path(&self, channel: &str, timeframe: &str) -> PathBuf {
        self.summaries_dir(channel)
            .join(format!("{}{}", safe_filename(timeframe), COLLECTION_SUFFIX))
    }

    async fn lock_for(&self, channel: &str, timeframe: &str) -> Arc<Mutex<()>> {
        let key = format!("{channel}/{timeframe}");
        let mut locks = self.locks.lock().await;
        locks.entry(key).or_default().clone()
    }

    /// Persist a new summary. Returns `false` (a logged no-op) when an
    /// entry with the identical period already exists; otherwise inserts at
    /// the front and truncates the collection to the retention bound.
    pub async fn save(&self, summary: &Summary) -> BriefResult<bool> {
        let lock = self.lock_for(&summary.channel, &summary.timeframe).await;
        let _guard = lock.lock().await;

        let path = self.collection_path(&summary.channel, &summary.timeframe);
        let mut collection = load_collection(&path)?;

        let duplicate = collection.summaries.iter().any(|s| {
            s.period_start == summary.period_start && s.period_end == summary.period_end
        });
        if duplicate {
            tracing::info!(
                channel = %summary.channel,
                timeframe = %summary.timeframe,
                "summary for period already exists, skipping"
            );
            return Ok(false);
        }

        collection.summaries.insert(0, summary.clone());
        collection
            .summaries
            .truncate(self.retention_for(&summary.timeframe));

        let content = serde_json::to_string_pretty(&collection)
            .map_err(|e| BriefError::Persistence(format!("serialize summaries: {e}")))?;
        atomic_write(&path, &content)
            .map_err(|e| BriefError::Persistence(format!("write {}: {e}", path.display())))?;

        tracing::info!(
            channel = %summary.channel,
            timeframe = %summary.timeframe,
            kept = collection.summaries.len(),
            "saved summary"
        );
        Ok(true)
    }

    /// Most recent summary for the channel and timeframe, if any.
    pub async fn latest(&self, channel: &str, timeframe: &str) -> Option<Summary> {
        let path = self.collection_path(channel, timeframe);
        let lock = self.lock_for(channel, timeframe).await;
        let _guard = lock.lock().await;
        match load_collection(&path) {
            Ok(collection) => collection.summaries.into_iter().next(),
            Err(e) => {
                tracing::warn!(%channel, %timeframe, error = %e, "could not read summaries");
                None
            }
        }
    }

    /// Most recent summary across all of the channel's timeframes, by
    /// covered `period_end`. Used when the requested timeframe has no
    /// history yet.
    pub async fn latest_any(&self, channel: &str) -> Option<Summary> {
        let dir = self.summaries_dir(channel);
        let entries = std::fs::read_dir(&dir).ok()?;

        let mut newest: Option<Summary> = None;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(timeframe) = name.strip_suffix(COLLECTION_SUFFIX) else {
                continue;
            };
            if let Some(candidate) = self.latest(channel, timeframe).await {
                let newer = newest
                    .as_ref()
                    .is_none_or(|best| candidate.period_end > best.period_end);
                if newer {
                    newest = Some(candidate);
                }
            }
        }
        newest
    }

    /// Remove whole collection files whose last modification is older than
    /// `max_age`. Orthogonal to the per-save retention trimming; reclaims
    /// timeframes that stopped receiving summaries.
    pub async fn cleanup_older_than(&self, max_age: Duration) -> BriefResult<CleanupStats> {
        let mut stats = CleanupStats::default();
        let channels = match std::fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(stats),
        };

        for channel_entry in channels.flatten() {
            if !channel_entry.path().is_dir() {
                continue;
            }
            let channel = channel_entry.file_name().to_string_lossy().to_string();
            let summaries = channel_entry.path().join("summaries");
            let Ok(files) = std::fs::read_dir(&summaries) else {
                continue;
            };

            for file in files.flatten() {
                let name = file.file_name().to_string_lossy().to_string();
                let Some(timeframe) = name.strip_suffix(COLLECTION_SUFFIX) else {
                    continue;
                };
                match file_age(&file.path()) {
                    Ok((age, size)) if age > max_age => {
                        let lock = self.lock_for(&channel, timeframe).await;
                        let _guard = lock.lock().await;
                        match std::fs::remove_file(file.path()) {
                            Ok(()) => {
                                stats.files_removed += 1;
                                stats.bytes_freed += size;
                                tracing::info!(
                                    path = %file.path().display(),
                                    "removed stale summary collection"
                                );
                            }
                            Err(e) => {
                                tracing::warn!(
                                    path = %file.path().display(),
                                    error = %e,
                                    "failed to remove stale summary collection"
                                );
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(path = %file.path().display(), error = %e, "stat failed");
                    }
                }
            }
        }

        Ok(stats)
    }
}

fn file_age(path: &Path) -> std::io::Result<(Duration, u64)> {
    let meta = std::fs::metadata(path)?;
    let age = meta
        .modified()?
        .elapsed()
        .unwrap_or(Duration::ZERO);
    Ok((age, meta.len()))
}

/// A missing file is an empty collection. An unparseable file is logged
/// and treated as empty so one corrupt document never wedges a channel;
/// a read I/O failure is a real persistence error.
fn load_collection(path: &Path) -> BriefResult<Collection> {
    if !path.exists() {
        return Ok(Collection::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| BriefError::Persistence(format!("read {}: {e}", path.display())))?;
    match serde_json::from_str(&content) {
        Ok(collection) => Ok(collection),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "corrupt summary collection, treating as empty"
            );
            Ok(Collection::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store(dir: &Path) -> SummaryStore {
        SummaryStore::new(dir, HashMap::from([("1h".to_string(), 3)]), 30)
    }

    fn summary(channel: &str, timeframe: &str, start_min: u32, end_min: u32) -> Summary {
        Summary {
            period_start: Utc.with_ymd_and_hms(2024, 3, 20, 9, start_min, 0).unwrap(),
            period_end: Utc.with_ymd_and_hms(2024, 3, 20, 9, end_min, 0).unwrap(),
            timeframe: timeframe.to_string(),
            channel: channel.to_string(),
            content: SummaryContent {
                headline: format!("HEADLINE {start_min}"),
                location: "Tel Aviv, March 20, 2024".to_string(),
                body: "Body text.".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn save_and_latest_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(tmp.path());

        assert!(store.save(&summary("alpha", "1h", 0, 45)).await.unwrap());
        let latest = store.latest("alpha", "1h").await.unwrap();
        assert_eq!(latest.content.headline, "HEADLINE 0");
        assert_eq!(latest.period_end, summary("alpha", "1h", 0, 45).period_end);
    }

    #[tokio::test]
    async fn duplicate_period_is_a_noop() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(tmp.path());

        assert!(store.save(&summary("alpha", "1h", 0, 45)).await.unwrap());
        assert!(!store.save(&summary("alpha", "1h", 0, 45)).await.unwrap());

        // identical period in a different timeframe is a separate collection
        assert!(store.save(&summary("alpha", "24h", 0, 45)).await.unwrap());

        let latest = store.latest("alpha", "1h").await.unwrap();
        assert_eq!(latest.content.headline, "HEADLINE 0");
    }

    #[tokio::test]
    async fn retention_keeps_most_recently_inserted() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(tmp.path());

        for start in [0, 5, 10, 15, 20] {
            assert!(store
                .save(&summary("alpha", "1h", start, start + 30))
                .await
                .unwrap());
        }

        let path = tmp.path().join("alpha").join("summaries").join("1h_summaries.json");
        let collection: Collection =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(collection.summaries.len(), 3);
        // newest-first by insertion order, oldest insertions truncated
        let headlines: Vec<&str> = collection
            .summaries
            .iter()
            .map(|s| s.content.headline.as_str())
            .collect();
        assert_eq!(headlines, ["HEADLINE 20", "HEADLINE 15", "HEADLINE 10"]);
    }

    #[tokio::test]
    async fn insertion_order_governs_not_period_end() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(tmp.path());

        // insert a later period first, then an earlier one
        store.save(&summary("alpha", "1h", 30, 59)).await.unwrap();
        store.save(&summary("alpha", "1h", 0, 10)).await.unwrap();

        let latest = store.latest("alpha", "1h").await.unwrap();
        assert_eq!(latest.content.headline, "HEADLINE 0");
    }

    #[tokio::test]
    async fn corrupt_collection_is_treated_as_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(tmp.path());
        let path = tmp.path().join("alpha").join("summaries").join("1h_summaries.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        assert!(store.latest("alpha", "1h").await.is_none());
        assert!(store.save(&summary("alpha", "1h", 0, 45)).await.unwrap());
        assert!(store.latest("alpha", "1h").await.is_some());
    }

    #[tokio::test]
    async fn latest_any_picks_newest_period_end_across_timeframes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(tmp.path());

        store.save(&summary("alpha", "1h", 0, 30)).await.unwrap();
        store.save(&summary("alpha", "24h", 0, 50)).await.unwrap();

        let newest = store.latest_any("alpha").await.unwrap();
        assert_eq!(newest.timeframe, "24h");

        assert!(store.latest_any("ghost").await.is_none());
    }

    #[tokio::test]
    async fn cleanup_removes_only_stale_collections() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = store(tmp.path());

        store.save(&summary("alpha", "1h", 0, 45)).await.unwrap();
        store.save(&summary("alpha", "24h", 0, 45)).await.unwrap();

        let stale = tmp.path().join("alpha").join("summaries").join("24h_summaries.json");
        let two_days_ago = std::time::SystemTime::now() - Duration::from_secs(2 * 86400);
        filetime::set_file_mtime(&stale, filetime::FileTime::from_system_time(two_days_ago))
            .unwrap();

        let stats = store
            .cleanup_older_than(Duration::from_secs(86400))
            .await
            .unwrap();
        assert_eq!(stats.files_removed, 1);
        assert!(stats.bytes_freed > 0);
        assert!(!stale.exists());
        assert!(store.latest("alpha", "1h").await.is_some());
    }

    #[tokio::test]
    async fn cleanup_on_missing_data_dir_is_empty_stats() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = SummaryStore::new(tmp.path().join("nope"), HashMap::new(), 30);
        let stats = store
            .cleanup_older_than(Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(stats, CleanupStats::default());
    }
}
