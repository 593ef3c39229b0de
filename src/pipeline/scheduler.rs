use crate::errors::BriefResult;
use crate::notify::{Notification, NotificationSink};
use crate::pipeline::report::{ReportOutcome, ReportPipeline, clean_channel_name};
use crate::source::client::SourceClient;
use crate::source::window::WindowFetcher;
use crate::timeframe::Timeframe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

/// Pause between channels within one sweep; rate-limit protection.
const CHANNEL_PACING: Duration = Duration::from_secs(1);

/// Transport-failure backoff cap.
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Exponential backoff, 2^n seconds capped at five minutes.
fn backoff_delay(consecutive_errors: u32) -> Duration {
    let secs = 2u64
        .checked_pow(consecutive_errors)
        .unwrap_or(MAX_BACKOFF.as_secs());
    Duration::from_secs(secs).min(MAX_BACKOFF)
}

/// One scheduled cadence: every `every`, sweep all qualifying channels for
/// `timeframe` reports, delivering only those meeting `min_messages`.
#[derive(Debug, Clone)]
pub struct SweepJob {
    pub timeframe: Timeframe,
    pub every: Duration,
    pub min_messages: usize,
}

#[derive(Debug, Default)]
pub struct SweepStats {
    /// Channels with at least one message in the window, with counts.
    pub active: Vec<(String, usize)>,
    pub reports_saved: usize,
    pub failures: usize,
}

/// Long-lived worker loop. One task per configured cadence; sweeps run
/// sequentially within a task and channels sequentially within a sweep, so
/// no two cycles for the same channel and timeframe ever overlap.
///
/// Shutdown is graceful: the stop signal interrupts the timer only, never
/// an in-flight sweep, so store writes always complete.
#[derive(Clone)]
pub struct SweepService {
    source: Arc<SourceClient>,
    fetcher: WindowFetcher,
    pipeline: Arc<ReportPipeline>,
    sink: Arc<dyn NotificationSink>,
    jobs: Vec<SweepJob>,
    shutdown: watch::Sender<bool>,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl SweepService {
    pub fn new(
        source: Arc<SourceClient>,
        fetcher: WindowFetcher,
        pipeline: Arc<ReportPipeline>,
        sink: Arc<dyn NotificationSink>,
        jobs: Vec<SweepJob>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            source,
            fetcher,
            pipeline,
            sink,
            jobs,
            shutdown,
            handles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;
        for job in self.jobs.clone() {
            let service = self.clone();
            let mut shutdown_rx = self.shutdown.subscribe();
            tracing::info!(
                timeframe = %job.timeframe,
                every_secs = job.every.as_secs(),
                "sweep scheduled"
            );

            handles.push(tokio::spawn(async move {
                let mut consecutive_errors: u32 = 0;
                let mut delay = job.every;

                loop {
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        _ = shutdown_rx.changed() => break,
                    }
                    if *shutdown_rx.borrow() {
                        break;
                    }

                    match service.run_sweep(&job).await {
                        Ok(stats) => {
                            consecutive_errors = 0;
                            delay = job.every;
                            tracing::info!(
                                timeframe = %job.timeframe,
                                active = stats.active.len(),
                                saved = stats.reports_saved,
                                failures = stats.failures,
                                "sweep complete"
                            );
                        }
                        Err(e) if e.is_retryable() => {
                            consecutive_errors += 1;
                            delay = backoff_delay(consecutive_errors);
                            tracing::warn!(
                                timeframe = %job.timeframe,
                                error = %e,
                                retry_in_secs = delay.as_secs(),
                                "sweep failed, backing off"
                            );
                        }
                        Err(e) => {
                            consecutive_errors = 0;
                            delay = job.every;
                            tracing::error!(timeframe = %job.timeframe, error = %e, "sweep failed");
                        }
                    }
                }
                tracing::info!(timeframe = %job.timeframe, "sweep loop stopped");
            }));
        }
    }

    /// Signal shutdown and wait for in-flight sweeps to finish.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
    }

    /// Sweep every qualifying channel once for the job's timeframe.
    /// A per-channel failure is counted and skipped; a failure to list
    /// channels fails the whole sweep (and is retryable upstream).
    pub async fn run_sweep(&self, job: &SweepJob) -> BriefResult<SweepStats> {
        tracing::info!(timeframe = %job.timeframe, "running report sweep");
        let channels = self.source.list_channels().await?;

        let mut stats = SweepStats::default();
        for (i, channel) in channels.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(CHANNEL_PACING).await;
            }
            match self
                .pipeline
                .run_and_deliver(&channel.id, &channel.name, &job.timeframe, job.min_messages)
                .await
            {
                Ok(ReportOutcome::NoMessages) => {}
                Ok(ReportOutcome::NoReport { message_count }) => {
                    stats.active.push((channel.name.clone(), message_count));
                }
                Ok(ReportOutcome::Completed { message_count, .. }) => {
                    stats.active.push((channel.name.clone(), message_count));
                    stats.reports_saved += 1;
                }
                Err(e) => {
                    stats.failures += 1;
                    tracing::warn!(channel = %channel.name, error = %e, "channel sweep failed");
                }
            }
        }

        let digest = sweep_digest(&job.timeframe, job.min_messages, &stats);
        if let Err(e) = self.sink.send(&Notification::text(digest)).await {
            tracing::warn!(error = %e, "failed to deliver sweep digest");
        }

        Ok(stats)
    }

    /// Count window messages per qualifying channel without summarizing,
    /// sorted most-active first.
    pub async fn check_activity(&self, window: &Timeframe) -> BriefResult<Vec<(String, usize)>> {
        let channels = self.source.list_channels().await?;

        let mut counts = Vec::new();
        for (i, channel) in channels.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(CHANNEL_PACING).await;
            }
            let messages = self
                .fetcher
                .fetch_window(&channel.id, window.duration())
                .await;
            if !messages.is_empty() {
                counts.push((channel.name.clone(), messages.len()));
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(counts)
    }
}

pub fn sweep_digest(timeframe: &Timeframe, min_messages: usize, stats: &SweepStats) -> String {
    if stats.active.is_empty() {
        return format!(
            "ℹ️ No activity in any channel in the last {}",
            timeframe.label()
        );
    }

    let mut digest = format!("📊 Report sweep ({})\n\n", timeframe.label());
    for (name, count) in &stats.active {
        digest.push_str(&format!(
            "• #{}: {count} messages\n",
            clean_channel_name(name)
        ));
    }
    digest.push_str(&format!(
        "\nReports saved for {} channels",
        stats.reports_saved
    ));
    if !stats.active.iter().any(|(_, count)| *count >= min_messages) {
        digest.push_str(&format!(
            "\nNo channels met threshold ({min_messages} messages) for sending report"
        ));
    }
    digest
}

pub fn activity_digest(window: &Timeframe, counts: &[(String, usize)]) -> String {
    if counts.is_empty() {
        return format!(
            "ℹ️ No activity in any channel in the last {}",
            window.label()
        );
    }
    let mut digest = format!("📊 Channel Activity ({})\n\n", window.label());
    for (name, count) in counts {
        digest.push_str(&format!(
            "• #{}: {count} messages\n",
            clean_channel_name(name)
        ));
    }
    digest.trim_end().to_string()
}
