use crate::errors::BriefResult;
use crate::notify::{Notification, NotificationSink};
use crate::source::window::WindowFetcher;
use crate::store::message_log::MessageLog;
use crate::store::summary_store::{Summary, SummaryStore};
use crate::summarizer::report::ReportSummarizer;
use crate::timeframe::Timeframe;
use std::sync::Arc;

/// Result of one pipeline invocation.
#[derive(Debug)]
pub enum ReportOutcome {
    /// The window held no qualifying messages; nothing to do.
    NoMessages,
    /// Messages existed but the summarizer produced nothing usable;
    /// surfaced as a failed report, nothing stored.
    NoReport { message_count: usize },
    /// A summary was generated. `inserted` is false when the covered
    /// period was already stored (the save was a no-op).
    Completed {
        summary: Summary,
        message_count: usize,
        inserted: bool,
    },
}

/// Channel names use dashes in the source; reports show them with spaces.
pub fn clean_channel_name(name: &str) -> String {
    name.replace('-', " ")
}

/// One report cycle: fetch window → log messages → look up previous
/// summary → summarize with context → store → notify.
///
/// Holds no state of its own; cycles for the same channel and timeframe
/// must run sequentially (the store serializes the save itself, but
/// interleaved cycles would chain context from a stale previous summary).
pub struct ReportPipeline {
    fetcher: WindowFetcher,
    log: MessageLog,
    store: Arc<SummaryStore>,
    summarizer: ReportSummarizer,
    sink: Arc<dyn NotificationSink>,
}

impl ReportPipeline {
    pub fn new(
        fetcher: WindowFetcher,
        log: MessageLog,
        store: Arc<SummaryStore>,
        summarizer: ReportSummarizer,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            fetcher,
            log,
            store,
            summarizer,
            sink,
        }
    }

    /// Run one cycle without delivery. Summarizer transport failures and
    /// store write failures propagate as the cycle's error.
    pub async fn run(
        &self,
        channel_id: &str,
        channel_name: &str,
        timeframe: &Timeframe,
    ) -> BriefResult<ReportOutcome> {
        let messages = self
            .fetcher
            .fetch_window(channel_id, timeframe.duration())
            .await;
        let Some(first_ts) = messages.iter().map(|m| m.timestamp).min() else {
            tracing::info!(%channel_name, %timeframe, "no messages in window");
            return Ok(ReportOutcome::NoMessages);
        };
        let message_count = messages.len();
        tracing::info!(%channel_name, %timeframe, message_count, "generating report");

        // The raw log is a side-effect; a persistence failure here must not
        // block the report itself.
        let formatted = ReportSummarizer::format_messages(&messages);
        if let Err(e) = self
            .log
            .append(channel_name, first_ts.date_naive(), &formatted)
        {
            tracing::warn!(%channel_name, error = %e, "failed to log raw messages");
        }

        let previous = match self.store.latest(channel_name, timeframe.label()).await {
            Some(summary) => Some(summary),
            None => self.store.latest_any(channel_name).await,
        };

        let Some(summary) = self
            .summarizer
            .summarize(&messages, channel_name, timeframe.label(), previous.as_ref())
            .await?
        else {
            return Ok(ReportOutcome::NoReport { message_count });
        };

        let inserted = self.store.save(&summary).await?;

        Ok(ReportOutcome::Completed {
            summary,
            message_count,
            inserted,
        })
    }

    /// Run one cycle and deliver the outcome through the sink. The report
    /// is always stored when one is generated; it is only delivered when
    /// the window's message count meets `min_messages`. Failures are
    /// reported through the sink as error notifications before propagating.
    pub async fn run_and_deliver(
        &self,
        channel_id: &str,
        channel_name: &str,
        timeframe: &Timeframe,
        min_messages: usize,
    ) -> BriefResult<ReportOutcome> {
        let display_name = clean_channel_name(channel_name);

        let outcome = match self.run(channel_id, channel_name, timeframe).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let note = Notification::error(format!(
                    "Error generating report for #{display_name}: {e}"
                ));
                if let Err(send_err) = self.sink.send(&note).await {
                    tracing::warn!(error = %send_err, "failed to deliver error notification");
                }
                return Err(e);
            }
        };

        match &outcome {
            ReportOutcome::NoMessages => {}
            ReportOutcome::NoReport { .. } => {
                let note = Notification::error(format!(
                    "AI summary generation returned empty result for #{display_name}"
                ));
                if let Err(e) = self.sink.send(&note).await {
                    tracing::warn!(error = %e, "failed to deliver error notification");
                }
            }
            ReportOutcome::Completed {
                summary,
                message_count,
                ..
            } => {
                if *message_count >= min_messages {
                    let header = Notification::text(format!(
                        "📊 Report for {display_name} ({})\nMessages in timeframe: {message_count}",
                        timeframe.label()
                    ));
                    let body = Notification::text(summary.content.render());
                    if let Err(e) = self.sink.send(&header).await {
                        tracing::warn!(error = %e, "failed to deliver report header");
                    }
                    if let Err(e) = self.sink.send(&body).await {
                        tracing::warn!(error = %e, "failed to deliver report");
                    }
                } else {
                    tracing::info!(
                        %channel_name,
                        message_count,
                        min_messages,
                        "report stored but below delivery threshold"
                    );
                }
            }
        }

        Ok(outcome)
    }
}
