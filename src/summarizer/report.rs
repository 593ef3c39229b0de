use crate::errors::{BriefError, BriefResult};
use crate::source::types::Message;
use crate::summarizer::provider::CompletionBackend;
use crate::store::summary_store::{Summary, SummaryContent};
use crate::store::RECORD_DELIMITER;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Embed field name that is dropped from formatted messages; it carries
/// provenance links the report must not quote.
const EXCLUDED_FIELD: &str = "source";

const SYSTEM_PROMPT: &str = "You are an experienced news wire journalist creating concise, \
clear updates. Your task is to report the latest developments while maintaining narrative \
continuity with previous coverage. Focus on what's new and noteworthy, using prior context \
only when it enhances understanding of current events.";

/// Builds summarization requests, chaining the previous summary of the
/// same cadence into the prompt, and parses the structured result.
///
/// Chaining on the same timeframe's previous summary (rather than a
/// different cadence's) keeps narrative continuity aligned with what the
/// reader of that cadence last saw.
pub struct ReportSummarizer {
    backend: Arc<dyn CompletionBackend>,
    max_tokens: u32,
}

impl ReportSummarizer {
    pub fn new(backend: Arc<dyn CompletionBackend>, max_tokens: u32) -> Self {
        Self {
            backend,
            max_tokens,
        }
    }

    fn format_timestamp(ts: DateTime<Utc>) -> String {
        ts.format("%Y-%m-%d %H:%M UTC").to_string()
    }

    /// Render messages into normalized text blocks: a timestamp header,
    /// the body text, then embed titles/descriptions/fields (minus the
    /// excluded field), joined by the record delimiter. The same rendering
    /// feeds both the prompt and the message log.
    pub fn format_messages(messages: &[Message]) -> String {
        let blocks: Vec<String> = messages
            .iter()
            .map(|msg| {
                let mut block = format!("[{}]\n", Self::format_timestamp(msg.timestamp));
                if !msg.content.is_empty() {
                    block.push_str(&msg.content);
                    block.push('\n');
                }
                for embed in &msg.embeds {
                    if let Some(title) = &embed.title {
                        block.push_str(&format!("Title: {title}\n"));
                    }
                    if let Some(description) = &embed.description {
                        block.push_str(&format!("Description: {description}\n"));
                    }
                    for field in &embed.fields {
                        if field.name.eq_ignore_ascii_case(EXCLUDED_FIELD) {
                            continue;
                        }
                        block.push_str(&format!("{}: {}\n", field.name, field.value));
                    }
                }
                block
            })
            .collect();
        blocks.join(RECORD_DELIMITER)
    }

    fn format_context(previous: &Summary) -> String {
        format!(
            "CONTEXT FROM PREVIOUS REPORT\n\
             Time period: {} to {} UTC\n\n\
             {}\n\n\
             -------------------\n\
             NEW UPDATES TO INCORPORATE\n",
            previous.period_start.format("%B %d, %Y %H:%M"),
            previous.period_end.format("%B %d, %Y %H:%M"),
            previous.content.render(),
        )
    }

    fn build_prompt(formatted: &str, previous: Option<&Summary>) -> String {
        let context = previous.map(Self::format_context).unwrap_or_default();
        format!(
            "Create a concise, journalistic report covering the key developments, \
             incorporating context from the previous report when relevant.\n\n\
             {context}Updates to analyze:\n{formatted}\n\n\
             Requirements:\n\
             - Start with ONE headline in ALL CAPS that captures the most significant development\n\
             - Second line must be in format: City, Month Day, Year (use location of main development)\n\
             - First paragraph must summarize the most important verified development\n\
             - Subsequent paragraphs should cover other significant developments\n\
             - Do NOT include additional headlines - weave all events into a cohesive narrative\n\
             - Maximum 4096 characters, average 2500 characters\n\
             - Only include verified facts and direct quotes from official statements\n\
             - Maintain strictly neutral tone - avoid loaded terms or partisan framing\n\
             - NO analysis, commentary, or speculation\n\
             - NO use of terms like \"likely\", \"appears to\", or \"is seen as\"\n\n\
             When incorporating previous context:\n\
             - Focus primarily on new developments from the current timeframe\n\
             - Reference previous events only if they directly relate to new developments\n\
             - Avoid repeating old information unless it provides crucial context\n\
             - If a situation has evolved, clearly indicate what has changed\n\
             - Maintain chronological clarity when connecting past and present events\n\n\
             Example format:\n\
             MAJOR DEVELOPMENT OCCURS IN REGION\n\
             Tel Aviv, March 20, 2024\n\n\
             First paragraph with main verified development..."
        )
    }

    /// Headline on the first line, dateline on the second, body from the
    /// fourth onward. Anything shorter is unusable.
    fn parse_response(text: &str) -> Option<SummaryContent> {
        let lines: Vec<&str> = text.lines().collect();
        let headline = lines.first()?.trim();
        let location = lines.get(1)?.trim();
        if headline.is_empty() {
            return None;
        }
        let body = if lines.len() > 3 {
            lines[3..].join("\n").trim().to_string()
        } else {
            String::new()
        };
        Some(SummaryContent {
            headline: headline.to_string(),
            location: location.to_string(),
            body,
        })
    }

    /// Summarize a message window into a report. `Ok(None)` means there is
    /// nothing to report — an empty window, or a summarizer response that
    /// produced no usable text (which is never stored).
    pub async fn summarize(
        &self,
        messages: &[Message],
        channel: &str,
        timeframe: &str,
        previous: Option<&Summary>,
    ) -> BriefResult<Option<Summary>> {
        let Some(period_start) = messages.iter().map(|m| m.timestamp).min() else {
            return Ok(None);
        };
        let period_end = messages
            .iter()
            .map(|m| m.timestamp)
            .max()
            .unwrap_or(period_start);

        let formatted = Self::format_messages(messages);
        let prompt = Self::build_prompt(&formatted, previous);

        let text = self
            .backend
            .complete(SYSTEM_PROMPT, &prompt, self.max_tokens)
            .await
            .map_err(|e| BriefError::Transport {
                message: format!("summarization failed for #{channel}: {e}"),
                retryable: true,
            })?;

        match Self::parse_response(&text) {
            Some(content) => Ok(Some(Summary {
                period_start,
                period_end,
                timeframe: timeframe.to_string(),
                channel: channel.to_string(),
                content,
            })),
            None => {
                tracing::error!(%channel, %timeframe, "summarizer returned empty or unusable text");
                Ok(None)
            }
        }
    }
}
