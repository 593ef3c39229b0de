use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use newsbrief::config::{BotIdentity, SourceConfig};
use newsbrief::notify::{Notification, NotificationSink};
use newsbrief::pipeline::report::{ReportOutcome, ReportPipeline};
use newsbrief::source::client::SourceClient;
use newsbrief::source::window::WindowFetcher;
use newsbrief::store::message_log::MessageLog;
use newsbrief::store::summary_store::SummaryStore;
use newsbrief::summarizer::provider::CompletionBackend;
use newsbrief::summarizer::report::ReportSummarizer;
use newsbrief::timeframe::Timeframe;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use wiremock::matchers::{method, path, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REPLY: &str = "CLASHES INTENSIFY IN NORTHERN DISTRICT\nTel Aviv, March 20, 2024\n\nSix incidents were reported within the hour.";

struct StubBackend {
    prompts: Mutex<Vec<String>>,
    reply: String,
}

impl StubBackend {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            prompts: Mutex::new(Vec::new()),
            reply: reply.to_string(),
        })
    }
}

#[async_trait]
impl CompletionBackend for StubBackend {
    async fn complete(&self, _system: &str, prompt: &str, _max_tokens: u32) -> anyhow::Result<String> {
        self.prompts.lock().await.push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

#[derive(Default)]
struct CollectingSink {
    sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl NotificationSink for CollectingSink {
    async fn send(&self, note: &Notification) -> anyhow::Result<()> {
        self.sent.lock().await.push(note.clone());
        Ok(())
    }
}

fn bot() -> BotIdentity {
    BotIdentity {
        name: "WireBot".to_string(),
        tag: "7032".to_string(),
    }
}

fn message(id: &str, ts: DateTime<Utc>, content: &str) -> Value {
    json!({
        "id": id,
        "author": {"username": "WireBot", "discriminator": "7032"},
        "timestamp": ts.to_rfc3339(),
        "content": content,
    })
}

struct Harness {
    pipeline: ReportPipeline,
    backend: Arc<StubBackend>,
    sink: Arc<CollectingSink>,
    store: Arc<SummaryStore>,
    _tmp: tempfile::TempDir,
}

fn harness(server: &MockServer, reply: &str) -> Harness {
    let tmp = tempfile::TempDir::new().unwrap();
    let client = Arc::new(SourceClient::new(&SourceConfig {
        token: "source-token".to_string(),
        guild_id: "guild".to_string(),
        api_base: server.uri(),
        bot: bot(),
        ..SourceConfig::default()
    }));
    let fetcher = WindowFetcher::new(client, bot());
    let store = Arc::new(SummaryStore::new(
        tmp.path(),
        HashMap::from([("1h".to_string(), 48)]),
        30,
    ));
    let backend = StubBackend::new(reply);
    let sink = Arc::new(CollectingSink::default());
    let pipeline = ReportPipeline::new(
        fetcher,
        MessageLog::new(tmp.path()),
        store.clone(),
        ReportSummarizer::new(backend.clone(), 800),
        sink.clone(),
    );
    Harness {
        pipeline,
        backend,
        sink,
        store,
        _tmp: tmp,
    }
}

/// Six qualifying messages spread over 45 minutes, newest first, plus one
/// older message that terminates pagination at the cutoff.
async fn mount_channel(server: &MockServer, newest: DateTime<Utc>) {
    let page: Vec<Value> = (0..6)
        .map(|i| {
            message(
                &format!("m{i}"),
                newest - Duration::minutes(i * 9),
                &format!("update {i}"),
            )
        })
        .chain([message(
            "old",
            newest - Duration::minutes(120),
            "yesterday's news",
        )])
        .collect();

    Mock::given(method("GET"))
        .and(path("/channels/42/messages"))
        .and(query_param_is_missing("before"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(page)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn report_covers_the_message_period_and_is_stored() {
    let server = MockServer::start().await;
    let newest = Utc::now() - Duration::minutes(10);
    mount_channel(&server, newest).await;

    let h = harness(&server, REPLY);
    let timeframe: Timeframe = "1h".parse().unwrap();

    let outcome = h
        .pipeline
        .run_and_deliver("42", "alpha", &timeframe, 5)
        .await
        .unwrap();

    let ReportOutcome::Completed {
        summary,
        message_count,
        inserted,
    } = outcome
    else {
        panic!("expected a completed report");
    };
    assert_eq!(message_count, 6);
    assert!(inserted);
    // period derives from the message timestamps, not the requested hour
    assert_eq!(summary.period_end, newest);
    assert_eq!(summary.period_start, newest - Duration::minutes(45));
    assert_eq!(summary.content.headline, "CLASHES INTENSIFY IN NORTHERN DISTRICT");

    let stored = h.store.latest("alpha", "1h").await.unwrap();
    assert_eq!(stored.period_start, summary.period_start);

    // threshold met: header + report body were delivered
    let sent = h.sink.sent.lock().await;
    assert_eq!(sent.len(), 2);
    assert!(sent[0].text.contains("Messages in timeframe: 6"));
    assert!(sent[1].text.starts_with("CLASHES INTENSIFY"));
}

#[tokio::test]
async fn repeated_run_is_a_save_noop_but_still_delivers() {
    let server = MockServer::start().await;
    mount_channel(&server, Utc::now() - Duration::minutes(10)).await;

    let h = harness(&server, REPLY);
    let timeframe: Timeframe = "1h".parse().unwrap();

    let first = h
        .pipeline
        .run_and_deliver("42", "alpha", &timeframe, 0)
        .await
        .unwrap();
    assert!(matches!(first, ReportOutcome::Completed { inserted: true, .. }));

    let second = h
        .pipeline
        .run_and_deliver("42", "alpha", &timeframe, 0)
        .await
        .unwrap();
    let ReportOutcome::Completed {
        summary, inserted, ..
    } = second
    else {
        panic!("expected a completed report");
    };
    assert!(!inserted);
    assert_eq!(summary.content.headline, "CLASHES INTENSIFY IN NORTHERN DISTRICT");

    // both runs delivered, the duplicate save notwithstanding
    let sent = h.sink.sent.lock().await;
    assert_eq!(sent.iter().filter(|n| !n.is_error).count(), 4);
}

#[tokio::test]
async fn second_report_chains_context_from_the_first() {
    let server = MockServer::start().await;
    mount_channel(&server, Utc::now() - Duration::minutes(10)).await;

    let h = harness(&server, REPLY);
    let timeframe: Timeframe = "1h".parse().unwrap();

    h.pipeline
        .run_and_deliver("42", "alpha", &timeframe, 0)
        .await
        .unwrap();
    h.pipeline
        .run_and_deliver("42", "alpha", &timeframe, 0)
        .await
        .unwrap();

    let prompts = h.backend.prompts.lock().await;
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[0].contains("CONTEXT FROM PREVIOUS REPORT"));
    assert!(prompts[1].contains("CONTEXT FROM PREVIOUS REPORT"));
    assert!(prompts[1].contains("CLASHES INTENSIFY IN NORTHERN DISTRICT"));
}

#[tokio::test]
async fn message_log_ingestion_is_idempotent_across_runs() {
    let server = MockServer::start().await;
    let newest = Utc::now() - Duration::minutes(10);
    mount_channel(&server, newest).await;

    let h = harness(&server, REPLY);
    let timeframe: Timeframe = "1h".parse().unwrap();

    h.pipeline
        .run_and_deliver("42", "alpha", &timeframe, 0)
        .await
        .unwrap();
    h.pipeline
        .run_and_deliver("42", "alpha", &timeframe, 0)
        .await
        .unwrap();

    let log = MessageLog::new(h._tmp.path());
    let day = (newest - Duration::minutes(45)).date_naive();
    assert_eq!(log.record_count("alpha", day).unwrap(), 6);
}

#[tokio::test]
async fn empty_window_is_a_quiet_noop() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/42/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let h = harness(&server, REPLY);
    let timeframe: Timeframe = "1h".parse().unwrap();

    let outcome = h
        .pipeline
        .run_and_deliver("42", "alpha", &timeframe, 0)
        .await
        .unwrap();
    assert!(matches!(outcome, ReportOutcome::NoMessages));
    assert!(h.sink.sent.lock().await.is_empty());
    assert!(h.store.latest("alpha", "1h").await.is_none());
}

#[tokio::test]
async fn empty_summarizer_reply_stores_nothing_and_reports_the_failure() {
    let server = MockServer::start().await;
    mount_channel(&server, Utc::now() - Duration::minutes(10)).await;

    let h = harness(&server, "");
    let timeframe: Timeframe = "1h".parse().unwrap();

    let outcome = h
        .pipeline
        .run_and_deliver("42", "alpha", &timeframe, 0)
        .await
        .unwrap();
    assert!(matches!(outcome, ReportOutcome::NoReport { message_count: 6 }));
    assert!(h.store.latest("alpha", "1h").await.is_none());

    let sent = h.sink.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].is_error);
    assert!(sent[0].text.contains("empty result"));
}
