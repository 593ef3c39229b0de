use crate::config::{Config, data_dir, get_config_path, load_config};
use crate::notify::{LogSink, Notification, NotificationSink, TelegramSink};
use crate::pipeline::report::{ReportOutcome, ReportPipeline, clean_channel_name};
use crate::pipeline::scheduler::{SweepJob, SweepService, activity_digest};
use crate::source::client::SourceClient;
use crate::source::window::WindowFetcher;
use crate::store::message_log::MessageLog;
use crate::store::summary_store::SummaryStore;
use crate::summarizer::provider::AnthropicBackend;
use crate::summarizer::report::ReportSummarizer;
use crate::timeframe::Timeframe;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "newsbrief")]
#[command(about = "Channel-to-chat AI report bot")]
#[command(version = crate::VERSION)]
pub struct Cli {
    /// Path to the config file (defaults to <home>/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduled report sweeps until interrupted
    Serve,
    /// Generate one report for a channel
    Report {
        /// Source channel id
        #[arg(long)]
        channel: String,
        /// Window to cover, e.g. 10m, 1h, 24h
        #[arg(long, default_value = "1h")]
        window: String,
        /// Deliver via Telegram instead of printing
        #[arg(long, short = 'd')]
        deliver: bool,
    },
    /// List the channels that qualify for reporting
    Channels,
    /// Count window messages per channel without summarizing
    Activity {
        /// Window to cover, e.g. 30m, 1h, 4h
        #[arg(long, default_value = "1h")]
        window: String,
    },
    /// Remove summary collections not modified within the given age
    Cleanup {
        /// Age threshold, e.g. 30d, 2weeks
        #[arg(long, value_parser = humantime::parse_duration)]
        max_age: Duration,
    },
    /// Show configuration and storage paths
    Status,
}

/// Everything the orchestrator needs, constructed once at startup.
struct App {
    source: Arc<SourceClient>,
    fetcher: WindowFetcher,
    store: Arc<SummaryStore>,
    pipeline: Arc<ReportPipeline>,
    sink: Arc<dyn NotificationSink>,
}

fn build_app(config: &Config, sink: Arc<dyn NotificationSink>) -> Result<App> {
    let data = data_dir(config)?;
    let source = Arc::new(SourceClient::new(&config.source));
    let fetcher = WindowFetcher::new(source.clone(), config.source.bot.clone());
    let store = Arc::new(SummaryStore::new(
        data.clone(),
        config.storage.retention.clone(),
        config.storage.retention_fallback,
    ));
    let backend = Arc::new(AnthropicBackend::new(&config.summarizer));
    let pipeline = Arc::new(ReportPipeline::new(
        fetcher.clone(),
        MessageLog::new(data),
        store.clone(),
        ReportSummarizer::new(backend, config.summarizer.max_tokens),
        sink.clone(),
    ));
    Ok(App {
        source,
        fetcher,
        store,
        pipeline,
        sink,
    })
}

fn sweep_jobs(config: &Config) -> Result<Vec<SweepJob>> {
    config
        .reports
        .sweeps
        .iter()
        .map(|sweep| {
            let timeframe: Timeframe = sweep.timeframe.parse()?;
            let min_messages = config.threshold_for(timeframe.label());
            Ok(SweepJob {
                timeframe,
                every: Duration::from_secs(sweep.every_secs),
                min_messages,
            })
        })
        .collect()
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve => serve(&config).await,
        Commands::Report {
            channel,
            window,
            deliver,
        } => report(&config, &channel, &window, deliver).await,
        Commands::Channels => channels(&config).await,
        Commands::Activity { window } => activity(&config, &window).await,
        Commands::Cleanup { max_age } => cleanup(&config, max_age).await,
        Commands::Status => status(&config),
    }
}

async fn serve(config: &Config) -> Result<()> {
    config.validate_for_delivery()?;
    let sink: Arc<dyn NotificationSink> = Arc::new(TelegramSink::new(&config.telegram));
    let app = build_app(config, sink)?;
    let jobs = sweep_jobs(config)?;

    let cadences: Vec<&str> = jobs.iter().map(|j| j.timeframe.label()).collect();
    let welcome = format!(
        "🤖 newsbrief started\nScheduled report sweeps: {}",
        cadences.join(", ")
    );
    if let Err(e) = app.sink.send(&Notification::text(welcome)).await {
        tracing::warn!(error = %e, "failed to deliver startup message");
    }

    let service = SweepService::new(
        app.source.clone(),
        app.fetcher.clone(),
        app.pipeline.clone(),
        app.sink.clone(),
        jobs,
    );
    service.start().await;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Received shutdown signal, finishing in-flight work...");
    service.stop().await;
    Ok(())
}

async fn report(config: &Config, channel_id: &str, window: &str, deliver: bool) -> Result<()> {
    config.validate()?;
    if deliver {
        config.validate_for_delivery()?;
    }
    let timeframe: Timeframe = window.parse()?;
    let sink: Arc<dyn NotificationSink> = if deliver {
        Arc::new(TelegramSink::new(&config.telegram))
    } else {
        Arc::new(LogSink)
    };
    let app = build_app(config, sink)?;

    let channel_name = app
        .source
        .list_channels()
        .await?
        .into_iter()
        .find(|c| c.id == channel_id)
        .map_or_else(|| "unknown-channel".to_string(), |c| c.name);

    if deliver {
        app.pipeline
            .run_and_deliver(channel_id, &channel_name, &timeframe, 0)
            .await?;
        return Ok(());
    }

    match app.pipeline.run(channel_id, &channel_name, &timeframe).await? {
        ReportOutcome::NoMessages => {
            println!(
                "No messages found in #{} for the last {}.",
                clean_channel_name(&channel_name),
                timeframe.label()
            );
        }
        ReportOutcome::NoReport { message_count } => {
            anyhow::bail!(
                "summarizer returned an empty result for #{channel_name} ({message_count} messages)"
            );
        }
        ReportOutcome::Completed {
            summary,
            message_count,
            inserted,
        } => {
            println!(
                "📊 Report for {} ({}) — {} messages{}\n",
                clean_channel_name(&channel_name),
                timeframe.label(),
                message_count,
                if inserted { "" } else { " (period already stored)" }
            );
            println!("{}", summary.content.render());
        }
    }
    Ok(())
}

async fn channels(config: &Config) -> Result<()> {
    config.validate_source()?;
    let source = SourceClient::new(&config.source);
    let channels = source.list_channels().await?;
    if channels.is_empty() {
        println!("No channels qualify for reporting.");
        return Ok(());
    }
    for channel in channels {
        println!("{}  #{}", channel.id, channel.name);
    }
    Ok(())
}

async fn activity(config: &Config, window: &str) -> Result<()> {
    config.validate_source()?;
    let timeframe: Timeframe = window.parse()?;
    let app = build_app(config, Arc::new(LogSink))?;
    let service = SweepService::new(
        app.source.clone(),
        app.fetcher.clone(),
        app.pipeline.clone(),
        app.sink.clone(),
        Vec::new(),
    );
    let counts = service.check_activity(&timeframe).await?;
    println!("{}", activity_digest(&timeframe, &counts));
    Ok(())
}

async fn cleanup(config: &Config, max_age: Duration) -> Result<()> {
    let app = build_app(config, Arc::new(LogSink))?;
    let stats = app.store.cleanup_older_than(max_age).await?;
    println!(
        "Removed {} stale summary collections ({} bytes freed)",
        stats.files_removed, stats.bytes_freed
    );
    Ok(())
}

fn status(config: &Config) -> Result<()> {
    let config_path = get_config_path()?;
    println!("newsbrief {}", crate::VERSION);
    println!(
        "Config:   {} ({})",
        config_path.display(),
        if config_path.exists() {
            "present"
        } else {
            "absent, using defaults"
        }
    );
    println!("Data dir: {}", data_dir(config)?.display());
    println!(
        "Source:   {} (guild {})",
        if config.source.token.is_empty() {
            "no token"
        } else {
            "token set"
        },
        if config.source.guild_id.is_empty() {
            "unset"
        } else {
            config.source.guild_id.as_str()
        }
    );
    for sweep in &config.reports.sweeps {
        println!(
            "Sweep:    {} every {}s (threshold {}, retention {})",
            sweep.timeframe,
            sweep.every_secs,
            config.threshold_for(&sweep.timeframe),
            config.retention_for(&sweep.timeframe)
        );
    }
    Ok(())
}
