//! feedenrich-agent - Evidence-gated product feed enrichment
//!
//! Command-line front end for the enrichment pipeline and its deterministic
//! building blocks. Results are printed to stdout as JSON; logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use feedenrich_agent::config::CliOverrides;
use feedenrich_agent::extractors::{BraveSearchClient, BraveWebRetriever, OracleVisualAnalyzer};
use feedenrich_agent::models::{Record, RunStatus, SourceType};
use feedenrich_agent::oracle::{OpenAiOracle, ReasoningOracle};
use feedenrich_agent::validators::{DiffEngine, HardRuleValidator, RiskClassifier};
use feedenrich_agent::workflow::event_bridge::bridge_pipeline_events;
use feedenrich_agent::{AgentConfig, OptimizationScope, Pipeline, PipelineResult};
use feedenrich_common::config::{load_toml_config, TomlConfig};
use feedenrich_common::events::EventBus;
use serde_json::json;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Command-line arguments for feedenrich-agent
#[derive(Parser, Debug)]
#[command(name = "feedenrich-agent")]
#[command(about = "Evidence-gated product feed enrichment")]
#[command(version)]
struct Args {
    /// TOML config file (default: <config dir>/feedenrich/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Oracle API key (overrides environment and TOML)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Log level when RUST_LOG is not set
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a record against the hard rules
    Validate {
        /// Record JSON file
        record: PathBuf,
    },

    /// Explain the difference between two values of a field
    Diff {
        field: String,
        before: String,
        after: String,
    },

    /// Classify the risk of one change and apply the human gate
    Assess {
        field: String,
        before: String,
        after: String,
        /// Source type: feed, image, web, user, mixed
        #[arg(long, default_value = "feed")]
        source: String,
        #[arg(long, default_value_t = 0.9)]
        confidence: f64,
    },

    /// Run the enrichment pipeline on one or more records
    Run {
        /// Record JSON files
        #[arg(required = true)]
        records: Vec<PathBuf>,

        /// Optimization scope
        #[arg(long, default_value = "all")]
        scope: OptimizationScope,

        /// Oracle timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Brave Search API key (overrides environment and TOML)
        #[arg(long)]
        brave_api_key: Option<String>,

        /// Records processed concurrently
        #[arg(long, default_value_t = 4)]
        concurrency: usize,

        /// Print progress events to stderr as JSON lines
        #[arg(long)]
        events: bool,
    },

    /// List optimization scopes
    Scopes,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml = load_toml_config(args.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&args, &toml)?;

    info!("Starting feedenrich-agent");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Validate { ref record } => {
            let json = read_record(record)?;
            let result = HardRuleValidator::new().validate_json(&json);
            print_json(&result)?;
        }

        Command::Diff {
            ref field,
            ref before,
            ref after,
        } => {
            let diff = DiffEngine::new().compute_diff(field, before, after);
            print_json(&diff)?;
        }

        Command::Assess {
            ref field,
            ref before,
            ref after,
            ref source,
            confidence,
        } => {
            let classifier = RiskClassifier::new();
            let assessment =
                classifier.assess_change(field, before, after, SourceType::parse(source), confidence);
            let human_gate = classifier.should_require_human_review(&assessment);
            print_json(&json!({ "assessment": assessment, "requires_human_review": human_gate }))?;
        }

        Command::Run {
            ref records,
            scope,
            timeout_secs,
            ref brave_api_key,
            concurrency,
            events,
        } => {
            let cli = CliOverrides {
                oracle_api_key: args.api_key.clone(),
                brave_api_key: brave_api_key.clone(),
                oracle_timeout_secs: timeout_secs,
                log_level: args.log_level.clone(),
            };
            let config = AgentConfig::resolve(&toml, &cli);
            let results = run_records(&config, records, scope, concurrency, events).await?;

            if results.len() == 1 {
                print_json(&results[0])?;
            } else {
                print_json(&results)?;
            }
            if results.iter().any(|r| r.status == RunStatus::Failed) {
                std::process::exit(1);
            }
        }

        Command::Scopes => {
            let scopes: Vec<_> = OptimizationScope::ALL.iter().map(|s| s.info()).collect();
            print_json(&scopes)?;
        }
    }

    Ok(())
}

fn init_tracing(args: &Args, toml: &TomlConfig) -> Result<()> {
    let level = args
        .log_level
        .clone()
        .or_else(|| std::env::var(feedenrich_agent::config::ENV_LOG_LEVEL).ok())
        .unwrap_or_else(|| toml.logging.level.clone());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn run_records(
    config: &AgentConfig,
    paths: &[PathBuf],
    scope: OptimizationScope,
    concurrency: usize,
    print_events: bool,
) -> Result<Vec<PipelineResult>> {
    let api_key = config.require_oracle_key()?;
    let oracle: Arc<dyn ReasoningOracle> = Arc::new(OpenAiOracle::with_options(
        api_key,
        &config.oracle_base_url,
        &config.oracle_model,
        &config.vision_model,
        config.oracle_timeout,
    )?);
    info!("Oracle: {} ({})", oracle.name(), config.oracle_model);

    let (event_tx, event_rx) = mpsc::channel(256);
    let mut pipeline = Pipeline::new(config.pipeline_config(scope), Arc::clone(&oracle))
        .with_visual(Arc::new(OracleVisualAnalyzer::new(Arc::clone(&oracle))))
        .with_events(event_tx);

    match config.brave_api_key.as_deref().map(BraveSearchClient::new) {
        Some(Ok(search)) => {
            pipeline = pipeline.with_web(Arc::new(BraveWebRetriever::new(search, Arc::clone(&oracle))));
        }
        Some(Err(e)) => warn!("Web evidence disabled: {}", e),
        None => info!("No Brave Search API key configured, web evidence disabled"),
    }

    // Event bus fan-out
    let event_bus = EventBus::new(256);
    let mut subscriber = event_bus.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match subscriber.recv().await {
                Ok(event) if print_events => {
                    if let Ok(line) = serde_json::to_string(&event) {
                        eprintln!("{}", line);
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event printer lagged, {} events skipped", skipped)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    let bridge = tokio::spawn(bridge_pipeline_events(event_rx, event_bus));

    // Ctrl-C cancels every in-flight run
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling runs");
            on_interrupt.cancel();
        }
    });

    let mut results = Vec::with_capacity(paths.len());
    let mut records = Vec::with_capacity(paths.len());
    let pipeline = Arc::new(pipeline);
    for path in paths {
        let json = read_record(path)?;
        if paths.len() == 1 {
            let (_, result) = pipeline.run_json(&json, cancel.clone()).await;
            results.push(result);
        } else {
            records.push(
                Record::from_json(&json).with_context(|| format!("Invalid record: {}", path.display()))?,
            );
        }
    }
    if !records.is_empty() {
        let batch = Arc::clone(&pipeline)
            .run_batch(records, concurrency, cancel.clone())
            .await;
        results.extend(batch.into_iter().map(|(_, result)| result));
    }

    // Dropping the pipeline closes the event channel and ends the bridge
    drop(pipeline);
    bridge.await.context("Event bridge task failed")?;
    printer.await.context("Event printer task failed")?;

    if results.is_empty() {
        bail!("No records processed");
    }
    Ok(results)
}

fn read_record(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read record: {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
