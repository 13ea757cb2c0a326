//! Reweave - Self-healing browser workflow replay engine
//!
//! Main entry point for the Reweave CLI.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use clap::Parser;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use reweave_browser::{BrowserSession, SessionConfig};
use reweave_engine::{DriverFactory, ReplayConfig, RunManager};
use reweave_llm_openai::OpenAiModel;
use reweave_protocols::{DriverError, PageDriver, RunSecrets, RunState, WorkflowStore};
use reweave_store::JsonWorkflowStore;

mod cli;

use cli::{Cli, Commands};

/// Get the .reweave directory path.
fn reweave_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".reweave"))
        .unwrap_or_else(|| PathBuf::from(".reweave"))
}

/// Initialize tracing with console and file output.
///
/// Log files are written to ~/.reweave/debug/ with daily rotation.
fn init_tracing() -> anyhow::Result<()> {
    let log_dir = reweave_dir().join("debug");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("reweave")
        .filename_suffix("log")
        .max_log_files(30)
        .build(&log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer guard alive for the program duration.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_ansi(true))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(())
}

/// Launches one isolated Chrome session per run.
struct ChromeDriverFactory {
    config: SessionConfig,
}

#[async_trait]
impl DriverFactory for ChromeDriverFactory {
    async fn create(&self) -> Result<Box<dyn PageDriver>, DriverError> {
        let session = BrowserSession::launch(self.config.clone()).await?;
        Ok(Box::new(session))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let cli = Cli::parse();

    let data_dir = cli
        .data_dir
        .unwrap_or_else(|| reweave_dir().join("workflows"));
    let store = JsonWorkflowStore::new(&data_dir).await?;

    match cli.command {
        Commands::Run {
            workflow_id,
            password,
            headed,
            chrome,
            max_retries,
            json,
        } => {
            run_workflow(
                store,
                &workflow_id,
                password,
                headed,
                chrome,
                max_retries,
                json,
            )
            .await
        }
        Commands::List { format } => list_workflows(store, &format).await,
        Commands::Show { workflow_id } => show_workflow(store, &workflow_id).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_workflow(
    store: JsonWorkflowStore,
    workflow_id: &str,
    password: Option<String>,
    headed: bool,
    chrome: Option<PathBuf>,
    max_retries: u32,
    json: bool,
) -> anyhow::Result<()> {
    info!("Starting Reweave v{}", env!("CARGO_PKG_VERSION"));

    let api_key = std::env::var("OPENAI_API_KEY")
        .context("OPENAI_API_KEY is required for step repair and extraction")?;
    let model = OpenAiModel::new(api_key);

    let drivers = ChromeDriverFactory {
        config: SessionConfig {
            chrome_path: chrome,
            headless: !headed,
            ..SessionConfig::default()
        },
    };

    let config = ReplayConfig {
        max_retries,
        ..ReplayConfig::default()
    };

    let manager = RunManager::new(
        Arc::new(store),
        Arc::new(model),
        Arc::new(drivers),
        config,
    );

    let secrets = match password {
        Some(password) => RunSecrets::with_password(password),
        None => RunSecrets::new(),
    };

    let run_id = manager.start_run(workflow_id, secrets).await?;
    info!(run = %run_id, workflow = workflow_id, "Run started");

    let report = manager
        .wait_run(&run_id)
        .await
        .context("run ended without a report")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Run {}: {:?}", run_id, report.state);
        if report.healed_step_count > 0 {
            println!("Healed steps: {}", report.healed_step_count);
        }
        for extraction in &report.extractions {
            println!(
                "Extracted (step {}, \"{}\"):\n{}",
                extraction.step_index,
                extraction.goal,
                serde_json::to_string_pretty(&extraction.data)?
            );
        }
        if let Some(warning) = &report.persistence_warning {
            println!("Warning: {}", warning);
        }
        if let Some(error) = &report.error {
            println!("Error: {}", error);
        }
    }

    if report.state != RunState::Succeeded && report.state != RunState::Cancelled {
        bail!("run failed");
    }
    Ok(())
}

async fn list_workflows(store: JsonWorkflowStore, format: &str) -> anyhow::Result<()> {
    let summaries = store.list_workflows().await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summaries)?),
        _ => {
            if summaries.is_empty() {
                println!("No workflows stored.");
                return Ok(());
            }
            println!("{:<38} {:<30} {:>5}  {}", "ID", "NAME", "STEPS", "PASSWORD");
            for s in &summaries {
                println!(
                    "{:<38} {:<30} {:>5}  {}",
                    s.id,
                    s.name,
                    s.step_count,
                    if s.requires_password { "yes" } else { "no" }
                );
            }
        }
    }
    Ok(())
}

async fn show_workflow(store: JsonWorkflowStore, workflow_id: &str) -> anyhow::Result<()> {
    let workflow = store.load_workflow(workflow_id).await?;
    println!("{}", serde_json::to_string_pretty(&workflow)?);
    Ok(())
}
