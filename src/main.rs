use anyhow::Context;
use api_client::{BrokerSession, build_session};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use configuration::{BrokerSettings, Config, CredentialStore, LateTradePolicy, load_config};
use core_types::SystemClock;
use engine::{ClientEngine, MasterEngine};
use events::EventLog;
use executor::MirrorExecutor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span};
use tracing_appender::non_blocking::WorkerGuard;

/// The main entry point for the copy trader.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Credentials and overrides may live in a local .env file.
    dotenvy::dotenv().ok();

    // Parse command-line arguments
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    // Dropping the guard stops the file writer, so it lives until main returns.
    let _log_guard: Option<WorkerGuard> = configuration::logging::init(&config.logging)?;

    // Execute the appropriate command
    match cli.command {
        Commands::Master(args) => {
            if let Some(policy) = args.late_trades {
                config.admission.late_trade_policy = policy;
            }
            handle_master(config).await
        }
        Commands::Client => handle_client(config).await,
        Commands::InspectLog(args) => handle_inspect_log(&config, args).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Mirrors trades from a master broker account onto client accounts.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file (default: ./copytrader.toml if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the master account and record every new trade in the event log.
    Master(MasterArgs),
    /// Tail the event log and place each fresh trade on the client account.
    Client,
    /// Print the records currently in the event log.
    InspectLog(InspectLogArgs),
}

#[derive(Parser)]
struct MasterArgs {
    /// What to do with trades first seen after the admission window.
    #[arg(long, value_enum)]
    late_trades: Option<LateTradePolicy>,
}

#[derive(Parser)]
struct InspectLogArgs {
    /// Event log to read (defaults to the configured path).
    #[arg(long)]
    path: Option<PathBuf>,
}

// ==============================================================================
// Engine Commands
// ==============================================================================

async fn handle_master(config: Config) -> anyhow::Result<()> {
    let session = open_session(&config, &config.master.broker)?;
    let span = info_span!("master", broker = config.master.broker.kind());
    let engine = MasterEngine::new(&config, session, Arc::new(SystemClock));

    let cancel = shutdown_on_ctrl_c();
    engine.run(cancel).instrument(span).await?;
    Ok(())
}

async fn handle_client(config: Config) -> anyhow::Result<()> {
    let session = open_session(&config, &config.client.broker)?;
    let span = info_span!("client", broker = config.client.broker.kind());
    let executor = Arc::new(MirrorExecutor::new(
        Arc::clone(&session),
        config.client.broker.symbols(),
        config.client.duration_policy.clone(),
    ));
    let engine = ClientEngine::new(&config, session, executor, Arc::new(SystemClock));

    let cancel = shutdown_on_ctrl_c();
    engine.run(cancel).instrument(span).await?;
    Ok(())
}

/// Builds the session for one role. Only live brokers need the credential file.
fn open_session(
    config: &Config,
    broker: &BrokerSettings,
) -> anyhow::Result<Arc<dyn BrokerSession>> {
    let credentials = match broker {
        BrokerSettings::Paper(_) => CredentialStore::from_lines(std::iter::empty::<String>()),
        BrokerSettings::Deriv(_) => CredentialStore::load(&config.credentials.path)?,
    };
    let session = build_session(broker, &credentials)
        .with_context(|| format!("Failed to build {} session", broker.kind()))?;
    Ok(session)
}

/// Returns a token that is cancelled on the first Ctrl-C.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C; shutting down"),
        }
        token.cancel();
    });
    cancel
}

// ==============================================================================
// Log Inspection
// ==============================================================================

async fn handle_inspect_log(config: &Config, args: InspectLogArgs) -> anyhow::Result<()> {
    let path = args.path.unwrap_or_else(|| config.event_log.path.clone());
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        anyhow::bail!("Event log {} does not exist", path.display());
    }

    let batch = EventLog::new(&path).read_all().await?;

    let mut table = Table::new();
    table.set_header(vec!["Detected (UTC)", "ID", "Asset", "Amount", "Direction", "Duration"]);
    for record in &batch.records {
        let detected = Utc
            .timestamp_opt(record.stamp, 0)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| record.stamp.to_string());
        table.add_row(vec![
            Cell::new(detected),
            Cell::new(record.id),
            Cell::new(&record.asset),
            Cell::new(record.amount.normalize()),
            Cell::new(record.direction),
            Cell::new(format!("{}s", record.duration)),
        ]);
    }

    println!("{table}");
    println!(
        "{} record(s), {} malformed line(s) in {}",
        batch.records.len(),
        batch.malformed,
        path.display()
    );
    Ok(())
}
