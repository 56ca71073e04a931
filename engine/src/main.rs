// Foreman supervisor service
// Main entry point for the foreman binary

use clap::Parser;
use std::sync::Arc;

use foreman_engine::cli::{Cli, Command};
use foreman_engine::config::Config;
use foreman_engine::db::Database;
use foreman_engine::orchestrator::{Orchestrator, SettlementPolicy, Timing};
use foreman_engine::planner::ChatPlanner;
use foreman_engine::runtime::Runtime;
use foreman_engine::scheduler::WakeScheduler;
use foreman_engine::server;
use foreman_engine::telemetry::{init_telemetry, init_telemetry_with_level};
use foreman_engine::worker::HttpWorker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize basic telemetry first (before config is loaded)
    init_telemetry();

    tracing::info!("Foreman v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // Re-initialize telemetry with the CLI or config-driven log level
    // (only takes effect if RUST_LOG env var is not set)
    let level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(level);

    match cli.command {
        Command::Serve { bind } => {
            let bind_addr = bind.unwrap_or_else(|| config.core.bind_addr.clone());
            serve(config, &bind_addr).await
        }

        Command::Check => {
            // Config was validated during load; report the effective values.
            if cli.json {
                let output = serde_json::json!({
                    "status": "ok",
                    "bind_addr": config.core.bind_addr,
                    "db_path": config.db_path(),
                    "planner_base_url": config.planner.base_url,
                    "planner_model": config.planner.model,
                    "worker_base_url": config.worker.base_url,
                    "default_max_iterations": config.orchestrator.default_max_iterations,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("Configuration OK");
                println!("  Bind address:   {}", config.core.bind_addr);
                println!("  Database:       {}", config.db_path().display());
                println!(
                    "  Planner:        {} ({})",
                    config.planner.base_url, config.planner.model
                );
                println!("  Worker:         {}", config.worker.base_url);
                println!(
                    "  Iteration cap:  {}",
                    config.orchestrator.default_max_iterations
                );
            }
            Ok(())
        }
    }
}

/// Wire the runtime together and serve until interrupted
async fn serve(config: Config, bind_addr: &str) -> anyhow::Result<()> {
    let database = Database::new(&config.db_path()).await?;

    let planner = Arc::new(ChatPlanner::new(config.planner.clone()));
    let worker = Arc::new(HttpWorker::new(config.worker.clone()));

    let orchestrator = Orchestrator::new(
        planner,
        worker.clone(),
        SettlementPolicy::from_config(&config.orchestrator),
        Timing::from_config(&config.orchestrator),
    );

    let (scheduler, wake_rx) = WakeScheduler::new();
    let runtime = Runtime::new(
        database.conversations(),
        orchestrator,
        worker,
        scheduler,
        config.orchestrator.default_max_iterations,
    );

    runtime.spawn_driver(wake_rx);

    // Conversations that were mid-flight when the process last stopped
    // resume from their persisted state.
    runtime.recover().await?;

    let (_addr, server_handle) = server::start(runtime, bind_addr).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    server_handle.abort();
    database.close().await?;

    Ok(())
}
