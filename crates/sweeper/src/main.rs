//! VM sweep agent
//!
//! Headless background process that periodically inspects VMs across all
//! visible subscriptions, records their power state and autoshutdown
//! eligibility to a CSV status log, and applies the autoshutdown power
//! rules to tagged machines.

use anyhow::{ensure, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use sweeper_lib::{
    ArmClient, CloudInventory, CsvSink, EvaluatorSettings, LogAnalyticsClient, StartTimeSource,
    SweepConfig, SweepLoop, VmEvaluator,
};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting vm-sweeper");

    let config = config::SweeperConfig::load()?;
    ensure!(
        !config.access_token.trim().is_empty(),
        "access_token must be set to a management-plane bearer token \
         (SWEEPER_ACCESS_TOKEN or the sweeper config file)"
    );
    info!(
        csv = %config.csv_output_path,
        poll_interval_secs = config.poll_interval_secs,
        uptime_check = config.enable_uptime_check,
        "Sweeper configured"
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    let inventory: Arc<dyn CloudInventory> = Arc::new(ArmClient::new(
        &config.management_endpoint,
        &config.access_token,
        http.clone(),
    ));
    let telemetry_token = config
        .log_analytics_token
        .clone()
        .unwrap_or_else(|| config.access_token.clone());
    let start_times: Arc<dyn StartTimeSource> = Arc::new(LogAnalyticsClient::new(
        &config.log_analytics_endpoint,
        telemetry_token,
        http,
    ));
    let sink = Arc::new(CsvSink::new(&config.csv_output_path));

    let evaluator = Arc::new(VmEvaluator::new(
        Arc::clone(&inventory),
        start_times,
        sink,
        EvaluatorSettings {
            enable_uptime_check: config.enable_uptime_check,
            workspace_id: config.workspace_id.clone(),
        },
    ));
    let sweep = SweepLoop::new(
        inventory,
        evaluator,
        SweepConfig {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
        },
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let sweep_handle = tokio::spawn(sweep.run(shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("SIGINT received, shutting down");
    let _ = shutdown_tx.send(());
    sweep_handle.await.context("Sweep loop task failed")?;

    Ok(())
}
