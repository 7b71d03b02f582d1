//! Replay Zero CLI

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use replay_zero::config::Config;
use replay_zero::handler;
use replay_zero::network::{HttpClient, ProxyServer};
use replay_zero::pipeline::CapturePipeline;
use replay_zero::telemetry::{self, UsageEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Replay Zero v{}", env!("CARGO_PKG_VERSION"));
        eprintln!();
        eprintln!("Usage: replay-zero <config.toml>");
        eprintln!("       replay-zero --version");
        process::exit(1);
    }

    if matches!(args[1].as_str(), "--version" | "-V") {
        println!("replay-zero {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config_path = PathBuf::from(&args[1]);
    let config = Config::from_file(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    init_tracing(config.debug);

    let client = Arc::new(HttpClient::new());
    let notifier = telemetry::notifier_for(config.telemetry.endpoint.as_deref(), Arc::clone(&client))?;
    notifier.notify(UsageEvent::Open);

    let handler = handler::from_config(&config, Arc::clone(&client), notifier)?;
    let (events, pipeline) = CapturePipeline::spawn(handler);

    let server = ProxyServer::bind(&config, client, events)
        .await
        .with_context(|| format!("binding port {}", config.listen_port))?;

    let result = server
        .run(shutdown_signal(tokio::signal::ctrl_c()))
        .await;

    pipeline.shutdown().await;
    info!("Stopped");

    result?;
    Ok(())
}

/// Resolves when `signal` fires; never resolves if it cannot be listened for
async fn shutdown_signal(signal: impl Future<Output = io::Result<()>>) {
    if let Err(e) = signal.await {
        error!("Could not listen for shutdown signal, running until killed: {e}");
        std::future::pending::<()>().await;
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
