use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use spockd::config::{Config, ConfigError, LoggingConfig};
use spockd::engine::{host_from_config, Engine};
use spockd::format_diagnostics;
use tokio::sync::{oneshot, RwLock};
use tracing::{error, info, warn};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Keep Home Assistant switches in line with the Spock energy status
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Configuration files, merged in order
    #[arg(default_value = "spockd.toml")]
    config: Vec<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

/// Load configuration, printing every diagnostic to stderr
fn load_config(paths: &[PathBuf]) -> anyhow::Result<Config> {
    match Config::from_files(paths) {
        Ok((config, diagnostics)) => {
            if !diagnostics.is_empty() {
                eprint!("{}", format_diagnostics(&diagnostics));
            }
            Ok(config)
        }
        Err(ConfigError::Invalid(diagnostics)) => {
            eprint!("{}", format_diagnostics(&diagnostics));
            let errors = diagnostics.iter().filter(|d| d.is_error()).count();
            anyhow::bail!("configuration has {} error(s)", errors)
        }
        Err(e) => Err(e).context("failed to load configuration"),
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter = Targets::new()
        .with_default(LevelFilter::from(config.level))
        .with_targets(
            config
                .overrides
                .iter()
                .map(|(target, level)| (target.clone(), LevelFilter::from(*level))),
        );

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();
}

async fn reload(paths: &[PathBuf], engine: &RwLock<Engine>) {
    let config = match load_config(paths) {
        Ok(config) => config,
        Err(e) => {
            error!("Reload failed, keeping current configuration: {:#}", e);
            return;
        }
    };

    let errors = engine.write().await.apply_config(&config).await;
    if errors.is_empty() {
        info!("Configuration reloaded");
    } else {
        warn!("Configuration reloaded with {} failed instance(s)", errors.len());
    }
}

/// Wait for Ctrl-C, reloading configuration on every SIGHUP meanwhile
#[cfg(unix)]
async fn run_until_shutdown(paths: &[PathBuf], engine: &RwLock<Engine>) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for Ctrl-C")?;
                info!("Received Ctrl-C, shutting down");
                return Ok(());
            }
            _ = hangup.recv() => {
                info!("Received SIGHUP, reloading configuration");
                reload(paths, engine).await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn run_until_shutdown(_paths: &[PathBuf], _engine: &RwLock<Engine>) -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Received Ctrl-C, shutting down");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    if args.check {
        println!(
            "Configuration OK: {} instance(s)",
            config.instances.len()
        );
        return Ok(());
    }

    init_logging(&config.logging);
    info!("spockd {} starting", env!("CARGO_PKG_VERSION"));

    let host = host_from_config(&config)?;
    let mut engine = Engine::new(host);

    let errors = engine.apply_config(&config).await;
    if errors.len() == config.instances.len() {
        anyhow::bail!("no instance could be started");
    }

    let engine = Arc::new(RwLock::new(engine));

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let api_handle = if config.api.enabled {
        let listener = spockd::api::bind(&config.api.listen, config.api.port)
            .await
            .map_err(|e| anyhow::anyhow!(e))
            .context("failed to start HTTP API")?;
        let engine = Arc::clone(&engine);
        Some(tokio::spawn(async move {
            let result = spockd::api::serve(listener, engine, shutdown_rx).await;
            if let Err(e) = &result {
                error!("HTTP API server error: {}", e);
            }
            result
        }))
    } else {
        info!("HTTP API disabled");
        None
    };

    run_until_shutdown(&args.config, &engine).await?;

    shutdown_tx.send(()).ok();
    if let Some(handle) = api_handle {
        match handle.await {
            Ok(_) => {}
            Err(e) => error!("HTTP API task failed: {}", e),
        }
    }

    engine.write().await.shutdown();
    info!("spockd stopped");
    Ok(())
}
