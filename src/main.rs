#![forbid(unsafe_code)]

//! `teleport-autoreviewer`: access request auto-reviewer binary.
//!
//! Bootstraps configuration, compiles the rejection rules, connects to the
//! access plane with the configured identity, and runs the request watcher,
//! the identity refresh loop, and the health endpoint until shutdown. A
//! watcher that loses its subscription stops the process with an error.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use teleport_autoreviewer::config::GlobalConfig;
use teleport_autoreviewer::health::{server as health_server, HealthState};
use teleport_autoreviewer::identity::manager::{spawn_refresh_task, CredentialManager};
use teleport_autoreviewer::plane::http::HttpConnector;
use teleport_autoreviewer::policy::compiler::RuleCompiler;
use teleport_autoreviewer::policy::evaluator::PolicyEvaluator;
use teleport_autoreviewer::reviewer::watcher::{spawn_watcher, RequestWatcher};
use teleport_autoreviewer::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "teleport-autoreviewer", about = "Teleport access request auto-reviewer", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("starting teleport autoreviewer");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
        .inspect_err(|err| error!(%err, "teleport autoreviewer failed"))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = GlobalConfig::load_from_path(&args.config)?;
    info!(
        rules = config.rejection.rules.len(),
        "loaded configuration"
    );

    // ── Compile rules (fatal on any invalid pattern) ────
    let rules = RuleCompiler::compile(&config.rejection.rules)?;
    let evaluator = Arc::new(PolicyEvaluator::new(rules));

    // ── Connect with the configured identity ────────────
    let health = Arc::new(HealthState::new());
    let connector = Arc::new(HttpConnector::new(&config.teleport.addr)?);
    let manager = Arc::new(
        CredentialManager::start(
            config.teleport.identity.clone(),
            connector,
            Arc::clone(&health),
        )
        .await?,
    );

    // ── Start background tasks ──────────────────────────
    let ct = CancellationToken::new();

    let health_ct = ct.clone();
    let health_state = Arc::clone(&health);
    let health_bind = config.health_bind();
    let health_path = config.server.health_path.clone();
    let health_handle = tokio::spawn(async move {
        if let Err(err) =
            health_server::serve_health(health_state, health_bind, &health_path, health_ct).await
        {
            error!(%err, "health server failed");
        }
    });

    let refresh_handle =
        spawn_refresh_task(Arc::clone(&manager), config.refresh_interval(), ct.clone());

    let watcher = Arc::new(RequestWatcher::new(
        evaluator,
        Arc::clone(&manager),
        Arc::clone(&health),
        config.rejection.default_message.clone(),
        config.teleport.reviewer.clone(),
    ));
    let mut watcher_handle = spawn_watcher(watcher, ct.clone());

    info!(
        port = config.server.health_port,
        path = %config.server.health_path,
        "teleport autoreviewer started"
    );

    // ── Wait for shutdown signal or a lost watch ────────
    let watcher_exit = tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received");
            None
        }
        joined = &mut watcher_handle => Some(joined),
    };
    ct.cancel();

    let watcher_running = watcher_exit.is_none();
    let outcome = match watcher_exit {
        None => Ok(()),
        Some(Ok(result)) => result,
        Some(Err(err)) => Err(AppError::Connection(format!(
            "request watcher task failed: {err}"
        ))),
    };

    // ── Wait for background tasks, bounded ──────────────
    wait_for_tasks(
        vec![health_handle, refresh_handle],
        watcher_running.then_some(watcher_handle),
        config.shutdown_timeout(),
    )
    .await;

    manager.current().plane().close();
    if outcome.is_ok() {
        info!("teleport autoreviewer shut down");
    }
    outcome
}

async fn wait_for_tasks(
    handles: Vec<JoinHandle<()>>,
    watcher: Option<JoinHandle<Result<()>>>,
    deadline: Duration,
) {
    let all = async {
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(%err, "background task ended abnormally");
            }
        }
        // The watcher logs its own error.
        if let Some(handle) = watcher {
            if let Err(err) = handle.await {
                warn!(%err, "request watcher ended abnormally");
            }
        }
    };

    if tokio::time::timeout(deadline, all).await.is_ok() {
        info!("all services stopped gracefully");
    } else {
        warn!(
            deadline_secs = deadline.as_secs(),
            "shutdown timeout reached, forcing exit"
        );
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
