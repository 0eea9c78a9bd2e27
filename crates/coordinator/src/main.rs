use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use concord_coordinator::background::{MetricsSampler, PresenceSweeper};
use concord_coordinator::{Coordinator, CoordinatorConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "concord=info".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    // --- Configuration ---
    let config = CoordinatorConfig::from_env().context("Invalid configuration")?;
    tracing::info!(
        namespace = %config.namespace,
        broker = config.broker_url.is_some(),
        op_timeout_ms = config.op_timeout.as_millis() as u64,
        "Loaded coordinator configuration"
    );

    // --- Store and broker ---
    let coordinator = Coordinator::connect(&config)
        .await
        .context("Failed to connect to the store or broker")?;
    coordinator
        .health_check()
        .await
        .context("Store health check failed")?;
    tracing::info!("Store health check passed");

    // --- Background services ---
    let sampler = config
        .metrics_sample_interval
        .map(|interval| MetricsSampler::start(coordinator.clone(), interval));
    let sweeper = config
        .presence_sweep_interval
        .map(|interval| PresenceSweeper::start(coordinator.presence().clone(), interval));

    tracing::info!("Coordinator ready");
    shutdown_signal().await;

    // --- Shutdown ---
    tracing::info!("Shutdown signal received, stopping background services");
    if let Some(sweeper) = sweeper {
        sweeper.stop().await;
    }
    if let Some(sampler) = sampler {
        sampler.stop().await;
    }
    tracing::info!(metrics = ?coordinator.metrics(), "Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
