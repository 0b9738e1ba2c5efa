//! crmetrics controller binary.
//!
//! - in-memory cluster seeded from `resources` in the config
//! - controller workers reconciling finalizers, metric series, and owned workloads
//! - `/metrics`, `/healthz`, `/readyz` on `metrics.listen`

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};

use crmetrics_controller::cluster::{ClusterClient, MemoryCluster};
use crmetrics_controller::controller::Controller;
use crmetrics_controller::{app_state, config, router};
use crmetrics_core::error::{CrMetricsError, Result};

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::var("CRMETRICS_CONFIG").unwrap_or_else(|_| "crmetrics.yaml".to_string());
    let cfg = config::load_from_file(&path)?;
    let listen = cfg.metrics.listen_addr()?;

    let cluster = Arc::new(MemoryCluster::new());
    for seed in &cfg.resources {
        cluster.apply(&seed.identity(), seed.size);
    }

    let state = app_state::AppState::new(cfg)?;
    let client: Arc<dyn ClusterClient> = cluster.clone();
    let controller = Controller::new(
        client,
        state.metrics(),
        state.registry().predicate(),
        state.cfg().controller.clone(),
    );

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| CrMetricsError::TransientIo(format!("bind {listen}: {e}")))?;
    tracing::info!(%listen, "crmetrics-controller starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let events = cluster.subscribe();
    state.registry().mark_ready();
    let running = tokio::spawn(controller.run(events, shutdown_rx));

    let app = router::build_router(state);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await
        .map_err(|e| CrMetricsError::TransientIo(format!("server failed: {e}")));

    let _ = shutdown_tx.send(true);
    match running.await {
        Ok(result) => result?,
        Err(e) => tracing::error!(error = %e, "controller task failed"),
    }
    served
}
