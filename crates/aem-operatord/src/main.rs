mod config;
mod http;
mod sim;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use aem_core::memory::{MemoryCluster, MemoryConfigClient};
use aem_core::{Collaborators, Controller, ControllerConfig, ReconcileMetrics};
use aem_observe::{LoggerConfig, logger_init};
use aem_prometheus::PrometheusMetrics;
use aem_vault::VaultSecretStore;

use crate::config::OperatorConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Logger
    let log_cfg = LoggerConfig::from_env()?;
    logger_init(&log_cfg)?;
    info!(format = %log_cfg.format, level = %log_cfg.level, "logger initialized");

    // 2) Configuration
    let cfg = OperatorConfig::from_env().context("loading operator configuration")?;
    info!(
        vault = %cfg.vault.addr,
        domain = %cfg.external_domain,
        namespace = cfg.namespace.as_deref().unwrap_or("*"),
        "configuration loaded"
    );

    // 3) Collaborators
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let cluster = Arc::new(
        MemoryCluster::new()
            .with_events(events_tx)
            .with_external_domain(&cfg.external_domain),
    );
    cluster.set_auto_bind(false);
    cluster.set_auto_ready(false);
    let secrets = Arc::new(VaultSecretStore::new(&cfg.vault)?);
    let metrics = Arc::new(PrometheusMetrics::new()?);
    let hook: Arc<dyn ReconcileMetrics> = metrics.clone();
    let collab = Collaborators::new(
        cluster.clone(),
        cluster.clone(),
        secrets,
        Arc::new(MemoryConfigClient::new()),
    )
    .with_metrics(hook);

    // 4) Controller
    let controller = Arc::new(Controller::new(ControllerConfig::default(), collab));
    let stop = CancellationToken::new();

    let pump = {
        let dispatch = controller.dispatcher();
        let stop = stop.clone();
        tokio::spawn(async move { dispatch.run(events_rx, stop).await })
    };
    let worker = {
        let controller = controller.clone();
        let stop = stop.clone();
        tokio::spawn(async move { controller.run(stop).await })
    };
    let kubelet = tokio::spawn(sim::kubelet(
        cluster.clone(),
        cfg.kubelet_interval,
        stop.clone(),
    ));
    let server = tokio::spawn(http::serve(cfg.metrics_addr, metrics, stop.clone()));

    // 5) Desired state
    match &cfg.deployments_file {
        Some(path) => {
            let deployments = sim::load_deployments(path).await?;
            let seeded = sim::seed(&cluster, deployments, cfg.namespace.as_deref());
            info!(seeded, "deployments loaded");
        }
        None => warn!("no deployments file configured, waiting idle"),
    }

    // 6) Run until Ctrl+C
    info!("operator running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutting down...");
    stop.cancel();

    for (name, task) in [("event pump", pump), ("controller", worker), ("kubelet", kubelet)] {
        if let Err(e) = task.await {
            error!(task = name, error = %e, "task panicked");
        }
    }
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "metrics endpoint failed"),
        Err(e) => error!(error = %e, "metrics endpoint panicked"),
    }
    Ok(())
}
