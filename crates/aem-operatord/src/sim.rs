//! In-process stand-in for the cluster the operator manages.
//!
//! Claims stay pending and instances stay unready until the simulated
//! kubelet ticks, so the controller sees the same transitions it would see
//! against a real cluster.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use aem_core::memory::MemoryCluster;
use aem_model::Deployment;

pub async fn load_deployments(path: &Path) -> anyhow::Result<Vec<Deployment>> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let deployments: Vec<Deployment> = serde_json::from_slice(&raw)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(deployments)
}

/// Adds `deployments` to the cluster, skipping those outside `namespace`.
pub fn seed(cluster: &MemoryCluster, deployments: Vec<Deployment>, namespace: Option<&str>) -> usize {
    let mut seeded = 0;
    for dep in deployments {
        if dep.name().is_empty() {
            warn!("skipping deployment without a name");
            continue;
        }
        if let Some(ns) = namespace
            && dep.namespace() != ns
        {
            debug!(key = %dep.key(), "outside watched namespace, skipped");
            continue;
        }
        info!(key = %dep.key(), "deployment loaded");
        cluster.upsert_deployment(dep);
        seeded += 1;
    }
    seeded
}

/// Binds pending claims and starts pending instances every `interval`.
pub async fn kubelet(cluster: Arc<MemoryCluster>, interval: Duration, stop: CancellationToken) {
    let mut tick = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tick.tick() => {
                let bound = cluster.bind_claims();
                let started = cluster.mark_all_healthy();
                if bound + started > 0 {
                    debug!(bound, started, "kubelet tick");
                }
            }
        }
    }
}
