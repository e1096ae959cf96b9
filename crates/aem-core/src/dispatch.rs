//! Turns change notifications into reconciliation keys.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use aem_model::{Deployment, Instance, ReconcileKey, secret_base_path};

use crate::collab::SecretStore;
use crate::queue::WorkQueue;

/// Object carried by a notification.
#[derive(Clone, Debug, PartialEq)]
pub enum WatchObject {
    Deployment(Deployment),
    Instance(Instance),
    /// Final state unknown; only the `namespace/name` key survived.
    Tombstone(String),
    /// Any other kind; dropped.
    Unknown(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum WatchEvent {
    Added(WatchObject),
    Updated(WatchObject, WatchObject),
    Deleted(WatchObject),
}

/// Routes notifications to the [`WorkQueue`].
///
/// Deployment deletion also clears every secret stored under the
/// deployment's path. That cleanup is best-effort: failures are logged and
/// the key is enqueued regardless.
#[derive(Clone)]
pub struct EventDispatch {
    queue: WorkQueue,
    secrets: Arc<dyn SecretStore>,
}

impl EventDispatch {
    pub fn new(queue: WorkQueue, secrets: Arc<dyn SecretStore>) -> Self {
        Self { queue, secrets }
    }

    pub fn on_add(&self, obj: &WatchObject) {
        self.enqueue(obj);
    }

    /// Enqueues the new object's key, also for periodic resyncs where
    /// nothing changed.
    pub fn on_update(&self, _old: &WatchObject, new: &WatchObject) {
        self.enqueue(new);
    }

    pub async fn on_delete(&self, obj: &WatchObject) {
        if let WatchObject::Deployment(d) = obj {
            let prefix = secret_base_path(d.namespace(), d.name());
            match self.secrets.clean_up(&prefix).await {
                Ok(()) => debug!(deployment = %d.key(), %prefix, "secrets cleaned up"),
                Err(e) => warn!(deployment = %d.key(), %prefix, error = %e, "secret cleanup failed"),
            }
        }
        self.enqueue(obj);
    }

    pub async fn handle(&self, event: WatchEvent) {
        match event {
            WatchEvent::Added(obj) => self.on_add(&obj),
            WatchEvent::Updated(old, new) => self.on_update(&old, &new),
            WatchEvent::Deleted(obj) => self.on_delete(&obj).await,
        }
    }

    /// Event pump: forwards notifications until `stop` fires or the source closes.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<WatchEvent>, stop: CancellationToken) {
        info!("event pump started");
        loop {
            let event = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                ev = events.recv() => ev,
            };
            match event {
                Some(ev) => self.handle(ev).await,
                None => {
                    info!("event source closed");
                    break;
                }
            }
        }
        info!("event pump stopped");
    }

    fn enqueue(&self, obj: &WatchObject) {
        if let Some(key) = key_for(obj) {
            trace!(key = %key, "enqueue");
            self.queue.add(key);
        }
    }
}

/// Reconciliation key an object routes to, `None` when it must be dropped.
pub fn key_for(obj: &WatchObject) -> Option<ReconcileKey> {
    match obj {
        WatchObject::Deployment(d) => {
            if d.name().is_empty() {
                warn!("dropping deployment without a name");
                return None;
            }
            Some(d.key())
        }
        WatchObject::Instance(inst) => match inst.deployment() {
            Some(owner) if !owner.is_empty() => Some(ReconcileKey::new(inst.namespace(), owner)),
            _ => {
                debug!(instance = inst.name(), "instance without owning deployment, dropped");
                None
            }
        },
        WatchObject::Tombstone(raw) => match ReconcileKey::parse(raw) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "dropping malformed tombstone");
                None
            }
        },
        WatchObject::Unknown(kind) => {
            warn!(%kind, "dropping notification for unexpected object");
            None
        }
    }
}
