//! In-process collaborators.
//!
//! They keep state behind std mutexes, record the operations they receive
//! and accept injected failures. Tests use them for assertions; the daemon
//! uses them to simulate a cluster.

mod cluster;
pub use cluster::{ClusterOp, MemoryCluster};

mod secrets;
pub use secrets::MemorySecretStore;

mod config;
pub use config::{ConfigCall, MemoryConfigClient};

use std::sync::{Mutex, MutexGuard};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, thiserror::Error)]
#[error("injected failure: {0}")]
struct Injected(String);
