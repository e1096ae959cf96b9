//! Reconciliation engine of the AEM deployment operator.
//!
//! Notifications enter through [`EventDispatch`], become keys on the
//! [`WorkQueue`] and are drained one at a time by the [`Controller`], which
//! hands each key to the [`Reconciler`]. Everything outside the process is
//! reached through the traits in [`collab`].

pub mod error;
pub use error::CoreError;

pub mod retry;
pub use retry::{RetryError, retry};

pub mod collab;
pub use collab::{
    BoxError, ClaimPhase, ConfigError, Credentials, DeploymentCache, InstanceConfigClient,
    InstanceEndpoint, ResourceStore, SecretError, SecretStore, StoreError,
};

pub mod queue;
pub use queue::{ItemBackoff, WorkQueue};

pub mod dispatch;
pub use dispatch::{EventDispatch, WatchEvent, WatchObject};

pub mod secrets;
pub use secrets::{PasswordGenerator, RandomPasswordGenerator, SecretLifecycle};

pub mod scaling;
pub use scaling::{ClaimWait, ScalingPlan, ScalingPolicy};

pub mod agents;
pub use agents::AgentConfigurator;

pub mod phase;
pub use phase::{Milestone, PhaseStateMachine};

pub mod metrics;
pub use metrics::{NoopMetrics, ReconcileMetrics, SyncOutcome};

pub mod config;
pub use config::ControllerConfig;

pub mod reconciler;
pub use reconciler::Reconciler;

pub mod controller;
pub use controller::{Collaborators, Controller};

pub mod memory;

/// Current wall-clock time as RFC 3339, used for condition timestamps.
pub(crate) fn now_rfc3339() -> String {
    use time::{OffsetDateTime, format_description::well_known::Rfc3339};

    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}
