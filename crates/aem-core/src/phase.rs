//! Deployment phase transitions.
//!
//! ```text
//! None ──Provisioned──▶ Creating ──Resized──▶ Resizing ◀──Resized── Running
//!                          │                     │                    ▲
//!                          └───────Healthy───────┴───────Healthy──────┘
//! Creating|Resizing|Running ──Unrecoverable──▶ Failed ──Healthy──▶ Running
//! ```

use aem_model::{DeploymentPhase, DeploymentStatus};

/// What the reconciler observed during one pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Milestone {
    /// Discovery service and base configuration exist.
    Provisioned,
    /// At least one runmode group was resized.
    Resized,
    /// Every instance is running and ready.
    Healthy,
    /// Reconciliation keeps failing.
    Unrecoverable,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PhaseStateMachine;

impl PhaseStateMachine {
    /// Phase after `milestone`, or `None` when the phase stays as is.
    pub fn next(current: DeploymentPhase, milestone: Milestone) -> Option<DeploymentPhase> {
        use DeploymentPhase as P;

        let next = match (milestone, current) {
            (Milestone::Provisioned, P::None) => P::Creating,
            (Milestone::Provisioned, _) => return None,
            (Milestone::Resized, P::Resizing) => return None,
            (Milestone::Resized, _) => P::Resizing,
            (Milestone::Healthy, P::Running) => return None,
            (Milestone::Healthy, _) => P::Running,
            // Never provisioned: stay put so the next pass still provisions.
            (Milestone::Unrecoverable, P::None | P::Failed) => return None,
            (Milestone::Unrecoverable, _) => P::Failed,
        };
        Some(next)
    }

    /// Applies `milestone` to `status`; returns whether the phase changed.
    pub fn advance(status: &mut DeploymentStatus, milestone: Milestone) -> bool {
        match Self::next(status.phase, milestone) {
            Some(phase) => {
                status.phase = phase;
                true
            }
            None => false,
        }
    }
}
