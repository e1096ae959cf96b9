use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse lifecycle status of a deployment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeploymentPhase {
    /// Never reconciled; serialised as an empty string.
    #[default]
    #[serde(rename = "")]
    None,
    Creating,
    Resizing,
    Running,
    Failed,
}

impl DeploymentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentPhase::None => "",
            DeploymentPhase::Creating => "Creating",
            DeploymentPhase::Resizing => "Resizing",
            DeploymentPhase::Running => "Running",
            DeploymentPhase::Failed => "Failed",
        }
    }
}

impl fmt::Display for DeploymentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentPhase::None => f.write_str("None"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    Ready,
    RemovingDeadMember,
    Recovering,
    ScalingUp,
    ScalingDown,
    #[serde(rename = "DataStoreGarbageCollecting")]
    GarbageCollecting,
    Upgrading,
    /// Set alongside [`DeploymentPhase::Failed`].
    ReconcileFailed,
}

/// One observation about the deployment at a point in time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentCondition {
    #[serde(rename = "type")]
    pub kind: ConditionType,
    pub reason: String,
    /// RFC 3339 timestamp of the last change of this condition.
    pub transition_time: String,
}

/// Observed state of a deployment, written only by the reconciler.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    #[serde(default)]
    pub phase: DeploymentPhase,
    /// Acknowledges `spec.paused`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub control_paused: bool,
    /// AEM version last observed running.
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub dispatcher_version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<DeploymentCondition>,
}

impl DeploymentStatus {
    pub fn condition(&self, kind: ConditionType) -> Option<&DeploymentCondition> {
        self.conditions.iter().find(|c| c.kind == kind)
    }

    /// Records `kind` with `reason`, keeping one entry per condition type.
    ///
    /// Returns `false` when an identical condition is already present, in
    /// which case the transition time is left untouched.
    pub fn set_condition(&mut self, kind: ConditionType, reason: &str, now: &str) -> bool {
        match self.conditions.iter_mut().find(|c| c.kind == kind) {
            Some(existing) if existing.reason == reason => false,
            Some(existing) => {
                existing.reason = reason.to_string();
                existing.transition_time = now.to_string();
                true
            }
            None => {
                self.conditions.push(DeploymentCondition {
                    kind,
                    reason: reason.to_string(),
                    transition_time: now.to_string(),
                });
                true
            }
        }
    }

    /// Drops the condition of `kind`; returns whether one was present.
    pub fn clear_condition(&mut self, kind: ConditionType) -> bool {
        let before = self.conditions.len();
        self.conditions.retain(|c| c.kind != kind);
        before != self.conditions.len()
    }
}
