use serde::{Deserialize, Serialize};

use crate::{
    ANNOTATION_INITIALIZED, LABEL_DEPLOYMENT, LABEL_RUNMODE, Labels, ObjectMeta, OwnerRef,
    Runmode, parse_parent_and_ordinal,
};

/// Lifecycle phase reported for a running compute unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstancePhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

/// One running compute unit of a deployment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub annotations: Labels,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerRef>,
    /// DNS hostname inside the deployment's discovery service.
    #[serde(default)]
    pub hostname: String,
    /// Discovery service name the hostname lives under.
    #[serde(default)]
    pub subdomain: String,
    #[serde(default)]
    pub phase: InstancePhase,
    /// Whether the ready condition is true.
    #[serde(default)]
    pub ready: bool,
    /// Set once deletion has been requested.
    #[serde(default)]
    pub terminating: bool,
    /// Routable address of the unit, once scheduled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Instance {
    #[inline]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    #[inline]
    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    /// Runmode from the `runmode` label; `None` when absent or unknown.
    pub fn runmode(&self) -> Option<Runmode> {
        self.labels.get(LABEL_RUNMODE)?.parse().ok()
    }

    pub fn is_runmode(&self, runmode: Runmode) -> bool {
        self.runmode() == Some(runmode)
    }

    /// Name of the deployment this instance belongs to.
    ///
    /// Prefers the owner reference and falls back to the `deployment` label.
    pub fn deployment(&self) -> Option<&str> {
        if let Some(owner) = &self.owner {
            return Some(owner.name.as_str());
        }
        self.labels.get(LABEL_DEPLOYMENT).map(String::as_str)
    }

    /// Ordinal parsed from the name suffix, `-1` when there is none.
    pub fn ordinal(&self) -> i64 {
        parse_parent_and_ordinal(self.name()).1
    }

    pub fn is_running_and_ready(&self) -> bool {
        self.phase == InstancePhase::Running && self.ready
    }

    pub fn is_healthy(&self) -> bool {
        self.is_running_and_ready() && !self.terminating
    }

    pub fn is_initialized(&self) -> bool {
        self.annotations
            .get(ANNOTATION_INITIALIZED)
            .is_some_and(|v| v == "true")
    }

    pub fn mark_initialized(&mut self) {
        self.annotations
            .insert(ANNOTATION_INITIALIZED.to_string(), "true".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy() -> Instance {
        let mut inst = Instance {
            phase: InstancePhase::Running,
            ready: true,
            ..Default::default()
        };
        inst.metadata.name = "example-aem-author-001".into();
        inst.labels.insert(LABEL_RUNMODE.into(), "author".into());
        inst
    }

    #[test]
    fn healthy_requires_all_three_predicates() {
        assert!(healthy().is_healthy());

        let mut not_running = healthy();
        not_running.phase = InstancePhase::Pending;
        assert!(!not_running.is_healthy());

        let mut not_ready = healthy();
        not_ready.ready = false;
        assert!(!not_ready.is_healthy());

        let mut terminating = healthy();
        terminating.terminating = true;
        assert!(!terminating.is_healthy());
    }

    #[test]
    fn initialized_marker_is_string_true() {
        let mut inst = healthy();
        assert!(!inst.is_initialized());

        inst.annotations
            .insert(ANNOTATION_INITIALIZED.into(), "false".into());
        assert!(!inst.is_initialized());

        inst.mark_initialized();
        assert!(inst.is_initialized());
        assert_eq!(inst.annotations[ANNOTATION_INITIALIZED], "true");
    }

    #[test]
    fn deployment_prefers_owner_ref() {
        let mut inst = healthy();
        inst.labels.insert(LABEL_DEPLOYMENT.into(), "from-label".into());
        assert_eq!(inst.deployment(), Some("from-label"));

        inst.owner = Some(OwnerRef {
            kind: "AEMDeployment".into(),
            name: "from-owner".into(),
            uid: String::new(),
        });
        assert_eq!(inst.deployment(), Some("from-owner"));
    }

    #[test]
    fn runmode_and_ordinal() {
        let inst = healthy();
        assert_eq!(inst.runmode(), Some(Runmode::Author));
        assert_eq!(inst.ordinal(), 1);
    }
}
