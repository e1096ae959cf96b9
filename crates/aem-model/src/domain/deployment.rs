use serde::{Deserialize, Serialize};

use crate::{DEPLOYMENT_KIND, DeploymentStatus, ReconcileKey, Runmode};

/// Identity and bookkeeping shared by every stored object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    /// Opaque version assigned by the store on every write.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
}

/// Back-link from an instance to the deployment it was created for.
///
/// This is a foreign key, not ownership: it is only consulted to route
/// instance notifications and as a cascade-deletion hint for the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerRef {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
}

/// Instance size and replica count for one runmode.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    /// Instance size class: `small`, `medium`, `large`.
    #[serde(rename = "type", default)]
    pub size: String,
    #[serde(default)]
    pub replicas: u32,
}

impl InstanceSpec {
    pub fn new(size: impl Into<String>, replicas: u32) -> Self {
        Self {
            size: size.into(),
            replicas,
        }
    }
}

/// Desired state of an AEM deployment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    /// Authoring instances. Only a single author is supported by AEM; the
    /// operator does not enforce it.
    #[serde(default)]
    pub authors: InstanceSpec,
    #[serde(default)]
    pub publishers: InstanceSpec,
    /// Apache + dispatcher instances, paired with publishers by ordinal.
    #[serde(default)]
    pub dispatchers: InstanceSpec,
    /// AEM version, e.g. `6.3`.
    #[serde(default)]
    pub version: String,
    /// Dispatcher module version, e.g. `4.2.2`.
    #[serde(default)]
    pub dispatcher_version: String,
    /// Suspends convergence while set.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub paused: bool,
}

impl DeploymentSpec {
    /// Desired replicas for `runmode`.
    pub fn replicas(&self, runmode: Runmode) -> u32 {
        match runmode {
            Runmode::Author => self.authors.replicas,
            Runmode::Publish => self.publishers.replicas,
            Runmode::Dispatcher => self.dispatchers.replicas,
        }
    }
}

/// The desired-state resource together with its status.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: DeploymentSpec,
    #[serde(default)]
    pub status: DeploymentStatus,
}

impl Deployment {
    pub fn new(namespace: &str, name: &str, spec: DeploymentSpec) -> Self {
        Self {
            metadata: ObjectMeta {
                name: name.to_string(),
                namespace: namespace.to_string(),
                ..Default::default()
            },
            spec,
            status: DeploymentStatus::default(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    #[inline]
    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn key(&self) -> ReconcileKey {
        ReconcileKey::new(&self.metadata.namespace, &self.metadata.name)
    }

    /// Reference stamped on resources created for this deployment.
    pub fn as_owner_ref(&self) -> OwnerRef {
        OwnerRef {
            kind: DEPLOYMENT_KIND.to_string(),
            name: self.metadata.name.clone(),
            uid: self.metadata.uid.clone(),
        }
    }
}
