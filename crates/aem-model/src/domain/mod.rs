mod key;
pub use key::ReconcileKey;

mod deployment;
pub use deployment::{Deployment, DeploymentSpec, InstanceSpec, ObjectMeta, OwnerRef};

mod status;
pub use status::{ConditionType, DeploymentCondition, DeploymentPhase, DeploymentStatus};

mod runmode;
pub use runmode::{Runmode, RunmodeProfile, VolumeLayout};

mod instance;
pub use instance::{Instance, InstancePhase};

mod naming;
pub use naming::*;

mod agent;
pub use agent::{AGENT_GRID_PROPERTY, Agent, AgentKind, AgentPolicy, AgentRecord};

mod secret;
pub use secret::{SecretData, SecretRecord, instance_secret_path, secret_base_path};

mod constants;
pub use constants::*;

/// Label map attached to instances and used as a list selector.
pub type Labels = std::collections::BTreeMap<String, String>;
