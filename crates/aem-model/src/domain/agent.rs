use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Property marking agents created by this operator.
pub const AGENT_GRID_PROPERTY: &str = "grid";

/// Agent tree an agent lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// `agents.author`: replication from author to publishers.
    Author,
    /// `agents.publish`: cache invalidation from publisher to dispatcher.
    Publish,
}

impl AgentKind {
    pub fn tree(&self) -> &'static str {
        match self {
            AgentKind::Author => "agents.author",
            AgentKind::Publish => "agents.publish",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentPolicy {
    Create,
    Delete,
}

/// A replication agent operation sent to an instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    pub kind: AgentKind,
    pub policy: AgentPolicy,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
}

impl Agent {
    pub fn create(kind: AgentKind, name: impl Into<String>, properties: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            kind,
            policy: AgentPolicy::Create,
            properties,
        }
    }

    pub fn delete(kind: AgentKind, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            policy: AgentPolicy::Delete,
            properties: Map::new(),
        }
    }
}

/// A replication agent as listed by an instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub name: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl AgentRecord {
    /// Whether this agent was created by the operator.
    pub fn is_managed(&self) -> bool {
        matches!(self.properties.get(AGENT_GRID_PROPERTY), Some(Value::Bool(true)))
    }
}
