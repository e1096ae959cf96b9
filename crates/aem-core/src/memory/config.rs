use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use aem_model::{ADMIN_USER, Agent, AgentKind, AgentPolicy, AgentRecord, DEFAULT_ADMIN_PASSWORD};

use super::{Injected, lock};
use crate::collab::{ConfigError, Credentials, InstanceConfigClient, InstanceEndpoint};

/// A call received by [`MemoryConfigClient`].
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigCall {
    ListAgents { address: String, kind: AgentKind },
    ApplyAgents { address: String, agents: Vec<Agent> },
    ChangePassword { address: String, accepted: bool },
}

#[derive(Debug, Default)]
struct Host {
    password: Option<String>,
    agents: BTreeMap<(AgentKind, String), AgentRecord>,
}

#[derive(Debug, Default)]
struct State {
    hosts: BTreeMap<String, Host>,
    failing: HashSet<String>,
    calls: Vec<ConfigCall>,
}

/// Simulated instance configuration API keyed by address.
///
/// Unknown hosts start with the factory admin password.
#[derive(Debug, Default)]
pub struct MemoryConfigClient {
    state: Mutex<State>,
}

impl MemoryConfigClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_password(&self, address: &str, password: &str) {
        let mut st = lock(&self.state);
        st.hosts.entry(address.to_string()).or_default().password = Some(password.to_string());
    }

    /// Admin password currently accepted by `address`.
    pub fn password(&self, address: &str) -> String {
        lock(&self.state)
            .hosts
            .get(address)
            .and_then(|h| h.password.clone())
            .unwrap_or_else(|| DEFAULT_ADMIN_PASSWORD.to_string())
    }

    pub fn insert_agent(&self, address: &str, kind: AgentKind, record: AgentRecord) {
        let mut st = lock(&self.state);
        let host = st.hosts.entry(address.to_string()).or_default();
        host.agents.insert((kind, record.name.clone()), record);
    }

    pub fn agents(&self, address: &str, kind: AgentKind) -> Vec<AgentRecord> {
        lock(&self.state)
            .hosts
            .get(address)
            .map(|h| {
                h.agents
                    .iter()
                    .filter(|((k, _), _)| *k == kind)
                    .map(|(_, r)| r.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Makes every call to `address` fail at the transport level.
    pub fn fail_address(&self, address: &str) {
        lock(&self.state).failing.insert(address.to_string());
    }

    pub fn heal_address(&self, address: &str) {
        lock(&self.state).failing.remove(address);
    }

    pub fn calls(&self) -> Vec<ConfigCall> {
        lock(&self.state).calls.clone()
    }

    /// Number of `apply_agents` calls received.
    pub fn apply_count(&self) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|c| matches!(c, ConfigCall::ApplyAgents { .. }))
            .count()
    }

    /// Drops every host whose address is not in `live`.
    pub fn retain_hosts(&self, live: &HashSet<String>) {
        lock(&self.state).hosts.retain(|addr, _| live.contains(addr));
    }
}

impl State {
    fn authorize(&self, address: &str, user: &str, password: &str) -> Result<(), ConfigError> {
        if self.failing.contains(address) {
            return Err(ConfigError::transport(Injected(format!("{address} unreachable"))));
        }
        let current = self
            .hosts
            .get(address)
            .and_then(|h| h.password.as_deref())
            .unwrap_or(DEFAULT_ADMIN_PASSWORD);
        if user != ADMIN_USER || password != current {
            return Err(ConfigError::Unauthorized {
                user: user.to_string(),
                address: address.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl InstanceConfigClient for MemoryConfigClient {
    async fn list_agents(
        &self,
        endpoint: &InstanceEndpoint,
        credentials: &Credentials,
        kind: AgentKind,
    ) -> Result<Vec<AgentRecord>, ConfigError> {
        {
            let mut st = lock(&self.state);
            st.calls.push(ConfigCall::ListAgents {
                address: endpoint.address.clone(),
                kind,
            });
            st.authorize(&endpoint.address, &credentials.user, &credentials.password)?;
        }
        Ok(self.agents(&endpoint.address, kind))
    }

    async fn apply_agents(
        &self,
        endpoint: &InstanceEndpoint,
        credentials: &Credentials,
        agents: &[Agent],
    ) -> Result<(), ConfigError> {
        let mut st = lock(&self.state);
        st.calls.push(ConfigCall::ApplyAgents {
            address: endpoint.address.clone(),
            agents: agents.to_vec(),
        });
        st.authorize(&endpoint.address, &credentials.user, &credentials.password)?;

        let host = st.hosts.entry(endpoint.address.clone()).or_default();
        for agent in agents {
            let id = (agent.kind, agent.name.clone());
            match agent.policy {
                AgentPolicy::Create => {
                    host.agents.insert(
                        id,
                        AgentRecord {
                            name: agent.name.clone(),
                            properties: agent.properties.clone(),
                        },
                    );
                }
                AgentPolicy::Delete => {
                    host.agents.remove(&id);
                }
            }
        }
        Ok(())
    }

    async fn change_password(
        &self,
        endpoint: &InstanceEndpoint,
        user: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), ConfigError> {
        let mut st = lock(&self.state);
        let res = st.authorize(&endpoint.address, user, old_password);
        st.calls.push(ConfigCall::ChangePassword {
            address: endpoint.address.clone(),
            accepted: res.is_ok(),
        });
        res?;
        st.hosts.entry(endpoint.address.clone()).or_default().password = Some(new_password.to_string());
        Ok(())
    }
}
