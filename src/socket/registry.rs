//! Named agent registry.
//!
//! Maps `(protocol, name)` to a shared [`Agent`]. Named agents are created
//! on first use and reused afterwards; the options of later requests for
//! the same name are ignored. Non-persistent agents remove themselves once
//! they have no active sockets and no waiters.

use crate::base::askererror::AskerError;
use crate::socket::pool::{Agent, AgentOptions, ConnectionManager, Unpooled};
use crate::socket::transport::Protocol;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Names that select the global agent of a protocol.
pub const GLOBAL_AGENT_NAMES: [&str; 2] = ["default", "globalAgent"];

/// Per-request choice of connection manager.
#[derive(Clone, Default)]
pub enum AgentSelector {
    /// The global agent of the request protocol.
    #[default]
    Default,
    /// No pooling: a dedicated connection per attempt.
    Disabled,
    /// A registry agent, created on first use.
    Named(AgentOptions),
    /// Caller supplied manager, used as is.
    Custom(Arc<dyn ConnectionManager>),
}

impl AgentSelector {
    pub fn named(name: impl Into<String>) -> Self {
        AgentSelector::Named(AgentOptions::named(name))
    }
}

impl fmt::Debug for AgentSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentSelector::Default => f.write_str("Default"),
            AgentSelector::Disabled => f.write_str("Disabled"),
            AgentSelector::Named(options) => f.debug_tuple("Named").field(options).finish(),
            AgentSelector::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<AgentOptions> for AgentSelector {
    fn from(options: AgentOptions) -> Self {
        AgentSelector::Named(options)
    }
}

/// Outcome of agent resolution.
#[derive(Clone)]
pub enum ResolvedAgent {
    Unpooled,
    Shared(Arc<dyn ConnectionManager>),
}

impl ResolvedAgent {
    pub fn is_pooled(&self) -> bool {
        matches!(self, ResolvedAgent::Shared(_))
    }

    pub fn manager(&self) -> Arc<dyn ConnectionManager> {
        match self {
            ResolvedAgent::Unpooled => Arc::new(Unpooled),
            ResolvedAgent::Shared(manager) => manager.clone(),
        }
    }
}

impl fmt::Debug for ResolvedAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedAgent::Unpooled => f.write_str("Unpooled"),
            ResolvedAgent::Shared(_) => f.write_str("Shared(..)"),
        }
    }
}

type AgentKey = (Protocol, String);

struct RegistryInner {
    named: DashMap<AgentKey, Arc<Agent>>,
    http: Arc<Agent>,
    https: Arc<Agent>,
}

/// Cheap to clone; clones share the same agents.
#[derive(Clone)]
pub struct AgentRegistry {
    inner: Arc<RegistryInner>,
}

static GLOBAL: Lazy<AgentRegistry> = Lazy::new(AgentRegistry::new);

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("named", &self.len())
            .finish()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                named: DashMap::new(),
                http: Arc::new(Agent::default()),
                https: Arc::new(Agent::default()),
            }),
        }
    }

    /// Process-wide registry used by clients that were not given one.
    pub fn global() -> &'static AgentRegistry {
        &GLOBAL
    }

    /// Global agent of `protocol`.
    pub fn default_agent(&self, protocol: Protocol) -> Arc<Agent> {
        match protocol {
            Protocol::Http => self.inner.http.clone(),
            Protocol::Https => self.inner.https.clone(),
        }
    }

    pub fn resolve(&self, protocol: Protocol, selector: &AgentSelector) -> ResolvedAgent {
        match selector {
            AgentSelector::Disabled => ResolvedAgent::Unpooled,
            AgentSelector::Custom(manager) => ResolvedAgent::Shared(manager.clone()),
            AgentSelector::Default => ResolvedAgent::Shared(self.default_agent(protocol)),
            AgentSelector::Named(options) => {
                ResolvedAgent::Shared(self.get_or_create(protocol, options.clone()))
            }
        }
    }

    /// Agent registered under `options.name`, created with `options` if
    /// absent. Global names resolve to the global agent.
    pub fn get_or_create(&self, protocol: Protocol, options: AgentOptions) -> Arc<Agent> {
        let Some(name) = registry_name(&options) else {
            return self.default_agent(protocol);
        };

        let key = (protocol, name.to_string());
        match self.inner.named.entry(key.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let agent = self.build_agent(key, options);
                entry.insert(agent.clone());
                agent
            }
        }
    }

    /// Create a named agent, failing if the name is taken.
    pub fn create_agent(
        &self,
        protocol: Protocol,
        options: AgentOptions,
    ) -> Result<Arc<Agent>, AskerError> {
        // the global agents always exist
        let Some(name) = registry_name(&options).map(str::to_string) else {
            let agent_name = options
                .name
                .unwrap_or_else(|| GLOBAL_AGENT_NAMES[0].to_string());
            return Err(AskerError::AgentNameAlreadyInUse { agent_name });
        };

        let key = (protocol, name.clone());
        match self.inner.named.entry(key.clone()) {
            Entry::Occupied(_) => Err(AskerError::AgentNameAlreadyInUse { agent_name: name }),
            Entry::Vacant(entry) => {
                let agent = self.build_agent(key, options);
                entry.insert(agent.clone());
                Ok(agent)
            }
        }
    }

    pub fn get(&self, protocol: Protocol, name: &str) -> Option<Arc<Agent>> {
        if GLOBAL_AGENT_NAMES.contains(&name) {
            return Some(self.default_agent(protocol));
        }
        self.inner
            .named
            .get(&(protocol, name.to_string()))
            .map(|entry| entry.value().clone())
    }

    pub fn contains(&self, protocol: Protocol, name: &str) -> bool {
        self.inner.named.contains_key(&(protocol, name.to_string()))
    }

    /// Number of named agents.
    pub fn len(&self) -> usize {
        self.inner.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.named.is_empty()
    }

    /// Drop every named agent. Requests holding one keep using it.
    pub fn clear(&self) {
        self.inner.named.clear();
    }

    fn build_agent(&self, key: AgentKey, options: AgentOptions) -> Arc<Agent> {
        let agent = Arc::new(Agent::new(options));
        debug!(
            protocol = %key.0,
            name = %key.1,
            max_sockets = agent.max_sockets(),
            persistent = agent.is_persistent(),
            "agent created"
        );

        if !agent.is_persistent() {
            let registry: Weak<RegistryInner> = Arc::downgrade(&self.inner);
            agent.on_socket_removed(move |agent| {
                if !agent.is_idle() {
                    return;
                }
                let Some(registry) = registry.upgrade() else {
                    return;
                };
                let removed = registry
                    .named
                    .remove_if(&key, |_, current| std::ptr::eq(current.as_ref(), agent));
                if removed.is_some() {
                    debug!(protocol = %key.0, name = %key.1, "idle agent evicted");
                }
            });
        }
        agent
    }
}

/// Registry key of `options`, `None` for the global agent.
fn registry_name(options: &AgentOptions) -> Option<&str> {
    options
        .name
        .as_deref()
        .filter(|name| !GLOBAL_AGENT_NAMES.contains(name))
}
