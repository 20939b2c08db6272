use crate::socket::transport::{Connection, Target, Transport, TransportError};
use futures::future::{self, BoxFuture};
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::debug;

/// Socket limit of agents created without an explicit `max_sockets`.
pub const DEFAULT_MAX_SOCKETS: usize = 1024;

/// Configuration of a pooled agent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AgentOptions {
    /// Registry key. `None`, `"default"` and `"globalAgent"` select the
    /// global agent of the request protocol.
    pub name: Option<String>,
    /// Concurrent sockets per target.
    pub max_sockets: usize,
    /// Non-persistent agents leave the registry once they have no active
    /// sockets and no waiters.
    pub persistent: bool,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            name: None,
            max_sockets: DEFAULT_MAX_SOCKETS,
            persistent: true,
        }
    }
}

impl AgentOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_max_sockets(mut self, max_sockets: usize) -> Self {
        self.max_sockets = max_sockets.max(1);
        self
    }

    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }
}

/// A socket slot handed out by a [`ConnectionManager`].
///
/// The slot may already carry an idle connection; a vacant slot connects
/// lazily through the client transport.
pub struct Socket {
    target: Target,
    connection: Option<Box<dyn Connection>>,
}

impl Socket {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            connection: None,
        }
    }

    pub fn with_connection(target: Target, connection: Box<dyn Connection>) -> Self {
        Self {
            target,
            connection: Some(connection),
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// True when the slot came with a live connection.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// The slot's connection, opening one through `transport` if vacant.
    pub async fn connect(
        &mut self,
        transport: &dyn Transport,
    ) -> Result<&mut (dyn Connection + 'static), TransportError> {
        if self.connection.is_none() {
            self.connection = Some(transport.connect(&self.target).await?);
        }
        self.connection.as_deref_mut().ok_or(TransportError::Closed)
    }

    pub fn into_connection(self) -> Option<Box<dyn Connection>> {
        self.connection
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("target", &self.target)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Hands out socket slots and takes them back.
pub trait ConnectionManager: Send + Sync {
    /// Wait for a free slot to `target`.
    fn assign<'a>(&'a self, target: &'a Target) -> BoxFuture<'a, Result<Socket, TransportError>>;

    /// Return a slot. A non-reusable slot has its connection dropped.
    fn release(&self, socket: Socket, reusable: bool);

    /// A waiter for `target` gave up before it was assigned.
    fn abandon(&self, target: &Target) {
        let _ = target;
    }
}

/// Sentinel manager for `agent: false`: every request gets its own
/// connection, which is closed after use.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unpooled;

impl ConnectionManager for Unpooled {
    fn assign<'a>(&'a self, target: &'a Target) -> BoxFuture<'a, Result<Socket, TransportError>> {
        Box::pin(future::ready(Ok(Socket::new(target.clone()))))
    }

    fn release(&self, socket: Socket, _reusable: bool) {
        drop(socket);
    }
}

struct Grant {
    connection: Option<Box<dyn Connection>>,
}

/// Per-target state.
#[derive(Default)]
struct Group {
    idle: VecDeque<Box<dyn Connection>>,
    active: usize,
    waiters: VecDeque<oneshot::Sender<Grant>>,
}

impl Group {
    fn take_idle(&mut self) -> Option<Box<dyn Connection>> {
        while let Some(connection) = self.idle.pop_front() {
            if connection.is_reusable() {
                return Some(connection);
            }
        }
        None
    }

    fn prune_waiters(&mut self) {
        self.waiters.retain(|waiter| !waiter.is_closed());
    }

    fn live_waiters(&self) -> usize {
        self.waiters.iter().filter(|w| !w.is_closed()).count()
    }

    fn is_unused(&self) -> bool {
        self.active == 0 && self.waiters.is_empty() && self.idle.is_empty()
    }

    /// Hand slots to waiters in FIFO order while capacity allows, then park
    /// the leftover connection as idle.
    fn dispatch(&mut self, max_sockets: usize, mut connection: Option<Box<dyn Connection>>) {
        while self.active < max_sockets {
            let Some(waiter) = self.waiters.pop_front() else {
                break;
            };
            if waiter.is_closed() {
                continue;
            }

            let grant = Grant {
                connection: connection.take().or_else(|| self.take_idle()),
            };
            self.active += 1;
            if let Err(grant) = waiter.send(grant) {
                self.active -= 1;
                connection = grant.connection;
            }
        }

        if let Some(connection) = connection {
            if connection.is_reusable() {
                self.idle.push_back(connection);
            }
        }
    }
}

type SocketRemovedListener = Box<dyn Fn(&Agent) + Send + Sync>;

/// Bounded connection pool with a FIFO wait queue per target.
pub struct Agent {
    options: AgentOptions,
    groups: Mutex<HashMap<Target, Group>>,
    listeners: Mutex<Vec<SocketRemovedListener>>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("options", &self.options)
            .field("active", &self.active_count())
            .field("pending", &self.pending_count())
            .field("idle", &self.idle_count())
            .finish()
    }
}

impl Default for Agent {
    fn default() -> Self {
        Self::new(AgentOptions::default())
    }
}

impl Agent {
    pub fn new(options: AgentOptions) -> Self {
        let options = AgentOptions {
            max_sockets: options.max_sockets.max(1),
            ..options
        };
        Self {
            options,
            groups: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    pub fn name(&self) -> Option<&str> {
        self.options.name.as_deref()
    }

    pub fn max_sockets(&self) -> usize {
        self.options.max_sockets
    }

    pub fn is_persistent(&self) -> bool {
        self.options.persistent
    }

    /// Register a listener fired after every release, discard or abandoned
    /// wait. Listeners run with no pool lock held.
    pub fn on_socket_removed<F>(&self, listener: F)
    where
        F: Fn(&Agent) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    /// Sockets currently assigned, across targets.
    pub fn active_count(&self) -> usize {
        self.lock_groups().values().map(|g| g.active).sum()
    }

    /// Live waiters, across targets.
    pub fn pending_count(&self) -> usize {
        self.lock_groups().values().map(Group::live_waiters).sum()
    }

    pub fn idle_count(&self) -> usize {
        self.lock_groups().values().map(|g| g.idle.len()).sum()
    }

    /// No active sockets and no live waiters.
    pub fn is_idle(&self) -> bool {
        self.lock_groups()
            .values()
            .all(|g| g.active == 0 && g.live_waiters() == 0)
    }

    fn lock_groups(&self) -> MutexGuard<'_, HashMap<Target, Group>> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn give_back(&self, target: &Target, connection: Option<Box<dyn Connection>>) {
        {
            let mut groups = self.lock_groups();
            if let Some(group) = groups.get_mut(target) {
                group.active = group.active.saturating_sub(1);
                group.prune_waiters();
                group.dispatch(self.options.max_sockets, connection);
                if group.is_unused() {
                    groups.remove(target);
                }
            }
        }
        self.notify_socket_removed();
    }

    fn notify_socket_removed(&self) {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener(self);
        }
    }
}

/// Pending assignment. Dropping it before completion returns any slot
/// granted in the meantime.
struct Waiter<'a> {
    agent: &'a Agent,
    target: &'a Target,
    rx: Option<oneshot::Receiver<Grant>>,
}

impl Waiter<'_> {
    async fn wait(&mut self) -> Result<Socket, TransportError> {
        let Some(rx) = self.rx.as_mut() else {
            return Err(TransportError::PoolClosed);
        };
        let result = rx.await;
        self.rx = None;

        let grant = result.map_err(|_| TransportError::PoolClosed)?;
        Ok(Socket {
            target: self.target.clone(),
            connection: grant.connection,
        })
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            if let Ok(grant) = rx.try_recv() {
                self.agent.give_back(self.target, grant.connection);
            }
        }
    }
}

impl ConnectionManager for Agent {
    fn assign<'a>(&'a self, target: &'a Target) -> BoxFuture<'a, Result<Socket, TransportError>> {
        Box::pin(async move {
            let rx = {
                let mut groups = self.lock_groups();
                let group = groups.entry(target.clone()).or_default();
                if group.active < self.options.max_sockets {
                    group.active += 1;
                    let connection = group.take_idle();
                    return Ok(Socket {
                        target: target.clone(),
                        connection,
                    });
                }

                let (tx, rx) = oneshot::channel();
                group.waiters.push_back(tx);
                debug!(
                    agent = self.name().unwrap_or("global"),
                    target = %target.authority(),
                    queued = group.waiters.len(),
                    "waiting for a free socket"
                );
                rx
            };

            let mut waiter = Waiter {
                agent: self,
                target,
                rx: Some(rx),
            };
            waiter.wait().await
        })
    }

    fn release(&self, socket: Socket, reusable: bool) {
        let Socket { target, connection } = socket;
        let connection = connection.filter(|c| reusable && c.is_reusable());
        self.give_back(&target, connection);
    }

    fn abandon(&self, target: &Target) {
        {
            let mut groups = self.lock_groups();
            if let Some(group) = groups.get_mut(target) {
                group.prune_waiters();
                if group.is_unused() {
                    groups.remove(target);
                }
            }
        }
        self.notify_socket_removed();
    }
}
