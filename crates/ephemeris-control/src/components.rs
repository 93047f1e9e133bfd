//! Bring-up bookkeeping for the control server.
//!
//! Every started piece of the server registers itself in a [`ComponentSet`].
//! Registration fails unless every component it depends on is already
//! registered, which pins the start order. Stopping walks the set in reverse.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::collaborators::Collaborator;
use crate::error::{ControlError, ControlResult};

/// Identity of a server component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentId {
    TableStore,
    ClusterIdentity,
    ResourceViews,
    EntityRegistries,
    Sequencer,
    Collaborator(&'static str),
    RpcListener,
}

impl ComponentId {
    /// Components that must be running before this one starts.
    #[must_use]
    pub const fn dependencies(self) -> &'static [ComponentId] {
        match self {
            Self::TableStore => &[],
            Self::ClusterIdentity => &[Self::TableStore],
            Self::ResourceViews => &[Self::ClusterIdentity],
            Self::EntityRegistries => &[Self::TableStore, Self::ResourceViews],
            Self::Sequencer => &[Self::ResourceViews, Self::EntityRegistries],
            Self::Collaborator(_) | Self::RpcListener => &[Self::Sequencer],
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TableStore => f.write_str("table store"),
            Self::ClusterIdentity => f.write_str("cluster identity"),
            Self::ResourceViews => f.write_str("resource views"),
            Self::EntityRegistries => f.write_str("entity registries"),
            Self::Sequencer => f.write_str("sequencer"),
            Self::Collaborator(name) => write!(f, "collaborator {name}"),
            Self::RpcListener => f.write_str("rpc listener"),
        }
    }
}

/// A started piece of the server that needs orderly teardown.
#[async_trait]
pub trait Component: Send {
    fn id(&self) -> ComponentId;

    async fn stop(&mut self);
}

/// Started components in start order.
#[derive(Default)]
pub struct ComponentSet {
    started: Vec<Box<dyn Component>>,
}

impl ComponentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.started.iter().any(|c| c.id() == id)
    }

    /// Fails unless `id` is new and all of its dependencies have started.
    pub fn check(&self, id: ComponentId) -> ControlResult<()> {
        if self.contains(id) {
            return Err(ControlError::Startup(format!("{id} started twice")));
        }
        if let Some(missing) = id.dependencies().iter().find(|dep| !self.contains(**dep)) {
            return Err(ControlError::Startup(format!(
                "{id} requires {missing} to be started first"
            )));
        }
        Ok(())
    }

    pub fn register(&mut self, component: Box<dyn Component>) -> ControlResult<()> {
        self.check(component.id())?;
        debug!(component = %component.id(), "component started");
        self.started.push(component);
        Ok(())
    }

    /// Stops every component, last started first.
    pub async fn stop_all(&mut self) {
        while let Some(mut component) = self.started.pop() {
            debug!(component = %component.id(), "stopping component");
            component.stop().await;
        }
    }

    pub fn ids(&self) -> Vec<ComponentId> {
        self.started.iter().map(|c| c.id()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.started.is_empty()
    }
}

/// A component with nothing to tear down.
pub struct Marker(pub ComponentId);

#[async_trait]
impl Component for Marker {
    fn id(&self) -> ComponentId {
        self.0
    }

    async fn stop(&mut self) {}
}

/// A spawned task that exits when its token is cancelled.
pub struct TaskComponent {
    id: ComponentId,
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
    grace: Option<Duration>,
}

impl TaskComponent {
    pub fn new(id: ComponentId, cancel: CancellationToken, join: JoinHandle<()>) -> Self {
        Self {
            id,
            cancel,
            join: Some(join),
            grace: None,
        }
    }

    /// Aborts the task if it has not finished `grace` after cancellation.
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = Some(grace);
        self
    }
}

#[async_trait]
impl Component for TaskComponent {
    fn id(&self) -> ComponentId {
        self.id
    }

    async fn stop(&mut self) {
        self.cancel.cancel();
        let Some(mut join) = self.join.take() else {
            return;
        };
        let result = match self.grace {
            Some(grace) => match tokio::time::timeout(grace, &mut join).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(component = %self.id, ?grace, "did not stop in time, aborting");
                    join.abort();
                    return;
                }
            },
            None => join.await,
        };
        if let Err(e) = result {
            warn!(component = %self.id, error = %e, "task ended abnormally");
        }
    }
}

/// A started [`Collaborator`].
pub struct CollaboratorComponent {
    collaborator: Box<dyn Collaborator>,
}

impl CollaboratorComponent {
    pub fn new(collaborator: Box<dyn Collaborator>) -> Self {
        Self { collaborator }
    }
}

#[async_trait]
impl Component for CollaboratorComponent {
    fn id(&self) -> ComponentId {
        ComponentId::Collaborator(self.collaborator.name())
    }

    async fn stop(&mut self) {
        self.collaborator.stop().await;
    }
}
