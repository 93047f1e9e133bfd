//! Control-plane server lifecycle.
//!
//! ```text
//! Created ──start()──▶ Starting ──▶ Started ──stop()──▶ Stopping ──▶ Stopped
//!                          │                                            ▲
//!                          └──────────── bring-up failure ──────────────┘
//! ```
//!
//! `start()` brings components up in dependency order, registering each in a
//! [`ComponentSet`]; `stop()` tears them down in reverse. A stopped server
//! cannot be started again.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ephemeris_proto::ClusterId;
use ephemeris_state::{open_table_store, TableStore};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::api::{self, AppState};
use crate::cluster_id::get_or_create_cluster_id;
use crate::collaborators::{Collaborator, CollaboratorContext, DebugStateReporter, StorageHealthCheck};
use crate::components::{CollaboratorComponent, ComponentId, ComponentSet, Marker, TaskComponent};
use crate::config::ControlConfig;
use crate::error::{ControlError, ControlResult};
use crate::handle::ControlHandle;
use crate::registry::{Registries, ResourceViewRegistry};
use crate::sequencer::Sequencer;
use crate::storage::TableStorage;

/// Capacity of the change-event feed. Slow subscribers lag rather than
/// block the sequencer.
const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Starting,
    Started,
    Stopping,
    Stopped,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        })
    }
}

pub struct ControlServer {
    config: ControlConfig,
    store: Option<Arc<dyn TableStore>>,
    collaborators: Vec<Box<dyn Collaborator>>,
    state: watch::Sender<ServerState>,
    components: ComponentSet,
    cancel: CancellationToken,
    handle: Option<ControlHandle>,
    cluster_id: Option<ClusterId>,
    local_addr: Option<SocketAddr>,
}

impl ControlServer {
    /// Creates a server that opens its table store from `config.storage`.
    pub fn new(config: ControlConfig) -> Self {
        let (state, _) = watch::channel(ServerState::Created);
        Self {
            config,
            store: None,
            collaborators: Vec::new(),
            state,
            components: ComponentSet::new(),
            cancel: CancellationToken::new(),
            handle: None,
            cluster_id: None,
            local_addr: None,
        }
    }

    /// Creates a server over an already-open table store.
    pub fn with_store(config: ControlConfig, store: Arc<dyn TableStore>) -> Self {
        let mut server = Self::new(config);
        server.store = Some(store);
        server
    }

    /// Adds a collaborator, started after the built-in ones.
    #[must_use]
    pub fn with_collaborator(mut self, collaborator: impl Collaborator + 'static) -> Self {
        self.collaborators.push(Box::new(collaborator));
        self
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    pub fn is_started(&self) -> bool {
        self.state() == ServerState::Started
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == ServerState::Stopped
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Resolves once the server is started. Fails if it stops first.
    pub async fn wait_started(&self) -> ControlResult<()> {
        let mut rx = self.state.subscribe();
        let reached = *rx
            .wait_for(|s| matches!(s, ServerState::Started | ServerState::Stopped))
            .await
            .map_err(|_| ControlError::internal("server state channel closed"))?;
        if reached == ServerState::Started {
            Ok(())
        } else {
            Err(ControlError::InvalidState("server stopped before it started".into()))
        }
    }

    /// Handle for in-process callers. Available once the sequencer is up.
    pub fn handle(&self) -> ControlResult<ControlHandle> {
        self.handle
            .clone()
            .ok_or_else(|| ControlError::InvalidState(format!("server is {}", self.state())))
    }

    pub fn cluster_id(&self) -> Option<ClusterId> {
        self.cluster_id
    }

    /// Address the RPC listener is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn components(&self) -> Vec<ComponentId> {
        self.components.ids()
    }

    pub async fn start(&mut self) -> ControlResult<()> {
        let current = self.state();
        if current != ServerState::Created {
            return Err(ControlError::InvalidState(format!("cannot start a server that is {current}")));
        }
        self.state.send_replace(ServerState::Starting);
        info!(session = %self.config.session_name, "control server starting");

        match self.bring_up().await {
            Ok(()) => {
                self.state.send_replace(ServerState::Started);
                info!(
                    cluster_id = ?self.cluster_id,
                    local_addr = ?self.local_addr,
                    "control server started"
                );
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "control server failed to start");
                self.teardown().await;
                self.state.send_replace(ServerState::Stopped);
                Err(e)
            }
        }
    }

    /// Stops the server. Safe to call more than once, and on a server that
    /// never started.
    pub async fn stop(&mut self) {
        match self.state() {
            ServerState::Stopped => return,
            ServerState::Created => {
                self.state.send_replace(ServerState::Stopped);
                return;
            }
            _ => {}
        }
        self.state.send_replace(ServerState::Stopping);
        info!("control server stopping");
        self.teardown().await;
        self.state.send_replace(ServerState::Stopped);
        info!("control server stopped");
    }

    async fn teardown(&mut self) {
        self.components.stop_all().await;
        self.cancel.cancel();
    }

    async fn bring_up(&mut self) -> ControlResult<()> {
        // Table store
        self.components.check(ComponentId::TableStore)?;
        let store = match &self.store {
            Some(store) => Arc::clone(store),
            None => open_table_store(&self.config.storage, &self.config.session_name).await?,
        };
        self.components.register(Box::new(Marker(ComponentId::TableStore)))?;

        // Cluster identity
        self.components.check(ComponentId::ClusterIdentity)?;
        let cluster_id = get_or_create_cluster_id(
            store.as_ref(),
            self.config.cluster.cluster_id_attempts,
            self.config.cluster.retry_delay(),
        )
        .await?;
        self.cluster_id = Some(cluster_id);
        self.components.register(Box::new(Marker(ComponentId::ClusterIdentity)))?;

        // Resource views
        self.components.check(ComponentId::ResourceViews)?;
        let resources = ResourceViewRegistry::new();
        self.components.register(Box::new(Marker(ComponentId::ResourceViews)))?;

        // Entity registries
        self.components.check(ComponentId::EntityRegistries)?;
        let mut registries = Registries::new(TableStorage::new(Arc::clone(&store)), resources);
        registries.load_persisted().await?;
        self.components.register(Box::new(Marker(ComponentId::EntityRegistries)))?;

        // Sequencer
        self.components.check(ComponentId::Sequencer)?;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let cancel = self.cancel.child_token();
        let sequencer = Sequencer::new(registries, commands_rx, events.clone(), cancel.clone());
        let join = tokio::spawn(sequencer.run());
        let handle = ControlHandle::new(commands_tx, events);
        self.handle = Some(handle.clone());
        self.components
            .register(Box::new(TaskComponent::new(ComponentId::Sequencer, cancel, join)))?;

        // Collaborators
        for mut collaborator in self.take_collaborators() {
            let id = ComponentId::Collaborator(collaborator.name());
            self.components.check(id)?;
            let ctx = CollaboratorContext {
                handle: handle.clone(),
                store: Arc::clone(&store),
                cancel: self.cancel.child_token(),
            };
            collaborator
                .start(ctx)
                .await
                .map_err(|e| ControlError::Startup(format!("{id}: {e}")))?;
            self.components
                .register(Box::new(CollaboratorComponent::new(collaborator)))?;
        }

        // RPC listener
        self.components.check(ComponentId::RpcListener)?;
        let listen_addr = self.config.server.listen_addr;
        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|e| ControlError::Startup(format!("failed to bind {listen_addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ControlError::Startup(format!("failed to read bound address: {e}")))?;
        let app = api::router(AppState::new(handle, cluster_id));
        let cancel = self.cancel.child_token();
        let shutdown = cancel.clone().cancelled_owned();
        let join = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                error!(error = %e, "rpc listener failed");
            }
        });
        self.local_addr = Some(local_addr);
        self.components.register(Box::new(
            TaskComponent::new(ComponentId::RpcListener, cancel, join)
                .with_grace(self.config.server.drain_timeout()),
        ))?;
        info!(%local_addr, "rpc listener bound");

        Ok(())
    }

    /// Built-in collaborators enabled by config, then the ones added with
    /// [`ControlServer::with_collaborator`].
    fn take_collaborators(&mut self) -> Vec<Box<dyn Collaborator>> {
        let settings = &self.config.collaborators;
        let mut all: Vec<Box<dyn Collaborator>> = Vec::new();
        if settings.health_check_interval_ms > 0 {
            all.push(Box::new(StorageHealthCheck::new(
                Duration::from_millis(settings.health_check_interval_ms),
                settings.health_failure_threshold,
            )));
        }
        if settings.debug_state_interval_secs > 0 {
            all.push(Box::new(DebugStateReporter::new(Duration::from_secs(
                settings.debug_state_interval_secs,
            ))));
        }
        all.append(&mut self.collaborators);
        all
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        // Spawned tasks hold child tokens; make sure none outlive the server.
        self.cancel.cancel();
    }
}

impl fmt::Debug for ControlServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlServer")
            .field("state", &self.state())
            .field("cluster_id", &self.cluster_id)
            .field("local_addr", &self.local_addr)
            .field("components", &self.components.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use ephemeris_state::MemoryTableStore;

    use super::*;
    use crate::config::CollaboratorConfig;

    fn config() -> ControlConfig {
        let mut config = ControlConfig::default();
        config.server.listen_addr = "127.0.0.1:0".parse().unwrap();
        config.server.drain_timeout_secs = 1;
        config.collaborators = CollaboratorConfig::disabled();
        config
    }

    #[tokio::test]
    async fn components_start_in_dependency_order() {
        let mut server = ControlServer::new(config());
        server.start().await.unwrap();

        assert!(server.is_started());
        assert_eq!(
            server.components(),
            vec![
                ComponentId::TableStore,
                ComponentId::ClusterIdentity,
                ComponentId::ResourceViews,
                ComponentId::EntityRegistries,
                ComponentId::Sequencer,
                ComponentId::RpcListener,
            ]
        );
        assert!(server.local_addr().unwrap().port() > 0);

        server.stop().await;
        assert!(server.is_stopped());
        assert!(server.components().is_empty());
    }

    #[tokio::test]
    async fn built_in_collaborators_start_when_enabled() {
        let mut config = config();
        config.collaborators = CollaboratorConfig::default();
        let mut server = ControlServer::new(config);
        server.start().await.unwrap();

        let components = server.components();
        assert!(components.contains(&ComponentId::Collaborator("storage-health-check")));
        assert!(components.contains(&ComponentId::Collaborator("debug-state-reporter")));
        server.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_final() {
        let mut server = ControlServer::new(config());
        server.stop().await;
        assert!(server.is_stopped());
        server.stop().await;

        let err = server.start().await.unwrap_err();
        assert!(matches!(err, ControlError::InvalidState(_)));
    }

    #[tokio::test]
    async fn cannot_start_twice() {
        let mut server = ControlServer::new(config());
        server.start().await.unwrap();
        assert!(matches!(server.start().await.unwrap_err(), ControlError::InvalidState(_)));
        server.wait_started().await.unwrap();
        server.stop().await;
    }

    #[tokio::test]
    async fn failed_bind_leaves_server_stopped() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = config();
        config.server.listen_addr = taken.local_addr().unwrap();

        let mut server = ControlServer::with_store(config, Arc::new(MemoryTableStore::new()));
        let err = server.start().await.unwrap_err();
        assert!(matches!(err, ControlError::Startup(_)));
        assert!(server.is_stopped());
        assert!(server.components().is_empty());
        assert!(server.wait_started().await.is_err());

        // The sequencer came up before the listener failed; it is gone now.
        assert!(server.handle().unwrap().is_closed());
        server.stop().await;
    }

    #[tokio::test]
    async fn handle_unavailable_before_start() {
        let server = ControlServer::new(config());
        assert!(matches!(server.handle().unwrap_err(), ControlError::InvalidState(_)));
        assert_eq!(server.cluster_id(), None);
    }
}
