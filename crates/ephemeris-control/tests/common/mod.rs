//! Common utilities for control-plane integration tests.

#![allow(dead_code)]

pub mod fixtures;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ephemeris_control::{
    AccessorConfig, CollaboratorConfig, ControlConfig, ControlHandle, ControlServer, StateAccessor,
};
use ephemeris_state::{MemoryTableStore, TableStore, ValkeyConfig, ValkeyTableStore};
use tokio::runtime::{Builder, Runtime};

pub const VALKEY_URL_ENV: &str = "EPHEMERIS_TEST_VALKEY_URL";

#[derive(Debug, Clone, Copy)]
pub enum Backend {
    Memory,
    Valkey,
}

/// Config for a test server: ephemeral port, no background collaborators.
pub fn test_config() -> ControlConfig {
    let mut config = ControlConfig::default();
    config.session_name = "ephemeris-test".into();
    config.server.listen_addr = "127.0.0.1:0".parse().unwrap();
    config.server.drain_timeout_secs = 1;
    config.cluster.cluster_id_attempts = 2;
    config.cluster.cluster_id_retry_ms = 10;
    config.collaborators = CollaboratorConfig::disabled();
    config
}

/// A runtime for driving servers from synchronous tests.
pub fn server_runtime() -> Runtime {
    Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("ephemeris-test")
        .enable_all()
        .build()
        .unwrap()
}

/// Valkey cases fail loudly rather than pass without a server.
pub fn valkey_url(var: Result<String, std::env::VarError>) -> String {
    var.unwrap_or_else(|_| panic!("{VALKEY_URL_ENV} must point at a Valkey server for the valkey cases"))
}

/// Opens a fresh store for `backend`. Valkey needs `EPHEMERIS_TEST_VALKEY_URL`.
pub fn open_store(runtime: &Runtime, backend: Backend) -> Arc<dyn TableStore> {
    match backend {
        Backend::Memory => Arc::new(MemoryTableStore::new()),
        Backend::Valkey => {
            let url = valkey_url(std::env::var(VALKEY_URL_ENV));
            let config = ValkeyConfig {
                url: Some(url),
                pool_size: 4,
                connect_attempts: 1,
                ..ValkeyConfig::default()
            };
            let namespace = format!("ephemeris-it-{}", ulid::Ulid::new());
            let store = runtime
                .block_on(ValkeyTableStore::connect(&config, namespace))
                .expect("valkey configured but not reachable");
            Arc::new(store)
        }
    }
}

/// A started server on its own runtime, with a connected accessor.
pub struct TestCluster {
    pub runtime: Runtime,
    pub server: ControlServer,
    pub handle: ControlHandle,
    pub accessor: StateAccessor,
    pub store: Arc<dyn TableStore>,
}

impl TestCluster {
    pub fn start(backend: Backend) -> Self {
        Self::start_with(backend, AccessorConfig::default())
    }

    pub fn start_with(backend: Backend, accessor: AccessorConfig) -> Self {
        let runtime = server_runtime();
        let store = open_store(&runtime, backend);
        Self::over_store(runtime, store, accessor)
    }

    /// Starts a server over an existing store.
    pub fn over_store(runtime: Runtime, store: Arc<dyn TableStore>, accessor: AccessorConfig) -> Self {
        let mut server = ControlServer::with_store(test_config(), Arc::clone(&store));
        runtime.block_on(server.start()).unwrap();
        let handle = server.handle().unwrap();

        let mut accessor = StateAccessor::new(handle.clone(), accessor);
        accessor.connect().unwrap();

        Self {
            runtime,
            server,
            handle,
            accessor,
            store,
        }
    }

    /// Runs a future on the server runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Stops the server and hands back its runtime and store.
    pub fn shutdown(mut self) -> (Runtime, Arc<dyn TableStore>) {
        self.accessor.disconnect();
        self.runtime.block_on(self.server.stop());
        (self.runtime, self.store)
    }
}

pub fn short_timeout() -> AccessorConfig {
    AccessorConfig::with_timeout(Duration::from_millis(100))
}
