//! Server lifecycle: start, stop, restart over a shared store.

mod common;

use std::sync::Arc;

use common::fixtures::{job, DownStore, NodeBuilder, WorkerBuilder};
use common::{server_runtime, test_config, TestCluster};
use ephemeris_control::{AccessorConfig, ControlError, ControlServer, ServerState, StateAccessor};
use ephemeris_state::{MemoryTableStore, TableStore};

#[test]
fn stop_is_idempotent() {
    let runtime = server_runtime();
    let mut server = ControlServer::with_store(test_config(), Arc::new(MemoryTableStore::new()));

    runtime.block_on(async {
        server.start().await.unwrap();
        assert_eq!(server.state(), ServerState::Started);

        server.stop().await;
        server.stop().await;
        assert_eq!(server.state(), ServerState::Stopped);
    });
}

#[test]
fn stopped_server_cannot_restart() {
    let runtime = server_runtime();
    let mut server = ControlServer::with_store(test_config(), Arc::new(MemoryTableStore::new()));

    runtime.block_on(async {
        server.start().await.unwrap();
        server.stop().await;
        assert!(matches!(server.start().await, Err(ControlError::InvalidState(_))));
    });
}

#[test]
fn stop_without_start() {
    let runtime = server_runtime();
    let mut server = ControlServer::with_store(test_config(), Arc::new(MemoryTableStore::new()));
    runtime.block_on(server.stop());
    assert!(server.is_stopped());
    assert!(server.handle().is_err());
}

#[test]
fn unreachable_store_fails_start() {
    let runtime = server_runtime();
    let mut server = ControlServer::with_store(test_config(), Arc::new(DownStore));

    runtime.block_on(async {
        let err = server.start().await.unwrap_err();
        assert!(matches!(err, ControlError::Startup(_)), "unexpected error: {err}");
        assert!(server.is_stopped());
        assert!(server.components().is_empty());

        // Teardown after a failed start is a no-op.
        server.stop().await;
    });
}

#[test]
fn restart_on_shared_store_keeps_identity_and_counters() {
    let store: Arc<dyn TableStore> = Arc::new(MemoryTableStore::new());

    let first = TestCluster::over_store(server_runtime(), Arc::clone(&store), AccessorConfig::default());
    let cluster_id = first.server.cluster_id().unwrap();
    let node = NodeBuilder::new().with_resources(&[("CPU", 8.0)]).build();
    first.block_on(first.handle.register_node(node.clone())).unwrap();
    first.block_on(first.handle.add_job(job(7))).unwrap();
    let worker = WorkerBuilder::new().on_node(node.node_id).bytes();
    first.accessor.add_worker_info(&worker).unwrap();
    let last_job_id = (0..3)
        .map(|_| first.accessor.get_next_job_id().unwrap())
        .last()
        .unwrap();
    let (runtime, store) = first.shutdown();

    let second = TestCluster::over_store(runtime, store, AccessorConfig::default());
    assert_eq!(second.server.cluster_id(), Some(cluster_id));
    assert!(second.accessor.get_next_job_id().unwrap() > last_job_id);

    assert_eq!(second.accessor.get_all_node_info().unwrap(), vec![node.clone()]);
    assert_eq!(second.accessor.get_all_job_info().unwrap(), vec![job(7)]);
    assert_eq!(second.accessor.get_all_worker_info().unwrap(), vec![worker]);

    // Declared totals are rebuilt from persisted nodes.
    let totals = second.accessor.get_all_total_resources().unwrap();
    assert_eq!(totals.len(), 1);
    assert_eq!(totals[0].node_id, node.node_id);
    assert_eq!(totals[0].resources_total, node.resources_total);

    // Live resource views are not persisted.
    assert!(second.accessor.get_all_resource_usage().unwrap().batch.is_empty());

    second.shutdown();
}

#[test]
fn accessor_is_single_use() {
    let runtime = server_runtime();
    let cluster = TestCluster::over_store(runtime, Arc::new(MemoryTableStore::new()), AccessorConfig::default());

    let mut accessor = StateAccessor::new(cluster.handle.clone(), AccessorConfig::default());
    accessor.connect().unwrap();
    accessor.connect().unwrap();
    assert!(accessor.get_all_job_info().unwrap().is_empty());

    accessor.disconnect();
    assert!(matches!(accessor.get_all_job_info(), Err(ControlError::InvalidState(_))));
    assert!(matches!(accessor.connect(), Err(ControlError::InvalidState(_))));

    cluster.shutdown();
}

#[test]
fn accessor_reports_unavailable_after_server_stops() {
    let runtime = server_runtime();
    let cluster = TestCluster::over_store(runtime, Arc::new(MemoryTableStore::new()), AccessorConfig::default());

    let mut accessor = StateAccessor::new(cluster.handle.clone(), AccessorConfig::default());
    accessor.connect().unwrap();

    let (_runtime, _store) = cluster.shutdown();
    assert!(matches!(accessor.get_all_node_info(), Err(ControlError::Unavailable(_))));
    accessor.disconnect();
}

#[test]
fn http_surface_serves_the_same_state() {
    let runtime = server_runtime();
    let cluster = TestCluster::over_store(runtime, Arc::new(MemoryTableStore::new()), AccessorConfig::default());
    let addr = cluster.server.local_addr().unwrap();

    let bytes = WorkerBuilder::new().bytes();
    let id = cluster.accessor.add_worker_info(&bytes).unwrap();

    // A bare HTTP/1.1 request keeps the test free of an HTTP client.
    let response = cluster.block_on(async move {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!("GET /workers/{id} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        response
    });

    assert!(response.starts_with(b"HTTP/1.1 200"));
    assert!(response.ends_with(&bytes));

    cluster.shutdown();
}
