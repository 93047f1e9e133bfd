//! HTTP client for a remote control server.
//!
//! [`ControlClient`] speaks the routes in [`crate::api`] and maps error
//! responses back onto [`ControlError`], so out-of-process tools see the
//! same errors as callers of [`crate::StateAccessor`].

use std::time::Duration;

use ephemeris_proto::{
    ClusterId, Entity, JobId, JobRecord, NodeId, NodeRecord, PlacementGroupRecord, ResourceUsageBatch,
    ResourceViewReport, TotalResources, WorkerId, WorkerRecord,
};
use ephemeris_state::StoreError;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::api::{
    ClusterIdResponse, DebuggerPortRequest, ErrorResponse, JobIdResponse, PausedThreadsRequest, WorkerIdResponse,
};
use crate::config::AccessorConfig;
use crate::error::{ControlError, ControlResult};

const OCTET_STREAM: &str = "application/octet-stream";

/// HTTP client for a control server's API.
#[derive(Debug, Clone)]
pub struct ControlClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl ControlClient {
    /// Creates a client for the server at `base_url`, e.g.
    /// `http://10.0.0.1:6380`. Every request is bounded by the accessor
    /// timeout.
    pub fn new(base_url: impl Into<String>, config: &AccessorConfig) -> ControlResult<Self> {
        let timeout = config.timeout();
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether the server answers its health check.
    pub async fn health(&self) -> ControlResult<()> {
        self.send(self.client.get(self.url("/health"))).await?;
        Ok(())
    }

    pub async fn cluster_id(&self) -> ControlResult<ClusterId> {
        let response: ClusterIdResponse = self.json(self.client.get(self.url("/cluster-id"))).await?;
        Ok(response.cluster_id)
    }

    pub async fn add_job(&self, record: &JobRecord) -> ControlResult<JobId> {
        let request = self.record(self.client.post(self.url("/jobs")), record)?;
        let response: JobIdResponse = self.json(request).await?;
        Ok(response.job_id)
    }

    pub async fn get_all_job_info(&self) -> ControlResult<Vec<JobRecord>> {
        self.json(self.client.get(self.url("/jobs"))).await
    }

    pub async fn get_next_job_id(&self) -> ControlResult<JobId> {
        let response: JobIdResponse = self.json(self.client.post(self.url("/jobs/next-id"))).await?;
        Ok(response.job_id)
    }

    pub async fn register_node(&self, record: &NodeRecord) -> ControlResult<()> {
        let request = self.record(self.client.post(self.url("/nodes")), record)?;
        self.send(request).await?;
        Ok(())
    }

    pub async fn get_all_node_info(&self) -> ControlResult<Vec<NodeRecord>> {
        self.json(self.client.get(self.url("/nodes"))).await
    }

    pub async fn report_resource_view(&self, node_id: NodeId, report: &ResourceViewReport) -> ControlResult<()> {
        let request = self
            .client
            .post(self.url(&format!("/nodes/{node_id}/resources")))
            .json(report);
        self.send(request).await?;
        Ok(())
    }

    pub async fn get_all_total_resources(&self) -> ControlResult<Vec<TotalResources>> {
        self.json(self.client.get(self.url("/resources/total"))).await
    }

    pub async fn get_all_resource_usage(&self) -> ControlResult<ResourceUsageBatch> {
        self.json(self.client.get(self.url("/resources/usage"))).await
    }

    /// Stores a serialised worker record and returns its id.
    pub async fn add_worker_info(&self, bytes: &[u8]) -> ControlResult<WorkerId> {
        let request = self
            .client
            .post(self.url("/workers"))
            .header(CONTENT_TYPE, OCTET_STREAM)
            .body(bytes.to_vec());
        let response: WorkerIdResponse = self.json(request).await?;
        Ok(response.worker_id)
    }

    /// The worker's serialised record, exactly as it is stored.
    pub async fn get_worker_info(&self, worker_id: WorkerId) -> ControlResult<Vec<u8>> {
        let response = self
            .send(self.client.get(self.url(&format!("/workers/{worker_id}"))))
            .await?;
        Ok(response.bytes().await.map_err(|e| self.transport(e))?.to_vec())
    }

    /// Every worker, decoded. The listing route serves records as JSON.
    pub async fn get_all_worker_info(&self) -> ControlResult<Vec<WorkerRecord>> {
        self.json(self.client.get(self.url("/workers"))).await
    }

    pub async fn update_worker_debugger_port(&self, worker_id: WorkerId, port: u32) -> ControlResult<()> {
        let request = self
            .client
            .put(self.url(&format!("/workers/{worker_id}/debugger-port")))
            .json(&DebuggerPortRequest { port });
        self.send(request).await?;
        Ok(())
    }

    pub async fn update_worker_num_paused_threads(&self, worker_id: WorkerId, delta: i32) -> ControlResult<()> {
        let request = self
            .client
            .post(self.url(&format!("/workers/{worker_id}/paused-threads")))
            .json(&PausedThreadsRequest { delta });
        self.send(request).await?;
        Ok(())
    }

    pub async fn get_all_placement_group_info(&self) -> ControlResult<Vec<PlacementGroupRecord>> {
        self.json(self.client.get(self.url("/placement-groups"))).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn record<E: Entity>(&self, request: RequestBuilder, record: &E) -> ControlResult<RequestBuilder> {
        Ok(request.header(CONTENT_TYPE, OCTET_STREAM).body(record.encode()?))
    }

    async fn send(&self, request: RequestBuilder) -> ControlResult<Response> {
        let response = request.send().await.map_err(|e| self.transport(e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.json::<ErrorResponse>().await.ok();
        Err(error_from_response(status, body, self.timeout))
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ControlResult<T> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| self.transport(e))
    }

    fn transport(&self, e: reqwest::Error) -> ControlError {
        if e.is_timeout() {
            ControlError::Timeout(self.timeout)
        } else if e.is_connect() {
            ControlError::Unavailable(format!("control server unreachable: {e}"))
        } else {
            ControlError::Http(e)
        }
    }
}

/// Rebuilds the server-side error from an error status and body.
fn error_from_response(status: StatusCode, body: Option<ErrorResponse>, timeout: Duration) -> ControlError {
    let (message, kind, id) = match body {
        Some(ErrorResponse { error, kind, id }) => (error, kind, id),
        None => (format!("control server returned {status}"), None, None),
    };
    let kind = entity_kind(kind.as_deref());
    let id = id.unwrap_or_default();
    match status {
        StatusCode::NOT_FOUND => ControlError::NotFound { kind, id },
        StatusCode::CONFLICT => ControlError::AlreadyExists { kind, id },
        StatusCode::BAD_REQUEST => ControlError::InvalidArgument(message),
        StatusCode::BAD_GATEWAY => ControlError::Storage(StoreError::Backend(message)),
        StatusCode::GATEWAY_TIMEOUT => ControlError::Timeout(timeout),
        StatusCode::SERVICE_UNAVAILABLE => ControlError::Unavailable(message),
        _ => ControlError::Internal(message),
    }
}

fn entity_kind(kind: Option<&str>) -> &'static str {
    match kind {
        Some("job") => "job",
        Some("node") => "node",
        Some("worker") => "worker",
        Some("placement group") => "placement group",
        _ => "entity",
    }
}
