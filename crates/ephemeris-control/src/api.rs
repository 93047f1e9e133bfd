//! HTTP RPC surface.
//!
//! Record bodies (`POST /jobs`, `POST /nodes`, `POST /workers`,
//! `GET /workers/{id}`) are encoded records sent as
//! `application/octet-stream`. Listings and small requests are JSON.

use std::str::FromStr;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use ephemeris_proto::{
    ClusterId, Entity, JobId, JobRecord, NodeId, NodeRecord, PlacementGroupRecord, ProtocolError, ResourceUsageBatch,
    ResourceViewReport, TotalResources, WorkerId, WorkerRecord,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{ControlError, ControlResult};
use crate::handle::ControlHandle;
use crate::sequencer::DebugState;

const OCTET_STREAM: &str = "application/octet-stream";

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    pub handle: ControlHandle,
    pub cluster_id: ClusterId,
}

impl AppState {
    pub fn new(handle: ControlHandle, cluster_id: ClusterId) -> Self {
        Self { handle, cluster_id }
    }
}

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/cluster-id", get(cluster_id))
        .route("/jobs", post(add_job).get(get_all_jobs))
        .route("/jobs/next-id", post(next_job_id))
        .route("/nodes", post(register_node).get(get_all_nodes))
        .route("/nodes/{node_id}/resources", post(report_resources))
        .route("/resources/total", get(get_all_total_resources))
        .route("/resources/usage", get(get_all_resource_usage))
        .route("/workers", post(add_worker).get(get_all_workers))
        .route("/workers/{worker_id}", get(get_worker))
        .route("/workers/{worker_id}/debugger-port", put(update_debugger_port))
        .route("/workers/{worker_id}/paused-threads", post(update_paused_threads))
        .route("/placement-groups", get(get_all_placement_groups))
        .route("/debug/state", get(debug_state))
        .with_state(state)
}

/// Error body. `kind` and `id` are set for missing or duplicate entities.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ControlError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::AlreadyExists { .. } => StatusCode::CONFLICT,
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::Storage(_) | Self::Http(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Startup(_) | Self::InvalidState(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            debug!(error = %self, "request rejected");
        }
        let (kind, id) = match &self {
            Self::NotFound { kind, id } | Self::AlreadyExists { kind, id } => {
                (Some((*kind).to_owned()), Some(id.clone()))
            }
            _ => (None, None),
        };
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
                kind,
                id,
            }),
        )
            .into_response()
    }
}

fn parse_id<T: FromStr<Err = ProtocolError>>(raw: &str) -> ControlResult<T> {
    Ok(raw.parse()?)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClusterIdResponse {
    pub cluster_id: ClusterId,
}

async fn cluster_id(State(state): State<AppState>) -> Json<ClusterIdResponse> {
    Json(ClusterIdResponse {
        cluster_id: state.cluster_id,
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobIdResponse {
    pub job_id: JobId,
}

async fn add_job(State(state): State<AppState>, body: Bytes) -> ControlResult<(StatusCode, Json<JobIdResponse>)> {
    let record = JobRecord::decode(&body)?;
    let job_id = record.job_id;
    state.handle.add_job(record).await?;
    Ok((StatusCode::CREATED, Json(JobIdResponse { job_id })))
}

async fn get_all_jobs(State(state): State<AppState>) -> ControlResult<Json<Vec<JobRecord>>> {
    Ok(Json(state.handle.get_all_jobs().await?))
}

async fn next_job_id(State(state): State<AppState>) -> ControlResult<Json<JobIdResponse>> {
    let job_id = state.handle.next_job_id().await?;
    Ok(Json(JobIdResponse { job_id }))
}

async fn register_node(State(state): State<AppState>, body: Bytes) -> ControlResult<StatusCode> {
    let record = NodeRecord::decode(&body)?;
    state.handle.register_node(record).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_all_nodes(State(state): State<AppState>) -> ControlResult<Json<Vec<NodeRecord>>> {
    Ok(Json(state.handle.get_all_nodes().await?))
}

async fn report_resources(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Json(report): Json<ResourceViewReport>,
) -> ControlResult<StatusCode> {
    let node_id: NodeId = parse_id(&node_id)?;
    state.handle.report_resource_view(node_id, report).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_all_total_resources(State(state): State<AppState>) -> ControlResult<Json<Vec<TotalResources>>> {
    Ok(Json(state.handle.get_all_total_resources().await?))
}

async fn get_all_resource_usage(State(state): State<AppState>) -> ControlResult<Json<ResourceUsageBatch>> {
    Ok(Json(state.handle.get_all_resource_usage().await?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerIdResponse {
    pub worker_id: WorkerId,
}

async fn add_worker(State(state): State<AppState>, body: Bytes) -> ControlResult<(StatusCode, Json<WorkerIdResponse>)> {
    let worker_id = state.handle.add_worker(body.to_vec()).await?;
    Ok((StatusCode::CREATED, Json(WorkerIdResponse { worker_id })))
}

async fn get_all_workers(State(state): State<AppState>) -> ControlResult<Json<Vec<WorkerRecord>>> {
    let workers = state
        .handle
        .get_all_workers()
        .await?
        .iter()
        .map(|bytes| {
            WorkerRecord::decode(bytes).map_err(|e| ControlError::internal(format!("corrupt worker record: {e}")))
        })
        .collect::<ControlResult<Vec<_>>>()?;
    Ok(Json(workers))
}

async fn get_worker(State(state): State<AppState>, Path(worker_id): Path<String>) -> ControlResult<Response> {
    let worker_id: WorkerId = parse_id(&worker_id)?;
    let bytes = state.handle.get_worker(worker_id).await?;
    Ok(([(header::CONTENT_TYPE, OCTET_STREAM)], bytes).into_response())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DebuggerPortRequest {
    pub port: u32,
}

async fn update_debugger_port(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
    Json(request): Json<DebuggerPortRequest>,
) -> ControlResult<StatusCode> {
    let worker_id: WorkerId = parse_id(&worker_id)?;
    state
        .handle
        .update_worker_debugger_port(worker_id, request.port)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PausedThreadsRequest {
    pub delta: i32,
}

async fn update_paused_threads(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
    Json(request): Json<PausedThreadsRequest>,
) -> ControlResult<StatusCode> {
    let worker_id: WorkerId = parse_id(&worker_id)?;
    state
        .handle
        .update_worker_num_paused_threads(worker_id, request.delta)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_all_placement_groups(State(state): State<AppState>) -> ControlResult<Json<Vec<PlacementGroupRecord>>> {
    Ok(Json(state.handle.get_all_placement_groups().await?))
}

async fn debug_state(State(state): State<AppState>) -> ControlResult<Json<DebugState>> {
    Ok(Json(state.handle.debug_state().await?))
}
