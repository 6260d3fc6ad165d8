use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use kx_core::error::KxError;
use kx_core::ids::{JobId, NotebookId};
use kx_core::model::{JobResult, JobType};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::AuthContext;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ClaimParams {
    pub worker_id: String,
    #[serde(rename = "type")]
    pub job_type: Option<JobType>,
}

/// Claim the next pending job for this notebook, or `204 No Content` if
/// none is available — agents poll this rather than blocking on it.
pub async fn claim_next(
    State(state): State<AppState>,
    Path(notebook_id): Path<NotebookId>,
    auth: AuthContext,
    Query(params): Query<ClaimParams>,
) -> ApiResult<axum::response::Response> {
    use axum::response::IntoResponse;
    let job = state
        .queue
        .claim(notebook_id, params.worker_id, params.job_type, Some(auth.label))
        .await?;
    Ok(match job {
        Some(job) => Json(job).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub worker_id: String,
    pub result: JobResult,
}

#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    pub accepted: bool,
}

/// Worker reports a completed job. The result is persisted first (the
/// job is done regardless of what happens next, per the failure policy),
/// then handed to the orchestrator to dispatch follow-on jobs.
///
/// Once `queue.complete` accepts the result the job is committed `completed`
/// no matter what follows: a worker whose completion succeeded must never
/// see a hard failure here, since that would read as "discard your result,
/// someone else already handled this" (§7). Dispatch failures are logged and
/// left for an administrative retry, not reflected in the response.
pub async fn complete(
    State(state): State<AppState>,
    Path((_notebook_id, job_id)): Path<(NotebookId, JobId)>,
    _auth: AuthContext,
    Json(req): Json<CompleteRequest>,
) -> ApiResult<Json<CompleteResponse>> {
    let result_json = serde_json::to_string(&req.result)
        .map_err(|e| KxError::Invalid(format!("result does not serialize: {e}")))?;
    let accepted = state.queue.complete(job_id, req.worker_id, result_json).await?;
    if accepted {
        match state.queue.get(job_id).await {
            Ok(Some(job)) => {
                if let Err(e) = state.orchestrator.on_completed(&job, &req.result).await {
                    warn!(%job_id, error = %e, "dispatch after job completion failed, result is still recorded");
                }
            }
            Ok(None) => warn!(%job_id, "completed job vanished before dispatch"),
            Err(e) => warn!(%job_id, error = %e, "failed to refetch completed job for dispatch"),
        }
    }
    Ok(Json(CompleteResponse { accepted }))
}

#[derive(Debug, Deserialize)]
pub struct FailRequest {
    pub worker_id: String,
    pub error: String,
}

pub async fn fail(
    State(state): State<AppState>,
    Path((_notebook_id, job_id)): Path<(NotebookId, JobId)>,
    _auth: AuthContext,
    Json(req): Json<FailRequest>,
) -> ApiResult<Json<CompleteResponse>> {
    let accepted = state.queue.fail(job_id, req.worker_id, req.error).await?;
    Ok(Json(CompleteResponse { accepted }))
}

#[derive(Debug, Serialize)]
pub struct JobStats {
    pub job_type: JobType,
    pub status: kx_core::model::JobStatus,
    pub count: u64,
}

pub async fn stats(
    State(state): State<AppState>,
    Path(notebook_id): Path<NotebookId>,
    _auth: AuthContext,
) -> ApiResult<Json<Vec<JobStats>>> {
    let rows = state.queue.stats(notebook_id).await?;
    Ok(Json(
        rows.into_iter()
            .map(|(job_type, status, count)| JobStats { job_type, status, count })
            .collect(),
    ))
}
