//! Review decisions: not part of spec.md's literal HTTP surface list,
//! but §4.H's gate needs some externally reachable way to approve or
//! reject a pending entry — modeled on the `/share` admin-action shape.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use kx_access::Gate;
use kx_core::error::KxError;
use kx_core::ids::{EntryId, NotebookId};
use kx_core::model::{AccessTier, JobPayload, JobType, ReviewStatus};
use kx_storage::queries::{entries, reviews};
use serde::Deserialize;

use crate::auth::AuthContext;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
}

pub async fn decide(
    State(state): State<AppState>,
    Path((notebook_id, entry_id)): Path<(NotebookId, EntryId)>,
    auth: AuthContext,
    Json(req): Json<ReviewRequest>,
) -> ApiResult<StatusCode> {
    let status = match req.decision {
        ReviewDecision::Approve => ReviewStatus::Approved,
        ReviewDecision::Reject => ReviewStatus::Rejected,
    };
    let reviewer = auth.author;

    let should_distill = state
        .engine
        .writer()
        .with_conn(move |conn| {
            Gate::require_tier(conn, notebook_id, reviewer, AccessTier::Admin)?;
            let entry = entries::get(conn, entry_id)?
                .filter(|e| e.notebook_id == notebook_id)
                .ok_or_else(|| KxError::NotFound(format!("entry {entry_id}")))?;
            if entry.review_status != ReviewStatus::Pending {
                return Err(KxError::Conflict(format!("entry {entry_id} already decided")));
            }

            reviews::decide(conn, entry_id, status.clone(), reviewer, Utc::now())?;
            entries::update_review_status(conn, entry_id, status.clone())?;

            kx_storage::audit::insert(
                conn,
                &kx_core::model::AuditRecord::new("entry.reviewed")
                    .notebook(notebook_id)
                    .author(reviewer)
                    .target("entry", entry_id.to_string())
                    .detail(serde_json::json!({ "status": format!("{status:?}") })),
            )?;

            Ok(status == ReviewStatus::Approved)
        })
        .await?;

    if should_distill {
        state
            .queue
            .enqueue(notebook_id, JobType::DistillClaims, JobPayload::DistillClaims { entry_id, context_claims: vec![] }, None)
            .await?;
    }

    Ok(StatusCode::NO_CONTENT)
}
