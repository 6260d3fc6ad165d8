use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use kx_access::sharing;
use kx_core::ids::{AuthorId, NotebookId};
use kx_core::model::AccessTier;
use serde::Deserialize;

use crate::auth::AuthContext;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub author: AuthorId,
    pub tier: AccessTier,
}

pub async fn grant(
    State(state): State<AppState>,
    Path(notebook_id): Path<NotebookId>,
    auth: AuthContext,
    Json(req): Json<GrantRequest>,
) -> ApiResult<StatusCode> {
    state
        .engine
        .writer()
        .with_conn(move |conn| sharing::grant(conn, notebook_id, auth.author, req.author, req.tier))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn revoke(
    State(state): State<AppState>,
    Path((notebook_id, target)): Path<(NotebookId, AuthorId)>,
    auth: AuthContext,
) -> ApiResult<StatusCode> {
    state
        .engine
        .writer()
        .with_conn(move |conn| sharing::revoke(conn, notebook_id, auth.author, target))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
