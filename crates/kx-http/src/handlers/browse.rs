use axum::extract::{Path, Query, State};
use axum::Json;
use kx_browse::BrowseQuery;
use kx_core::ids::{EntryId, NotebookId};
use kx_core::model::{ClaimsStatus, Entry, IntegrationStatus};
use serde::Deserialize;

use crate::auth::AuthContext;
use crate::error::ApiResult;
use crate::state::AppState;

fn default_limit() -> u32 {
    100
}

#[derive(Debug, Deserialize)]
pub struct BrowseParams {
    pub topic_prefix: Option<String>,
    pub claims_status: Option<ClaimsStatus>,
    pub integration_status: Option<IntegrationStatus>,
    pub author: Option<kx_core::ids::AuthorId>,
    pub sequence_min: Option<u64>,
    pub sequence_max: Option<u64>,
    pub has_friction_above: Option<f64>,
    pub needs_review: Option<bool>,
    pub fragment_of: Option<EntryId>,
    pub query: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

impl From<BrowseParams> for BrowseQuery {
    fn from(p: BrowseParams) -> Self {
        BrowseQuery {
            topic_prefix: p.topic_prefix,
            claims_status: p.claims_status,
            integration_status: p.integration_status,
            author: p.author,
            sequence_min: p.sequence_min,
            sequence_max: p.sequence_max,
            has_friction_above: p.has_friction_above,
            needs_review: p.needs_review,
            fragment_of: p.fragment_of,
            query: p.query,
            limit: p.limit,
            offset: p.offset,
        }
    }
}

pub async fn browse(
    State(state): State<AppState>,
    Path(notebook_id): Path<NotebookId>,
    auth: AuthContext,
    Query(params): Query<BrowseParams>,
) -> ApiResult<Json<Vec<Entry>>> {
    let entries = state
        .browser
        .browse(notebook_id, auth.author, auth.label, params.into())
        .await?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
pub struct ObserveParams {
    #[serde(default)]
    pub since: u64,
    pub topic_prefix: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

pub async fn observe(
    State(state): State<AppState>,
    Path(notebook_id): Path<NotebookId>,
    auth: AuthContext,
    Query(params): Query<ObserveParams>,
) -> ApiResult<Json<Vec<Entry>>> {
    let entries = state
        .browser
        .observe(notebook_id, auth.author, auth.label, params.since, params.topic_prefix, params.limit)
        .await?;
    Ok(Json(entries))
}
