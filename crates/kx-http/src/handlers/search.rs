use axum::extract::{Path, Query, State};
use axum::Json;
use kx_browse::search::SearchHit;
use kx_core::ids::NotebookId;
use serde::Deserialize;

use crate::auth::AuthContext;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchModeParam {
    Lexical,
    Semantic,
}

fn default_k() -> usize {
    10
}

fn default_min_similarity() -> f64 {
    0.0
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub mode: SearchModeParam,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
}

pub async fn search(
    State(state): State<AppState>,
    Path(notebook_id): Path<NotebookId>,
    auth: AuthContext,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<SearchHit>>> {
    let hits = match params.mode {
        SearchModeParam::Lexical => {
            state
                .browser
                .search_lexical(notebook_id, auth.author, auth.label, params.q, params.k as u32)
                .await?
        }
        SearchModeParam::Semantic => {
            state
                .browser
                .search_semantic(
                    notebook_id,
                    auth.author,
                    auth.label,
                    &params.q,
                    params.k,
                    params.min_similarity,
                    state.embedder.as_ref(),
                )
                .await?
        }
    };
    Ok(Json(hits))
}
