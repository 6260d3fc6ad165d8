use std::collections::BTreeSet;

use axum::extract::State;
use axum::Json;
use kx_core::ids::NotebookId;
use kx_core::model::{ClassificationLevel, Notebook};
use kx_storage::queries::notebooks;
use serde::{Deserialize, Serialize};

use crate::auth::AuthContext;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateNotebookRequest {
    pub name: String,
    #[serde(default)]
    pub classification: Option<ClassificationLevel>,
    #[serde(default)]
    pub compartments: BTreeSet<String>,
    #[serde(default)]
    pub review_threshold: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct CreateNotebookResponse {
    pub id: NotebookId,
}

pub async fn create_notebook(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateNotebookRequest>,
) -> ApiResult<Json<CreateNotebookResponse>> {
    let notebook = Notebook {
        id: NotebookId::new(),
        name: req.name,
        owner_author: auth.author,
        created: chrono::Utc::now(),
        current_sequence: 0,
        classification_level: req.classification.unwrap_or(ClassificationLevel::Internal),
        compartments: req.compartments,
        review_threshold: req.review_threshold.unwrap_or(state.config.review.friction_threshold),
    };
    let id = notebook.id;
    state.engine.writer().with_conn(move |conn| notebooks::insert(conn, &notebook)).await?;
    Ok(Json(CreateNotebookResponse { id }))
}

pub async fn list_notebooks(State(state): State<AppState>, auth: AuthContext) -> ApiResult<Json<Vec<Notebook>>> {
    let visible = state
        .engine
        .writer()
        .with_conn(move |conn| notebooks::list_visible(conn, auth.author))
        .await?;
    Ok(Json(visible))
}
