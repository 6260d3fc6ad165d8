use axum::extract::{Path, State};
use axum::Json;
use kx_core::error::KxError;
use kx_core::ids::{EntryId, NotebookId};
use kx_core::model::Entry;
use kx_storage::queries::entries;
use kx_writer::{WriteRequest, WrittenEntry};
use serde::Deserialize;

use crate::auth::AuthContext;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WriteEntryRequest {
    pub content: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub references: Vec<EntryId>,
}

fn default_content_type() -> String {
    "text/plain".to_string()
}

fn into_write_request(notebook_id: NotebookId, auth: &AuthContext, req: WriteEntryRequest) -> WriteRequest {
    WriteRequest {
        notebook_id,
        author: auth.author,
        caller_label: auth.label.clone(),
        content: req.content.into_bytes(),
        content_type: req.content_type,
        topic: req.topic,
        references: req.references,
        revision_of: None,
    }
}

pub async fn write_entry(
    State(state): State<AppState>,
    Path(notebook_id): Path<NotebookId>,
    auth: AuthContext,
    Json(req): Json<WriteEntryRequest>,
) -> ApiResult<Json<Vec<WrittenEntry>>> {
    let written = state.writer.write(into_write_request(notebook_id, &auth, req)).await?;
    Ok(Json(written))
}

pub async fn revise_entry(
    State(state): State<AppState>,
    Path((notebook_id, entry_id)): Path<(NotebookId, EntryId)>,
    auth: AuthContext,
    Json(req): Json<WriteEntryRequest>,
) -> ApiResult<Json<Vec<WrittenEntry>>> {
    let written = state
        .writer
        .revise(into_write_request(notebook_id, &auth, req), entry_id)
        .await?;
    Ok(Json(written))
}

#[derive(Debug, serde::Serialize)]
pub struct EntryDetail {
    pub entry: Entry,
    pub revision_chain: Vec<Entry>,
    pub references: Vec<Entry>,
}

/// Read an entry plus its revision chain (walking `revision_of` back to the
/// root) and the entries its `references` resolve to.
pub async fn get_entry(
    State(state): State<AppState>,
    Path((notebook_id, entry_id)): Path<(NotebookId, EntryId)>,
    auth: AuthContext,
) -> ApiResult<Json<EntryDetail>> {
    let detail = state
        .engine
        .writer()
        .with_conn(move |conn| {
            kx_access::Gate::require_clearance(
                conn,
                notebook_id,
                auth.author,
                kx_core::model::AccessTier::Read,
                &auth.label,
            )?;

            let entry = entries::get(conn, entry_id)?
                .filter(|e| e.notebook_id == notebook_id)
                .ok_or_else(|| KxError::NotFound(format!("entry {entry_id}")))?;

            let mut revision_chain = Vec::new();
            let mut cursor = entry.revision_of;
            while let Some(prior_id) = cursor {
                let Some(prior) = entries::get(conn, prior_id)? else { break };
                cursor = prior.revision_of;
                revision_chain.push(prior);
            }

            let mut references = Vec::with_capacity(entry.references.len());
            for reference_id in &entry.references {
                if let Some(reference) = entries::get(conn, *reference_id)? {
                    references.push(reference);
                }
            }

            Ok(EntryDetail { entry, revision_chain, references })
        })
        .await?;
    Ok(Json(detail))
}

#[derive(Debug, Deserialize)]
pub struct BatchWriteRequest {
    pub entries: Vec<WriteEntryRequest>,
}

/// Batched write: every entry in the batch is written under the same
/// notebook lock sequence, so they land with contiguous sequence numbers
/// and either all persist or the request fails before any side effects
/// outside storage happen. A failure partway through does not roll back
/// entries already inserted — each `Writer::write` call is its own
/// atomic unit, same as calling the single-entry endpoint in a loop.
pub async fn batch_write(
    State(state): State<AppState>,
    Path(notebook_id): Path<NotebookId>,
    auth: AuthContext,
    Json(req): Json<BatchWriteRequest>,
) -> ApiResult<Json<Vec<WrittenEntry>>> {
    let mut written = Vec::new();
    for entry_req in req.entries {
        let result = state.writer.write(into_write_request(notebook_id, &auth, entry_req)).await?;
        written.extend(result);
    }
    Ok(Json(written))
}
