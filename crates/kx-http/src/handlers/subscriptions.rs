//! Subscription management: not part of spec.md's literal HTTP surface
//! list, but §4.G is a full weighted module with no other externally
//! reachable entry point — modeled on the `/share` admin-action shape.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use kx_core::ids::{NotebookId, SubscriptionId};
use kx_core::model::SubscriptionScope;
use serde::{Deserialize, Serialize};

use crate::auth::AuthContext;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub source: NotebookId,
    pub scope: SubscriptionScope,
    #[serde(default)]
    pub topic_filter: Option<String>,
    pub discount_factor: f64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u32,
}

fn default_poll_interval() -> u32 {
    300
}

#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    pub id: SubscriptionId,
}

pub async fn subscribe(
    State(state): State<AppState>,
    Path(subscriber): Path<NotebookId>,
    auth: AuthContext,
    Json(req): Json<SubscribeRequest>,
) -> ApiResult<Json<SubscribeResponse>> {
    let id = state
        .subscriptions
        .subscribe(
            subscriber,
            req.source,
            req.scope,
            req.topic_filter,
            req.discount_factor,
            req.poll_interval_seconds,
            auth.author,
            auth.label,
        )
        .await?;
    Ok(Json(SubscribeResponse { id }))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    Path((_subscriber, subscription_id)): Path<(NotebookId, SubscriptionId)>,
    auth: AuthContext,
) -> ApiResult<StatusCode> {
    state.subscriptions.unsubscribe(subscription_id, auth.author, auth.label).await?;
    Ok(StatusCode::NO_CONTENT)
}
