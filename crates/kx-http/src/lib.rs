//! HTTP surface over the knowledge-exchange service (spec.md §6): a thin
//! translation layer between axum and the `kx-*` crates underneath it —
//! handlers gate, call, and serialize, nothing more.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod state;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/notebooks", post(handlers::notebooks::create_notebook).get(handlers::notebooks::list_notebooks))
        .route("/notebooks/{id}/entries", post(handlers::entries::write_entry))
        .route("/notebooks/{id}/entries/{eid}", put(handlers::entries::revise_entry).get(handlers::entries::get_entry))
        .route("/notebooks/{id}/batch", post(handlers::entries::batch_write))
        .route("/notebooks/{id}/browse", get(handlers::browse::browse))
        .route("/notebooks/{id}/observe", get(handlers::browse::observe))
        .route("/notebooks/{id}/search", get(handlers::search::search))
        .route("/notebooks/{id}/share", post(handlers::share::grant))
        .route("/notebooks/{id}/share/{author}", delete(handlers::share::revoke))
        .route("/notebooks/{id}/jobs/next", get(handlers::jobs::claim_next))
        .route("/notebooks/{id}/jobs/{jid}/complete", post(handlers::jobs::complete))
        .route("/notebooks/{id}/jobs/{jid}/fail", post(handlers::jobs::fail))
        .route("/notebooks/{id}/jobs/stats", get(handlers::jobs::stats))
        .route("/notebooks/{id}/subscriptions", post(handlers::subscriptions::subscribe))
        .route("/notebooks/{id}/subscriptions/{sid}", delete(handlers::subscriptions::unsubscribe))
        .route("/notebooks/{id}/entries/{eid}/review", post(handlers::reviews::decide))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
