//! # kx-core
//!
//! Domain types, error taxonomy, and configuration shared by every other
//! crate in the knowledge-exchange workspace. Nothing here touches SQLite,
//! HTTP, or the job queue directly — those are repository-style concerns
//! layered on top in `kx-storage`, `kx-http`, and `kx-queue`.

pub mod config;
pub mod error;
pub mod ids;
pub mod model;

pub use error::{KxError, KxResult};
