//! # kx-storage
//!
//! Durable storage, atomic sequencing, and indexed queries (§4.A). A single
//! writer connection (SQLite, WAL mode) serializes every mutation — this
//! is what makes sequence assignment and `Claim`'s skip-locked scan atomic
//! by construction, the same guarantee the teacher's `StorageEngine`
//! ("single write connection + read pool") gives the Cortex memory store.
//!
//! Every blocking `rusqlite` call is pushed onto `spawn_blocking` so the
//! async request/worker-poll surface above never blocks the runtime.

pub mod audit;
pub mod engine;
pub mod pool;
pub mod queries;
pub mod schema;

pub use engine::StorageEngine;
