//! # kx-subscription
//!
//! Notebook-to-notebook mirroring (§4.G): subscription lifecycle with
//! cycle prevention, and the per-subscription sync cycle the poll loop in
//! `kx-server` drives.

pub mod cycle;
pub mod manager;
pub mod poller;

pub use manager::Manager;
pub use poller::{Poller, SyncReport};
