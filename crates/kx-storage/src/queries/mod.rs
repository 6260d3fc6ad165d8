//! Repository-style query modules: explicit operations with targeted
//! column updates, never a whole-row read-modify-write (Design Notes §9).

pub mod access;
pub mod authors;
pub mod entries;
pub mod jobs;
pub mod notebooks;
pub mod reviews;
pub mod subscriptions;
