//! # kx-browse
//!
//! Read surface over entries (§4.F): filtered browse, the sequence-cursor
//! change feed, and lexical/semantic/claims-batch search. Every entry
//! point gates through `kx-access::Gate` first, then applies the
//! submitter/admin visibility rule the storage layer's plain
//! `include_unapproved` flag can't express on its own (§3 invariant v).

pub mod browser;
pub mod search;

pub use browser::{BrowseQuery, Browser};
pub use search::{Embedder, NullEmbedder, SearchHit, SearchMode};
