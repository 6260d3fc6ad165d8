//! # kx-writer
//!
//! Entry writer (§4.C): gate, quota, normalize, clean, fragment, persist,
//! review gate, pipeline kickoff, audit — one ordered sequence of fallible
//! steps per write, mirroring the teacher's ingest-pipeline shape.

pub mod cleanup;
pub mod fragment;
pub mod normalize;
pub mod writer;

pub use writer::{QuotaSource, UnlimitedQuota, WriteRequest, Writer, WrittenEntry};
