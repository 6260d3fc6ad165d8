use crate::ids::{AuthorId, EntryId, NotebookId, SubscriptionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionScope {
    Catalog,
    Claims,
    Entries,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Active,
    Paused,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub subscriber_notebook: NotebookId,
    pub source_notebook: NotebookId,
    pub scope: SubscriptionScope,
    pub topic_filter: Option<String>,
    pub discount_factor: f64,
    pub poll_interval_seconds: u32,
    /// Source sequence up to which this subscription has been synced.
    pub watermark: u64,
    pub sync_status: SyncStatus,
    pub mirrored_count: u64,
    pub approved_by: AuthorId,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl Subscription {
    pub const MIN_POLL_INTERVAL_SECONDS: u32 = 10;

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_sync_at {
            None => true,
            Some(last) => {
                (now - last).num_seconds() >= i64::from(self.poll_interval_seconds)
            }
        }
    }
}

/// A read-only shadow of a source entry inside the subscriber notebook,
/// keyed by `(subscription_id, source_entry_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirroredEntry {
    pub subscription_id: SubscriptionId,
    pub source_entry_id: EntryId,
    pub source_sequence: u64,
    pub claims: Vec<crate::model::ClaimRecord>,
    pub embedding: Option<Vec<f32>>,
    pub topic: Option<String>,
    pub tombstoned: bool,
}

/// Alias kept for call sites that only care about the claim payload of a
/// mirrored row (the spec's "Mirrored Claim" is the same row as
/// `MirroredEntry` — a shadow keyed by subscription + source entry id).
pub type MirroredClaim = MirroredEntry;
