use crate::ids::{AuthorId, EntryId};
use crate::model::ReviewStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row per entry awaiting or having gone through human review (§4.H).
/// Created whenever an untrusted author's write lands `review_status =
/// pending`, or a `needs_review` flag is raised by `COMPARE_CLAIMS`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryReview {
    pub entry_id: EntryId,
    pub status: ReviewStatus,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_by: Option<AuthorId>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl EntryReview {
    pub fn pending(entry_id: EntryId) -> Self {
        Self {
            entry_id,
            status: ReviewStatus::Pending,
            submitted_at: Utc::now(),
            reviewed_by: None,
            reviewed_at: None,
        }
    }
}
