use crate::ids::{AuthorId, EntryId, NotebookId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimsStatus {
    Pending,
    Distilled,
    Verified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationStatus {
    Probation,
    Integrated,
    Orphan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Approved,
    Pending,
    Rejected,
}

/// One extracted factual statement with the distiller's confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub text: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    pub claim_a: String,
    pub claim_b: String,
    pub severity: f64,
}

/// Per-peer comparison result, appended to `Entry::comparisons` as each
/// `COMPARE_CLAIMS` job lands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub compared_against: EntryId,
    pub entropy: f64,
    pub friction: f64,
    pub contradictions: Vec<Contradiction>,
    pub is_mirrored: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub notebook_id: NotebookId,
    pub sequence: u64,
    pub content: Vec<u8>,
    pub content_type: String,
    pub original_content_type: Option<String>,
    pub topic: Option<String>,
    pub author: AuthorId,
    pub signature: Vec<u8>,
    pub revision_of: Option<EntryId>,
    pub references: Vec<EntryId>,
    pub fragment_of: Option<EntryId>,
    pub fragment_index: Option<u32>,
    pub claims: Vec<ClaimRecord>,
    pub claims_status: ClaimsStatus,
    pub comparisons: Vec<Comparison>,
    pub max_friction: Option<f64>,
    pub needs_review: bool,
    pub embedding: Option<Vec<f32>>,
    pub integration_status: IntegrationStatus,
    pub review_status: ReviewStatus,
    pub expected_comparisons: Option<u32>,
    pub created: DateTime<Utc>,
}

impl Entry {
    /// Invariant (vi): `max_friction` is the max friction across current
    /// comparisons, or `None` if there are none.
    pub fn recompute_max_friction(&mut self) {
        self.max_friction = self
            .comparisons
            .iter()
            .map(|c| c.friction)
            .fold(None, |acc, f| Some(acc.map_or(f, |a: f64| a.max(f))));
    }

    /// Invariant (vii): `needs_review` iff `max_friction >= review_threshold`.
    pub fn recompute_needs_review(&mut self, review_threshold: f64) {
        self.needs_review = self.max_friction.is_some_and(|f| f >= review_threshold);
    }

    /// Invariant (vii) restated: whether all jobs' comparisons have landed.
    pub fn all_comparisons_landed(&self) -> bool {
        match self.expected_comparisons {
            Some(expected) => self.comparisons.len() as u32 >= expected,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::EntryId;

    fn comparison(friction: f64) -> Comparison {
        Comparison {
            compared_against: EntryId::new(),
            entropy: 0.0,
            friction,
            contradictions: vec![],
            is_mirrored: false,
        }
    }

    fn blank_entry() -> Entry {
        Entry {
            id: EntryId::new(),
            notebook_id: crate::ids::NotebookId::new(),
            sequence: 1,
            content: vec![],
            content_type: "text/plain".into(),
            original_content_type: None,
            topic: None,
            author: crate::ids::AuthorId::from_public_key(b"k"),
            signature: vec![],
            revision_of: None,
            references: vec![],
            fragment_of: None,
            fragment_index: None,
            claims: vec![],
            claims_status: ClaimsStatus::Pending,
            comparisons: vec![],
            max_friction: None,
            needs_review: false,
            embedding: None,
            integration_status: IntegrationStatus::Probation,
            review_status: ReviewStatus::Approved,
            expected_comparisons: None,
            created: Utc::now(),
        }
    }

    #[test]
    fn max_friction_is_none_when_no_comparisons() {
        let e = blank_entry();
        let mut e = e;
        e.recompute_max_friction();
        assert_eq!(e.max_friction, None);
    }

    #[test]
    fn max_friction_is_max_across_comparisons() {
        let mut e = blank_entry();
        e.comparisons = vec![comparison(0.2), comparison(0.9), comparison(0.5)];
        e.recompute_max_friction();
        assert_eq!(e.max_friction, Some(0.9));
    }

    #[test]
    fn needs_review_tracks_threshold() {
        let mut e = blank_entry();
        e.comparisons = vec![comparison(0.6)];
        e.recompute_max_friction();
        e.recompute_needs_review(0.7);
        assert!(!e.needs_review);
        e.recompute_needs_review(0.6);
        assert!(e.needs_review);
    }

    #[test]
    fn all_comparisons_landed_requires_expected_count() {
        let mut e = blank_entry();
        assert!(!e.all_comparisons_landed());
        e.expected_comparisons = Some(2);
        e.comparisons = vec![comparison(0.1)];
        assert!(!e.all_comparisons_landed());
        e.comparisons.push(comparison(0.2));
        assert!(e.all_comparisons_landed());
    }
}
