//! Review-gate storage (§4.H). One row per entry that ever needed human
//! sign-off, created by the writer on untrusted submission and updated by
//! the reviewer's decision.

use chrono::{DateTime, Utc};
use kx_core::error::KxError;
use kx_core::ids::{AuthorId, EntryId};
use kx_core::model::{EntryReview, ReviewStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};

pub fn insert(conn: &Connection, review: &EntryReview) -> Result<(), KxError> {
    conn.execute(
        "INSERT INTO entry_reviews (entry_id, status, submitted_at, reviewed_by, reviewed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            review.entry_id.to_string(),
            status_str(review.status.clone()),
            review.submitted_at.to_rfc3339(),
            review.reviewed_by.map(|a| a.to_hex()),
            review.reviewed_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, entry_id: EntryId) -> Result<Option<EntryReview>, KxError> {
    conn.query_row(
        "SELECT entry_id, status, submitted_at, reviewed_by, reviewed_at FROM entry_reviews WHERE entry_id = ?1",
        params![entry_id.to_string()],
        row_to_review,
    )
    .optional()
    .map_err(KxError::from)
}

pub fn list_pending(conn: &Connection, limit: u32) -> Result<Vec<EntryReview>, KxError> {
    let mut stmt = conn.prepare(
        "SELECT entry_id, status, submitted_at, reviewed_by, reviewed_at
         FROM entry_reviews WHERE status = 'pending' ORDER BY submitted_at ASC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], row_to_review)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(KxError::from)
}

/// Records a reviewer's decision (`Approved`/`Rejected`). The caller is
/// responsible for also updating `entries.review_status` to match.
pub fn decide(
    conn: &Connection,
    entry_id: EntryId,
    status: ReviewStatus,
    reviewed_by: AuthorId,
    reviewed_at: DateTime<Utc>,
) -> Result<(), KxError> {
    conn.execute(
        "UPDATE entry_reviews SET status = ?1, reviewed_by = ?2, reviewed_at = ?3 WHERE entry_id = ?4",
        params![
            status_str(status),
            reviewed_by.to_hex(),
            reviewed_at.to_rfc3339(),
            entry_id.to_string(),
        ],
    )?;
    Ok(())
}

fn row_to_review(row: &Row<'_>) -> rusqlite::Result<EntryReview> {
    let entry_id: String = row.get(0)?;
    let status: String = row.get(1)?;
    let submitted_at: String = row.get(2)?;
    let reviewed_by: Option<String> = row.get(3)?;
    let reviewed_at: Option<String> = row.get(4)?;
    Ok(EntryReview {
        entry_id: entry_id.parse().unwrap_or(EntryId::nil()),
        status: str_to_status(&status),
        submitted_at: DateTime::parse_from_rfc3339(&submitted_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        reviewed_by: reviewed_by.and_then(|s| AuthorId::from_hex(&s).ok()),
        reviewed_at: reviewed_at
            .as_deref()
            .map(|s| DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())),
    })
}

fn status_str(s: ReviewStatus) -> &'static str {
    match s {
        ReviewStatus::Approved => "approved",
        ReviewStatus::Pending => "pending",
        ReviewStatus::Rejected => "rejected",
    }
}

fn str_to_status(s: &str) -> ReviewStatus {
    match s {
        "pending" => ReviewStatus::Pending,
        "rejected" => ReviewStatus::Rejected,
        _ => ReviewStatus::Approved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StorageEngine;
    use crate::queries::{authors, entries, notebooks};
    use kx_core::model::{Author, ClaimsStatus, ClassificationLevel, Entry, IntegrationStatus, Notebook};
    use kx_core::ids::NotebookId;
    use std::collections::BTreeSet;

    fn setup() -> (StorageEngine, EntryId) {
        let engine = StorageEngine::open_in_memory().unwrap();
        let owner = AuthorId::from_public_key(b"owner");
        let nb = Notebook {
            id: NotebookId::new(),
            name: "n".into(),
            owner_author: owner,
            created: Utc::now(),
            current_sequence: 0,
            classification_level: ClassificationLevel::Internal,
            compartments: BTreeSet::new(),
            review_threshold: 0.7,
        };
        let mut entry = Entry {
            id: EntryId::new(),
            notebook_id: nb.id,
            sequence: 0,
            content: b"x".to_vec(),
            content_type: "text/plain".into(),
            original_content_type: None,
            topic: None,
            author: owner,
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
            review_status: ReviewStatus::Pending,
            expected_comparisons: None,
            created: Utc::now(),
        };
        engine
            .writer()
            .with_conn_sync(|conn| {
                authors::insert(conn, &Author { id: owner, public_key: b"owner".to_vec(), trusted: true })?;
                notebooks::insert(conn, &nb)?;
                entries::insert_with_next_sequence(conn, &mut entry)
            })
            .unwrap();
        (engine, entry.id)
    }

    #[test]
    fn pending_review_shows_up_in_list_pending_until_decided() {
        let (engine, entry_id) = setup();
        let reviewer = AuthorId::from_public_key(b"reviewer");
        engine
            .writer()
            .with_conn_sync(|conn| insert(conn, &EntryReview::pending(entry_id)))
            .unwrap();

        let pending = engine.writer().with_conn_sync(|conn| list_pending(conn, 10)).unwrap();
        assert_eq!(pending.len(), 1);

        engine
            .writer()
            .with_conn_sync(|conn| decide(conn, entry_id, ReviewStatus::Approved, reviewer, Utc::now()))
            .unwrap();

        let pending = engine.writer().with_conn_sync(|conn| list_pending(conn, 10)).unwrap();
        assert!(pending.is_empty());

        let record = engine.writer().with_conn_sync(|conn| get(conn, entry_id)).unwrap().unwrap();
        assert_eq!(record.status, ReviewStatus::Approved);
        assert_eq!(record.reviewed_by, Some(reviewer));
    }
}
