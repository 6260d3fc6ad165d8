//! Entry CRUD, browse/observe/search queries (§4.A, §4.F). Every update
//! here targets specific columns — never a whole-row read-modify-write,
//! per Design Notes §9.

use kx_core::error::KxError;
use kx_core::ids::{EntryId, NotebookId};
use kx_core::model::{
    ClaimRecord, ClaimsStatus, Comparison, Entry, IntegrationStatus, ReviewStatus,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::notebooks;

/// Insert `entry` after atomically reserving the next sequence for its
/// notebook (invariant (ii)). Caller must not set `entry.sequence` —
/// it is overwritten here and returned.
///
/// Both statements run inside the single call holding the writer lock
/// (see `kx_storage::pool::Writer`), so no other caller can observe or
/// interleave between the reservation and the insert.
pub fn insert_with_next_sequence(conn: &Connection, entry: &mut Entry) -> Result<u64, KxError> {
    let sequence = notebooks::next_sequence(conn, entry.notebook_id)?;
    entry.sequence = sequence;
    insert(conn, entry)?;
    Ok(sequence)
}

pub fn insert(conn: &Connection, entry: &Entry) -> Result<(), KxError> {
    conn.execute(
        "INSERT INTO entries (
            id, notebook_id, sequence, content, content_type, original_content_type, topic,
            author, signature, revision_of, references_json, fragment_of, fragment_index,
            claims_json, claims_status, comparisons_json, max_friction, needs_review, embedding,
            integration_status, review_status, expected_comparisons, created
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19,
            ?20, ?21, ?22, ?23
        )",
        params![
            entry.id.to_string(),
            entry.notebook_id.to_string(),
            entry.sequence,
            entry.content,
            entry.content_type,
            entry.original_content_type,
            entry.topic,
            entry.author.to_hex(),
            entry.signature,
            entry.revision_of.map(|e| e.to_string()),
            serde_json::to_string(&entry.references)?,
            entry.fragment_of.map(|e| e.to_string()),
            entry.fragment_index,
            serde_json::to_string(&entry.claims)?,
            claims_status_str(entry.claims_status.clone()),
            serde_json::to_string(&entry.comparisons)?,
            entry.max_friction,
            entry.needs_review as i64,
            entry.embedding.as_ref().map(|e| serde_json::to_vec(e)).transpose()?,
            integration_status_str(entry.integration_status.clone()),
            review_status_str(entry.review_status.clone()),
            entry.expected_comparisons,
            entry.created.to_rfc3339(),
        ],
    )?;
    conn.execute(
        "INSERT INTO entries_fts (entry_id, content, topic) VALUES (?1, ?2, ?3)",
        params![
            entry.id.to_string(),
            String::from_utf8_lossy(&entry.content),
            entry.topic,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: EntryId) -> Result<Option<Entry>, KxError> {
    conn.query_row(&format!("{SELECT_ENTRY} WHERE id = ?1"), params![id.to_string()], row_to_entry)
        .optional()
        .map_err(KxError::from)
}

/// Targeted update: claims + claims_status (DISTILL_CLAIMS completion).
pub fn update_claims(
    conn: &Connection,
    id: EntryId,
    claims: &[ClaimRecord],
    status: ClaimsStatus,
) -> Result<(), KxError> {
    conn.execute(
        "UPDATE entries SET claims_json = ?1, claims_status = ?2 WHERE id = ?3",
        params![serde_json::to_string(claims)?, claims_status_str(status), id.to_string()],
    )?;
    Ok(())
}

/// Targeted update: embedding (EMBED_CLAIMS completion).
pub fn update_embedding(conn: &Connection, id: EntryId, embedding: &[f32]) -> Result<(), KxError> {
    conn.execute(
        "UPDATE entries SET embedding = ?1 WHERE id = ?2",
        params![serde_json::to_vec(embedding)?, id.to_string()],
    )?;
    Ok(())
}

/// Targeted update: expected_comparisons (set once EMBED_CLAIMS enqueues
/// the COMPARE_CLAIMS fan-out).
pub fn set_expected_comparisons(conn: &Connection, id: EntryId, expected: u32) -> Result<(), KxError> {
    conn.execute(
        "UPDATE entries SET expected_comparisons = ?1 WHERE id = ?2",
        params![expected, id.to_string()],
    )?;
    Ok(())
}

/// Targeted update: append one comparison and recompute the cached
/// max_friction/needs_review/claims_status columns (invariants (vi),
/// (vii)). Read-append-write is safe here because the whole operation
/// runs under the writer lock.
pub fn append_comparison(
    conn: &Connection,
    id: EntryId,
    comparison: Comparison,
    review_threshold: f64,
) -> Result<Entry, KxError> {
    let mut entry = get(conn, id)?.ok_or_else(|| KxError::NotFound(format!("entry {id}")))?;
    entry.comparisons.push(comparison);
    entry.recompute_max_friction();
    entry.recompute_needs_review(review_threshold);
    if entry.all_comparisons_landed() {
        entry.claims_status = ClaimsStatus::Verified;
    }
    conn.execute(
        "UPDATE entries SET comparisons_json = ?1, max_friction = ?2, needs_review = ?3, claims_status = ?4 WHERE id = ?5",
        params![
            serde_json::to_string(&entry.comparisons)?,
            entry.max_friction,
            entry.needs_review as i64,
            claims_status_str(entry.claims_status.clone()),
            id.to_string(),
        ],
    )?;
    Ok(entry)
}

/// Targeted update: integration_status (COMPARE_CLAIMS completion).
pub fn update_integration_status(
    conn: &Connection,
    id: EntryId,
    status: IntegrationStatus,
) -> Result<(), KxError> {
    conn.execute(
        "UPDATE entries SET integration_status = ?1 WHERE id = ?2",
        params![integration_status_str(status), id.to_string()],
    )?;
    Ok(())
}

/// Targeted update: topic (CLASSIFY_TOPIC completion).
pub fn update_topic(conn: &Connection, id: EntryId, topic: &str) -> Result<(), KxError> {
    conn.execute("UPDATE entries SET topic = ?1 WHERE id = ?2", params![topic, id.to_string()])?;
    conn.execute(
        "UPDATE entries_fts SET topic = ?1 WHERE entry_id = ?2",
        params![topic, id.to_string()],
    )?;
    Ok(())
}

/// Targeted update: review_status (review gate transition).
pub fn update_review_status(conn: &Connection, id: EntryId, status: ReviewStatus) -> Result<(), KxError> {
    conn.execute(
        "UPDATE entries SET review_status = ?1 WHERE id = ?2",
        params![review_status_str(status), id.to_string()],
    )?;
    Ok(())
}

/// Browse predicates from §4.F, AND-combined, with stable ascending
/// sequence ordering and `(limit, offset)` pagination.
#[derive(Debug, Clone, Default)]
pub struct BrowseFilter {
    pub topic_prefix: Option<String>,
    pub claims_status: Option<ClaimsStatus>,
    pub integration_status: Option<IntegrationStatus>,
    pub author: Option<kx_core::ids::AuthorId>,
    pub sequence_min: Option<u64>,
    pub sequence_max: Option<u64>,
    pub has_friction_above: Option<f64>,
    pub needs_review: Option<bool>,
    pub fragment_of: Option<EntryId>,
    pub query: Option<String>,
    pub limit: u32,
    pub offset: u32,
    /// Only reviewer/owner callers may see non-approved entries.
    pub include_unapproved: bool,
}

pub fn browse(conn: &Connection, notebook_id: NotebookId, filter: &BrowseFilter) -> Result<Vec<Entry>, KxError> {
    let mut sql = format!("{SELECT_ENTRY} WHERE notebook_id = ?1");
    let mut idx = 2;
    let mut binds: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(notebook_id.to_string())];

    if !filter.include_unapproved {
        sql.push_str(" AND review_status = 'approved'");
    }
    if let Some(prefix) = &filter.topic_prefix {
        sql.push_str(&format!(" AND topic LIKE ?{idx}"));
        binds.push(Box::new(format!("{prefix}%")));
        idx += 1;
    }
    if let Some(status) = filter.claims_status.clone() {
        sql.push_str(&format!(" AND claims_status = ?{idx}"));
        binds.push(Box::new(claims_status_str(status).to_string()));
        idx += 1;
    }
    if let Some(status) = filter.integration_status.clone() {
        sql.push_str(&format!(" AND integration_status = ?{idx}"));
        binds.push(Box::new(integration_status_str(status).to_string()));
        idx += 1;
    }
    if let Some(author) = filter.author {
        sql.push_str(&format!(" AND author = ?{idx}"));
        binds.push(Box::new(author.to_hex()));
        idx += 1;
    }
    if let Some(min) = filter.sequence_min {
        sql.push_str(&format!(" AND sequence >= ?{idx}"));
        binds.push(Box::new(min));
        idx += 1;
    }
    if let Some(max) = filter.sequence_max {
        sql.push_str(&format!(" AND sequence <= ?{idx}"));
        binds.push(Box::new(max));
        idx += 1;
    }
    if let Some(threshold) = filter.has_friction_above {
        sql.push_str(&format!(" AND max_friction > ?{idx}"));
        binds.push(Box::new(threshold));
        idx += 1;
    }
    if let Some(needs_review) = filter.needs_review {
        sql.push_str(&format!(" AND needs_review = ?{idx}"));
        binds.push(Box::new(needs_review as i64));
        idx += 1;
    }
    if let Some(fragment_of) = filter.fragment_of {
        sql.push_str(&format!(" AND fragment_of = ?{idx}"));
        binds.push(Box::new(fragment_of.to_string()));
        idx += 1;
    }
    if let Some(query) = &filter.query {
        sql.push_str(&format!(
            " AND id IN (SELECT entry_id FROM entries_fts WHERE entries_fts MATCH ?{idx})"
        ));
        binds.push(Box::new(query.clone()));
        idx += 1;
    }

    sql.push_str(&format!(" ORDER BY sequence ASC LIMIT ?{idx} OFFSET ?{}", idx + 1));
    binds.push(Box::new(filter.limit.min(500)));
    binds.push(Box::new(filter.offset));

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = binds.iter().map(|b| b.as_ref()).collect();
    let rows = stmt.query_map(param_refs.as_slice(), row_to_entry)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(KxError::from)
}

/// Change feed: entries with `sequence > since_sequence`, ascending,
/// capped by `limit`. Resumable because the per-notebook sequence is
/// monotonic.
pub fn observe(
    conn: &Connection,
    notebook_id: NotebookId,
    since_sequence: u64,
    topic_prefix: Option<&str>,
    limit: u32,
) -> Result<Vec<Entry>, KxError> {
    let sql = if topic_prefix.is_some() {
        format!("{SELECT_ENTRY} WHERE notebook_id = ?1 AND sequence > ?2 AND review_status = 'approved' AND topic LIKE ?3 ORDER BY sequence ASC LIMIT ?4")
    } else {
        format!("{SELECT_ENTRY} WHERE notebook_id = ?1 AND sequence > ?2 AND review_status = 'approved' ORDER BY sequence ASC LIMIT ?3")
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = if let Some(prefix) = topic_prefix {
        stmt.query_map(
            params![notebook_id.to_string(), since_sequence, format!("{prefix}%"), limit.min(500)],
            row_to_entry,
        )?
        .collect::<Result<Vec<_>, _>>()
    } else {
        stmt.query_map(params![notebook_id.to_string(), since_sequence, limit.min(500)], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()
    };
    rows.map_err(KxError::from)
}

/// Brute-force cosine-similarity k-nearest-neighbor lookup. Good enough at
/// the scale a single notebook reaches; a real deployment would push this
/// into a vector index, which is explicitly out of scope (§1 Non-goals
/// don't name it, but no ANN library sits in the teacher's dependency
/// stack, so a linear scan is the grounded choice here).
pub fn semantic_search(
    conn: &Connection,
    notebook_id: NotebookId,
    query_embedding: &[f32],
    k: usize,
    min_similarity: f64,
) -> Result<Vec<(Entry, f64)>, KxError> {
    let candidates = browse(
        conn,
        notebook_id,
        &BrowseFilter {
            limit: 500,
            ..Default::default()
        },
    )?;
    let mut scored: Vec<(Entry, f64)> = candidates
        .into_iter()
        .filter_map(|e| {
            let sim = cosine_similarity(query_embedding, e.embedding.as_deref()?);
            (sim >= min_similarity).then_some((e, sim))
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    Ok(scored)
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)) as f64
    }
}

const SELECT_ENTRY: &str = "SELECT
    id, notebook_id, sequence, content, content_type, original_content_type, topic, author,
    signature, revision_of, references_json, fragment_of, fragment_index, claims_json,
    claims_status, comparisons_json, max_friction, needs_review, embedding, integration_status,
    review_status, expected_comparisons, created
    FROM entries";

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<Entry> {
    let id: String = row.get(0)?;
    let notebook_id: String = row.get(1)?;
    let author: String = row.get(7)?;
    let revision_of: Option<String> = row.get(9)?;
    let references_json: String = row.get(10)?;
    let fragment_of: Option<String> = row.get(11)?;
    let claims_json: String = row.get(13)?;
    let claims_status: String = row.get(14)?;
    let comparisons_json: String = row.get(15)?;
    let embedding: Option<Vec<u8>> = row.get(18)?;
    let integration_status: String = row.get(19)?;
    let review_status: String = row.get(20)?;
    let created: String = row.get(22)?;

    Ok(Entry {
        id: id.parse().unwrap_or(EntryId::nil()),
        notebook_id: notebook_id.parse().unwrap_or(NotebookId::nil()),
        sequence: row.get(2)?,
        content: row.get(3)?,
        content_type: row.get(4)?,
        original_content_type: row.get(5)?,
        topic: row.get(6)?,
        author: kx_core::ids::AuthorId::from_hex(&author)
            .unwrap_or_else(|_| kx_core::ids::AuthorId::from_public_key(b"")),
        signature: row.get(8)?,
        revision_of: revision_of.and_then(|s| s.parse().ok()),
        references: serde_json::from_str(&references_json).unwrap_or_default(),
        fragment_of: fragment_of.and_then(|s| s.parse().ok()),
        fragment_index: row.get(12)?,
        claims: serde_json::from_str(&claims_json).unwrap_or_default(),
        claims_status: str_to_claims_status(&claims_status),
        comparisons: serde_json::from_str(&comparisons_json).unwrap_or_default(),
        max_friction: row.get(16)?,
        needs_review: row.get::<_, i64>(17)? != 0,
        embedding: embedding.and_then(|b| serde_json::from_slice(&b).ok()),
        integration_status: str_to_integration_status(&integration_status),
        review_status: str_to_review_status(&review_status),
        expected_comparisons: row.get(21)?,
        created: chrono::DateTime::parse_from_rfc3339(&created)
            .map(|t| t.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
    })
}

fn claims_status_str(s: ClaimsStatus) -> &'static str {
    match s {
        ClaimsStatus::Pending => "pending",
        ClaimsStatus::Distilled => "distilled",
        ClaimsStatus::Verified => "verified",
    }
}

fn str_to_claims_status(s: &str) -> ClaimsStatus {
    match s {
        "distilled" => ClaimsStatus::Distilled,
        "verified" => ClaimsStatus::Verified,
        _ => ClaimsStatus::Pending,
    }
}

fn integration_status_str(s: IntegrationStatus) -> &'static str {
    match s {
        IntegrationStatus::Probation => "probation",
        IntegrationStatus::Integrated => "integrated",
        IntegrationStatus::Orphan => "orphan",
    }
}

fn str_to_integration_status(s: &str) -> IntegrationStatus {
    match s {
        "integrated" => IntegrationStatus::Integrated,
        "orphan" => IntegrationStatus::Orphan,
        _ => IntegrationStatus::Probation,
    }
}

fn review_status_str(s: ReviewStatus) -> &'static str {
    match s {
        ReviewStatus::Approved => "approved",
        ReviewStatus::Pending => "pending",
        ReviewStatus::Rejected => "rejected",
    }
}

fn str_to_review_status(s: &str) -> ReviewStatus {
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
    use kx_core::ids::AuthorId;
    use kx_core::model::{Author, ClassificationLevel, Notebook};
    use std::collections::BTreeSet;

    fn setup() -> (StorageEngine, NotebookId, AuthorId) {
        let engine = StorageEngine::open_in_memory().unwrap();
        let owner = AuthorId::from_public_key(b"owner");
        let notebook = Notebook {
            id: NotebookId::new(),
            name: "n".into(),
            owner_author: owner,
            created: chrono::Utc::now(),
            current_sequence: 0,
            classification_level: ClassificationLevel::Internal,
            compartments: BTreeSet::new(),
            review_threshold: 0.7,
        };
        let nb_id = notebook.id;
        engine
            .writer()
            .with_conn_sync(|conn| {
                super::super::authors::insert(
                    conn,
                    &Author { id: owner, public_key: b"owner".to_vec(), trusted: true },
                )?;
                super::super::notebooks::insert(conn, &notebook)
            })
            .unwrap();
        (engine, nb_id, owner)
    }

    fn blank_entry(notebook_id: NotebookId, author: AuthorId) -> Entry {
        Entry {
            id: EntryId::new(),
            notebook_id,
            sequence: 0,
            content: b"hello world".to_vec(),
            content_type: "text/plain".into(),
            original_content_type: None,
            topic: Some("science/physics".into()),
            author,
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
            created: chrono::Utc::now(),
        }
    }

    #[test]
    fn insert_with_next_sequence_assigns_distinct_sequences() {
        let (engine, nb_id, author) = setup();
        let seqs: Vec<u64> = (0..3)
            .map(|_| {
                let mut e = blank_entry(nb_id, author);
                engine.writer().with_conn_sync(|conn| insert_with_next_sequence(conn, &mut e)).unwrap()
            })
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn observe_returns_only_entries_after_watermark() {
        let (engine, nb_id, author) = setup();
        let mut ids = vec![];
        for _ in 0..5 {
            let mut e = blank_entry(nb_id, author);
            engine.writer().with_conn_sync(|conn| insert_with_next_sequence(conn, &mut e)).unwrap();
            ids.push(e.id);
        }
        let after = engine
            .writer()
            .with_conn_sync(|conn| observe(conn, nb_id, 2, None, 100))
            .unwrap();
        assert_eq!(after.len(), 3);
        assert!(after.iter().all(|e| e.sequence > 2));
    }

    #[test]
    fn browse_excludes_unapproved_unless_requested() {
        let (engine, nb_id, author) = setup();
        let mut approved = blank_entry(nb_id, author);
        let mut pending = blank_entry(nb_id, author);
        pending.review_status = ReviewStatus::Pending;
        engine
            .writer()
            .with_conn_sync(|conn| {
                insert_with_next_sequence(conn, &mut approved)?;
                insert_with_next_sequence(conn, &mut pending)
            })
            .unwrap();

        let visible = engine
            .writer()
            .with_conn_sync(|conn| browse(conn, nb_id, &BrowseFilter { limit: 100, ..Default::default() }))
            .unwrap();
        assert_eq!(visible.len(), 1);

        let all = engine
            .writer()
            .with_conn_sync(|conn| {
                browse(conn, nb_id, &BrowseFilter { limit: 100, include_unapproved: true, ..Default::default() })
            })
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn append_comparison_updates_cached_friction_and_review_flag() {
        let (engine, nb_id, author) = setup();
        let mut e = blank_entry(nb_id, author);
        e.expected_comparisons = Some(1);
        engine.writer().with_conn_sync(|conn| insert_with_next_sequence(conn, &mut e)).unwrap();

        let peer = EntryId::new();
        let updated = engine
            .writer()
            .with_conn_sync(|conn| {
                append_comparison(
                    conn,
                    e.id,
                    Comparison {
                        compared_against: peer,
                        entropy: 0.1,
                        friction: 0.9,
                        contradictions: vec![],
                        is_mirrored: false,
                    },
                    0.7,
                )
            })
            .unwrap();
        assert_eq!(updated.max_friction, Some(0.9));
        assert!(updated.needs_review);
        assert_eq!(updated.claims_status, ClaimsStatus::Verified);
    }
}
