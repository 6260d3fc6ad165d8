//! Subscription mirror storage (§4.G). A subscription pulls entries from
//! `source_notebook` into `subscriber_notebook` as read-only
//! `mirrored_entries` rows, watermarked by `source_sequence` the same way
//! `observe` watermarks live entries.

use chrono::{DateTime, Utc};
use kx_core::error::KxError;
use kx_core::ids::{AuthorId, EntryId, NotebookId, SubscriptionId};
use kx_core::model::{ClaimRecord, MirroredEntry, Subscription, SubscriptionScope, SyncStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};

pub fn insert(conn: &Connection, sub: &Subscription) -> Result<(), KxError> {
    conn.execute(
        "INSERT INTO notebook_subscriptions (
            id, subscriber_notebook, source_notebook, scope, topic_filter, discount_factor,
            poll_interval_seconds, watermark, sync_status, mirrored_count, approved_by, last_sync_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            sub.id.to_string(),
            sub.subscriber_notebook.to_string(),
            sub.source_notebook.to_string(),
            scope_str(sub.scope),
            sub.topic_filter,
            sub.discount_factor,
            sub.poll_interval_seconds,
            sub.watermark,
            status_str(sub.sync_status),
            sub.mirrored_count,
            sub.approved_by.to_hex(),
            sub.last_sync_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: SubscriptionId) -> Result<Option<Subscription>, KxError> {
    conn.query_row(&format!("{SELECT_SUB} WHERE id = ?1"), params![id.to_string()], row_to_subscription)
        .optional()
        .map_err(KxError::from)
}

pub fn list_for_subscriber(conn: &Connection, subscriber: NotebookId) -> Result<Vec<Subscription>, KxError> {
    let mut stmt = conn.prepare(&format!("{SELECT_SUB} WHERE subscriber_notebook = ?1 ORDER BY id"))?;
    let rows = stmt.query_map(params![subscriber.to_string()], row_to_subscription)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(KxError::from)
}

/// All active subscriptions sourced from `source` — used to fan out a
/// freshly-written entry to every downstream mirror without a full table
/// scan (§4.G propagation on write).
pub fn list_for_source(conn: &Connection, source: NotebookId) -> Result<Vec<Subscription>, KxError> {
    let mut stmt = conn.prepare(
        &format!("{SELECT_SUB} WHERE source_notebook = ?1 AND sync_status != 'paused' ORDER BY id"),
    )?;
    let rows = stmt.query_map(params![source.to_string()], row_to_subscription)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(KxError::from)
}

pub fn list_all_active(conn: &Connection) -> Result<Vec<Subscription>, KxError> {
    let mut stmt = conn.prepare(&format!("{SELECT_SUB} WHERE sync_status = 'active' ORDER BY id"))?;
    let rows = stmt.query_map([], row_to_subscription)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(KxError::from)
}

pub fn advance_watermark(
    conn: &Connection,
    id: SubscriptionId,
    watermark: u64,
    synced_at: DateTime<Utc>,
) -> Result<(), KxError> {
    conn.execute(
        "UPDATE notebook_subscriptions SET watermark = ?1, last_sync_at = ?2 WHERE id = ?3",
        params![watermark, synced_at.to_rfc3339(), id.to_string()],
    )?;
    Ok(())
}

pub fn increment_mirrored_count(conn: &Connection, id: SubscriptionId, by: u64) -> Result<(), KxError> {
    conn.execute(
        "UPDATE notebook_subscriptions SET mirrored_count = mirrored_count + ?1 WHERE id = ?2",
        params![by, id.to_string()],
    )?;
    Ok(())
}

pub fn set_sync_status(conn: &Connection, id: SubscriptionId, status: SyncStatus) -> Result<(), KxError> {
    conn.execute(
        "UPDATE notebook_subscriptions SET sync_status = ?1 WHERE id = ?2",
        params![status_str(status), id.to_string()],
    )?;
    Ok(())
}

/// Insert or refresh the mirrored shadow of a source entry. Called once
/// per mirrored entry per sync cycle; re-running it for the same
/// `(subscription_id, source_entry_id)` just overwrites the shadow so a
/// re-sync after a partial failure is idempotent.
pub fn upsert_mirrored_entry(conn: &Connection, entry: &MirroredEntry) -> Result<(), KxError> {
    conn.execute(
        "INSERT INTO mirrored_entries (subscription_id, source_entry_id, source_sequence, claims_json, embedding, topic, tombstoned)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT (subscription_id, source_entry_id) DO UPDATE SET
            source_sequence = excluded.source_sequence,
            claims_json = excluded.claims_json,
            embedding = excluded.embedding,
            topic = excluded.topic,
            tombstoned = excluded.tombstoned",
        params![
            entry.subscription_id.to_string(),
            entry.source_entry_id.to_string(),
            entry.source_sequence,
            serde_json::to_string(&entry.claims)?,
            entry.embedding.as_ref().map(|v| serde_json::to_vec(v)).transpose()?,
            entry.topic,
            entry.tombstoned as i64,
        ],
    )?;
    Ok(())
}

/// Source-side deletion mirrors as a tombstone rather than a row delete,
/// so a subscriber that already surfaced the entry in a browse result can
/// still resolve the id and see it was retracted.
pub fn tombstone_mirrored_entry(
    conn: &Connection,
    subscription_id: SubscriptionId,
    source_entry_id: EntryId,
) -> Result<(), KxError> {
    conn.execute(
        "UPDATE mirrored_entries SET tombstoned = 1 WHERE subscription_id = ?1 AND source_entry_id = ?2",
        params![subscription_id.to_string(), source_entry_id.to_string()],
    )?;
    Ok(())
}

/// Targeted update: embedding only (`EMBED_MIRRORED` completion).
pub fn update_mirrored_embedding(
    conn: &Connection,
    subscription_id: SubscriptionId,
    source_entry_id: EntryId,
    embedding: &[f32],
) -> Result<(), KxError> {
    conn.execute(
        "UPDATE mirrored_entries SET embedding = ?1 WHERE subscription_id = ?2 AND source_entry_id = ?3",
        params![
            serde_json::to_vec(embedding)?,
            subscription_id.to_string(),
            source_entry_id.to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_mirrored_entry(
    conn: &Connection,
    subscription_id: SubscriptionId,
    source_entry_id: EntryId,
) -> Result<Option<MirroredEntry>, KxError> {
    conn.query_row(
        "SELECT subscription_id, source_entry_id, source_sequence, claims_json, embedding, topic, tombstoned
         FROM mirrored_entries WHERE subscription_id = ?1 AND source_entry_id = ?2",
        params![subscription_id.to_string(), source_entry_id.to_string()],
        row_to_mirrored,
    )
    .optional()
    .map_err(KxError::from)
}

pub fn list_mirrored_entries(
    conn: &Connection,
    subscription_id: SubscriptionId,
    include_tombstoned: bool,
) -> Result<Vec<MirroredEntry>, KxError> {
    let sql = if include_tombstoned {
        "SELECT subscription_id, source_entry_id, source_sequence, claims_json, embedding, topic, tombstoned
         FROM mirrored_entries WHERE subscription_id = ?1 ORDER BY source_sequence ASC"
    } else {
        "SELECT subscription_id, source_entry_id, source_sequence, claims_json, embedding, topic, tombstoned
         FROM mirrored_entries WHERE subscription_id = ?1 AND tombstoned = 0 ORDER BY source_sequence ASC"
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![subscription_id.to_string()], row_to_mirrored)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(KxError::from)
}

const SELECT_SUB: &str = "SELECT
    id, subscriber_notebook, source_notebook, scope, topic_filter, discount_factor,
    poll_interval_seconds, watermark, sync_status, mirrored_count, approved_by, last_sync_at
    FROM notebook_subscriptions";

fn row_to_subscription(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    let id: String = row.get(0)?;
    let subscriber: String = row.get(1)?;
    let source: String = row.get(2)?;
    let scope: String = row.get(3)?;
    let sync_status: String = row.get(8)?;
    let approved_by: String = row.get(10)?;
    let last_sync_at: Option<String> = row.get(11)?;

    Ok(Subscription {
        id: id.parse().unwrap_or(SubscriptionId::nil()),
        subscriber_notebook: subscriber.parse().unwrap_or(NotebookId::nil()),
        source_notebook: source.parse().unwrap_or(NotebookId::nil()),
        scope: str_to_scope(&scope),
        topic_filter: row.get(4)?,
        discount_factor: row.get(5)?,
        poll_interval_seconds: row.get(6)?,
        watermark: row.get(7)?,
        sync_status: str_to_status(&sync_status),
        mirrored_count: row.get(9)?,
        approved_by: AuthorId::from_hex(&approved_by).unwrap_or_else(|_| AuthorId::from_public_key(b"")),
        last_sync_at: last_sync_at
            .as_deref()
            .map(|s| DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())),
    })
}

fn row_to_mirrored(row: &Row<'_>) -> rusqlite::Result<MirroredEntry> {
    let subscription_id: String = row.get(0)?;
    let source_entry_id: String = row.get(1)?;
    let claims_json: String = row.get(3)?;
    let embedding: Option<Vec<u8>> = row.get(4)?;
    Ok(MirroredEntry {
        subscription_id: subscription_id.parse().unwrap_or(SubscriptionId::nil()),
        source_entry_id: source_entry_id.parse().unwrap_or(EntryId::nil()),
        source_sequence: row.get(2)?,
        claims: serde_json::from_str::<Vec<ClaimRecord>>(&claims_json).unwrap_or_default(),
        embedding: embedding.and_then(|b| serde_json::from_slice(&b).ok()),
        topic: row.get(5)?,
        tombstoned: row.get::<_, i64>(6)? != 0,
    })
}

fn scope_str(scope: SubscriptionScope) -> &'static str {
    match scope {
        SubscriptionScope::Catalog => "catalog",
        SubscriptionScope::Claims => "claims",
        SubscriptionScope::Entries => "entries",
    }
}

fn str_to_scope(s: &str) -> SubscriptionScope {
    match s {
        "entries" => SubscriptionScope::Entries,
        "catalog" => SubscriptionScope::Catalog,
        _ => SubscriptionScope::Claims,
    }
}

fn status_str(status: SyncStatus) -> &'static str {
    match status {
        SyncStatus::Active => "active",
        SyncStatus::Paused => "paused",
        SyncStatus::Error => "error",
    }
}

fn str_to_status(s: &str) -> SyncStatus {
    match s {
        "paused" => SyncStatus::Paused,
        "error" => SyncStatus::Error,
        _ => SyncStatus::Active,
    }
}
