//! Forward-only, transactional migration runner, following the teacher's
//! `cortex-storage::migrations` shape (numbered migrations, a
//! `schema_version` tracking table, `current_version`/`migrate_to_latest`).

use kx_core::error::KxError;
use rusqlite::Connection;
use tracing::{debug, info};

pub const LATEST_VERSION: u32 = 1;

type MigrationFn = fn(&Connection) -> Result<(), KxError>;

const MIGRATIONS: [(u32, &str, MigrationFn); 1] = [(1, "initial_schema", v001_initial_schema)];

pub fn current_version(conn: &Connection) -> Result<u32, KxError> {
    let exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version'")
        .and_then(|mut stmt| stmt.exists([]))?;
    if !exists {
        return Ok(0);
    }
    let version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

pub fn migrate_to_latest(conn: &mut Connection) -> Result<(), KxError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current = current_version(conn)?;
    for (version, name, migrate) in MIGRATIONS {
        if version <= current {
            debug!(version, name, "migration already applied");
            continue;
        }
        info!(version, name, "applying migration");
        let tx = conn.transaction()?;
        migrate(&tx)?;
        tx.execute(
            "INSERT INTO schema_version (version, name) VALUES (?1, ?2)",
            rusqlite::params![version, name],
        )?;
        tx.commit()?;
    }
    Ok(())
}

/// Realizes every table named in spec.md §6 ("Persisted layout").
fn v001_initial_schema(conn: &Connection) -> Result<(), KxError> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE authors (
            id          TEXT PRIMARY KEY,
            public_key  BLOB NOT NULL,
            trusted     INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE notebooks (
            id                  TEXT PRIMARY KEY,
            name                TEXT NOT NULL,
            owner_author        TEXT NOT NULL REFERENCES authors(id),
            created             TEXT NOT NULL,
            current_sequence    INTEGER NOT NULL DEFAULT 0,
            classification_level TEXT NOT NULL,
            compartments        TEXT NOT NULL DEFAULT '[]',
            review_threshold    REAL NOT NULL DEFAULT 0.7
        );

        CREATE TABLE notebook_access (
            notebook_id TEXT NOT NULL REFERENCES notebooks(id),
            author_id   TEXT NOT NULL REFERENCES authors(id),
            tier        TEXT NOT NULL,
            PRIMARY KEY (notebook_id, author_id)
        );

        CREATE TABLE entries (
            id                      TEXT PRIMARY KEY,
            notebook_id             TEXT NOT NULL REFERENCES notebooks(id),
            sequence                INTEGER NOT NULL,
            content                 BLOB NOT NULL,
            content_type            TEXT NOT NULL,
            original_content_type   TEXT,
            topic                   TEXT,
            author                  TEXT NOT NULL REFERENCES authors(id),
            signature               BLOB NOT NULL,
            revision_of             TEXT REFERENCES entries(id),
            references_json         TEXT NOT NULL DEFAULT '[]',
            fragment_of             TEXT REFERENCES entries(id),
            fragment_index          INTEGER,
            claims_json             TEXT NOT NULL DEFAULT '[]',
            claims_status           TEXT NOT NULL DEFAULT 'pending',
            comparisons_json        TEXT NOT NULL DEFAULT '[]',
            max_friction            REAL,
            needs_review            INTEGER NOT NULL DEFAULT 0,
            embedding               BLOB,
            integration_status      TEXT NOT NULL DEFAULT 'probation',
            review_status           TEXT NOT NULL DEFAULT 'approved',
            expected_comparisons    INTEGER,
            created                 TEXT NOT NULL,
            UNIQUE (notebook_id, sequence)
        );
        CREATE INDEX idx_entries_notebook_sequence ON entries(notebook_id, sequence);
        CREATE INDEX idx_entries_notebook_topic ON entries(notebook_id, topic);
        CREATE INDEX idx_entries_fragment_of ON entries(fragment_of);

        CREATE VIRTUAL TABLE entries_fts USING fts5(
            entry_id UNINDEXED,
            content,
            topic
        );

        CREATE TABLE jobs (
            id                TEXT PRIMARY KEY,
            notebook_id       TEXT NOT NULL REFERENCES notebooks(id),
            job_type          TEXT NOT NULL,
            status            TEXT NOT NULL DEFAULT 'pending',
            payload_json      TEXT NOT NULL,
            result_json       TEXT,
            error             TEXT,
            created           TEXT NOT NULL,
            claimed_at        TEXT,
            claimed_by        TEXT,
            completed_at      TEXT,
            timeout_seconds   INTEGER NOT NULL DEFAULT 120,
            retry_count       INTEGER NOT NULL DEFAULT 0,
            max_retries       INTEGER NOT NULL DEFAULT 3,
            priority          INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX idx_jobs_claim_scan ON jobs(notebook_id, status, job_type, priority DESC, created ASC);

        CREATE TABLE notebook_subscriptions (
            id                      TEXT PRIMARY KEY,
            subscriber_notebook     TEXT NOT NULL REFERENCES notebooks(id),
            source_notebook         TEXT NOT NULL REFERENCES notebooks(id),
            scope                   TEXT NOT NULL,
            topic_filter            TEXT,
            discount_factor         REAL NOT NULL,
            poll_interval_seconds   INTEGER NOT NULL,
            watermark               INTEGER NOT NULL DEFAULT 0,
            sync_status             TEXT NOT NULL DEFAULT 'active',
            mirrored_count          INTEGER NOT NULL DEFAULT 0,
            approved_by             TEXT NOT NULL REFERENCES authors(id),
            last_sync_at            TEXT
        );

        CREATE TABLE mirrored_entries (
            subscription_id   TEXT NOT NULL REFERENCES notebook_subscriptions(id),
            source_entry_id   TEXT NOT NULL,
            source_sequence   INTEGER NOT NULL,
            claims_json       TEXT NOT NULL DEFAULT '[]',
            embedding         BLOB,
            topic             TEXT,
            tombstoned        INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (subscription_id, source_entry_id)
        );

        CREATE TABLE entry_reviews (
            entry_id    TEXT PRIMARY KEY REFERENCES entries(id),
            status      TEXT NOT NULL DEFAULT 'pending',
            submitted_at TEXT NOT NULL,
            reviewed_by TEXT REFERENCES authors(id),
            reviewed_at TEXT
        );

        CREATE TABLE audit_log (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            time            TEXT NOT NULL,
            notebook_id     TEXT,
            author          TEXT,
            action          TEXT NOT NULL,
            target_type     TEXT,
            target_id       TEXT,
            detail_json     TEXT NOT NULL DEFAULT 'null',
            ip              TEXT,
            user_agent      TEXT
        );
        CREATE INDEX idx_audit_notebook_time ON audit_log(notebook_id, time);
        "#,
    )?;
    Ok(())
}
