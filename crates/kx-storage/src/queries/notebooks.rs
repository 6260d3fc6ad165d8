use std::collections::BTreeSet;

use kx_core::error::KxError;
use kx_core::ids::{AuthorId, NotebookId};
use kx_core::model::{ClassificationLevel, Notebook};
use rusqlite::{params, Connection, OptionalExtension};

pub fn insert(conn: &Connection, notebook: &Notebook) -> Result<(), KxError> {
    conn.execute(
        "INSERT INTO notebooks (id, name, owner_author, created, current_sequence, classification_level, compartments, review_threshold)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            notebook.id.to_string(),
            notebook.name,
            notebook.owner_author.to_hex(),
            notebook.created.to_rfc3339(),
            notebook.current_sequence,
            level_to_str(notebook.classification_level),
            serde_json::to_string(&notebook.compartments)?,
            notebook.review_threshold,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: NotebookId) -> Result<Option<Notebook>, KxError> {
    conn.query_row(
        "SELECT id, name, owner_author, created, current_sequence, classification_level, compartments, review_threshold
         FROM notebooks WHERE id = ?1",
        params![id.to_string()],
        row_to_notebook,
    )
    .optional()
    .map_err(KxError::from)
}

pub fn list_visible(conn: &Connection, author_id: AuthorId) -> Result<Vec<Notebook>, KxError> {
    let mut stmt = conn.prepare(
        "SELECT n.id, n.name, n.owner_author, n.created, n.current_sequence, n.classification_level, n.compartments, n.review_threshold
         FROM notebooks n
         WHERE n.owner_author = ?1
            OR EXISTS (SELECT 1 FROM notebook_access a WHERE a.notebook_id = n.id AND a.author_id = ?1)
         ORDER BY n.created ASC",
    )?;
    let rows = stmt.query_map(params![author_id.to_hex()], row_to_notebook)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(KxError::from)
}

/// Every notebook in the deployment, regardless of caller. Used by the
/// background job-timeout sweep, which must reclaim across notebooks the
/// sweep itself has no author identity to gate against.
pub fn list_all(conn: &Connection) -> Result<Vec<Notebook>, KxError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, owner_author, created, current_sequence, classification_level, compartments, review_threshold
         FROM notebooks ORDER BY created ASC",
    )?;
    let rows = stmt.query_map([], row_to_notebook)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(KxError::from)
}

/// Atomically reserve and return the next sequence number, in the same
/// statement that increments the counter — this is what makes invariant
/// (ii) ("sequence assigned server-side by atomic increment") hold even
/// under concurrent callers sharing the single writer connection.
pub fn next_sequence(conn: &Connection, notebook_id: NotebookId) -> Result<u64, KxError> {
    conn.query_row(
        "UPDATE notebooks SET current_sequence = current_sequence + 1
         WHERE id = ?1
         RETURNING current_sequence",
        params![notebook_id.to_string()],
        |row| row.get(0),
    )
    .map_err(KxError::from)
}

fn row_to_notebook(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notebook> {
    let id: String = row.get(0)?;
    let owner: String = row.get(2)?;
    let created: String = row.get(3)?;
    let level: String = row.get(5)?;
    let compartments: String = row.get(6)?;
    Ok(Notebook {
        id: id.parse().unwrap_or(NotebookId::nil()),
        name: row.get(1)?,
        owner_author: AuthorId::from_hex(&owner).unwrap_or_else(|_| AuthorId::from_public_key(b"")),
        created: chrono::DateTime::parse_from_rfc3339(&created)
            .map(|t| t.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
        current_sequence: row.get(4)?,
        classification_level: str_to_level(&level),
        compartments: serde_json::from_str::<BTreeSet<String>>(&compartments).unwrap_or_default(),
        review_threshold: row.get(7)?,
    })
}

fn level_to_str(level: ClassificationLevel) -> &'static str {
    match level {
        ClassificationLevel::Public => "public",
        ClassificationLevel::Internal => "internal",
        ClassificationLevel::Confidential => "confidential",
        ClassificationLevel::Secret => "secret",
        ClassificationLevel::TopSecret => "top_secret",
    }
}

fn str_to_level(s: &str) -> ClassificationLevel {
    match s {
        "internal" => ClassificationLevel::Internal,
        "confidential" => ClassificationLevel::Confidential,
        "secret" => ClassificationLevel::Secret,
        "top_secret" => ClassificationLevel::TopSecret,
        _ => ClassificationLevel::Public,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StorageEngine;

    fn sample_notebook(owner: AuthorId) -> Notebook {
        Notebook {
            id: NotebookId::new(),
            name: "test".into(),
            owner_author: owner,
            created: chrono::Utc::now(),
            current_sequence: 0,
            classification_level: ClassificationLevel::Internal,
            compartments: BTreeSet::new(),
            review_threshold: 0.7,
        }
    }

    #[test]
    fn next_sequence_increments_atomically_in_order() {
        let engine = StorageEngine::open_in_memory().unwrap();
        let owner = AuthorId::from_public_key(b"owner");
        let notebook = sample_notebook(owner);
        let nb_id = notebook.id;
        engine
            .writer()
            .with_conn_sync(|conn| {
                crate::queries::authors::insert(
                    conn,
                    &kx_core::model::Author {
                        id: owner,
                        public_key: b"owner".to_vec(),
                        trusted: true,
                    },
                )?;
                insert(conn, &notebook)
            })
            .unwrap();

        let seqs: Vec<u64> = (0..5)
            .map(|_| {
                engine
                    .writer()
                    .with_conn_sync(|conn| next_sequence(conn, nb_id))
                    .unwrap()
            })
            .collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }
}
