//! Append-only action log (§4.I). Grounded on the teacher's
//! `queries::audit_ops` (insert + query by notebook/actor/time).

use chrono::{DateTime, Utc};
use kx_core::error::KxError;
use kx_core::ids::{AuthorId, NotebookId};
use kx_core::model::AuditRecord;
use rusqlite::{params, Connection, Row};

pub fn insert(conn: &Connection, record: &AuditRecord) -> Result<(), KxError> {
    conn.execute(
        "INSERT INTO audit_log (time, notebook_id, author, action, target_type, target_id, detail_json, ip, user_agent)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.time.to_rfc3339(),
            record.notebook_id.map(|n| n.to_string()),
            record.author.map(|a| a.to_hex()),
            record.action,
            record.target_type,
            record.target_id,
            record.detail.to_string(),
            record.ip,
            record.user_agent,
        ],
    )?;
    Ok(())
}

pub fn query_by_notebook(
    conn: &Connection,
    notebook_id: NotebookId,
    limit: u32,
) -> Result<Vec<AuditRecord>, KxError> {
    let mut stmt = conn.prepare(
        "SELECT time, notebook_id, author, action, target_type, target_id, detail_json, ip, user_agent
         FROM audit_log WHERE notebook_id = ?1 ORDER BY time DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![notebook_id.to_string(), limit], row_to_record)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(KxError::from)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<AuditRecord> {
    let time: String = row.get(0)?;
    let notebook_id: Option<String> = row.get(1)?;
    let author: Option<String> = row.get(2)?;
    let detail_json: String = row.get(6)?;
    Ok(AuditRecord {
        time: DateTime::parse_from_rfc3339(&time)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        notebook_id: notebook_id.and_then(|s| s.parse().ok()),
        author: author.and_then(|s| AuthorId::from_hex(&s).ok()),
        action: row.get(3)?,
        target_type: row.get(4)?,
        target_id: row.get(5)?,
        detail: serde_json::from_str(&detail_json).unwrap_or(serde_json::Value::Null),
        ip: row.get(7)?,
        user_agent: row.get(8)?,
    })
}
