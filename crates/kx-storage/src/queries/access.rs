use kx_core::error::KxError;
use kx_core::ids::{AuthorId, NotebookId};
use kx_core::model::{AccessGrant, AccessTier};
use rusqlite::{params, Connection, OptionalExtension};

pub fn upsert(conn: &Connection, grant: &AccessGrant) -> Result<(), KxError> {
    conn.execute(
        "INSERT INTO notebook_access (notebook_id, author_id, tier) VALUES (?1, ?2, ?3)
         ON CONFLICT (notebook_id, author_id) DO UPDATE SET tier = excluded.tier",
        params![
            grant.notebook_id.to_string(),
            grant.author_id.to_hex(),
            tier_to_str(grant.tier),
        ],
    )?;
    Ok(())
}

pub fn revoke(conn: &Connection, notebook_id: NotebookId, author_id: AuthorId) -> Result<(), KxError> {
    conn.execute(
        "DELETE FROM notebook_access WHERE notebook_id = ?1 AND author_id = ?2",
        params![notebook_id.to_string(), author_id.to_hex()],
    )?;
    Ok(())
}

pub fn get_tier(
    conn: &Connection,
    notebook_id: NotebookId,
    author_id: AuthorId,
) -> Result<Option<AccessTier>, KxError> {
    conn.query_row(
        "SELECT tier FROM notebook_access WHERE notebook_id = ?1 AND author_id = ?2",
        params![notebook_id.to_string(), author_id.to_hex()],
        |row| {
            let tier: String = row.get(0)?;
            Ok(str_to_tier(&tier))
        },
    )
    .optional()
    .map_err(KxError::from)
}

fn tier_to_str(tier: AccessTier) -> &'static str {
    match tier {
        AccessTier::Existence => "existence",
        AccessTier::Read => "read",
        AccessTier::ReadWrite => "read_write",
        AccessTier::Admin => "admin",
    }
}

fn str_to_tier(s: &str) -> AccessTier {
    match s {
        "read" => AccessTier::Read,
        "read_write" => AccessTier::ReadWrite,
        "admin" => AccessTier::Admin,
        _ => AccessTier::Existence,
    }
}
