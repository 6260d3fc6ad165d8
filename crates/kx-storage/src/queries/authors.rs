use kx_core::error::KxError;
use kx_core::ids::AuthorId;
use kx_core::model::Author;
use rusqlite::{params, Connection, OptionalExtension};

pub fn insert(conn: &Connection, author: &Author) -> Result<(), KxError> {
    conn.execute(
        "INSERT OR IGNORE INTO authors (id, public_key, trusted) VALUES (?1, ?2, ?3)",
        params![author.id.to_hex(), author.public_key, author.trusted as i64],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: AuthorId) -> Result<Option<Author>, KxError> {
    conn.query_row(
        "SELECT id, public_key, trusted FROM authors WHERE id = ?1",
        params![id.to_hex()],
        |row| {
            let id_hex: String = row.get(0)?;
            Ok(Author {
                id: AuthorId::from_hex(&id_hex).unwrap_or_else(|_| AuthorId::from_public_key(b"")),
                public_key: row.get(1)?,
                trusted: row.get::<_, i64>(2)? != 0,
            })
        },
    )
    .optional()
    .map_err(KxError::from)
}
