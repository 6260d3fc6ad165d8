use kx_core::error::KxError;
use rusqlite::Connection;

use crate::pool::Writer;
use crate::schema;

/// Owns the database connection and exposes the sole writer. Opening runs
/// pending migrations synchronously (grounded on the teacher's
/// `StorageEngine::open`/`open_in_memory`).
#[derive(Clone)]
pub struct StorageEngine {
    writer: Writer,
}

impl StorageEngine {
    pub fn open(path: &str) -> Result<Self, KxError> {
        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::migrate_to_latest(&mut conn)?;
        Ok(Self {
            writer: Writer::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, KxError> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::migrate_to_latest(&mut conn)?;
        Ok(Self {
            writer: Writer::new(conn),
        })
    }

    pub fn writer(&self) -> &Writer {
        &self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_in_memory_applies_all_migrations() {
        let engine = StorageEngine::open_in_memory().unwrap();
        let version = engine
            .writer()
            .with_conn_sync(|conn| Ok(schema::current_version(conn)?))
            .unwrap();
        assert_eq!(version, schema::LATEST_VERSION);
    }
}
