//! Single writer connection wrapper. SQLite only allows one writer at a
//! time; wrapping it in a blocking `Mutex` and routing every call through
//! `spawn_blocking` gives us the atomic-claim and atomic-sequence
//! guarantees the specification requires without any extra coordination.

use std::sync::{Arc, Mutex};

use kx_core::error::KxError;
use rusqlite::Connection;

/// Owns the sole writer connection. Reads go through the same connection —
/// WAL mode would allow a separate read pool, but a single connection is
/// sufficient here and keeps the skip-locked `Claim` query trivially
/// correct (SQLite serializes statements on one connection).
#[derive(Clone)]
pub struct Writer {
    conn: Arc<Mutex<Connection>>,
}

impl Writer {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run a closure against the connection on the current thread. Intended
    /// for tests and for call sites that are already inside a
    /// `spawn_blocking` context.
    pub fn with_conn_sync<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, KxError>,
    ) -> Result<T, KxError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| KxError::Fatal("writer connection mutex poisoned".into()))?;
        f(&conn)
    }

    /// Run a closure against the connection on a blocking worker thread,
    /// for use from async call sites.
    pub async fn with_conn<T, F>(&self, f: F) -> Result<T, KxError>
    where
        F: FnOnce(&Connection) -> Result<T, KxError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| KxError::Fatal("writer connection mutex poisoned".into()))?;
            f(&conn)
        })
        .await
        .map_err(|e| KxError::Fatal(format!("storage task panicked: {e}")))?
    }
}
