//! Top-level error taxonomy for the knowledge-exchange core.
//!
//! Every subsystem error converts into [`KxError`] via `From`. The variants
//! mirror the abstract taxonomy in the specification: `NotFound`,
//! `Forbidden`, `Conflict`, `Invalid`, `Unavailable`, `Transient`, `Fatal`.

#[derive(Debug, thiserror::Error)]
pub enum KxError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("transient failure, retry: {0}")]
    Transient(String),

    #[error("invariant violated: {0}")]
    Fatal(String),
}

pub type KxResult<T> = Result<T, KxError>;

impl From<rusqlite::Error> for KxError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => KxError::NotFound(e.to_string()),
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::DatabaseBusy
                    || err.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                KxError::Transient(e.to_string())
            }
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                KxError::Conflict(e.to_string())
            }
            other => KxError::Unavailable(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for KxError {
    fn from(e: serde_json::Error) -> Self {
        KxError::Invalid(format!("serialization error: {e}"))
    }
}
