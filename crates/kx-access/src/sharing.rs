//! Grant/revoke the tiered access that `Gate` later checks (§4.B). Only an
//! `Admin` on the notebook can change who else holds a grant on it.

use kx_core::error::KxResult;
use kx_core::ids::{AuthorId, NotebookId};
use kx_core::model::{AccessGrant, AccessTier, AuditRecord};
use kx_storage::queries::access;
use rusqlite::Connection;
use tracing::info;

use crate::Gate;

/// Grants `tier` to `grantee` on `notebook_id`. `caller` must already hold
/// `Admin` there. Idempotent: re-granting overwrites the prior tier.
pub fn grant(
    conn: &Connection,
    notebook_id: NotebookId,
    caller: AuthorId,
    grantee: AuthorId,
    tier: AccessTier,
) -> KxResult<()> {
    Gate::require_tier(conn, notebook_id, caller, AccessTier::Admin)?;
    access::upsert(conn, &AccessGrant { notebook_id, author_id: grantee, tier })?;
    kx_storage::audit::insert(
        conn,
        &AuditRecord::new("access.granted")
            .notebook(notebook_id)
            .author(caller)
            .target("author", grantee.to_string())
            .detail(serde_json::json!({ "tier": format!("{tier:?}") })),
    )?;
    info!(%notebook_id, %grantee, ?tier, "access granted");
    Ok(())
}

/// Revokes whatever grant `target` holds on `notebook_id`. `caller` must
/// hold `Admin` there. Revoking a grant that doesn't exist is a no-op.
pub fn revoke(
    conn: &Connection,
    notebook_id: NotebookId,
    caller: AuthorId,
    target: AuthorId,
) -> KxResult<()> {
    Gate::require_tier(conn, notebook_id, caller, AccessTier::Admin)?;
    access::revoke(conn, notebook_id, target)?;
    kx_storage::audit::insert(
        conn,
        &AuditRecord::new("access.revoked")
            .notebook(notebook_id)
            .author(caller)
            .target("author", target.to_string()),
    )?;
    info!(%notebook_id, %target, "access revoked");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kx_core::model::{Author, ClassificationLevel, Notebook};
    use kx_storage::StorageEngine;
    use std::collections::BTreeSet;

    fn notebook(owner: AuthorId) -> Notebook {
        Notebook {
            id: NotebookId::new(),
            name: "n".into(),
            owner_author: owner,
            created: chrono::Utc::now(),
            current_sequence: 0,
            classification_level: ClassificationLevel::Internal,
            compartments: BTreeSet::new(),
            review_threshold: 0.7,
        }
    }

    fn setup() -> (StorageEngine, Notebook, AuthorId, AuthorId) {
        let owner = AuthorId::from_public_key(b"owner");
        let grantee = AuthorId::from_public_key(b"grantee");
        let nb = notebook(owner);
        let engine = StorageEngine::open_in_memory().unwrap();
        engine
            .writer()
            .with_conn_sync(|conn| {
                kx_storage::queries::authors::insert(conn, &Author { id: owner, public_key: b"o".to_vec(), trusted: true })?;
                kx_storage::queries::authors::insert(conn, &Author { id: grantee, public_key: b"g".to_vec(), trusted: true })?;
                kx_storage::queries::notebooks::insert(conn, &nb)
            })
            .unwrap();
        (engine, nb, owner, grantee)
    }

    #[test]
    fn owner_can_grant_and_revoke() {
        let (engine, nb, owner, grantee) = setup();
        engine
            .writer()
            .with_conn_sync(|conn| grant(conn, nb.id, owner, grantee, AccessTier::Read))
            .unwrap();
        let tier = engine
            .writer()
            .with_conn_sync(|conn| access::get_tier(conn, nb.id, grantee))
            .unwrap();
        assert_eq!(tier, Some(AccessTier::Read));

        engine
            .writer()
            .with_conn_sync(|conn| revoke(conn, nb.id, owner, grantee))
            .unwrap();
        let tier = engine
            .writer()
            .with_conn_sync(|conn| access::get_tier(conn, nb.id, grantee))
            .unwrap();
        assert_eq!(tier, None);
    }

    #[test]
    fn non_admin_cannot_grant() {
        let (engine, nb, _owner, grantee) = setup();
        let third = AuthorId::from_public_key(b"third");
        let err = engine
            .writer()
            .with_conn_sync(|conn| grant(conn, nb.id, grantee, third, AccessTier::Read))
            .unwrap_err();
        assert!(matches!(err, kx_core::error::KxError::NotFound(_)));
    }
}
