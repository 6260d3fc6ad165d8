use kx_core::error::{KxError, KxResult};
use kx_core::ids::{AuthorId, NotebookId};
use kx_core::model::{AccessTier, AuditRecord, Label, Notebook};
use kx_storage::queries::{access, notebooks};
use rusqlite::Connection;
use tracing::warn;

/// Stateless check-and-audit gate. Every method takes the connection
/// already inside the caller's writer-lock closure, so the tier check and
/// the audit write on denial are part of the same atomic unit as whatever
/// the caller does next.
pub struct Gate;

impl Gate {
    /// Resolve the caller's effective tier: the owner is implicitly
    /// `Admin`; everyone else is whatever `notebook_access` grants, or
    /// nothing at all.
    pub fn effective_tier(
        conn: &Connection,
        notebook: &Notebook,
        caller: AuthorId,
    ) -> KxResult<Option<AccessTier>> {
        if notebook.owner_author == caller {
            return Ok(Some(AccessTier::Admin));
        }
        access::get_tier(conn, notebook.id, caller).map_err(KxError::from)
    }

    /// Require at least `required` tier on `notebook_id` for `caller`.
    /// Denial semantics are leak-resistant: no grant at all reads as
    /// `NotFound`; a grant below the required tier reads as `Forbidden`.
    /// Every denial is audited with the required tier and the caller's
    /// actual tier (if any).
    pub fn require_tier(
        conn: &Connection,
        notebook_id: NotebookId,
        caller: AuthorId,
        required: AccessTier,
    ) -> KxResult<Notebook> {
        let notebook = notebooks::get(conn, notebook_id)?
            .ok_or_else(|| KxError::NotFound(format!("notebook {notebook_id}")))?;

        let tier = Self::effective_tier(conn, &notebook, caller)?;
        match tier {
            None => {
                Self::audit_denial(conn, notebook_id, caller, required, None)?;
                Err(KxError::NotFound(format!("notebook {notebook_id}")))
            }
            Some(t) if t < required => {
                Self::audit_denial(conn, notebook_id, caller, required, Some(t))?;
                Err(KxError::Forbidden(format!(
                    "caller holds {t:?}, {required:?} required"
                )))
            }
            Some(_) => Ok(notebook),
        }
    }

    /// Clearance check for reading: the caller's access grant must also
    /// dominate the notebook's classification label, not merely meet the
    /// tier bar (§4.B rule 3). A `Read`-tier grant on a `Secret` notebook
    /// does not let an `Internal`-cleared author see it.
    pub fn require_clearance(
        conn: &Connection,
        notebook_id: NotebookId,
        caller: AuthorId,
        required: AccessTier,
        caller_label: &Label,
    ) -> KxResult<Notebook> {
        let notebook = Self::require_tier(conn, notebook_id, caller, required)?;
        if !caller_label.dominates(&notebook.label()) {
            Self::audit_denial(conn, notebook_id, caller, required, None)?;
            return Err(KxError::Forbidden(format!(
                "caller clearance does not dominate notebook {notebook_id} label"
            )));
        }
        Ok(notebook)
    }

    /// §4.B rule 2: can an agent holding `agent_label` claim a job against
    /// a notebook whose classification label is `notebook.label()`?
    pub fn agent_may_claim(notebook: &Notebook, agent_label: &Label) -> bool {
        agent_label.dominates(&notebook.label())
    }

    fn audit_denial(
        conn: &Connection,
        notebook_id: NotebookId,
        caller: AuthorId,
        required: AccessTier,
        actual: Option<AccessTier>,
    ) -> KxResult<()> {
        warn!(%notebook_id, %caller, ?required, ?actual, "access denied");
        kx_storage::audit::insert(
            conn,
            &AuditRecord::new("access.denied")
                .notebook(notebook_id)
                .author(caller)
                .target("notebook", notebook_id.to_string())
                .detail(serde_json::json!({ "required_tier": format!("{required:?}"), "actual_tier": actual.map(|t| format!("{t:?}")) })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kx_core::model::{AccessGrant, Author, ClassificationLevel};
    use kx_storage::StorageEngine;
    use std::collections::BTreeSet;

    fn notebook(owner: AuthorId, level: ClassificationLevel, comps: &[&str]) -> Notebook {
        Notebook {
            id: kx_core::ids::NotebookId::new(),
            name: "n".into(),
            owner_author: owner,
            created: chrono::Utc::now(),
            current_sequence: 0,
            classification_level: level,
            compartments: comps.iter().map(|s| s.to_string()).collect(),
            review_threshold: 0.7,
        }
    }

    fn setup(notebook: &Notebook, owner: AuthorId) -> StorageEngine {
        let engine = StorageEngine::open_in_memory().unwrap();
        engine
            .writer()
            .with_conn_sync(|conn| {
                kx_storage::queries::authors::insert(
                    conn,
                    &Author { id: owner, public_key: b"o".to_vec(), trusted: true },
                )?;
                kx_storage::queries::notebooks::insert(conn, notebook)
            })
            .unwrap();
        engine
    }

    #[test]
    fn owner_always_has_admin_tier() {
        let owner = AuthorId::from_public_key(b"owner");
        let nb = notebook(owner, ClassificationLevel::Internal, &[]);
        let engine = setup(&nb, owner);
        engine
            .writer()
            .with_conn_sync(|conn| {
                Gate::require_tier(conn, nb.id, owner, AccessTier::Admin)?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn caller_with_no_grant_gets_not_found() {
        let owner = AuthorId::from_public_key(b"owner");
        let stranger = AuthorId::from_public_key(b"stranger");
        let nb = notebook(owner, ClassificationLevel::Internal, &[]);
        let engine = setup(&nb, owner);
        let err = engine
            .writer()
            .with_conn_sync(|conn| Gate::require_tier(conn, nb.id, stranger, AccessTier::Read))
            .unwrap_err();
        assert!(matches!(err, KxError::NotFound(_)));
    }

    #[test]
    fn caller_with_insufficient_grant_gets_forbidden() {
        let owner = AuthorId::from_public_key(b"owner");
        let reader = AuthorId::from_public_key(b"reader");
        let nb = notebook(owner, ClassificationLevel::Internal, &[]);
        let engine = setup(&nb, owner);
        engine
            .writer()
            .with_conn_sync(|conn| {
                kx_storage::queries::authors::insert(
                    conn,
                    &Author { id: reader, public_key: b"r".to_vec(), trusted: true },
                )?;
                kx_storage::queries::access::upsert(
                    conn,
                    &AccessGrant { notebook_id: nb.id, author_id: reader, tier: AccessTier::Read },
                )
            })
            .unwrap();

        let err = engine
            .writer()
            .with_conn_sync(|conn| Gate::require_tier(conn, nb.id, reader, AccessTier::ReadWrite))
            .unwrap_err();
        assert!(matches!(err, KxError::Forbidden(_)));
    }

    #[test]
    fn denial_is_audited() {
        let owner = AuthorId::from_public_key(b"owner");
        let stranger = AuthorId::from_public_key(b"stranger");
        let nb = notebook(owner, ClassificationLevel::Internal, &[]);
        let engine = setup(&nb, owner);
        let _ = engine
            .writer()
            .with_conn_sync(|conn| Gate::require_tier(conn, nb.id, stranger, AccessTier::Read));

        let records = engine
            .writer()
            .with_conn_sync(|conn| kx_storage::audit::query_by_notebook(conn, nb.id, 10))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, "access.denied");
    }

    #[test]
    fn agent_label_must_dominate_notebook_label_to_claim() {
        let owner = AuthorId::from_public_key(b"owner");
        let nb = notebook(owner, ClassificationLevel::Secret, &["alpha"]);
        let cleared = Label::new(ClassificationLevel::TopSecret, ["alpha".to_string()]);
        let uncleared = Label::new(ClassificationLevel::Confidential, BTreeSet::<String>::new());
        assert!(Gate::agent_may_claim(&nb, &cleared));
        assert!(!Gate::agent_may_claim(&nb, &uncleared));
    }
}
