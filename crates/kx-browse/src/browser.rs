//! Filtered browse, the observe change feed, and claims-batch lookup
//! (§4.F). Every call gates through `Gate::require_clearance` first; the
//! storage layer's plain `include_unapproved` flag can't express "the
//! submitter sees their own pending work, nobody else's" (invariant v),
//! so that merge happens here instead.

use kx_core::error::KxResult;
use kx_core::ids::{AuthorId, EntryId, NotebookId};
use kx_core::model::{
    AccessTier, ClaimRecord, ClaimsStatus, Entry, IntegrationStatus, Label, ReviewStatus,
};
use kx_access::Gate;
use kx_storage::queries::entries::{self, BrowseFilter};
use kx_storage::StorageEngine;
use tracing::instrument;

/// Caller-facing browse predicates, mirroring `kx_storage`'s `BrowseFilter`
/// minus `include_unapproved` — that flag is derived from the caller's
/// tier here, never set directly.
#[derive(Debug, Clone, Default)]
pub struct BrowseQuery {
    pub topic_prefix: Option<String>,
    pub claims_status: Option<ClaimsStatus>,
    pub integration_status: Option<IntegrationStatus>,
    pub author: Option<AuthorId>,
    pub sequence_min: Option<u64>,
    pub sequence_max: Option<u64>,
    pub has_friction_above: Option<f64>,
    pub needs_review: Option<bool>,
    pub fragment_of: Option<EntryId>,
    pub query: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

impl BrowseQuery {
    fn to_storage_filter(&self, include_unapproved: bool) -> BrowseFilter {
        BrowseFilter {
            topic_prefix: self.topic_prefix.clone(),
            claims_status: self.claims_status.clone(),
            integration_status: self.integration_status.clone(),
            author: self.author,
            sequence_min: self.sequence_min,
            sequence_max: self.sequence_max,
            has_friction_above: self.has_friction_above,
            needs_review: self.needs_review,
            fragment_of: self.fragment_of,
            query: self.query.clone(),
            limit: self.limit,
            offset: self.offset,
            include_unapproved,
        }
    }
}

pub struct Browser {
    pub(crate) engine: StorageEngine,
}

impl Browser {
    pub fn new(engine: StorageEngine) -> Self {
        Self { engine }
    }

    /// §4.F browse: AND-combined filters, ascending-sequence pagination.
    /// Admins see every review status; everyone else sees approved
    /// entries plus their own pending/rejected submissions.
    #[instrument(skip(self, caller_label, query))]
    pub async fn browse(
        &self,
        notebook_id: NotebookId,
        caller: AuthorId,
        caller_label: Label,
        query: BrowseQuery,
    ) -> KxResult<Vec<Entry>> {
        let limit = query.limit.min(500).max(1) as usize;
        self.engine
            .writer()
            .with_conn(move |conn| {
                let notebook = Gate::require_clearance(conn, notebook_id, caller, AccessTier::Read, &caller_label)?;
                let is_admin = Gate::effective_tier(conn, &notebook, caller)? == Some(AccessTier::Admin);

                if is_admin {
                    let filter = query.to_storage_filter(true);
                    return entries::browse(conn, notebook_id, &filter);
                }

                let mut visible = entries::browse(conn, notebook_id, &query.to_storage_filter(false))?;

                if query.author.is_none() || query.author == Some(caller) {
                    let mut own_filter = query.to_storage_filter(true);
                    own_filter.author = Some(caller);
                    own_filter.offset = 0;
                    let own_pending = entries::browse(conn, notebook_id, &own_filter)?
                        .into_iter()
                        .filter(|e| e.review_status != ReviewStatus::Approved);
                    visible.extend(own_pending);
                }

                visible.sort_by_key(|e| e.sequence);
                visible.dedup_by(|a, b| a.id == b.id);
                visible.truncate(limit);
                Ok(visible)
            })
            .await
    }

    /// §4.F observe: entries with `sequence > since_sequence`, ascending,
    /// capped by `limit`. Always approved-only — the change feed is a
    /// shared cursor, not a per-submitter view.
    #[instrument(skip(self, caller_label))]
    pub async fn observe(
        &self,
        notebook_id: NotebookId,
        caller: AuthorId,
        caller_label: Label,
        since_sequence: u64,
        topic_prefix: Option<String>,
        limit: u32,
    ) -> KxResult<Vec<Entry>> {
        self.engine
            .writer()
            .with_conn(move |conn| {
                Gate::require_clearance(conn, notebook_id, caller, AccessTier::Read, &caller_label)?;
                entries::observe(conn, notebook_id, since_sequence, topic_prefix.as_deref(), limit)
            })
            .await
    }

    /// §4.F claims batch: resolve a list of entry ids to their claim sets
    /// in one round trip. Ids outside the notebook or not yet approved are
    /// silently dropped rather than erroring the whole batch.
    #[instrument(skip(self, caller_label, ids))]
    pub async fn claims_batch(
        &self,
        notebook_id: NotebookId,
        caller: AuthorId,
        caller_label: Label,
        ids: Vec<EntryId>,
    ) -> KxResult<Vec<(EntryId, Vec<ClaimRecord>)>> {
        self.engine
            .writer()
            .with_conn(move |conn| {
                Gate::require_clearance(conn, notebook_id, caller, AccessTier::Read, &caller_label)?;
                let mut out = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(entry) = entries::get(conn, id)? {
                        if entry.notebook_id == notebook_id && entry.review_status == ReviewStatus::Approved {
                            out.push((id, entry.claims));
                        }
                    }
                }
                Ok(out)
            })
            .await
    }
}
