//! Subscription lifecycle (§4.G): create with cycle + clearance checks,
//! tombstone on unsubscribe.

use chrono::Utc;
use kx_core::error::{KxError, KxResult};
use kx_core::ids::{AuthorId, NotebookId, SubscriptionId};
use kx_core::model::{AccessTier, AuditRecord, Label, Subscription, SubscriptionScope, SyncStatus};
use kx_access::Gate;
use kx_storage::queries::subscriptions;
use kx_storage::StorageEngine;
use tracing::{info, instrument};

use crate::cycle;

pub struct Manager {
    engine: StorageEngine,
}

impl Manager {
    pub fn new(engine: StorageEngine) -> Self {
        Self { engine }
    }

    /// Creates a subscription pulling `source` into `subscriber`. The
    /// approver must hold `Admin` on `subscriber` (they're the one
    /// committing the subscriber notebook to this data flow) and
    /// clearance dominating `source`'s classification label (§4.B rule 3)
    /// — a subscriber cannot pull content it isn't cleared to read.
    #[instrument(skip(self, approver_label))]
    pub async fn subscribe(
        &self,
        subscriber: NotebookId,
        source: NotebookId,
        scope: SubscriptionScope,
        topic_filter: Option<String>,
        discount_factor: f64,
        poll_interval_seconds: u32,
        approver: AuthorId,
        approver_label: Label,
    ) -> KxResult<SubscriptionId> {
        if discount_factor <= 0.0 || discount_factor > 1.0 {
            return Err(KxError::Invalid("discount_factor must be in (0, 1]".into()));
        }
        let poll_interval_seconds = poll_interval_seconds.max(Subscription::MIN_POLL_INTERVAL_SECONDS);

        self.engine
            .writer()
            .with_conn(move |conn| {
                Gate::require_tier(conn, subscriber, approver, AccessTier::Admin)?;
                Gate::require_clearance(conn, source, approver, AccessTier::Read, &approver_label)?;

                let existing: Vec<(NotebookId, NotebookId)> = subscriptions::list_all_active(conn)?
                    .into_iter()
                    .map(|s| (s.subscriber_notebook, s.source_notebook))
                    .collect();
                if cycle::would_create_cycle(&existing, subscriber, source) {
                    return Err(KxError::Conflict(format!(
                        "subscription {subscriber} -> {source} would close a cycle"
                    )));
                }

                let sub = Subscription {
                    id: SubscriptionId::new(),
                    subscriber_notebook: subscriber,
                    source_notebook: source,
                    scope,
                    topic_filter,
                    discount_factor,
                    poll_interval_seconds,
                    watermark: 0,
                    sync_status: SyncStatus::Active,
                    mirrored_count: 0,
                    approved_by: approver,
                    last_sync_at: None,
                };
                subscriptions::insert(conn, &sub)?;

                kx_storage::audit::insert(
                    conn,
                    &AuditRecord::new("subscription.created")
                        .notebook(subscriber)
                        .author(approver)
                        .target("notebook", source.to_string()),
                )?;
                info!(%subscriber, %source, "subscription created");
                Ok(sub.id)
            })
            .await
    }

    /// Stops syncing a subscription and tombstones everything it mirrored
    /// so subscriber-side browsers stop surfacing it.
    #[instrument(skip(self, caller_label))]
    pub async fn unsubscribe(
        &self,
        subscription_id: SubscriptionId,
        caller: AuthorId,
        caller_label: Label,
    ) -> KxResult<()> {
        self.engine
            .writer()
            .with_conn(move |conn| {
                let sub = subscriptions::get(conn, subscription_id)?
                    .ok_or_else(|| KxError::NotFound(format!("subscription {subscription_id}")))?;
                Gate::require_clearance(conn, sub.subscriber_notebook, caller, AccessTier::Admin, &caller_label)?;

                for entry in subscriptions::list_mirrored_entries(conn, subscription_id, false)? {
                    subscriptions::tombstone_mirrored_entry(conn, subscription_id, entry.source_entry_id)?;
                }
                subscriptions::set_sync_status(conn, subscription_id, SyncStatus::Paused)?;

                kx_storage::audit::insert(
                    conn,
                    &AuditRecord::new("subscription.removed")
                        .notebook(sub.subscriber_notebook)
                        .author(caller)
                        .target("subscription", subscription_id.to_string()),
                )?;
                info!(%subscription_id, "subscription unsubscribed, mirrors tombstoned");
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kx_core::model::{Author, ClassificationLevel, Notebook};
    use std::collections::BTreeSet;

    fn label() -> Label {
        Label::new(ClassificationLevel::Internal, [])
    }

    fn notebook(owner: AuthorId) -> Notebook {
        Notebook {
            id: NotebookId::new(),
            name: "n".into(),
            owner_author: owner,
            created: Utc::now(),
            current_sequence: 0,
            classification_level: ClassificationLevel::Internal,
            compartments: BTreeSet::new(),
            review_threshold: 0.7,
        }
    }

    async fn setup() -> (Manager, NotebookId, NotebookId, AuthorId) {
        let engine = StorageEngine::open_in_memory().unwrap();
        let owner = AuthorId::from_public_key(b"owner");
        let a = notebook(owner);
        let b = notebook(owner);
        let (a_id, b_id) = (a.id, b.id);
        engine
            .writer()
            .with_conn_sync(|conn| {
                kx_storage::queries::authors::insert(conn, &Author { id: owner, public_key: b"o".to_vec(), trusted: true })?;
                kx_storage::queries::notebooks::insert(conn, &a)?;
                kx_storage::queries::notebooks::insert(conn, &b)
            })
            .unwrap();
        (Manager::new(engine), a_id, b_id, owner)
    }

    #[tokio::test]
    async fn owner_can_subscribe_their_notebook_to_another() {
        let (mgr, a, b, owner) = setup().await;
        let id = mgr
            .subscribe(a, b, SubscriptionScope::Claims, None, 0.5, 30, owner, label())
            .await
            .unwrap();
        assert_ne!(id, SubscriptionId::nil());
    }

    #[tokio::test]
    async fn reverse_subscription_closing_a_cycle_is_rejected() {
        let (mgr, a, b, owner) = setup().await;
        mgr.subscribe(a, b, SubscriptionScope::Claims, None, 0.5, 30, owner, label()).await.unwrap();
        let err = mgr
            .subscribe(b, a, SubscriptionScope::Claims, None, 0.5, 30, owner, label())
            .await
            .unwrap_err();
        assert!(matches!(err, KxError::Conflict(_)));
    }

    #[tokio::test]
    async fn invalid_discount_factor_is_rejected() {
        let (mgr, a, b, owner) = setup().await;
        let err = mgr
            .subscribe(a, b, SubscriptionScope::Claims, None, 0.0, 30, owner, label())
            .await
            .unwrap_err();
        assert!(matches!(err, KxError::Invalid(_)));
    }

    #[tokio::test]
    async fn unsubscribe_tombstones_mirrors_and_pauses_sync() {
        let (mgr, a, b, owner) = setup().await;
        let id = mgr
            .subscribe(a, b, SubscriptionScope::Claims, None, 0.5, 30, owner, label())
            .await
            .unwrap();
        mgr.unsubscribe(id, owner, label()).await.unwrap();
        let sub = mgr.engine.writer().with_conn(move |conn| subscriptions::get(conn, id)).await.unwrap().unwrap();
        assert_eq!(sub.sync_status, SyncStatus::Paused);
    }
}
