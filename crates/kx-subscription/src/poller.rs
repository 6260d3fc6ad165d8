//! Mirroring cycle (§4.G): for each due subscription, pull the source's
//! change feed since `watermark`, upsert mirrored-entry shadows, enqueue
//! `EMBED_MIRRORED` for anything with claims, and advance the watermark.
//! The actual poll *loop* lives in `kx-server`; this is the logic it
//! calls once per due subscription.

use chrono::Utc;
use kx_core::error::KxResult;
use kx_core::ids::SubscriptionId;
use kx_core::model::{JobPayload, JobType, MirroredEntry};
use kx_queue::JobQueue;
use kx_storage::queries::{entries, subscriptions};
use kx_storage::StorageEngine;
use tracing::{info, instrument};

const FEED_PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub mirrored: u64,
    pub embed_jobs_enqueued: u64,
    pub new_watermark: u64,
}

pub struct Poller {
    engine: StorageEngine,
    queue: JobQueue,
}

impl Poller {
    pub fn new(engine: StorageEngine, queue: JobQueue) -> Self {
        Self { engine, queue }
    }

    /// Every active subscription whose poll interval has elapsed.
    #[instrument(skip(self))]
    pub async fn sync_due(&self) -> KxResult<Vec<(SubscriptionId, KxResult<SyncReport>)>> {
        let due: Vec<SubscriptionId> = self
            .engine
            .writer()
            .with_conn(|conn| {
                let now = Utc::now();
                Ok(subscriptions::list_all_active(conn)?
                    .into_iter()
                    .filter(|s| s.is_due(now))
                    .map(|s| s.id)
                    .collect())
            })
            .await?;

        let mut reports = Vec::with_capacity(due.len());
        for id in due {
            reports.push((id, self.sync_one(id).await));
        }
        Ok(reports)
    }

    /// Pulls `source`'s approved change feed since `watermark` and
    /// upserts a mirrored shadow for every entry in it. An entry synced
    /// before its own `DISTILL_CLAIMS` lands is mirrored with empty claims
    /// and not revisited later — watermarks never move backward — so
    /// `EMBED_MIRRORED` is only enqueued for entries that already carry
    /// claims at sync time.
    #[instrument(skip(self))]
    pub async fn sync_one(&self, subscription_id: SubscriptionId) -> KxResult<SyncReport> {
        let sub = self
            .engine
            .writer()
            .with_conn(move |conn| {
                subscriptions::get(conn, subscription_id)?
                    .ok_or_else(|| kx_core::error::KxError::NotFound(format!("subscription {subscription_id}")))
            })
            .await?;

        let feed = self
            .engine
            .writer()
            .with_conn({
                let topic_filter = sub.topic_filter.clone();
                move |conn| {
                    entries::observe(conn, sub.source_notebook, sub.watermark, topic_filter.as_deref(), FEED_PAGE_SIZE)
                }
            })
            .await?;

        let mut new_watermark = sub.watermark;
        let mut mirrored = 0u64;
        let mut embed_jobs_enqueued = 0u64;

        for entry in &feed {
            new_watermark = new_watermark.max(entry.sequence);

            let shadow = MirroredEntry {
                subscription_id,
                source_entry_id: entry.id,
                source_sequence: entry.sequence,
                claims: entry.claims.clone(),
                embedding: None,
                topic: entry.topic.clone(),
                tombstoned: false,
            };
            self.engine
                .writer()
                .with_conn(move |conn| subscriptions::upsert_mirrored_entry(conn, &shadow))
                .await?;
            mirrored += 1;

            if !entry.claims.is_empty() {
                self.queue
                    .enqueue(
                        sub.subscriber_notebook,
                        JobType::EmbedMirrored,
                        JobPayload::EmbedMirrored {
                            subscription_id,
                            source_entry_id: entry.id,
                            claims: entry.claims.clone(),
                        },
                        None,
                    )
                    .await?;
                embed_jobs_enqueued += 1;
            }
        }

        self.engine
            .writer()
            .with_conn(move |conn| subscriptions::advance_watermark(conn, subscription_id, new_watermark, Utc::now()))
            .await?;
        if mirrored > 0 {
            self.engine
                .writer()
                .with_conn(move |conn| subscriptions::increment_mirrored_count(conn, subscription_id, mirrored))
                .await?;
        }

        info!(%subscription_id, mirrored, embed_jobs_enqueued, new_watermark, "subscription synced");
        Ok(SyncReport { mirrored, embed_jobs_enqueued, new_watermark })
    }
}
