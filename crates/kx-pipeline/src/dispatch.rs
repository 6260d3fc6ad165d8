use kx_core::config::PipelineConfig;
use kx_core::error::{KxError, KxResult};
use kx_core::ids::EntryId;
use kx_core::model::{
    ClaimRecord, ClaimsStatus, Comparison, Entry, IntegrationStatus, Job, JobPayload, JobResult,
    JobType,
};
use kx_queue::JobQueue;
use kx_storage::queries::{entries, subscriptions};
use kx_storage::StorageEngine;
use tracing::{debug, info};

use crate::retroactive::RetroactiveQueue;

/// One semantic-neighbor candidate eligible for `COMPARE_CLAIMS`, whether
/// native to the notebook or mirrored in from a subscription.
struct Candidate {
    entry_id: EntryId,
    claims: Vec<ClaimRecord>,
    discount_factor: Option<f64>,
    is_mirrored: bool,
    similarity: f64,
}

pub struct Orchestrator {
    engine: StorageEngine,
    queue: JobQueue,
    config: PipelineConfig,
    retroactive: RetroactiveQueue,
}

impl Orchestrator {
    pub fn new(engine: StorageEngine, queue: JobQueue, config: PipelineConfig) -> Self {
        let retroactive = RetroactiveQueue::new(config.retroactive_queue_capacity);
        Self { engine, queue, config, retroactive }
    }

    pub fn retroactive_queue(&self) -> &RetroactiveQueue {
        &self.retroactive
    }

    /// Single consumer interface: a worker-poll loop calls this once
    /// `Complete` has been accepted at the storage layer. Per Failure
    /// policy (§4.E): the job is already `completed` regardless of what
    /// happens here; any error here is logged and repaired later by an
    /// administrative retry, never by un-completing the job.
    pub async fn on_completed(&self, job: &Job, result: &JobResult) -> KxResult<()> {
        let outcome = match (&job.payload, result) {
            (JobPayload::DistillClaims { entry_id, .. }, JobResult::DistillClaims { claims }) => {
                self.on_distill_claims(*entry_id, claims.clone()).await
            }
            (JobPayload::EmbedClaims { entry_id, claims }, JobResult::EmbedClaims { embedding }) => {
                self.on_embed_claims(*entry_id, claims.clone(), embedding.clone()).await
            }
            (
                JobPayload::CompareClaims {
                    entry_id,
                    compare_against_id,
                    discount_factor,
                    against_is_mirrored,
                    ..
                },
                JobResult::CompareClaims { entropy, friction, contradictions },
            ) => {
                self.on_compare_claims(
                    *entry_id,
                    *compare_against_id,
                    *entropy,
                    *friction,
                    contradictions.clone(),
                    *against_is_mirrored,
                    *discount_factor,
                )
                .await
            }
            (JobPayload::ClassifyTopic { entry_id, .. }, JobResult::ClassifyTopic { primary_topic, .. }) => {
                self.on_classify_topic(*entry_id, primary_topic.clone()).await
            }
            (
                JobPayload::EmbedMirrored { subscription_id, source_entry_id, .. },
                JobResult::EmbedMirrored { embedding },
            ) => self.on_embed_mirrored(*subscription_id, *source_entry_id, embedding.clone()).await,
            _ => Err(KxError::Invalid(format!(
                "job {} payload/result type mismatch",
                job.id
            ))),
        };

        if let Err(ref e) = outcome {
            tracing::error!(job_id = %job.id, error = %e, "pipeline dispatch failed, job remains completed");
        }
        outcome
    }

    async fn on_distill_claims(&self, entry_id: EntryId, claims: Vec<ClaimRecord>) -> KxResult<()> {
        let entry = self.get_entry(entry_id).await?;
        self.engine
            .writer()
            .with_conn({
                let claims = claims.clone();
                move |conn| entries::update_claims(conn, entry_id, &claims, ClaimsStatus::Distilled)
            })
            .await?;

        self.queue
            .enqueue(
                entry.notebook_id,
                JobType::EmbedClaims,
                JobPayload::EmbedClaims { entry_id, claims: claims.clone() },
                None,
            )
            .await?;
        self.queue
            .enqueue(
                entry.notebook_id,
                JobType::ClassifyTopic,
                JobPayload::ClassifyTopic { entry_id, claims, available_topics: vec![] },
                None,
            )
            .await?;
        debug!(%entry_id, "claims distilled, embed + classify enqueued");
        Ok(())
    }

    async fn on_embed_claims(
        &self,
        entry_id: EntryId,
        claims: Vec<ClaimRecord>,
        embedding: Vec<f32>,
    ) -> KxResult<()> {
        self.engine
            .writer()
            .with_conn({
                let embedding = embedding.clone();
                move |conn| entries::update_embedding(conn, entry_id, &embedding)
            })
            .await?;

        let entry = self.get_entry(entry_id).await?;
        let candidates = self.semantic_candidates(&entry, &embedding).await?;

        let mut enqueued = 0u32;
        for candidate in &candidates {
            self.queue
                .enqueue(
                    entry.notebook_id,
                    JobType::CompareClaims,
                    JobPayload::CompareClaims {
                        entry_id,
                        compare_against_id: candidate.entry_id,
                        claims_a: candidate.claims.clone(),
                        claims_b: claims.clone(),
                        discount_factor: candidate.discount_factor,
                        against_is_mirrored: candidate.is_mirrored,
                    },
                    None,
                )
                .await?;
            enqueued += 1;
        }
        self.engine
            .writer()
            .with_conn(move |conn| entries::set_expected_comparisons(conn, entry_id, enqueued))
            .await?;
        debug!(%entry_id, neighbors = enqueued, "embedding stored, compare jobs enqueued");
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn on_compare_claims(
        &self,
        entry_id: EntryId,
        compare_against_id: EntryId,
        entropy: f64,
        friction: f64,
        contradictions: Vec<kx_core::model::Contradiction>,
        is_mirrored: bool,
        discount_factor: Option<f64>,
    ) -> KxResult<()> {
        let scaled_friction = match (is_mirrored, discount_factor) {
            (true, Some(d)) => friction * d,
            _ => friction,
        };
        let entry = self.get_entry(entry_id).await?;
        let notebook = self.get_notebook(entry.notebook_id).await?;

        let comparison = Comparison {
            compared_against: compare_against_id,
            entropy,
            friction: scaled_friction,
            contradictions,
            is_mirrored,
        };

        let updated = self
            .engine
            .writer()
            .with_conn({
                let comparison = comparison.clone();
                let threshold = notebook.review_threshold;
                move |conn| entries::append_comparison(conn, entry_id, comparison, threshold)
            })
            .await?;

        // §4.E: integration status is a function of the entry's whole
        // comparison set, not just the comparison that just landed —
        // `integrated` needs every peer past T_int, `orphan` needs every
        // peer still below T_low.
        let similarities: Vec<f64> = updated.comparisons.iter().map(|c| 1.0 - c.entropy).collect();
        let min_similarity = similarities.iter().copied().fold(f64::INFINITY, f64::min);
        let max_similarity = similarities.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let integration_status = if min_similarity >= self.config.integration_threshold
            && updated.max_friction.unwrap_or(0.0) < self.config.friction_threshold
        {
            IntegrationStatus::Integrated
        } else if max_similarity < self.config.low_similarity_threshold {
            IntegrationStatus::Orphan
        } else {
            IntegrationStatus::Probation
        };
        self.engine
            .writer()
            .with_conn(move |conn| entries::update_integration_status(conn, entry_id, integration_status))
            .await?;

        if self.config.retroactive_propagation_enabled && !is_mirrored {
            self.retroactive.push(
                compare_against_id,
                Comparison {
                    compared_against: entry_id,
                    entropy,
                    friction: scaled_friction,
                    contradictions: comparison.contradictions.clone(),
                    is_mirrored: false,
                },
            );
        }

        info!(%entry_id, %compare_against_id, friction = scaled_friction, ?integration_status, "comparison landed");
        Ok(())
    }

    async fn on_classify_topic(&self, entry_id: EntryId, primary_topic: String) -> KxResult<()> {
        self.engine
            .writer()
            .with_conn(move |conn| entries::update_topic(conn, entry_id, &primary_topic))
            .await
    }

    async fn on_embed_mirrored(
        &self,
        subscription_id: kx_core::ids::SubscriptionId,
        source_entry_id: EntryId,
        embedding: Vec<f32>,
    ) -> KxResult<()> {
        self.engine
            .writer()
            .with_conn(move |conn| {
                subscriptions::update_mirrored_embedding(conn, subscription_id, source_entry_id, &embedding)
            })
            .await
    }

    /// Drain the retroactive-propagation queue: for every pending peer,
    /// append the mirrored comparison to its own row and recompute its
    /// cached friction/review flag (§4.E "Retroactive propagation").
    pub async fn drain_retroactive(&self) -> KxResult<usize> {
        let pending = self.retroactive.drain();
        let mut applied = 0;
        for item in pending {
            let entry = match self.get_entry(item.peer_id).await {
                Ok(e) => e,
                Err(KxError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            let notebook = self.get_notebook(entry.notebook_id).await?;
            self.engine
                .writer()
                .with_conn({
                    let comparison = item.comparison.clone();
                    let threshold = notebook.review_threshold;
                    move |conn| entries::append_comparison(conn, item.peer_id, comparison, threshold)
                })
                .await?;
            applied += 1;
        }
        Ok(applied)
    }

    async fn semantic_candidates(&self, entry: &Entry, embedding: &[f32]) -> KxResult<Vec<Candidate>> {
        let notebook_id = entry.notebook_id;
        let entry_id = entry.id;
        let k = self.config.semantic_top_k;
        let min_sim = self.config.semantic_min_similarity;

        let native = self
            .engine
            .writer()
            .with_conn({
                let embedding = embedding.to_vec();
                move |conn| entries::semantic_search(conn, notebook_id, &embedding, k, min_sim)
            })
            .await?;

        let mut candidates: Vec<Candidate> = native
            .into_iter()
            .filter(|(peer, _)| peer.id != entry_id)
            .map(|(peer, sim)| Candidate {
                entry_id: peer.id,
                claims: peer.claims,
                discount_factor: None,
                is_mirrored: false,
                similarity: sim,
            })
            .collect();

        if self.config.include_mirrored_in_compare {
            let subs = self
                .engine
                .writer()
                .with_conn(move |conn| subscriptions::list_for_subscriber(conn, notebook_id))
                .await?;
            for sub in subs {
                let mirrored = self
                    .engine
                    .writer()
                    .with_conn(move |conn| subscriptions::list_mirrored_entries(conn, sub.id, false))
                    .await?;
                for m in mirrored {
                    let Some(peer_embedding) = &m.embedding else { continue };
                    let sim = entries::cosine_similarity(embedding, peer_embedding);
                    if sim >= min_sim {
                        candidates.push(Candidate {
                            entry_id: m.source_entry_id,
                            claims: m.claims,
                            discount_factor: Some(sub.discount_factor),
                            is_mirrored: true,
                            similarity: sim,
                        });
                    }
                }
            }
        }

        candidates.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(k);
        Ok(candidates)
    }

    async fn get_entry(&self, id: EntryId) -> KxResult<Entry> {
        self.engine
            .writer()
            .with_conn(move |conn| entries::get(conn, id))
            .await?
            .ok_or_else(|| KxError::NotFound(format!("entry {id}")))
    }

    async fn get_notebook(&self, id: kx_core::ids::NotebookId) -> KxResult<kx_core::model::Notebook> {
        self.engine
            .writer()
            .with_conn(move |conn| kx_storage::queries::notebooks::get(conn, id))
            .await?
            .ok_or_else(|| KxError::NotFound(format!("notebook {id}")))
    }
}
