use std::sync::Arc;

use chrono::Utc;
use kx_access::Gate;
use kx_core::config::FragmenterConfig;
use kx_core::error::{KxError, KxResult};
use kx_core::ids::{AuthorId, EntryId, NotebookId};
use kx_core::model::{
    AccessTier, AuditRecord, ClaimRecord, ClaimsStatus, Entry, EntryReview, IntegrationStatus,
    JobPayload, JobType, Label, ReviewStatus,
};
use kx_queue::JobQueue;
use kx_storage::queries::entries::BrowseFilter;
use kx_storage::queries::{authors, entries, reviews};
use kx_storage::StorageEngine;
use rusqlite::Connection;
use tracing::{info, instrument};

use crate::{cleanup, fragment, normalize};

/// Read-only external quota source, consulted per author before a write is
/// accepted. Pluggable so a deployment can back it with whatever accounting
/// system it already runs; the writer never mutates it.
pub trait QuotaSource: Send + Sync {
    /// `None` means unlimited; `Some(0)` rejects the write.
    fn remaining(&self, author: AuthorId) -> KxResult<Option<u64>>;
}

/// Default quota source: no enforcement.
pub struct UnlimitedQuota;

impl QuotaSource for UnlimitedQuota {
    fn remaining(&self, _author: AuthorId) -> KxResult<Option<u64>> {
        Ok(None)
    }
}

#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub notebook_id: NotebookId,
    pub author: AuthorId,
    /// The caller's classification clearance, checked against the
    /// notebook's label (§4.B rule 3) alongside the tier check.
    pub caller_label: Label,
    pub content: Vec<u8>,
    pub content_type: String,
    pub topic: Option<String>,
    pub references: Vec<EntryId>,
    /// Set to revise an existing entry; left `None` for a fresh write.
    pub revision_of: Option<EntryId>,
}

#[derive(Debug, Clone)]
pub struct WrittenEntry {
    pub entry_id: EntryId,
    pub sequence: u64,
    pub fragment_index: Option<u32>,
}

struct PersistedEntry {
    entry_id: EntryId,
    sequence: u64,
    fragment_index: Option<u32>,
    review_status: ReviewStatus,
}

pub struct Writer {
    engine: StorageEngine,
    queue: JobQueue,
    quota: Arc<dyn QuotaSource>,
    char_budget: usize,
}

impl Writer {
    pub fn new(engine: StorageEngine, queue: JobQueue, fragmenter: FragmenterConfig) -> Self {
        Self::with_quota(engine, queue, fragmenter, Arc::new(UnlimitedQuota))
    }

    pub fn with_quota(
        engine: StorageEngine,
        queue: JobQueue,
        fragmenter: FragmenterConfig,
        quota: Arc<dyn QuotaSource>,
    ) -> Self {
        Self {
            engine,
            queue,
            quota,
            char_budget: fragmenter.token_budget.saturating_mul(4).max(1),
        }
    }

    /// §4.C full write algorithm: gate, quota, normalize, clean up,
    /// fragment if oversized, persist with an atomically assigned
    /// sequence, route through the review gate, and — once approved —
    /// enqueue `DISTILL_CLAIMS` for every resulting entry.
    #[instrument(skip(self, req))]
    pub async fn write(&self, req: WriteRequest) -> KxResult<Vec<WrittenEntry>> {
        if let Some(0) = self.quota.remaining(req.author)? {
            return Err(KxError::Forbidden(format!(
                "author {} has exhausted their write quota",
                req.author
            )));
        }

        let (normalized, original_content_type) = normalize::normalize(&req.content, &req.content_type);
        let text = String::from_utf8_lossy(&normalized).into_owned();
        let cleaned = cleanup::cleanup(&text);
        let pieces = fragment::fragment(&cleaned, self.char_budget);
        let fragmented = pieces.len() > 1;
        // The head fragment's own id doubles as the group's `fragment_of`
        // anchor, so every fragment — including the head, self-referentially
        // — resolves to a real, addressable entry (§4.C step 5) and a later
        // `revise()` of that head entry can find its prior children.
        let entry_ids: Vec<EntryId> = pieces.iter().map(|_| EntryId::new()).collect();
        let group_id = fragmented.then(|| entry_ids[0]);

        let notebook_id = req.notebook_id;
        let author = req.author;
        let caller_label = req.caller_label.clone();
        let revision_of = req.revision_of;
        let references = req.references.clone();
        let topic = req.topic.clone();
        let content_type = req.content_type.clone();

        let (persisted, context_claims) = self
            .engine
            .writer()
            .with_conn(move |conn| {
                let _notebook =
                    Gate::require_clearance(conn, notebook_id, author, AccessTier::ReadWrite, &caller_label)?;

                if let Some(old) = revision_of {
                    let old_entry =
                        entries::get(conn, old)?.ok_or_else(|| KxError::NotFound(format!("entry {old}")))?;
                    if old_entry.notebook_id != notebook_id {
                        return Err(KxError::Invalid(
                            "revision_of must resolve within the same notebook".into(),
                        ));
                    }
                }
                for reference in &references {
                    let referenced = entries::get(conn, *reference)?
                        .ok_or_else(|| KxError::Invalid(format!("reference {reference} does not resolve")))?;
                    if referenced.notebook_id != notebook_id {
                        return Err(KxError::Invalid(
                            "references must resolve within the same notebook".into(),
                        ));
                    }
                }

                let author_row = authors::get(conn, author)?
                    .ok_or_else(|| KxError::Invalid(format!("unknown author {author}")))?;
                let review_status = if author_row.trusted {
                    ReviewStatus::Approved
                } else {
                    ReviewStatus::Pending
                };

                let context_claims = match revision_of {
                    Some(old) => prior_children_claims(conn, old)?,
                    None => vec![],
                };

                let mut out = Vec::with_capacity(pieces.len());
                for (i, piece) in pieces.iter().enumerate() {
                    let mut entry = Entry {
                        id: entry_ids[i],
                        notebook_id,
                        sequence: 0,
                        content: piece.content.as_bytes().to_vec(),
                        content_type: content_type.clone(),
                        original_content_type: original_content_type.clone(),
                        topic: topic.clone(),
                        author,
                        signature: vec![],
                        revision_of,
                        references: if i == 0 { references.clone() } else { vec![] },
                        fragment_of: group_id,
                        fragment_index: fragmented.then_some(i as u32),
                        claims: vec![],
                        claims_status: ClaimsStatus::Pending,
                        comparisons: vec![],
                        max_friction: None,
                        needs_review: false,
                        embedding: None,
                        integration_status: IntegrationStatus::Probation,
                        review_status: review_status.clone(),
                        expected_comparisons: None,
                        created: Utc::now(),
                    };
                    let sequence = entries::insert_with_next_sequence(conn, &mut entry)?;

                    if review_status == ReviewStatus::Pending {
                        reviews::insert(conn, &EntryReview::pending(entry.id))?;
                    }

                    kx_storage::audit::insert(
                        conn,
                        &AuditRecord::new("entry.write")
                            .notebook(notebook_id)
                            .author(author)
                            .target("entry", entry.id.to_string())
                            .detail(serde_json::json!({
                                "sequence": sequence,
                                "fragment_index": entry.fragment_index,
                                "review_status": format!("{review_status:?}"),
                            })),
                    )?;

                    out.push(PersistedEntry {
                        entry_id: entry.id,
                        sequence,
                        fragment_index: entry.fragment_index,
                        review_status: review_status.clone(),
                    });
                }
                Ok((out, context_claims))
            })
            .await?;

        let mut result = Vec::with_capacity(persisted.len());
        for entry in persisted {
            if entry.review_status == ReviewStatus::Approved {
                self.queue
                    .enqueue(
                        req.notebook_id,
                        JobType::DistillClaims,
                        JobPayload::DistillClaims {
                            entry_id: entry.entry_id,
                            context_claims: context_claims.clone(),
                        },
                        None,
                    )
                    .await?;
            }
            result.push(WrittenEntry {
                entry_id: entry.entry_id,
                sequence: entry.sequence,
                fragment_index: entry.fragment_index,
            });
        }
        info!(count = result.len(), "entry write complete");
        Ok(result)
    }

    /// Same gate and flow as [`Writer::write`], but the new entry carries
    /// `revision_of` and does not reassign the original's claims — it
    /// re-enters the pipeline fresh via the same `DISTILL_CLAIMS` enqueue.
    pub async fn revise(&self, mut req: WriteRequest, revision_of: EntryId) -> KxResult<Vec<WrittenEntry>> {
        req.revision_of = Some(revision_of);
        self.write(req).await
    }
}

/// §4.C step 8: when revising an entry whose fragments already went
/// through `DISTILL_CLAIMS`, surface their claims as context for the
/// revision's own distillation job.
fn prior_children_claims(conn: &Connection, parent: EntryId) -> KxResult<Vec<ClaimRecord>> {
    let Some(parent_entry) = entries::get(conn, parent)? else {
        return Ok(vec![]);
    };
    let children = entries::browse(
        conn,
        parent_entry.notebook_id,
        &BrowseFilter {
            fragment_of: Some(parent),
            include_unapproved: true,
            limit: 500,
            ..Default::default()
        },
    )?;
    Ok(children
        .into_iter()
        .filter(|e| e.claims_status != ClaimsStatus::Pending)
        .flat_map(|e| e.claims)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kx_core::ids::{AuthorId as AId, NotebookId as NbId};
    use kx_core::model::{Author, ClassificationLevel, Notebook};
    use kx_storage::queries::{authors, notebooks};
    use std::collections::BTreeSet;

    fn label(level: ClassificationLevel) -> Label {
        Label::new(level, BTreeSet::<String>::new())
    }

    async fn setup(review_threshold: f64) -> (Writer, NbId, AId, AId) {
        let engine = StorageEngine::open_in_memory().unwrap();
        let owner = AId::from_public_key(b"owner");
        let untrusted = AId::from_public_key(b"guest");
        let nb = Notebook {
            id: NbId::new(),
            name: "n".into(),
            owner_author: owner,
            created: Utc::now(),
            current_sequence: 0,
            classification_level: ClassificationLevel::Internal,
            compartments: BTreeSet::new(),
            review_threshold,
        };
        let nb_id = nb.id;
        engine
            .writer()
            .with_conn_sync(|conn| {
                authors::insert(conn, &Author { id: owner, public_key: b"owner".to_vec(), trusted: true })?;
                authors::insert(conn, &Author { id: untrusted, public_key: b"guest".to_vec(), trusted: false })?;
                notebooks::insert(conn, &nb)
            })
            .unwrap();
        let queue = JobQueue::new(engine.clone());
        let writer = Writer::new(engine, queue, FragmenterConfig::default());
        (writer, nb_id, owner, untrusted)
    }

    fn req(notebook_id: NbId, author: AId, content: &str) -> WriteRequest {
        WriteRequest {
            notebook_id,
            author,
            caller_label: label(ClassificationLevel::Internal),
            content: content.as_bytes().to_vec(),
            content_type: "text/plain".into(),
            topic: Some("science".into()),
            references: vec![],
            revision_of: None,
        }
    }

    #[tokio::test]
    async fn trusted_author_write_is_approved_and_enqueues_distill() {
        let (writer, nb_id, owner, _) = setup(0.7).await;
        let written = writer.write(req(nb_id, owner, "hello world")).await.unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].sequence, 1);

        let entry = writer
            .engine
            .writer()
            .with_conn_sync(|conn| entries::get(conn, written[0].entry_id))
            .unwrap()
            .unwrap();
        assert_eq!(entry.review_status, ReviewStatus::Approved);

        let stats = writer.queue.stats(nb_id).await.unwrap();
        assert!(stats.iter().any(|(t, s, n)| {
            *t == JobType::DistillClaims && *s == kx_core::model::JobStatus::Pending && *n == 1
        }));
    }

    #[tokio::test]
    async fn untrusted_author_write_is_pending_and_does_not_enqueue() {
        let (writer, nb_id, _, untrusted) = setup(0.7).await;
        let written = writer.write(req(nb_id, untrusted, "hello world")).await.unwrap();

        let entry = writer
            .engine
            .writer()
            .with_conn_sync(|conn| entries::get(conn, written[0].entry_id))
            .unwrap()
            .unwrap();
        assert_eq!(entry.review_status, ReviewStatus::Pending);

        let pending_review = writer
            .engine
            .writer()
            .with_conn_sync(|conn| reviews::get(conn, written[0].entry_id))
            .unwrap();
        assert!(pending_review.is_some());

        let stats = writer.queue.stats(nb_id).await.unwrap();
        assert!(stats.is_empty());
    }

    #[tokio::test]
    async fn oversized_content_is_fragmented_and_every_fragment_gets_its_own_distill_job() {
        let (writer, nb_id, owner, _) = setup(0.7).await;
        let mut r = req(nb_id, owner, "");
        r.content = format!("# One\n{}\n# Two\n{}", "a".repeat(20), "b".repeat(20)).into_bytes();
        let engine = writer.engine.clone();
        let queue = JobQueue::new(engine);
        let small_budget_writer = Writer::new(
            writer.engine.clone(),
            queue,
            FragmenterConfig { token_budget: 5 },
        );
        let written = small_budget_writer.write(r).await.unwrap();
        assert!(written.len() >= 2);
        assert_eq!(
            written.iter().map(|w| w.fragment_index).collect::<Vec<_>>(),
            (0..written.len() as u32).map(Some).collect::<Vec<_>>()
        );

        let stats = small_budget_writer.queue.stats(nb_id).await.unwrap();
        let distill_count: u64 = stats
            .iter()
            .filter(|(t, s, _)| *t == JobType::DistillClaims && *s == kx_core::model::JobStatus::Pending)
            .map(|(_, _, n)| *n)
            .sum();
        assert_eq!(distill_count, written.len() as u64);
    }

    #[tokio::test]
    async fn revise_sets_revision_of_and_reenters_pipeline_without_reassigning_claims() {
        let (writer, nb_id, owner, _) = setup(0.7).await;
        let original = writer.write(req(nb_id, owner, "v1 content")).await.unwrap();
        writer
            .engine
            .writer()
            .with_conn_sync(|conn| {
                entries::update_claims(
                    conn,
                    original[0].entry_id,
                    &[ClaimRecord { text: "water boils at 100C".into(), confidence: 0.9 }],
                    ClaimsStatus::Distilled,
                )
            })
            .unwrap();

        let revised = writer
            .revise(req(nb_id, owner, "v2 content"), original[0].entry_id)
            .await
            .unwrap();
        assert_eq!(revised.len(), 1);

        let entry = writer
            .engine
            .writer()
            .with_conn_sync(|conn| entries::get(conn, revised[0].entry_id))
            .unwrap()
            .unwrap();
        assert_eq!(entry.revision_of, Some(original[0].entry_id));
        assert!(entry.claims.is_empty());
        assert_eq!(entry.claims_status, ClaimsStatus::Pending);

        let original_still = writer
            .engine
            .writer()
            .with_conn_sync(|conn| entries::get(conn, original[0].entry_id))
            .unwrap()
            .unwrap();
        assert_eq!(original_still.claims_status, ClaimsStatus::Distilled);
    }

    #[tokio::test]
    async fn revising_a_fragmented_head_pulls_its_children_claims_as_context() {
        let (writer, nb_id, owner, _) = setup(0.7).await;
        let small_writer =
            Writer::new(writer.engine.clone(), JobQueue::new(writer.engine.clone()), FragmenterConfig { token_budget: 5 });
        let mut r = req(nb_id, owner, "");
        r.content = format!("# One\n{}\n# Two\n{}", "a".repeat(20), "b".repeat(20)).into_bytes();
        let fragments = small_writer.write(r).await.unwrap();
        assert!(fragments.len() >= 2);
        let head_id = fragments[0].entry_id;

        writer
            .engine
            .writer()
            .with_conn_sync(|conn| {
                entries::update_claims(
                    conn,
                    fragments[1].entry_id,
                    &[ClaimRecord { text: "claim from second fragment".into(), confidence: 0.8 }],
                    ClaimsStatus::Distilled,
                )
            })
            .unwrap();

        let revised = writer.revise(req(nb_id, owner, "v2 head content"), head_id).await.unwrap();
        let job = writer
            .queue
            .claim(nb_id, "worker-1".into(), Some(JobType::DistillClaims), None)
            .await
            .unwrap();
        // Drain every other pending DISTILL_CLAIMS job first so we land on
        // the revision's own job regardless of claim order.
        let mut found = job;
        while let Some(candidate) = &found {
            if let kx_core::model::JobPayload::DistillClaims { entry_id, context_claims } = &candidate.payload {
                if *entry_id == revised[0].entry_id {
                    assert_eq!(context_claims.len(), 1);
                    assert_eq!(context_claims[0].text, "claim from second fragment");
                    return;
                }
            }
            found = writer.queue.claim(nb_id, "worker-1".into(), Some(JobType::DistillClaims), None).await.unwrap();
        }
        panic!("revision's DISTILL_CLAIMS job was never claimed");
    }

    struct ZeroQuota;
    impl QuotaSource for ZeroQuota {
        fn remaining(&self, _author: AId) -> KxResult<Option<u64>> {
            Ok(Some(0))
        }
    }

    #[tokio::test]
    async fn exhausted_quota_rejects_the_write_before_touching_storage() {
        let (writer, nb_id, owner, _) = setup(0.7).await;
        let engine = writer.engine.clone();
        let limited = Writer::with_quota(
            engine,
            JobQueue::new(writer.engine.clone()),
            FragmenterConfig::default(),
            Arc::new(ZeroQuota),
        );
        let err = limited.write(req(nb_id, owner, "hello")).await.unwrap_err();
        assert!(matches!(err, KxError::Forbidden(_)));
    }
}
