//! Search modes (§4.F): lexical full-text with snippets, semantic
//! k-nearest-neighbor (native entries unioned with mirrored claims, same
//! candidate-gathering shape as `kx-pipeline`'s `COMPARE_CLAIMS` fan-out),
//! and claims-batch lookup (in `browser.rs`).

use kx_core::error::{KxError, KxResult};
use kx_core::ids::{AuthorId, EntryId, NotebookId};
use kx_core::model::{AccessTier, Label};
use kx_access::Gate;
use kx_storage::queries::entries::{self, BrowseFilter};
use kx_storage::queries::subscriptions;
use tracing::instrument;

use crate::browser::Browser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Lexical,
    Semantic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub entry_id: EntryId,
    pub snippet: Option<String>,
    pub similarity: Option<f64>,
    pub is_mirrored: bool,
    pub discount_factor: Option<f64>,
}

/// Embedding generation is an external language-model callout (§1
/// Non-goals), so semantic search takes one as an injected dependency
/// rather than computing it in-process — the same pattern `kx-writer`
/// uses for per-author quotas.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> KxResult<Vec<f32>>;
}

/// No embedder configured: semantic search is unavailable, not silently
/// wrong.
pub struct NullEmbedder;

impl Embedder for NullEmbedder {
    fn embed(&self, _text: &str) -> KxResult<Vec<f32>> {
        Err(KxError::Unavailable("no embedder configured for semantic search".into()))
    }
}

struct Candidate {
    entry_id: EntryId,
    similarity: f64,
    is_mirrored: bool,
    discount_factor: Option<f64>,
}

impl Browser {
    /// Trigram full-text search over content + topic, with a short
    /// surrounding-text snippet for each hit.
    #[instrument(skip(self, caller_label, query_text))]
    pub async fn search_lexical(
        &self,
        notebook_id: NotebookId,
        caller: AuthorId,
        caller_label: Label,
        query_text: String,
        limit: u32,
    ) -> KxResult<Vec<SearchHit>> {
        let needle = query_text.clone();
        let entries = self
            .engine
            .writer()
            .with_conn(move |conn| {
                Gate::require_clearance(conn, notebook_id, caller, AccessTier::Read, &caller_label)?;
                entries::browse(
                    conn,
                    notebook_id,
                    &BrowseFilter {
                        query: Some(query_text),
                        limit,
                        ..Default::default()
                    },
                )
            })
            .await?;

        Ok(entries
            .into_iter()
            .map(|e| SearchHit {
                entry_id: e.id,
                snippet: snippet(&e.content, &needle),
                similarity: None,
                is_mirrored: false,
                discount_factor: None,
            })
            .collect())
    }

    /// k-nearest-neighbor search by embedding cosine similarity, unioned
    /// with mirrored claims from every subscription the notebook holds and
    /// tagged with `is_mirrored` + the subscription's discount factor.
    #[instrument(skip(self, caller_label, query_text, embedder))]
    pub async fn search_semantic(
        &self,
        notebook_id: NotebookId,
        caller: AuthorId,
        caller_label: Label,
        query_text: &str,
        k: usize,
        min_similarity: f64,
        embedder: &dyn Embedder,
    ) -> KxResult<Vec<SearchHit>> {
        let query_embedding = embedder.embed(query_text)?;

        let candidates = self
            .engine
            .writer()
            .with_conn({
                let query_embedding = query_embedding.clone();
                move |conn| {
                    Gate::require_clearance(conn, notebook_id, caller, AccessTier::Read, &caller_label)?;

                    let mut candidates: Vec<Candidate> = entries::semantic_search(
                        conn,
                        notebook_id,
                        &query_embedding,
                        k,
                        min_similarity,
                    )?
                    .into_iter()
                    .map(|(e, sim)| Candidate {
                        entry_id: e.id,
                        similarity: sim,
                        is_mirrored: false,
                        discount_factor: None,
                    })
                    .collect();

                    for sub in subscriptions::list_for_subscriber(conn, notebook_id)? {
                        for mirrored in subscriptions::list_mirrored_entries(conn, sub.id, false)? {
                            let Some(embedding) = &mirrored.embedding else { continue };
                            let sim = entries::cosine_similarity(&query_embedding, embedding);
                            if sim >= min_similarity {
                                candidates.push(Candidate {
                                    entry_id: mirrored.source_entry_id,
                                    similarity: sim,
                                    is_mirrored: true,
                                    discount_factor: Some(sub.discount_factor),
                                });
                            }
                        }
                    }
                    Ok(candidates)
                }
            })
            .await?;

        let mut candidates = candidates;
        candidates.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(k);

        Ok(candidates
            .into_iter()
            .map(|c| SearchHit {
                entry_id: c.entry_id,
                snippet: None,
                similarity: Some(c.similarity),
                is_mirrored: c.is_mirrored,
                discount_factor: c.discount_factor,
            })
            .collect())
    }
}

/// First case-insensitive occurrence of any whitespace-separated query
/// term, with ~30 characters of surrounding context on each side.
fn snippet(content: &[u8], query_text: &str) -> Option<String> {
    const CONTEXT: usize = 30;
    let text = String::from_utf8_lossy(content);
    let lower = text.to_lowercase();
    let term = query_text.split_whitespace().next()?.to_lowercase();
    let pos = lower.find(&term)?;

    let start = lower[..pos].char_indices().rev().nth(CONTEXT).map(|(i, _)| i).unwrap_or(0);
    let end_from = pos + term.len();
    let end = text[end_from..]
        .char_indices()
        .nth(CONTEXT)
        .map(|(i, _)| end_from + i)
        .unwrap_or(text.len());

    Some(text[start..end].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kx_core::ids::NotebookId;
    use kx_core::model::{Author, ClaimsStatus, ClassificationLevel, Entry, IntegrationStatus, Notebook, ReviewStatus};
    use kx_storage::StorageEngine;
    use std::collections::BTreeSet;

    fn label() -> Label {
        Label::new(ClassificationLevel::Internal, [])
    }

    struct FixedEmbedder(Vec<f32>);
    impl Embedder for FixedEmbedder {
        fn embed(&self, _text: &str) -> KxResult<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    async fn setup() -> (Browser, NotebookId, AuthorId) {
        let engine = StorageEngine::open_in_memory().unwrap();
        let owner = AuthorId::from_public_key(b"owner");
        let nb = Notebook {
            id: NotebookId::new(),
            name: "n".into(),
            owner_author: owner,
            created: chrono::Utc::now(),
            current_sequence: 0,
            classification_level: ClassificationLevel::Internal,
            compartments: BTreeSet::new(),
            review_threshold: 0.7,
        };
        let nb_id = nb.id;
        engine
            .writer()
            .with_conn_sync(|conn| {
                kx_storage::queries::authors::insert(conn, &Author { id: owner, public_key: b"o".to_vec(), trusted: true })?;
                kx_storage::queries::notebooks::insert(conn, &nb)?;

                let mut e1 = Entry {
                    id: EntryId::new(),
                    notebook_id: nb_id,
                    sequence: 0,
                    content: b"the quick brown fox jumps over the lazy dog".to_vec(),
                    content_type: "text/plain".into(),
                    original_content_type: None,
                    topic: None,
                    author: owner,
                    signature: vec![],
                    revision_of: None,
                    references: vec![],
                    fragment_of: None,
                    fragment_index: None,
                    claims: vec![],
                    claims_status: ClaimsStatus::Pending,
                    comparisons: vec![],
                    max_friction: None,
                    needs_review: false,
                    embedding: Some(vec![1.0, 0.0]),
                    integration_status: IntegrationStatus::Probation,
                    review_status: ReviewStatus::Approved,
                    expected_comparisons: None,
                    created: chrono::Utc::now(),
                };
                entries::insert_with_next_sequence(conn, &mut e1)?;
                Ok(())
            })
            .unwrap();
        (Browser::new(engine), nb_id, owner)
    }

    #[tokio::test]
    async fn lexical_search_returns_a_snippet_around_the_match() {
        let (browser, nb_id, owner) = setup().await;
        let hits = browser
            .search_lexical(nb_id, owner, label(), "fox".to_string(), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].snippet.as_ref().unwrap().contains("fox"));
    }

    #[tokio::test]
    async fn semantic_search_finds_the_aligned_entry() {
        let (browser, nb_id, owner) = setup().await;
        let embedder = FixedEmbedder(vec![1.0, 0.0]);
        let hits = browser
            .search_semantic(nb_id, owner, label(), "query", 5, 0.5, &embedder)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(!hits[0].is_mirrored);
        assert!(hits[0].similarity.unwrap() > 0.99);
    }

    #[test]
    fn null_embedder_reports_unavailable() {
        let err = NullEmbedder.embed("anything").unwrap_err();
        assert!(matches!(err, KxError::Unavailable(_)));
    }
}
