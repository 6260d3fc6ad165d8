//! # kx-queue
//!
//! Priority+FIFO job queue on top of `kx-storage::queries::jobs` (§4.D).
//! This crate owns the business rules the storage layer doesn't know
//! about: baseline priority assignment, default timeout/retry budgets,
//! and the classification-dominance check that gates `Claim` before the
//! atomic storage-level claim ever runs.

use chrono::Utc;
use kx_core::error::{KxError, KxResult};
use kx_core::ids::{JobId, NotebookId};
use kx_core::model::{Job, JobPayload, JobStatus, JobType, Label};
use kx_storage::queries::{jobs, notebooks};
use kx_storage::StorageEngine;
use tracing::{debug, info, instrument};

pub struct JobQueue {
    engine: StorageEngine,
}

impl JobQueue {
    pub fn new(engine: StorageEngine) -> Self {
        Self { engine }
    }

    #[instrument(skip(self, payload))]
    pub async fn enqueue(
        &self,
        notebook_id: NotebookId,
        job_type: JobType,
        payload: JobPayload,
        priority_override: Option<i32>,
    ) -> KxResult<JobId> {
        let id = JobId::new();
        let job = Job {
            id,
            notebook_id,
            job_type,
            status: JobStatus::Pending,
            payload,
            result: None,
            error: None,
            created: Utc::now(),
            claimed_at: None,
            claimed_by: None,
            completed_at: None,
            timeout_seconds: Job::DEFAULT_TIMEOUT_SECONDS,
            retry_count: 0,
            max_retries: Job::DEFAULT_MAX_RETRIES,
            priority: priority_override.unwrap_or_else(|| job_type.baseline_priority()),
        };
        self.engine.writer().with_conn(move |conn| jobs::insert(conn, &job)).await?;
        debug!(%id, ?job_type, "job enqueued");
        Ok(id)
    }

    /// Claim the highest-priority pending job on `notebook_id`, optionally
    /// restricted to `type_filter`. If `agent_label` is given, the
    /// notebook's classification must be dominated by it (§4.B rule 2) or
    /// no job is returned at all — an agent that cannot see the notebook
    /// cannot learn whether it has pending work either.
    #[instrument(skip(self))]
    pub async fn claim(
        &self,
        notebook_id: NotebookId,
        worker_id: String,
        type_filter: Option<JobType>,
        agent_label: Option<Label>,
    ) -> KxResult<Option<Job>> {
        self.engine
            .writer()
            .with_conn(move |conn| {
                if let Some(label) = &agent_label {
                    let notebook = notebooks::get(conn, notebook_id)?
                        .ok_or_else(|| KxError::NotFound(format!("notebook {notebook_id}")))?;
                    if !kx_access::Gate::agent_may_claim(&notebook, label) {
                        return Ok(None);
                    }
                }
                jobs::claim_next(conn, notebook_id, type_filter, &worker_id, Utc::now())
            })
            .await
    }

    #[instrument(skip(self, result_json))]
    pub async fn complete(&self, id: JobId, worker_id: String, result_json: String) -> KxResult<bool> {
        let accepted = self
            .engine
            .writer()
            .with_conn(move |conn| jobs::complete(conn, id, &worker_id, &result_json, Utc::now()))
            .await?;
        if accepted {
            info!(%id, "job completed");
        } else {
            debug!(%id, "job completion rejected (stale claim)");
        }
        Ok(accepted)
    }

    #[instrument(skip(self))]
    pub async fn fail(&self, id: JobId, worker_id: String, error: String) -> KxResult<bool> {
        self.engine.writer().with_conn(move |conn| jobs::fail(conn, id, &worker_id, &error)).await
    }

    #[instrument(skip(self))]
    pub async fn reclaim_timed_out(&self, notebook_id: NotebookId) -> KxResult<u64> {
        let n = self
            .engine
            .writer()
            .with_conn(move |conn| jobs::reclaim_timed_out(conn, notebook_id, Utc::now()))
            .await?;
        if n > 0 {
            info!(%notebook_id, reclaimed = n, "timed-out jobs reclaimed");
        }
        Ok(n)
    }

    pub async fn retry_failed(&self, notebook_id: NotebookId) -> KxResult<u64> {
        self.engine.writer().with_conn(move |conn| jobs::retry_failed(conn, notebook_id)).await
    }

    pub async fn stats(&self, notebook_id: NotebookId) -> KxResult<Vec<(JobType, JobStatus, u64)>> {
        self.engine.writer().with_conn(move |conn| jobs::stats(conn, notebook_id)).await
    }

    pub async fn get(&self, id: JobId) -> KxResult<Option<Job>> {
        self.engine.writer().with_conn(move |conn| jobs::get(conn, id)).await
    }
}
