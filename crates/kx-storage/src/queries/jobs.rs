//! Job queue row storage (§4.D). The atomic claim is a single `UPDATE ...
//! WHERE id = (SELECT ... LIMIT 1) RETURNING *` so a row being claimed by
//! one caller can never be returned to another — the serialized writer
//! connection gives us the skip-locked guarantee without a second lock.

use chrono::{DateTime, Utc};
use kx_core::error::KxError;
use kx_core::ids::{JobId, NotebookId};
use kx_core::model::{Job, JobStatus, JobType};
use rusqlite::{params, Connection, OptionalExtension, Row};

pub fn insert(conn: &Connection, job: &Job) -> Result<(), KxError> {
    conn.execute(
        "INSERT INTO jobs (
            id, notebook_id, job_type, status, payload_json, result_json, error, created,
            claimed_at, claimed_by, completed_at, timeout_seconds, retry_count, max_retries, priority
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            job.id.to_string(),
            job.notebook_id.to_string(),
            job_type_str(job.job_type),
            status_str(job.status),
            serde_json::to_string(&job.payload)?,
            job.result.as_ref().map(serde_json::to_string).transpose()?,
            job.error,
            job.created.to_rfc3339(),
            job.claimed_at.map(|t| t.to_rfc3339()),
            job.claimed_by,
            job.completed_at.map(|t| t.to_rfc3339()),
            job.timeout_seconds,
            job.retry_count,
            job.max_retries,
            job.priority,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: JobId) -> Result<Option<Job>, KxError> {
    conn.query_row(&format!("{SELECT_JOB} WHERE id = ?1"), params![id.to_string()], row_to_job)
        .optional()
        .map_err(KxError::from)
}

/// Atomically select the highest-priority pending job matching
/// `(notebook, type_filter)`, mark it `in_progress`, and stamp
/// `claimed_at`/`claimed_by`. `dominated_job_ids` narrows the candidate
/// set to jobs whose notebook label the caller's agent label dominates
/// (the label check itself is evaluated by `kx-access` before calling
/// this, since label dominance needs the notebook row, not the job row).
pub fn claim_next(
    conn: &Connection,
    notebook_id: NotebookId,
    type_filter: Option<JobType>,
    worker_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<Job>, KxError> {
    let sql = if type_filter.is_some() {
        "UPDATE jobs SET status = 'in_progress', claimed_at = ?1, claimed_by = ?2
         WHERE id = (
             SELECT id FROM jobs
             WHERE notebook_id = ?3 AND status = 'pending' AND job_type = ?4
             ORDER BY priority DESC, created ASC LIMIT 1
         )
         RETURNING id"
    } else {
        "UPDATE jobs SET status = 'in_progress', claimed_at = ?1, claimed_by = ?2
         WHERE id = (
             SELECT id FROM jobs
             WHERE notebook_id = ?3 AND status = 'pending'
             ORDER BY priority DESC, created ASC LIMIT 1
         )
         RETURNING id"
    };

    let claimed_id: Option<String> = if let Some(jt) = type_filter {
        conn.query_row(sql, params![now.to_rfc3339(), worker_id, notebook_id.to_string(), job_type_str(jt)], |r| r.get(0))
            .optional()?
    } else {
        conn.query_row(sql, params![now.to_rfc3339(), worker_id, notebook_id.to_string()], |r| r.get(0))
            .optional()?
    };

    match claimed_id {
        Some(id) => get(conn, id.parse().map_err(|_| KxError::Fatal("bad job id".into()))?),
        None => Ok(None),
    }
}

/// State-checked completion: only succeeds if the job is still
/// `in_progress` and claimed by `worker_id`. Returns `Ok(false)` (not an
/// error) if the conditional update matched nothing — the caller (a
/// stale worker) must treat that as "another worker handled this job".
pub fn complete(
    conn: &Connection,
    id: JobId,
    worker_id: &str,
    result_json: &str,
    now: DateTime<Utc>,
) -> Result<bool, KxError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = 'completed', result_json = ?1, completed_at = ?2
         WHERE id = ?3 AND status = 'in_progress' AND claimed_by = ?4",
        params![result_json, now.to_rfc3339(), id.to_string(), worker_id],
    )?;
    Ok(changed == 1)
}

/// State-checked failure: increments `retry_count`; returns to `pending`
/// (clearing `claimed_*`) if retries remain, else terminal `failed`.
/// Returns `Ok(false)` if the conditional update matched nothing.
pub fn fail(conn: &Connection, id: JobId, worker_id: &str, error: &str) -> Result<bool, KxError> {
    let changed = conn.execute(
        "UPDATE jobs SET
            retry_count = retry_count + 1,
            error = ?1,
            status = CASE WHEN retry_count + 1 < max_retries THEN 'pending' ELSE 'failed' END,
            claimed_at = CASE WHEN retry_count + 1 < max_retries THEN NULL ELSE claimed_at END,
            claimed_by = CASE WHEN retry_count + 1 < max_retries THEN NULL ELSE claimed_by END
         WHERE id = ?2 AND status = 'in_progress' AND claimed_by = ?3",
        params![error, id.to_string(), worker_id],
    )?;
    Ok(changed == 1)
}

/// Any `in_progress` job whose deadline has passed and which still has
/// retries left returns to `pending` with `retry_count += 1`.
pub fn reclaim_timed_out(conn: &Connection, notebook_id: NotebookId, now: DateTime<Utc>) -> Result<u64, KxError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = 'pending', retry_count = retry_count + 1, claimed_at = NULL, claimed_by = NULL
         WHERE notebook_id = ?1 AND status = 'in_progress'
           AND retry_count < max_retries
           AND datetime(claimed_at, '+' || timeout_seconds || ' seconds') < datetime(?2)",
        params![notebook_id.to_string(), now.to_rfc3339()],
    )?;
    Ok(changed as u64)
}

/// Resets all terminal `failed` jobs back to `pending` (administrative
/// "retry failed jobs" repair operation, §4.E Failure policy).
pub fn retry_failed(conn: &Connection, notebook_id: NotebookId) -> Result<u64, KxError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = 'pending', retry_count = 0, claimed_at = NULL, claimed_by = NULL, error = NULL
         WHERE notebook_id = ?1 AND status = 'failed'",
        params![notebook_id.to_string()],
    )?;
    Ok(changed as u64)
}

pub fn stats(conn: &Connection, notebook_id: NotebookId) -> Result<Vec<(JobType, JobStatus, u64)>, KxError> {
    let mut stmt = conn.prepare(
        "SELECT job_type, status, COUNT(*) FROM jobs WHERE notebook_id = ?1 GROUP BY job_type, status",
    )?;
    let rows = stmt.query_map(params![notebook_id.to_string()], |row| {
        let jt: String = row.get(0)?;
        let st: String = row.get(1)?;
        let count: i64 = row.get(2)?;
        Ok((str_to_job_type(&jt), str_to_status(&st), count as u64))
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(KxError::from)
}

const SELECT_JOB: &str = "SELECT
    id, notebook_id, job_type, status, payload_json, result_json, error, created, claimed_at,
    claimed_by, completed_at, timeout_seconds, retry_count, max_retries, priority
    FROM jobs";

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<Job> {
    let id: String = row.get(0)?;
    let notebook_id: String = row.get(1)?;
    let job_type: String = row.get(2)?;
    let status: String = row.get(3)?;
    let payload_json: String = row.get(4)?;
    let result_json: Option<String> = row.get(5)?;
    let created: String = row.get(7)?;
    let claimed_at: Option<String> = row.get(8)?;
    let completed_at: Option<String> = row.get(10)?;

    Ok(Job {
        id: id.parse().unwrap_or(JobId::nil()),
        notebook_id: notebook_id.parse().unwrap_or(NotebookId::nil()),
        job_type: str_to_job_type(&job_type),
        status: str_to_status(&status),
        payload: serde_json::from_str(&payload_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?,
        result: result_json.map(|s| serde_json::from_str(&s)).transpose().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?,
        error: row.get(6)?,
        created: parse_dt(&created),
        claimed_at: claimed_at.as_deref().map(parse_dt),
        claimed_by: row.get(9)?,
        completed_at: completed_at.as_deref().map(parse_dt),
        timeout_seconds: row.get(11)?,
        retry_count: row.get(12)?,
        max_retries: row.get(13)?,
        priority: row.get(14)?,
    })
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

fn job_type_str(jt: JobType) -> &'static str {
    match jt {
        JobType::DistillClaims => "distill_claims",
        JobType::EmbedClaims => "embed_claims",
        JobType::EmbedMirrored => "embed_mirrored",
        JobType::CompareClaims => "compare_claims",
        JobType::ClassifyTopic => "classify_topic",
    }
}

fn str_to_job_type(s: &str) -> JobType {
    match s {
        "embed_claims" => JobType::EmbedClaims,
        "embed_mirrored" => JobType::EmbedMirrored,
        "compare_claims" => JobType::CompareClaims,
        "classify_topic" => JobType::ClassifyTopic,
        _ => JobType::DistillClaims,
    }
}

fn status_str(s: JobStatus) -> &'static str {
    match s {
        JobStatus::Pending => "pending",
        JobStatus::InProgress => "in_progress",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
    }
}

fn str_to_status(s: &str) -> JobStatus {
    match s {
        "in_progress" => JobStatus::InProgress,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        _ => JobStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StorageEngine;
    use kx_core::ids::EntryId;
    use kx_core::model::JobPayload;

    fn sample_job(notebook_id: NotebookId, job_type: JobType) -> Job {
        Job {
            id: JobId::new(),
            notebook_id,
            job_type,
            status: JobStatus::Pending,
            payload: JobPayload::DistillClaims { entry_id: EntryId::new(), context_claims: vec![] },
            result: None,
            error: None,
            created: Utc::now(),
            claimed_at: None,
            claimed_by: None,
            completed_at: None,
            timeout_seconds: 1,
            retry_count: 0,
            max_retries: 3,
            priority: job_type.baseline_priority(),
        }
    }

    #[test]
    fn claim_is_exclusive_until_timeout_or_terminal() {
        let engine = StorageEngine::open_in_memory().unwrap();
        let nb = NotebookId::new();
        let job = sample_job(nb, JobType::DistillClaims);
        let id = job.id;
        engine.writer().with_conn_sync(|conn| insert(conn, &job)).unwrap();

        let claimed = engine
            .writer()
            .with_conn_sync(|conn| claim_next(conn, nb, None, "w1", Utc::now()))
            .unwrap()
            .unwrap();
        assert_eq!(claimed.id, id);

        let second = engine
            .writer()
            .with_conn_sync(|conn| claim_next(conn, nb, None, "w2", Utc::now()))
            .unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn reclaim_timed_out_returns_job_to_pending_with_incremented_retry() {
        let engine = StorageEngine::open_in_memory().unwrap();
        let nb = NotebookId::new();
        let job = sample_job(nb, JobType::DistillClaims);
        let id = job.id;
        engine.writer().with_conn_sync(|conn| insert(conn, &job)).unwrap();
        engine.writer().with_conn_sync(|conn| claim_next(conn, nb, None, "w1", Utc::now())).unwrap();

        let later = Utc::now() + chrono::Duration::seconds(5);
        let n = engine.writer().with_conn_sync(|conn| reclaim_timed_out(conn, nb, later)).unwrap();
        assert_eq!(n, 1);

        let refetched = engine.writer().with_conn_sync(|conn| get(conn, id)).unwrap().unwrap();
        assert_eq!(refetched.status, JobStatus::Pending);
        assert_eq!(refetched.retry_count, 1);

        let reclaimed = engine
            .writer()
            .with_conn_sync(|conn| claim_next(conn, nb, None, "w2", later))
            .unwrap()
            .unwrap();
        assert_eq!(reclaimed.claimed_by.as_deref(), Some("w2"));
    }

    #[test]
    fn reclaim_timed_out_leaves_a_claim_that_has_not_yet_expired() {
        let engine = StorageEngine::open_in_memory().unwrap();
        let nb = NotebookId::new();
        let mut job = sample_job(nb, JobType::DistillClaims);
        job.timeout_seconds = 3600;
        let id = job.id;
        engine.writer().with_conn_sync(|conn| insert(conn, &job)).unwrap();
        engine.writer().with_conn_sync(|conn| claim_next(conn, nb, None, "w1", Utc::now())).unwrap();

        // Same UTC calendar day, well inside the 3600s timeout — a naive
        // string comparison of rfc3339 against SQLite's space-separated
        // datetime() output would wrongly treat this as expired.
        let soon = Utc::now() + chrono::Duration::seconds(5);
        let n = engine.writer().with_conn_sync(|conn| reclaim_timed_out(conn, nb, soon)).unwrap();
        assert_eq!(n, 0);

        let refetched = engine.writer().with_conn_sync(|conn| get(conn, id)).unwrap().unwrap();
        assert_eq!(refetched.status, JobStatus::InProgress);
        assert_eq!(refetched.retry_count, 0);
    }

    #[test]
    fn completing_twice_only_the_first_wins() {
        let engine = StorageEngine::open_in_memory().unwrap();
        let nb = NotebookId::new();
        let job = sample_job(nb, JobType::DistillClaims);
        let id = job.id;
        engine.writer().with_conn_sync(|conn| insert(conn, &job)).unwrap();
        engine.writer().with_conn_sync(|conn| claim_next(conn, nb, None, "w1", Utc::now())).unwrap();

        let first = engine
            .writer()
            .with_conn_sync(|conn| complete(conn, id, "w1", "{}", Utc::now()))
            .unwrap();
        assert!(first);

        let second = engine
            .writer()
            .with_conn_sync(|conn| complete(conn, id, "w1", "{}", Utc::now()))
            .unwrap();
        assert!(!second);
    }

    #[test]
    fn claim_next_respects_priority_over_fifo() {
        let engine = StorageEngine::open_in_memory().unwrap();
        let nb = NotebookId::new();
        let low = sample_job(nb, JobType::DistillClaims);
        let high = sample_job(nb, JobType::EmbedClaims);
        let high_id = high.id;
        engine
            .writer()
            .with_conn_sync(|conn| {
                insert(conn, &low)?;
                insert(conn, &high)
            })
            .unwrap();

        let claimed = engine
            .writer()
            .with_conn_sync(|conn| claim_next(conn, nb, None, "w1", Utc::now()))
            .unwrap()
            .unwrap();
        assert_eq!(claimed.id, high_id);
    }
}
