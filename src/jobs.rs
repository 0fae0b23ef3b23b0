//! Postgres-backed background job queue.
//!
//! Jobs are rows in `jobs`; workers claim them with `FOR UPDATE SKIP LOCKED`
//! so several worker processes can poll the same table.

use chrono::{Duration, NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Job, NewJob};
use crate::schema::jobs;

pub const JOB_PURGE_EXPIRED_TRASH: &str = "purge-expired-trash";

/// A job left in `processing` longer than this is assumed to belong to a
/// worker that died before settling it.
pub const STALLED_JOB_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Processing,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

pub type JobQueueResult<T> = Result<T, JobQueueError>;

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

pub fn enqueue_job(
    conn: &mut PgConnection,
    job_type: &str,
    payload: Value,
    run_after: Option<NaiveDateTime>,
) -> JobQueueResult<Job> {
    let new_job = NewJob {
        id: Uuid::new_v4(),
        job_type: job_type.to_string(),
        payload,
        status: JobStatus::Queued.as_str().to_string(),
        run_after: run_after.unwrap_or_else(now),
    };

    let job = diesel::insert_into(jobs::table)
        .values(&new_job)
        .get_result(conn)?;
    debug!(job_id = %new_job.id, job_type, "enqueued job");
    Ok(job)
}

/// Enqueues `job_type` unless one is already queued or running.
/// Returns whether a new job was created.
pub fn ensure_job_scheduled(
    conn: &mut PgConnection,
    job_type: &str,
    run_after: NaiveDateTime,
) -> JobQueueResult<bool> {
    conn.transaction(|conn| {
        let pending: i64 = jobs::table
            .filter(jobs::job_type.eq(job_type))
            .filter(jobs::status.eq_any([
                JobStatus::Queued.as_str(),
                JobStatus::Processing.as_str(),
            ]))
            .count()
            .get_result(conn)?;

        if pending > 0 {
            return Ok(false);
        }

        enqueue_job(conn, job_type, json!({}), Some(run_after))?;
        Ok(true)
    })
}

/// Puts `processing` jobs of `job_type` untouched since `stalled_before` back
/// in the queue. Returns how many were requeued.
pub fn requeue_stalled_jobs(
    conn: &mut PgConnection,
    job_type: &str,
    stalled_before: NaiveDateTime,
) -> JobQueueResult<usize> {
    let now = now();
    let requeued = diesel::update(
        jobs::table
            .filter(jobs::job_type.eq(job_type))
            .filter(jobs::status.eq(JobStatus::Processing.as_str()))
            .filter(jobs::updated_at.lt(stalled_before)),
    )
    .set((
        jobs::status.eq(JobStatus::Queued.as_str()),
        jobs::run_after.eq(now),
        jobs::last_error.eq(Some("requeued after the worker stopped mid-run")),
        jobs::updated_at.eq(now),
    ))
    .execute(conn)?;

    if requeued > 0 {
        debug!(job_type, requeued, "requeued stalled jobs");
    }
    Ok(requeued)
}

pub fn reserve_job(conn: &mut PgConnection, job_types: &[&str]) -> JobQueueResult<Option<Job>> {
    let now = now();

    conn.transaction(|conn| {
        let candidate = jobs::table
            .filter(jobs::status.eq(JobStatus::Queued.as_str()))
            .filter(jobs::run_after.le(now))
            .filter(jobs::job_type.eq_any(job_types))
            .order(jobs::run_after.asc())
            .for_update()
            .skip_locked()
            .first::<Job>(conn)
            .optional()?;

        let Some(job) = candidate else {
            return Ok(None);
        };

        let reserved = diesel::update(jobs::table.find(job.id))
            .set((
                jobs::status.eq(JobStatus::Processing.as_str()),
                jobs::attempts.eq(job.attempts + 1),
                jobs::updated_at.eq(now),
            ))
            .get_result::<Job>(conn)?;
        Ok(Some(reserved))
    })
}

pub fn mark_job_succeeded(conn: &mut PgConnection, job_id: Uuid) -> JobQueueResult<()> {
    diesel::update(jobs::table.find(job_id))
        .set((
            jobs::status.eq(JobStatus::Succeeded.as_str()),
            jobs::last_error.eq::<Option<String>>(None),
            jobs::updated_at.eq(now()),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn retry_job_after(
    conn: &mut PgConnection,
    job_id: Uuid,
    delay: Duration,
    error_message: &str,
) -> JobQueueResult<()> {
    diesel::update(jobs::table.find(job_id))
        .set((
            jobs::status.eq(JobStatus::Queued.as_str()),
            jobs::run_after.eq(now() + delay),
            jobs::last_error.eq(Some(error_message.to_string())),
            jobs::updated_at.eq(now()),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn mark_job_failed(
    conn: &mut PgConnection,
    job_id: Uuid,
    error_message: &str,
) -> JobQueueResult<()> {
    diesel::update(jobs::table.find(job_id))
        .set((
            jobs::status.eq(JobStatus::Failed.as_str()),
            jobs::last_error.eq(Some(error_message.to_string())),
            jobs::updated_at.eq(now()),
        ))
        .execute(conn)?;
    Ok(())
}
