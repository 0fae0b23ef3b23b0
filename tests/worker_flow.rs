mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::{Duration, Utc};
use common::{acquire_db_lock, TestApp};
use diesel::prelude::*;
use paw_legal::jobs::{JobStatus, JOB_PURGE_EXPIRED_TRASH};
use paw_legal::models::Job;
use paw_legal::schema::jobs;
use paw_legal::{default_handlers, Worker};
use serde_json::json;
use uuid::Uuid;

async fn insert_processing_job(app: &TestApp, idle_for: Duration) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let touched = (Utc::now() - idle_for).naive_utc();
    app.with_conn(move |conn| {
        diesel::insert_into(jobs::table)
            .values((
                jobs::id.eq(id),
                jobs::job_type.eq(JOB_PURGE_EXPIRED_TRASH),
                jobs::payload.eq(json!({})),
                jobs::status.eq(JobStatus::Processing.as_str()),
                jobs::attempts.eq(1),
                jobs::run_after.eq(touched),
                jobs::updated_at.eq(touched),
            ))
            .execute(conn)?;
        Ok(())
    })
    .await?;
    Ok(id)
}

async fn purge_jobs(app: &TestApp) -> Result<Vec<Job>> {
    app.with_conn(|conn| {
        Ok(jobs::table
            .filter(jobs::job_type.eq(JOB_PURGE_EXPIRED_TRASH))
            .order(jobs::created_at.asc())
            .load::<Job>(conn)?)
    })
    .await
}

fn worker(app: &TestApp) -> Worker {
    Worker::new(
        Arc::new(app.state.clone()),
        default_handlers(),
        StdDuration::from_millis(10),
    )
}

#[tokio::test]
async fn purge_job_abandoned_mid_run_is_requeued_and_runs() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let stalled = insert_processing_job(&app, Duration::hours(3)).await?;

    let worker = worker(&app);
    worker.seed_recurring_jobs()?;

    let jobs = purge_jobs(&app).await?;
    assert_eq!(jobs.len(), 1, "the stalled job is reused, not duplicated");
    assert_eq!(jobs[0].id, stalled);
    assert_eq!(jobs[0].status, JobStatus::Queued.as_str());

    assert!(worker.tick().await?);

    let jobs = purge_jobs(&app).await?;
    let finished = jobs.iter().find(|job| job.id == stalled);
    assert_eq!(
        finished.map(|job| job.status.as_str()),
        Some(JobStatus::Succeeded.as_str())
    );
    let next_runs = jobs
        .iter()
        .filter(|job| job.status == JobStatus::Queued.as_str())
        .count();
    assert_eq!(next_runs, 1, "the purge schedules its next run");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn running_purge_job_is_left_alone() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let running = insert_processing_job(&app, Duration::minutes(1)).await?;

    worker(&app).seed_recurring_jobs()?;

    let jobs = purge_jobs(&app).await?;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, running);
    assert_eq!(jobs[0].status, JobStatus::Processing.as_str());

    app.cleanup().await?;
    Ok(())
}
