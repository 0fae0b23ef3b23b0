use std::{collections::HashMap, sync::Arc, time::Duration as StdDuration};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{
    jobs::{
        ensure_job_scheduled, mark_job_failed, mark_job_succeeded, requeue_stalled_jobs,
        reserve_job, retry_job_after, JobQueueError, JOB_PURGE_EXPIRED_TRASH, STALLED_JOB_MINUTES,
    },
    models::Job,
    state::AppState,
};

pub mod purge;

#[derive(Debug)]
pub enum JobExecution {
    Success,
    Retry { delay: Duration, error: String },
    Failed { error: String },
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &'static str;
    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution;
}

pub struct Worker {
    state: Arc<AppState>,
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
    poll_interval: StdDuration,
}

impl Worker {
    pub fn new(
        state: Arc<AppState>,
        handlers: Vec<Arc<dyn JobHandler>>,
        poll_interval: StdDuration,
    ) -> Self {
        let handlers = handlers
            .into_iter()
            .map(|handler| (handler.job_type(), handler))
            .collect();
        Self {
            state,
            handlers,
            poll_interval,
        }
    }

    /// Queues the recurring purge if no run is pending. A purge stuck in
    /// `processing` for more than [`STALLED_JOB_MINUTES`] is requeued first,
    /// so a worker killed mid-run does not stop purging for good.
    pub fn seed_recurring_jobs(&self) -> Result<(), JobQueueError> {
        if !self.handlers.contains_key(JOB_PURGE_EXPIRED_TRASH) {
            return Ok(());
        }
        let Ok(mut conn) = self.state.db() else {
            warn!("no database connection to seed recurring jobs");
            return Ok(());
        };
        let now = Utc::now().naive_utc();
        let requeued = requeue_stalled_jobs(
            &mut conn,
            JOB_PURGE_EXPIRED_TRASH,
            now - Duration::minutes(STALLED_JOB_MINUTES),
        )?;
        if requeued > 0 {
            warn!(job_type = JOB_PURGE_EXPIRED_TRASH, requeued, "requeued stalled jobs");
        }
        if ensure_job_scheduled(&mut conn, JOB_PURGE_EXPIRED_TRASH, now)? {
            info!(job_type = JOB_PURGE_EXPIRED_TRASH, "scheduled recurring job");
        }
        Ok(())
    }

    pub async fn run(&self) {
        info!(handlers = self.handlers.len(), "worker started");
        if let Err(err) = self.seed_recurring_jobs() {
            error!(error = %err, "failed to seed recurring jobs");
        }

        loop {
            match self.tick().await {
                Ok(true) => {}
                Ok(false) => sleep(self.poll_interval).await,
                Err(err) => {
                    error!(error = %err, "worker tick failed");
                    sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Runs at most one job. Returns whether a job was found.
    pub async fn tick(&self) -> Result<bool, JobQueueError> {
        let job_types: Vec<&str> = self.handlers.keys().copied().collect();
        if job_types.is_empty() {
            return Ok(false);
        }

        let reserved = {
            let mut conn = match self.state.db() {
                Ok(conn) => conn,
                Err(err) => {
                    error!(error = %err.message(), "failed to obtain database connection in worker");
                    return Ok(false);
                }
            };
            reserve_job(&mut conn, &job_types)?
        };

        let Some(job) = reserved else {
            return Ok(false);
        };

        let execution = match self.handlers.get(job.job_type.as_str()) {
            Some(handler) => handler.handle(self.state.clone(), job.clone()).await,
            None => JobExecution::Failed {
                error: "no handler registered".to_string(),
            },
        };
        self.settle(&job, execution)?;
        Ok(true)
    }

    fn settle(&self, job: &Job, execution: JobExecution) -> Result<(), JobQueueError> {
        let Ok(mut conn) = self.state.db() else {
            error!(job_id = %job.id, "failed to record job outcome due to pool error");
            return Ok(());
        };

        match execution {
            JobExecution::Success => {
                mark_job_succeeded(&mut conn, job.id)?;
                info!(job_id = %job.id, job_type = %job.job_type, "job completed successfully");
            }
            JobExecution::Retry { delay, error } => {
                warn!(job_id = %job.id, job_type = %job.job_type, %error, "job will retry");
                retry_job_after(&mut conn, job.id, delay, &error)?;
            }
            JobExecution::Failed { error } => {
                error!(job_id = %job.id, job_type = %job.job_type, %error, "job failed");
                mark_job_failed(&mut conn, job.id, &error)?;
            }
        }
        Ok(())
    }
}

pub fn default_handlers() -> Vec<Arc<dyn JobHandler>> {
    vec![Arc::new(purge::PurgeExpiredTrashJob::new())]
}
