use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::task;
use tracing::{error, info};

use super::{JobExecution, JobHandler};
use crate::{
    audit::Actor,
    jobs::{enqueue_job, JOB_PURGE_EXPIRED_TRASH},
    models::Job,
    state::AppState,
    trash,
};

/// Deletes expired trash items, then queues its own next run.
pub struct PurgeExpiredTrashJob;

impl PurgeExpiredTrashJob {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PurgeExpiredTrashJob {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandler for PurgeExpiredTrashJob {
    fn job_type(&self) -> &'static str {
        JOB_PURGE_EXPIRED_TRASH
    }

    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution {
        let worker_state = state.clone();
        match task::spawn_blocking(move || purge_and_reschedule(&worker_state)).await {
            Ok(Ok(purged)) => {
                info!(job_id = %job.id, purged, "scheduled trash purge finished");
                JobExecution::Success
            }
            Ok(Err(err)) => JobExecution::Retry {
                delay: Duration::minutes(5),
                error: err,
            },
            Err(join_err) => {
                error!(job_id = %job.id, error = %join_err, "trash purge task panicked");
                JobExecution::Retry {
                    delay: Duration::minutes(5),
                    error: format!("worker panicked: {join_err}"),
                }
            }
        }
    }
}

fn purge_and_reschedule(state: &AppState) -> Result<usize, String> {
    let mut conn = state.db().map_err(|err| err.message().to_string())?;
    let now = Utc::now().naive_utc();

    let purged = trash::purge_expired(&mut conn, &Actor::system(), now, state.trash_retention())
        .map_err(|err| err.to_string())?;

    let next_run = now + Duration::minutes(state.config.trash_purge_interval_minutes);
    enqueue_job(&mut conn, JOB_PURGE_EXPIRED_TRASH, serde_json::json!({}), Some(next_run))
        .map_err(|err| err.to_string())?;

    Ok(purged)
}
