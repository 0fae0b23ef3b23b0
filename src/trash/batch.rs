use chrono::{Duration, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use super::{purge, restore, TrashAccess, TrashError};
use crate::audit::Actor;
use crate::db::PgPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOperation {
    Restore,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchItemStatus {
    Restored,
    Deleted,
    NotFound,
    Conflict,
    Unsupported,
    Forbidden,
    Error,
}

impl BatchItemStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchItemStatus::Restored | BatchItemStatus::Deleted)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItemResult {
    pub id: Uuid,
    pub status: BatchItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BatchItemResult {
    fn failed(id: Uuid, status: BatchItemStatus, message: impl Into<String>) -> Self {
        Self {
            id,
            status,
            message: Some(message.into()),
        }
    }

    pub fn from_outcome(id: Uuid, operation: BatchOperation, outcome: Result<(), TrashError>) -> Self {
        match outcome {
            Ok(()) => Self {
                id,
                status: match operation {
                    BatchOperation::Restore => BatchItemStatus::Restored,
                    BatchOperation::Delete => BatchItemStatus::Deleted,
                },
                message: None,
            },
            Err(TrashError::NotFound) => Self::failed(
                id,
                BatchItemStatus::NotFound,
                "élément introuvable dans la corbeille ou expiré",
            ),
            Err(TrashError::Conflict(entity_id)) => Self::failed(
                id,
                BatchItemStatus::Conflict,
                format!("un élément actif portant l'identifiant {entity_id} existe déjà"),
            ),
            Err(TrashError::Unsupported(item_type)) => Self::failed(
                id,
                BatchItemStatus::Unsupported,
                format!("les éléments de type '{item_type}' ne peuvent pas être restaurés"),
            ),
            Err(TrashError::Forbidden(item_type)) => Self::failed(
                id,
                BatchItemStatus::Forbidden,
                format!("les éléments de type '{item_type}' sont réservés au superadministrateur"),
            ),
            Err(err) => {
                warn!(trash_item_id = %id, error = %err, "batch trash operation failed");
                Self::failed(id, BatchItemStatus::Error, err.to_string())
            }
        }
    }
}

/// Per-item outcome of a batch call. Items are independent: a failure never
/// rolls back the others.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub results: Vec<BatchItemResult>,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn new(results: Vec<BatchItemResult>) -> Self {
        let succeeded = results
            .iter()
            .filter(|result| result.status.is_success())
            .count();
        let failed = results.len() - succeeded;
        Self {
            results,
            succeeded,
            failed,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Runs `operation` for every id concurrently, each on its own blocking task
/// and pooled connection. Results keep the order of `ids`.
pub async fn run_batch(
    pool: PgPool,
    ids: Vec<Uuid>,
    operation: BatchOperation,
    actor: Actor,
    access: TrashAccess,
    retention: Duration,
) -> BatchReport {
    let tasks = ids.into_iter().map(|id| {
        let pool = pool.clone();
        let actor = actor.clone();
        async move {
            let joined = tokio::task::spawn_blocking(move || {
                run_single(&pool, id, operation, &actor, access, retention)
            })
            .await;

            match joined {
                Ok(result) => result,
                Err(err) => {
                    warn!(trash_item_id = %id, error = %err, "batch task panicked");
                    BatchItemResult::failed(id, BatchItemStatus::Error, "tâche interrompue")
                }
            }
        }
    });

    BatchReport::new(join_all(tasks).await)
}

fn run_single(
    pool: &PgPool,
    id: Uuid,
    operation: BatchOperation,
    actor: &Actor,
    access: TrashAccess,
    retention: Duration,
) -> BatchItemResult {
    let mut conn = match pool.get() {
        Ok(conn) => conn,
        Err(err) => {
            warn!(trash_item_id = %id, error = %err, "no database connection for batch item");
            return BatchItemResult::failed(
                id,
                BatchItemStatus::Error,
                format!("database pool error: {err}"),
            );
        }
    };

    let now = Utc::now().naive_utc();
    let outcome = match operation {
        BatchOperation::Restore => {
            restore(&mut conn, id, actor, access, now, retention).map(|_| ())
        }
        BatchOperation::Delete => purge(&mut conn, id, actor, access).map(|_| ()),
    };
    BatchItemResult::from_outcome(id, operation, outcome)
}
