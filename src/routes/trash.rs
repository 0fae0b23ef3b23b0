use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::{
    audit::Actor,
    auth::{StaffUser, SuperAdmin},
    error::{AppError, AppResult},
    models::TrashItem,
    pagination::{PageRequest, Paginated},
    state::AppState,
    trash::{
        self,
        batch::{run_batch, BatchOperation, BatchReport},
        ItemType, RestoredEntity, TrashAccess, TrashFilter, TrashStats,
    },
};

const MAX_BATCH_IDS: usize = 200;

#[derive(Debug, Deserialize)]
pub struct TrashListQuery {
    pub item_type: Option<String>,
    pub origin: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TrashItemResponse {
    pub id: Uuid,
    pub item_type: String,
    pub item_id: Uuid,
    pub label: String,
    pub origin: String,
    pub deleted_by: Option<Uuid>,
    pub deleted_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub days_remaining: i64,
}

#[derive(Debug, Serialize)]
pub struct TrashItemDetail {
    #[serde(flatten)]
    pub item: TrashItemResponse,
    pub item_data: Value,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub ids: Vec<Uuid>,
}

fn to_response(item: TrashItem, now: NaiveDateTime, retention: chrono::Duration) -> TrashItemResponse {
    TrashItemResponse {
        expires_at: trash::expires_at(item.deleted_at, retention),
        days_remaining: trash::days_remaining(item.deleted_at, now, retention),
        id: item.id,
        item_type: item.item_type,
        item_id: item.item_id,
        label: item.label,
        origin: item.origin,
        deleted_by: item.deleted_by,
        deleted_at: item.deleted_at,
    }
}

pub async fn list_trash(
    State(state): State<AppState>,
    _staff: StaffUser,
    Query(query): Query<TrashListQuery>,
) -> AppResult<Json<Paginated<TrashItemResponse>>> {
    let item_type = query
        .item_type
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .map(str::parse::<ItemType>)
        .transpose()
        .map_err(AppError::bad_request)?;

    let filter = TrashFilter {
        item_type,
        origin: query
            .origin
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty()),
    };
    let page = PageRequest::new(query.page, query.limit);
    let now = Utc::now().naive_utc();
    let retention = state.trash_retention();

    let mut conn = state.db()?;
    let (items, total) = trash::list_items(&mut conn, &filter, page, now, retention)?;
    let items = items
        .into_iter()
        .map(|item| to_response(item, now, retention))
        .collect();

    Ok(Json(Paginated::new(items, page, total)))
}

pub async fn trash_stats(
    State(state): State<AppState>,
    _staff: StaffUser,
) -> AppResult<Json<TrashStats>> {
    let mut conn = state.db()?;
    let stats = trash::stats(&mut conn, Utc::now().naive_utc(), state.trash_retention())?;
    Ok(Json(stats))
}

pub async fn get_trash_item(
    State(state): State<AppState>,
    _staff: StaffUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TrashItemDetail>> {
    let now = Utc::now().naive_utc();
    let retention = state.trash_retention();
    let mut conn = state.db()?;
    let mut item = trash::get_item(&mut conn, id, now, retention)?;
    let item_type = item.item_type.parse().unwrap_or(ItemType::Other);
    let item_data = trash::redact_snapshot(item_type, std::mem::take(&mut item.item_data));

    Ok(Json(TrashItemDetail {
        item: to_response(item, now, retention),
        item_data,
    }))
}

pub async fn restore_trash_item(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RestoredEntity>> {
    let mut conn = state.db()?;
    let restored = trash::restore(
        &mut conn,
        id,
        &Actor::from(&user),
        TrashAccess::for_role(user.role),
        Utc::now().naive_utc(),
        state.trash_retention(),
    )?;
    Ok(Json(restored))
}

pub async fn delete_trash_item(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    trash::purge(&mut conn, id, &Actor::from(&user), TrashAccess::for_role(user.role))?;
    Ok(StatusCode::NO_CONTENT)
}

fn validate_batch(request: BatchRequest) -> AppResult<Vec<Uuid>> {
    if request.ids.is_empty() {
        return Err(AppError::bad_request("la liste d'identifiants est vide"));
    }
    if request.ids.len() > MAX_BATCH_IDS {
        return Err(AppError::bad_request(format!(
            "au plus {MAX_BATCH_IDS} éléments par lot"
        )));
    }
    let mut ids = request.ids;
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(*id));
    Ok(ids)
}

async fn batch(
    state: AppState,
    user: &crate::auth::AuthenticatedUser,
    request: BatchRequest,
    operation: BatchOperation,
) -> AppResult<(StatusCode, Json<BatchReport>)> {
    let ids = validate_batch(request)?;
    let requested = ids.len();
    let report = run_batch(
        state.pool.clone(),
        ids,
        operation,
        Actor::from(user),
        TrashAccess::for_role(user.role),
        state.trash_retention(),
    )
    .await;

    info!(
        operation = ?operation,
        requested,
        succeeded = report.succeeded,
        failed = report.failed,
        "processed trash batch"
    );

    let status = if report.has_failures() {
        StatusCode::MULTI_STATUS
    } else {
        StatusCode::OK
    };
    Ok((status, Json(report)))
}

pub async fn batch_restore(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Json(request): Json<BatchRequest>,
) -> AppResult<(StatusCode, Json<BatchReport>)> {
    batch(state, &user, request, BatchOperation::Restore).await
}

pub async fn batch_delete(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Json(request): Json<BatchRequest>,
) -> AppResult<(StatusCode, Json<BatchReport>)> {
    batch(state, &user, request, BatchOperation::Delete).await
}

pub async fn purge_expired_items(
    State(state): State<AppState>,
    SuperAdmin(user): SuperAdmin,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let purged = trash::purge_expired(
        &mut conn,
        &Actor::from(&user),
        Utc::now().naive_utc(),
        state.trash_retention(),
    )?;
    Ok(Json(json!({ "purged": purged })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_ids_are_deduplicated() {
        let id = Uuid::new_v4();
        let ids = validate_batch(BatchRequest {
            ids: vec![id, Uuid::new_v4(), id],
        })
        .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], id);
    }

    #[test]
    fn empty_batch_is_rejected() {
        let err = validate_batch(BatchRequest { ids: Vec::new() }).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
