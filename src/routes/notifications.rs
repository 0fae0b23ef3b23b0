use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::required_text;
use crate::{
    audit::{self, Actor},
    auth::StaffUser,
    error::{AppError, AppResult},
    models::{NewNotification, Notification},
    pagination::{PageRequest, Paginated},
    schema::notifications,
    state::AppState,
    trash::ItemType,
};

#[derive(Debug, Deserialize)]
pub struct NotificationListQuery {
    pub user_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    _staff: StaffUser,
    Query(query): Query<NotificationListQuery>,
) -> AppResult<Json<Paginated<Notification>>> {
    let page = PageRequest::new(query.page, query.limit);
    let mut conn = state.db()?;

    let mut count_query = notifications::table.into_boxed();
    let mut list_query = notifications::table.into_boxed();
    if let Some(user_id) = query.user_id {
        count_query = count_query.filter(notifications::user_id.eq(user_id));
        list_query = list_query.filter(notifications::user_id.eq(user_id));
    }

    let total: i64 = count_query.count().get_result(&mut conn)?;
    let items: Vec<Notification> = list_query
        .order(notifications::created_at.desc())
        .limit(page.limit)
        .offset(page.offset())
        .load(&mut conn)?;

    Ok(Json(Paginated::new(items, page, total)))
}

#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
}

pub async fn create_notification(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Json(payload): Json<CreateNotificationRequest>,
) -> AppResult<(StatusCode, Json<Notification>)> {
    let new_notification = NewNotification {
        id: Uuid::new_v4(),
        user_id: payload.user_id,
        title: required_text(&payload.title, "title")?,
        body: required_text(&payload.body, "body")?,
    };

    let mut conn = state.db()?;
    let notification = conn.transaction::<Notification, AppError, _>(|conn| {
        let notification = diesel::insert_into(notifications::table)
            .values(&new_notification)
            .returning(Notification::as_returning())
            .get_result(conn)?;
        audit::record(
            conn,
            &Actor::from(&user),
            audit::ACTION_CREATE,
            Some((ItemType::Notification.as_str(), new_notification.id)),
            json!({ "user_id": new_notification.user_id }),
        )?;
        Ok(notification)
    })?;

    Ok((StatusCode::CREATED, Json(notification)))
}
