use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{optional_text, required_text};
use crate::{
    audit::{self, Actor},
    auth::StaffUser,
    error::{AppError, AppResult},
    models::{Message, NewMessage},
    pagination::{PageRequest, Paginated},
    schema::messages,
    state::AppState,
    trash::ItemType,
};

#[derive(Debug, Deserialize)]
pub struct MessageListQuery {
    pub dossier_id: Option<Uuid>,
    pub recipient_id: Option<Uuid>,
    #[serde(default)]
    pub unread: bool,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

fn scoped(query: &MessageListQuery) -> messages::BoxedQuery<'static, Pg> {
    let mut boxed = messages::table.into_boxed();
    if let Some(dossier_id) = query.dossier_id {
        boxed = boxed.filter(messages::dossier_id.eq(dossier_id));
    }
    if let Some(recipient_id) = query.recipient_id {
        boxed = boxed.filter(messages::recipient_id.eq(recipient_id));
    }
    if query.unread {
        boxed = boxed.filter(messages::read_at.is_null());
    }
    boxed
}

pub async fn list_messages(
    State(state): State<AppState>,
    _staff: StaffUser,
    Query(query): Query<MessageListQuery>,
) -> AppResult<Json<Paginated<Message>>> {
    let page = PageRequest::new(query.page, query.limit);
    let mut conn = state.db()?;

    let total: i64 = scoped(&query).count().get_result(&mut conn)?;
    let items: Vec<Message> = scoped(&query)
        .order(messages::sent_at.desc())
        .limit(page.limit)
        .offset(page.offset())
        .load(&mut conn)?;

    Ok(Json(Paginated::new(items, page, total)))
}

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub dossier_id: Option<Uuid>,
    pub recipient_id: Option<Uuid>,
    pub subject: Option<String>,
    pub body: String,
}

pub async fn create_message(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Json(payload): Json<CreateMessageRequest>,
) -> AppResult<(StatusCode, Json<Message>)> {
    let new_message = NewMessage {
        id: Uuid::new_v4(),
        dossier_id: payload.dossier_id,
        sender_id: Some(user.user_id),
        recipient_id: payload.recipient_id,
        subject: optional_text(payload.subject),
        body: required_text(&payload.body, "body")?,
    };

    let mut conn = state.db()?;
    let message = conn.transaction::<Message, AppError, _>(|conn| {
        let message = diesel::insert_into(messages::table)
            .values(&new_message)
            .returning(Message::as_returning())
            .get_result(conn)?;
        audit::record(
            conn,
            &Actor::from(&user),
            audit::ACTION_CREATE,
            Some((ItemType::Message.as_str(), new_message.id)),
            json!({ "recipient_id": new_message.recipient_id, "dossier_id": new_message.dossier_id }),
        )?;
        Ok(message)
    })?;

    Ok((StatusCode::CREATED, Json(message)))
}
