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
    models::{NewTemoignage, Temoignage},
    pagination::{PageRequest, Paginated},
    schema::temoignages,
    state::AppState,
    trash::ItemType,
};

#[derive(Debug, Deserialize)]
pub struct TemoignageListQuery {
    pub published: Option<bool>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_temoignages(
    State(state): State<AppState>,
    _staff: StaffUser,
    Query(query): Query<TemoignageListQuery>,
) -> AppResult<Json<Paginated<Temoignage>>> {
    let page = PageRequest::new(query.page, query.limit);
    let mut conn = state.db()?;

    let (total, items): (i64, Vec<Temoignage>) = match query.published {
        Some(published) => (
            temoignages::table
                .filter(temoignages::published.eq(published))
                .count()
                .get_result(&mut conn)?,
            temoignages::table
                .filter(temoignages::published.eq(published))
                .order(temoignages::created_at.desc())
                .limit(page.limit)
                .offset(page.offset())
                .load(&mut conn)?,
        ),
        None => (
            temoignages::table.count().get_result(&mut conn)?,
            temoignages::table
                .order(temoignages::created_at.desc())
                .limit(page.limit)
                .offset(page.offset())
                .load(&mut conn)?,
        ),
    };

    Ok(Json(Paginated::new(items, page, total)))
}

#[derive(Debug, Deserialize)]
pub struct CreateTemoignageRequest {
    pub author_name: String,
    pub content: String,
    pub rating: i32,
    #[serde(default)]
    pub published: bool,
}

pub async fn create_temoignage(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Json(payload): Json<CreateTemoignageRequest>,
) -> AppResult<(StatusCode, Json<Temoignage>)> {
    if !(1..=5).contains(&payload.rating) {
        return Err(AppError::bad_request("la note doit être comprise entre 1 et 5"));
    }

    let new_temoignage = NewTemoignage {
        id: Uuid::new_v4(),
        author_name: required_text(&payload.author_name, "author_name")?,
        content: required_text(&payload.content, "content")?,
        rating: payload.rating,
        published: payload.published,
    };

    let mut conn = state.db()?;
    let temoignage = conn.transaction::<Temoignage, AppError, _>(|conn| {
        let temoignage = diesel::insert_into(temoignages::table)
            .values(&new_temoignage)
            .returning(Temoignage::as_returning())
            .get_result(conn)?;
        audit::record(
            conn,
            &Actor::from(&user),
            audit::ACTION_CREATE,
            Some((ItemType::Temoignage.as_str(), new_temoignage.id)),
            json!({ "author_name": new_temoignage.author_name, "rating": new_temoignage.rating }),
        )?;
        Ok(temoignage)
    })?;

    Ok((StatusCode::CREATED, Json(temoignage)))
}
