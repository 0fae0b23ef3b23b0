//! Handlers shared by every trashable resource.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    audit::Actor,
    auth::{AuthenticatedUser, StaffUser},
    error::{AppError, AppResult},
    state::AppState,
    trash::{self, ItemType, Trashable},
};

const MAX_ORIGIN_CHARS: usize = 128;

#[derive(Debug, Default, Deserialize)]
pub struct TrashQuery {
    pub origin: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TrashedResponse {
    pub trash_item_id: Uuid,
    pub item_type: ItemType,
    pub item_id: Uuid,
    pub label: String,
    pub origin: String,
    pub deleted_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

pub(crate) fn resolve_origin<T: Trashable>(requested: Option<&str>) -> AppResult<String> {
    match requested.map(str::trim).filter(|value| !value.is_empty()) {
        Some(origin) if origin.chars().count() > MAX_ORIGIN_CHARS => Err(AppError::bad_request(
            format!("l'origine ne doit pas dépasser {MAX_ORIGIN_CHARS} caractères"),
        )),
        Some(origin) => Ok(origin.to_string()),
        None => Ok(format!("admin.{}", T::COLLECTION)),
    }
}

pub async fn show_record<T>(
    State(state): State<AppState>,
    _staff: StaffUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<T>>
where
    T: Trashable + Send + 'static,
{
    let mut conn = state.db()?;
    let record = T::find(&mut conn, id)?.ok_or_else(|| AppError::not_found_with("élément introuvable"))?;
    Ok(Json(record))
}

/// `DELETE /api/<collection>/:id`: moves the row into the trash.
pub async fn trash_record<T>(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Path(id): Path<Uuid>,
    Query(query): Query<TrashQuery>,
) -> AppResult<Json<TrashedResponse>>
where
    T: Trashable + Send + 'static,
{
    let response = move_record_to_trash::<T>(&state, &user, id, query.origin.as_deref())?;
    Ok(Json(response))
}

pub(crate) fn move_record_to_trash<T: Trashable>(
    state: &AppState,
    user: &AuthenticatedUser,
    id: Uuid,
    origin: Option<&str>,
) -> AppResult<TrashedResponse> {
    let origin = resolve_origin::<T>(origin)?;
    let mut conn = state.db()?;
    let item = trash::move_to_trash::<T>(
        &mut conn,
        id,
        &Actor::from(user),
        &origin,
        Utc::now().naive_utc(),
    )?;

    Ok(TrashedResponse {
        trash_item_id: item.id,
        item_type: T::ITEM_TYPE,
        item_id: item.item_id,
        label: item.label,
        expires_at: trash::expires_at(item.deleted_at, state.trash_retention()),
        deleted_at: item.deleted_at,
        origin: item.origin,
    })
}

#[cfg(test)]
mod tests {
    use super::resolve_origin;
    use crate::models::{Dossier, Temoignage};

    #[test]
    fn origin_defaults_to_admin_collection() {
        assert_eq!(resolve_origin::<Dossier>(None).unwrap(), "admin.dossiers");
        assert_eq!(
            resolve_origin::<Temoignage>(Some("  ")).unwrap(),
            "admin.temoignages"
        );
        assert_eq!(
            resolve_origin::<Dossier>(Some("client.portal")).unwrap(),
            "client.portal"
        );
        assert!(resolve_origin::<Dossier>(Some(&"x".repeat(200))).is_err());
    }
}
