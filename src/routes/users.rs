use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::records::{move_record_to_trash, TrashQuery, TrashedResponse};
use super::{required_text, PageQuery};
use crate::{
    audit::{self, Actor},
    auth::{password, Role, StaffUser, SuperAdmin},
    error::{AppError, AppResult},
    models::{NewUser, User},
    pagination::Paginated,
    schema::users,
    state::AppState,
    trash::ItemType,
};

const MIN_PASSWORD_CHARS: usize = 8;

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

pub async fn list_users(
    State(state): State<AppState>,
    _staff: StaffUser,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Paginated<UserResponse>>> {
    let page = query.request();
    let mut conn = state.db()?;

    let total: i64 = users::table.count().get_result(&mut conn)?;
    let items: Vec<User> = users::table
        .order(users::username.asc())
        .limit(page.limit)
        .offset(page.offset())
        .select(User::as_select())
        .load(&mut conn)?;

    Ok(Json(Paginated::new(
        items.into_iter().map(UserResponse::from).collect(),
        page,
        total,
    )))
}

pub async fn get_user(
    State(state): State<AppState>,
    _staff: StaffUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<UserResponse>> {
    let mut conn = state.db()?;
    let user = users::table
        .find(user_id)
        .select(User::as_select())
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_with("utilisateur introuvable"))?;
    Ok(Json(user.into()))
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub role: String,
}

pub async fn create_user(
    State(state): State<AppState>,
    SuperAdmin(admin): SuperAdmin,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let username = required_text(&payload.username, "username")?;
    let role: Role = payload.role.parse().map_err(AppError::bad_request)?;
    if payload.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AppError::bad_request(format!(
            "le mot de passe doit contenir au moins {MIN_PASSWORD_CHARS} caractères"
        )));
    }
    let password_hash = password::hash_password(&payload.password)?;

    let new_user = NewUser {
        id: Uuid::new_v4(),
        username,
        password_hash,
        role: role.as_str().to_string(),
    };

    let mut conn = state.db()?;
    let user = conn.transaction::<User, AppError, _>(|conn| {
        let user = diesel::insert_into(users::table)
            .values(&new_user)
            .returning(User::as_returning())
            .get_result(conn)
            .map_err(|err| match err {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    AppError::conflict(format!(
                        "le nom d'utilisateur {} est déjà pris",
                        new_user.username
                    ))
                }
                other => AppError::from(other),
            })?;
        audit::record(
            conn,
            &Actor::from(&admin),
            audit::ACTION_CREATE,
            Some((ItemType::User.as_str(), new_user.id)),
            json!({ "username": new_user.username, "role": new_user.role }),
        )?;
        Ok(user)
    })?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Moves the account to the trash. Its refresh tokens are dropped with it.
pub async fn delete_user(
    State(state): State<AppState>,
    SuperAdmin(admin): SuperAdmin,
    Path(user_id): Path<Uuid>,
    Query(query): Query<TrashQuery>,
) -> AppResult<Json<TrashedResponse>> {
    if user_id == admin.user_id {
        return Err(AppError::bad_request(
            "vous ne pouvez pas supprimer votre propre compte",
        ));
    }
    let response = move_record_to_trash::<User>(&state, &admin, user_id, query.origin.as_deref())?;
    Ok(Json(response))
}
