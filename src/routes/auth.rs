use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use axum_extra::{headers::Cookie, typed_header::TypedHeader};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use diesel::prelude::*;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    audit::{self, Actor},
    auth::{password, AuthenticatedUser, Role},
    error::{AppError, AppResult},
    models::{NewRefreshToken, RefreshToken, User},
    schema::{refresh_tokens, users},
    state::AppState,
};

const REFRESH_COOKIE_NAME: &str = "refresh_token";

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub role: Role,
}

fn stored_role(user: &User) -> AppResult<Role> {
    user.role.parse().map_err(|err: String| {
        warn!(user_id = %user.id, error = %err, "user has an unknown role");
        AppError::unauthorized()
    })
}

/// Signs an access token and stores a fresh refresh token for `user`.
fn issue_session(
    state: &AppState,
    conn: &mut PgConnection,
    user: &User,
    now: DateTime<Utc>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let role = stored_role(user)?;
    let access_token = state.jwt.issue(
        &AuthenticatedUser {
            user_id: user.id,
            username: user.username.clone(),
            role,
        },
        now,
    )?;

    let refresh_value = generate_refresh_token();
    let refresh_expires_at = now + Duration::days(state.config.refresh_token_expiry_days);
    diesel::insert_into(refresh_tokens::table)
        .values(&NewRefreshToken {
            id: Uuid::new_v4(),
            user_id: user.id,
            token_hash: hash_refresh_token(&refresh_value),
            issued_at: now.naive_utc(),
            expires_at: refresh_expires_at.naive_utc(),
        })
        .execute(conn)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        build_refresh_cookie(state, &refresh_value, refresh_expires_at)?,
    );

    Ok((
        headers,
        Json(LoginResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: state.jwt.lifetime_secs(),
            role,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let mut conn = state.db()?;

    let user: User = users::table
        .filter(users::username.eq(payload.username.trim()))
        .select(User::as_select())
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::unauthorized)?;

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;
    if !valid {
        return Err(AppError::unauthorized());
    }

    let session = issue_session(&state, &mut conn, &user, Utc::now())?;
    audit::record(
        &mut conn,
        &Actor::user(user.id, user.username.clone()),
        audit::ACTION_LOGIN,
        Some(("user", user.id)),
        json!({ "role": user.role }),
    )?;
    info!(user_id = %user.id, "user logged in");
    Ok(session)
}

pub async fn refresh(
    State(state): State<AppState>,
    jar: Option<TypedHeader<Cookie>>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let cookies = jar.ok_or_else(AppError::unauthorized)?;
    let refresh_value = cookies
        .get(REFRESH_COOKIE_NAME)
        .ok_or_else(AppError::unauthorized)?;

    let now = Utc::now();
    let now_naive = now.naive_utc();
    let mut conn = state.db()?;

    let token: RefreshToken = refresh_tokens::table
        .filter(refresh_tokens::token_hash.eq(hash_refresh_token(refresh_value)))
        .filter(refresh_tokens::revoked_at.is_null())
        .filter(refresh_tokens::expires_at.gt(now_naive))
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::unauthorized)?;

    revoke_token(&mut conn, token.id, now_naive)?;

    let user: User = users::table
        .find(token.user_id)
        .select(User::as_select())
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::unauthorized)?;

    issue_session(&state, &mut conn, &user, now)
}

fn revoke_token(conn: &mut PgConnection, token_id: Uuid, now: NaiveDateTime) -> QueryResult<usize> {
    diesel::update(refresh_tokens::table.find(token_id))
        .set((
            refresh_tokens::revoked_at.eq(now),
            refresh_tokens::updated_at.eq(now),
        ))
        .execute(conn)
}

pub async fn logout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    jar: Option<TypedHeader<Cookie>>,
) -> AppResult<(HeaderMap, StatusCode)> {
    let mut conn = state.db()?;
    let now = Utc::now().naive_utc();

    let active = refresh_tokens::table
        .filter(refresh_tokens::user_id.eq(user.user_id))
        .filter(refresh_tokens::revoked_at.is_null());

    // Revoke the presented token, or every open session when none is sent.
    let presented = jar
        .as_ref()
        .and_then(|cookies| cookies.get(REFRESH_COOKIE_NAME))
        .map(hash_refresh_token);
    let revoked = match presented {
        Some(hash) => diesel::update(active.clone().filter(refresh_tokens::token_hash.eq(hash)))
            .set((
                refresh_tokens::revoked_at.eq(now),
                refresh_tokens::updated_at.eq(now),
            ))
            .execute(&mut conn)?,
        None => 0,
    };
    if revoked == 0 {
        diesel::update(active)
            .set((
                refresh_tokens::revoked_at.eq(now),
                refresh_tokens::updated_at.eq(now),
            ))
            .execute(&mut conn)?;
    }

    audit::record(
        &mut conn,
        &Actor::from(&user),
        audit::ACTION_LOGOUT,
        Some(("user", user.user_id)),
        json!({}),
    )?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, build_clear_refresh_cookie(&state)?);
    Ok((headers, StatusCode::NO_CONTENT))
}

pub async fn me(user: AuthenticatedUser) -> Json<AuthenticatedUser> {
    Json(user)
}

fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn cookie_header(state: &AppState, mut parts: Vec<String>) -> AppResult<HeaderValue> {
    parts.push("Path=/".into());
    parts.push("HttpOnly".into());
    parts.push("SameSite=Strict".into());
    if state.config.refresh_cookie_secure {
        parts.push("Secure".into());
    }
    if let Some(domain) = &state.config.refresh_cookie_domain {
        parts.push(format!("Domain={domain}"));
    }
    HeaderValue::from_str(&parts.join("; "))
        .map_err(|err| AppError::internal(format!("invalid refresh cookie: {err}")))
}

fn build_refresh_cookie(
    state: &AppState,
    token: &str,
    expires_at: DateTime<Utc>,
) -> AppResult<HeaderValue> {
    let max_age = Duration::days(state.config.refresh_token_expiry_days).num_seconds();
    cookie_header(
        state,
        vec![
            format!("{REFRESH_COOKIE_NAME}={token}"),
            format!("Max-Age={max_age}"),
            format!("Expires={}", expires_at.to_rfc2822()),
        ],
    )
}

fn build_clear_refresh_cookie(state: &AppState) -> AppResult<HeaderValue> {
    cookie_header(
        state,
        vec![
            format!("{REFRESH_COOKIE_NAME}="),
            "Max-Age=0".to_string(),
            "Expires=Thu, 01 Jan 1970 00:00:00 GMT".to_string(),
        ],
    )
}
