use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::Response,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{Appointment, CaseDocument, Dossier, Message, Notification, Task, Temoignage},
    pagination::PageRequest,
    state::AppState,
};

pub mod appointments;
pub mod auth;
pub mod documents;
pub mod dossiers;
pub mod health;
pub mod logs;
pub mod messages;
pub mod notifications;
pub mod records;
pub mod tasks;
pub mod temoignages;
pub mod trash;
pub mod users;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn request(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit)
    }
}

/// Trimmed, non-empty text or a 400 naming the field.
pub(crate) fn required_text(value: &str, field: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request(format!("le champ {field} est obligatoire")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn build_cors(origins: Option<&String>) -> CorsLayer {
    let allow_origin = match origins {
        Some(origins) => {
            let list: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(origin = value, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(list)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = build_cors(state.config.cors_allowed_origin.as_ref());

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    let logs_routes = Router::new()
        .route("/", get(logs::list_logs))
        .route("/stats", get(logs::log_stats))
        .route("/dlog/pdf", get(logs::export_dlog_pdf));

    let trash_routes = Router::new()
        .route("/", get(trash::list_trash))
        .route("/stats", get(trash::trash_stats))
        .route("/purge-expired", post(trash::purge_expired_items))
        .route("/batch/restore", post(trash::batch_restore))
        .route("/batch/delete", post(trash::batch_delete))
        .route("/:id", get(trash::get_trash_item).delete(trash::delete_trash_item))
        .route("/:id/restore", post(trash::restore_trash_item));

    let dossiers_routes = Router::new()
        .route("/", get(dossiers::list_dossiers).post(dossiers::create_dossier))
        .route(
            "/:id",
            get(records::show_record::<Dossier>)
                .patch(dossiers::update_dossier)
                .delete(records::trash_record::<Dossier>),
        )
        .route("/:id/recap/pdf", get(dossiers::export_recap_pdf));

    let documents_routes = Router::new()
        .route(
            "/",
            get(documents::list_documents).post(documents::create_document),
        )
        .route(
            "/:id",
            get(records::show_record::<CaseDocument>).delete(records::trash_record::<CaseDocument>),
        );

    let appointments_routes = Router::new()
        .route(
            "/",
            get(appointments::list_appointments).post(appointments::create_appointment),
        )
        .route(
            "/:id",
            get(records::show_record::<Appointment>).delete(records::trash_record::<Appointment>),
        );

    let messages_routes = Router::new()
        .route("/", get(messages::list_messages).post(messages::create_message))
        .route(
            "/:id",
            get(records::show_record::<Message>).delete(records::trash_record::<Message>),
        );

    let tasks_routes = Router::new()
        .route("/", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/:id",
            get(records::show_record::<Task>).delete(records::trash_record::<Task>),
        );

    let notifications_routes = Router::new()
        .route(
            "/",
            get(notifications::list_notifications).post(notifications::create_notification),
        )
        .route(
            "/:id",
            get(records::show_record::<Notification>)
                .delete(records::trash_record::<Notification>),
        );

    let temoignages_routes = Router::new()
        .route(
            "/",
            get(temoignages::list_temoignages).post(temoignages::create_temoignage),
        )
        .route(
            "/:id",
            get(records::show_record::<Temoignage>).delete(records::trash_record::<Temoignage>),
        );

    let users_routes = Router::new()
        .route("/", get(users::list_users).post(users::create_user))
        .route("/:id", get(users::get_user).delete(users::delete_user));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/logs", logs_routes)
        .nest("/api/trash", trash_routes)
        .nest("/api/dossiers", dossiers_routes)
        .nest("/api/documents", documents_routes)
        .nest("/api/appointments", appointments_routes)
        .nest("/api/messages", messages_routes)
        .nest("/api/tasks", tasks_routes)
        .nest("/api/notifications", notifications_routes)
        .nest("/api/temoignages", temoignages_routes)
        .nest("/api/users", users_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn attachment_disposition(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            ch if ch.is_control() => '_',
            _ => ch,
        })
        .collect();
    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    format!("attachment; filename=\"{sanitized}\"; filename*=UTF-8''{encoded}")
}

/// Wraps rendered PDF bytes as a download.
pub(crate) fn pdf_attachment(bytes: Vec<u8>, filename: &str) -> AppResult<Response> {
    let disposition = HeaderValue::from_str(&attachment_disposition(filename))
        .map_err(|err| AppError::internal(format!("invalid content disposition: {err}")))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CONTENT_LENGTH, bytes.len())
        .body(Body::from(bytes))
        .map_err(AppError::internal)
}
