use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;

use crate::auth::jwt::TokenError;
use crate::jobs::JobQueueError;
use crate::trash::TrashError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "accès refusé")
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "resource not found")
    }

    pub fn not_found_with(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal<E: Display>(error: E) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl From<diesel::result::Error> for AppError {
    fn from(value: diesel::result::Error) -> Self {
        match value {
            diesel::result::Error::NotFound => AppError::not_found(),
            _ => AppError::internal(value),
        }
    }
}

impl From<TrashError> for AppError {
    fn from(value: TrashError) -> Self {
        match value {
            TrashError::NotFound => {
                AppError::not_found_with("élément introuvable dans la corbeille ou expiré")
            }
            TrashError::EntityNotFound => AppError::not_found_with("élément introuvable"),
            TrashError::Conflict(id) => AppError::conflict(format!(
                "un élément actif portant l'identifiant {id} existe déjà"
            )),
            TrashError::Unsupported(item_type) => AppError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("les éléments de type '{item_type}' ne peuvent pas être restaurés"),
            ),
            TrashError::Forbidden(item_type) => AppError::new(
                StatusCode::FORBIDDEN,
                format!("les éléments de type '{item_type}' sont réservés au superadministrateur"),
            ),
            TrashError::InvalidSnapshot(err) => {
                AppError::internal(format!("instantané illisible: {err}"))
            }
            TrashError::Database(err) => AppError::from(err),
        }
    }
}

impl From<JobQueueError> for AppError {
    fn from(value: JobQueueError) -> Self {
        AppError::internal(value)
    }
}

impl From<TokenError> for AppError {
    fn from(value: TokenError) -> Self {
        match value {
            TokenError::Signing(_) => AppError::internal(value),
            TokenError::Rejected(_) => AppError::unauthorized(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::internal(value)
    }
}
