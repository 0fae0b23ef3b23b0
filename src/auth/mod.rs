pub mod jwt;
pub mod password;

use std::fmt;
use std::str::FromStr;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Partenaire,
    Admin,
    SuperAdmin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Client, Role::Partenaire, Role::Admin, Role::SuperAdmin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Partenaire => "partenaire",
            Role::Admin => "admin",
            Role::SuperAdmin => "superadmin",
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| format!("rôle inconnu '{value}'"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: uuid::Uuid,
    pub username: String,
    pub role: Role,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        state
            .jwt
            .authenticate(bearer.token())
            .map_err(|_| AppError::unauthorized())
    }
}

/// An authenticated `admin` or `superadmin`.
#[derive(Debug, Clone)]
pub struct StaffUser(pub AuthenticatedUser);

#[async_trait]
impl FromRequestParts<AppState> for StaffUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        if !user.role.is_staff() {
            return Err(AppError::forbidden());
        }
        Ok(StaffUser(user))
    }
}

#[derive(Debug, Clone)]
pub struct SuperAdmin(pub AuthenticatedUser);

#[async_trait]
impl FromRequestParts<AppState> for SuperAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        if user.role != Role::SuperAdmin {
            return Err(AppError::forbidden());
        }
        Ok(SuperAdmin(user))
    }
}

#[cfg(test)]
mod tests {
    use super::Role;

    #[test]
    fn parses_roles_case_insensitively() {
        assert_eq!("SuperAdmin".parse::<Role>(), Ok(Role::SuperAdmin));
        assert_eq!(" partenaire ".parse::<Role>(), Ok(Role::Partenaire));
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn only_admins_are_staff() {
        assert!(Role::Admin.is_staff());
        assert!(Role::SuperAdmin.is_staff());
        assert!(!Role::Client.is_staff());
        assert!(!Role::Partenaire.is_staff());
    }

    #[test]
    fn serializes_as_stored_role_names() {
        let json = serde_json::to_string(&Role::SuperAdmin).unwrap();
        assert_eq!(json, "\"superadmin\"");
    }
}
