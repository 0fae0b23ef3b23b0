use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::models::NewAuditLog;
use crate::schema::audit_logs;

pub const ACTION_LOGIN: &str = "auth.login";
pub const ACTION_LOGOUT: &str = "auth.logout";
pub const ACTION_CREATE: &str = "entity.create";
pub const ACTION_UPDATE: &str = "entity.update";
pub const ACTION_TRASH_MOVE: &str = "trash.move";
pub const ACTION_TRASH_RESTORE: &str = "trash.restore";
pub const ACTION_TRASH_PURGE: &str = "trash.purge";
pub const ACTION_TRASH_PURGE_EXPIRED: &str = "trash.purge_expired";
pub const ACTION_DLOG_EXPORT: &str = "logs.dlog_export";

/// Who performed an audited action. System actions (scheduled purge) carry no user.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
}

impl Actor {
    pub fn system() -> Self {
        Self::default()
    }

    pub fn user(user_id: Uuid, username: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id),
            username: Some(username.into()),
        }
    }
}

impl From<&AuthenticatedUser> for Actor {
    fn from(user: &AuthenticatedUser) -> Self {
        Actor::user(user.user_id, user.username.clone())
    }
}

pub fn record(
    conn: &mut PgConnection,
    actor: &Actor,
    action: &str,
    entity: Option<(&str, Uuid)>,
    details: Value,
) -> QueryResult<()> {
    let entry = NewAuditLog {
        id: Uuid::new_v4(),
        user_id: actor.user_id,
        username: actor.username.clone(),
        action: action.to_string(),
        entity_type: entity.map(|(kind, _)| kind.to_string()),
        entity_id: entity.map(|(_, id)| id),
        details,
    };

    diesel::insert_into(audit_logs::table)
        .values(&entry)
        .execute(conn)?;
    Ok(())
}
