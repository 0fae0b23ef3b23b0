//! Recycle bin shared by every deletable entity.
//!
//! Deleting a live row copies it into `trash_items` (type, full JSON snapshot,
//! actor, timestamp, origin) inside the same transaction. An item stays
//! visible and restorable while `deleted_at + retention > now`; afterwards it
//! is hidden from every read path and removed by [`purge_expired`].

pub mod batch;
pub mod entity;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime};
use diesel::dsl::count_star;
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::{self, Actor};
use crate::auth::Role;
use crate::models::{
    Appointment, CaseDocument, Dossier, Message, NewTrashItem, Notification, Task, Temoignage,
    TrashItem, User,
};
use crate::pagination::PageRequest;
use crate::schema::trash_items;

pub use entity::Trashable;

pub const EXPIRING_SOON_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Message,
    Document,
    Dossier,
    Appointment,
    Temoignage,
    User,
    Task,
    Notification,
    Other,
}

impl ItemType {
    pub const ALL: [ItemType; 9] = [
        ItemType::Message,
        ItemType::Document,
        ItemType::Dossier,
        ItemType::Appointment,
        ItemType::Temoignage,
        ItemType::User,
        ItemType::Task,
        ItemType::Notification,
        ItemType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Message => "message",
            ItemType::Document => "document",
            ItemType::Dossier => "dossier",
            ItemType::Appointment => "appointment",
            ItemType::Temoignage => "temoignage",
            ItemType::User => "user",
            ItemType::Task => "task",
            ItemType::Notification => "notification",
            ItemType::Other => "other",
        }
    }

    /// Snapshot fields kept for restore but never returned to callers.
    pub fn sensitive_fields(&self) -> &'static [&'static str] {
        match self {
            ItemType::User => &["password_hash"],
            _ => &[],
        }
    }
}

/// Which item types a caller may restore or purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrashAccess {
    /// Every item type, including user accounts.
    Full,
    /// Everything except user accounts.
    Staff,
}

impl TrashAccess {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::SuperAdmin => TrashAccess::Full,
            _ => TrashAccess::Staff,
        }
    }

    pub fn permits(&self, item_type: ItemType) -> bool {
        match self {
            TrashAccess::Full => true,
            TrashAccess::Staff => item_type != ItemType::User,
        }
    }

    fn check(&self, item_type: ItemType) -> TrashResult<()> {
        if self.permits(item_type) {
            Ok(())
        } else {
            Err(TrashError::Forbidden(item_type))
        }
    }
}

/// Drops the fields listed by [`ItemType::sensitive_fields`] from a snapshot.
pub fn redact_snapshot(item_type: ItemType, mut data: Value) -> Value {
    if let Value::Object(map) = &mut data {
        for field in item_type.sensitive_fields() {
            map.remove(*field);
        }
    }
    data
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        ItemType::ALL
            .into_iter()
            .find(|item_type| item_type.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "type d'élément invalide '{value}'. Types acceptés: {}",
                    ItemType::ALL.map(|t| t.as_str()).join(", ")
                )
            })
    }
}

#[derive(Debug, Error)]
pub enum TrashError {
    #[error("trash item not found")]
    NotFound,
    #[error("live entity not found")]
    EntityNotFound,
    #[error("a live entity with id {0} already exists")]
    Conflict(Uuid),
    #[error("items of type {0} cannot be restored")]
    Unsupported(ItemType),
    #[error("items of type {0} require a superadmin")]
    Forbidden(ItemType),
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] DieselError),
}

pub type TrashResult<T> = Result<T, TrashError>;

#[derive(Debug, Clone, Default)]
pub struct TrashFilter {
    pub item_type: Option<ItemType>,
    pub origin: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrashStats {
    pub total: i64,
    pub by_type: BTreeMap<String, i64>,
    pub by_origin: BTreeMap<String, i64>,
    pub expiring_soon: i64,
    pub retention_days: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoredEntity {
    pub item_type: ItemType,
    pub item_id: Uuid,
    pub data: Value,
}

pub fn expires_at(deleted_at: NaiveDateTime, retention: Duration) -> NaiveDateTime {
    deleted_at + retention
}

pub fn is_expired(deleted_at: NaiveDateTime, now: NaiveDateTime, retention: Duration) -> bool {
    expires_at(deleted_at, retention) <= now
}

/// Whole days left before the purge, rounded up; zero once expired.
pub fn days_remaining(deleted_at: NaiveDateTime, now: NaiveDateTime, retention: Duration) -> i64 {
    let remaining = expires_at(deleted_at, retention) - now;
    if remaining <= Duration::zero() {
        return 0;
    }
    let days = remaining.num_days();
    if remaining > Duration::days(days) {
        days + 1
    } else {
        days
    }
}

fn cutoff(now: NaiveDateTime, retention: Duration) -> NaiveDateTime {
    now - retention
}

pub fn move_to_trash<T: Trashable>(
    conn: &mut PgConnection,
    entity_id: Uuid,
    actor: &Actor,
    origin: &str,
    now: NaiveDateTime,
) -> TrashResult<TrashItem> {
    conn.transaction::<TrashItem, TrashError, _>(|conn| {
        let entity = T::find(conn, entity_id)?.ok_or(TrashError::EntityNotFound)?;
        let snapshot = serde_json::to_value(&entity)?;

        let new_item = NewTrashItem {
            id: Uuid::new_v4(),
            item_type: T::ITEM_TYPE.as_str().to_string(),
            item_id: entity_id,
            label: entity.label(),
            item_data: snapshot,
            deleted_by: actor.user_id,
            deleted_at: now,
            origin: origin.to_string(),
        };

        let item: TrashItem = diesel::insert_into(trash_items::table)
            .values(&new_item)
            .get_result(conn)?;

        if T::remove(conn, entity_id)? == 0 {
            return Err(TrashError::EntityNotFound);
        }

        audit::record(
            conn,
            actor,
            audit::ACTION_TRASH_MOVE,
            Some((T::ITEM_TYPE.as_str(), entity_id)),
            json!({ "trash_item_id": item.id, "origin": origin, "label": item.label }),
        )?;

        info!(
            trash_item_id = %item.id,
            item_type = %T::ITEM_TYPE,
            item_id = %entity_id,
            origin = %origin,
            "moved entity to trash"
        );
        Ok(item)
    })
}

fn visible_items<'a>(
    filter: &'a TrashFilter,
    now: NaiveDateTime,
    retention: Duration,
) -> trash_items::BoxedQuery<'a, Pg> {
    let mut query = trash_items::table
        .filter(trash_items::deleted_at.gt(cutoff(now, retention)))
        .into_boxed();

    if let Some(item_type) = filter.item_type {
        query = query.filter(trash_items::item_type.eq(item_type.as_str()));
    }
    if let Some(origin) = filter.origin.as_deref() {
        query = query.filter(trash_items::origin.eq(origin));
    }
    query
}

pub fn list_items(
    conn: &mut PgConnection,
    filter: &TrashFilter,
    page: PageRequest,
    now: NaiveDateTime,
    retention: Duration,
) -> TrashResult<(Vec<TrashItem>, i64)> {
    let total: i64 = visible_items(filter, now, retention)
        .count()
        .get_result(conn)?;

    let items: Vec<TrashItem> = visible_items(filter, now, retention)
        .order((trash_items::deleted_at.desc(), trash_items::id.asc()))
        .limit(page.limit)
        .offset(page.offset())
        .load(conn)?;

    debug!(
        total,
        returned = items.len(),
        page = page.page,
        "listed trash items"
    );
    Ok((items, total))
}

pub fn get_item(
    conn: &mut PgConnection,
    item_id: Uuid,
    now: NaiveDateTime,
    retention: Duration,
) -> TrashResult<TrashItem> {
    trash_items::table
        .find(item_id)
        .filter(trash_items::deleted_at.gt(cutoff(now, retention)))
        .first::<TrashItem>(conn)
        .optional()?
        .ok_or(TrashError::NotFound)
}

pub fn stats(
    conn: &mut PgConnection,
    now: NaiveDateTime,
    retention: Duration,
) -> TrashResult<TrashStats> {
    let cutoff = cutoff(now, retention);

    let type_rows: Vec<(String, i64)> = trash_items::table
        .filter(trash_items::deleted_at.gt(cutoff))
        .group_by(trash_items::item_type)
        .select((trash_items::item_type, count_star()))
        .load(conn)?;

    let origin_rows: Vec<(String, i64)> = trash_items::table
        .filter(trash_items::deleted_at.gt(cutoff))
        .group_by(trash_items::origin)
        .select((trash_items::origin, count_star()))
        .load(conn)?;

    let expiring_soon: i64 = trash_items::table
        .filter(trash_items::deleted_at.gt(cutoff))
        .filter(trash_items::deleted_at.le(cutoff + Duration::days(EXPIRING_SOON_DAYS)))
        .select(count_star())
        .first(conn)?;

    let mut by_type: BTreeMap<String, i64> = ItemType::ALL
        .iter()
        .map(|item_type| (item_type.as_str().to_string(), 0))
        .collect();
    let mut total = 0;
    for (item_type, count) in type_rows {
        total += count;
        *by_type.entry(item_type).or_insert(0) += count;
    }

    Ok(TrashStats {
        total,
        by_type,
        by_origin: origin_rows.into_iter().collect(),
        expiring_soon,
        retention_days: retention.num_days(),
    })
}

pub fn restore(
    conn: &mut PgConnection,
    item_id: Uuid,
    actor: &Actor,
    access: TrashAccess,
    now: NaiveDateTime,
    retention: Duration,
) -> TrashResult<RestoredEntity> {
    conn.transaction::<RestoredEntity, TrashError, _>(|conn| {
        let item: TrashItem = trash_items::table
            .find(item_id)
            .filter(trash_items::deleted_at.gt(cutoff(now, retention)))
            .for_update()
            .first(conn)
            .optional()?
            .ok_or(TrashError::NotFound)?;

        let item_type = item.item_type.parse().unwrap_or(ItemType::Other);
        access.check(item_type)?;
        let data = match item_type {
            ItemType::Message => restore_snapshot::<Message>(conn, &item)?,
            ItemType::Document => restore_snapshot::<CaseDocument>(conn, &item)?,
            ItemType::Dossier => restore_snapshot::<Dossier>(conn, &item)?,
            ItemType::Appointment => restore_snapshot::<Appointment>(conn, &item)?,
            ItemType::Temoignage => restore_snapshot::<Temoignage>(conn, &item)?,
            ItemType::User => restore_snapshot::<User>(conn, &item)?,
            ItemType::Task => restore_snapshot::<Task>(conn, &item)?,
            ItemType::Notification => restore_snapshot::<Notification>(conn, &item)?,
            ItemType::Other => return Err(TrashError::Unsupported(item_type)),
        };

        diesel::delete(trash_items::table.find(item.id)).execute(conn)?;

        audit::record(
            conn,
            actor,
            audit::ACTION_TRASH_RESTORE,
            Some((item_type.as_str(), item.item_id)),
            json!({ "trash_item_id": item.id, "origin": item.origin, "label": item.label }),
        )?;

        info!(
            trash_item_id = %item.id,
            item_type = %item_type,
            item_id = %item.item_id,
            "restored entity from trash"
        );

        Ok(RestoredEntity {
            item_type,
            item_id: item.item_id,
            data: redact_snapshot(item_type, data),
        })
    })
}

fn restore_snapshot<T: Trashable>(conn: &mut PgConnection, item: &TrashItem) -> TrashResult<Value> {
    let entity: T = serde_json::from_value(item.item_data.clone())?;
    let entity_id = entity.entity_id();

    if T::find(conn, entity_id)?.is_some() {
        return Err(TrashError::Conflict(entity_id));
    }

    match entity.insert(conn) {
        Ok(_) => {}
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(TrashError::Conflict(entity_id));
        }
        Err(err) => return Err(TrashError::from(err)),
    }

    Ok(serde_json::to_value(&entity)?)
}

pub fn purge(
    conn: &mut PgConnection,
    item_id: Uuid,
    actor: &Actor,
    access: TrashAccess,
) -> TrashResult<TrashItem> {
    conn.transaction::<TrashItem, TrashError, _>(|conn| {
        let item_type: String = trash_items::table
            .find(item_id)
            .select(trash_items::item_type)
            .for_update()
            .first(conn)
            .optional()?
            .ok_or(TrashError::NotFound)?;
        access.check(item_type.parse().unwrap_or(ItemType::Other))?;

        let item: TrashItem = diesel::delete(trash_items::table.find(item_id)).get_result(conn)?;

        audit::record(
            conn,
            actor,
            audit::ACTION_TRASH_PURGE,
            Some((item.item_type.as_str(), item.item_id)),
            json!({ "trash_item_id": item.id, "origin": item.origin, "label": item.label }),
        )?;

        info!(
            trash_item_id = %item.id,
            item_type = %item.item_type,
            "permanently deleted trash item"
        );
        Ok(item)
    })
}

/// Removes every item whose retention window has elapsed.
pub fn purge_expired(
    conn: &mut PgConnection,
    actor: &Actor,
    now: NaiveDateTime,
    retention: Duration,
) -> TrashResult<usize> {
    conn.transaction::<usize, TrashError, _>(|conn| {
        let purged = diesel::delete(
            trash_items::table.filter(trash_items::deleted_at.le(cutoff(now, retention))),
        )
        .execute(conn)?;

        if purged > 0 {
            audit::record(
                conn,
                actor,
                audit::ACTION_TRASH_PURGE_EXPIRED,
                None,
                json!({ "purged": purged, "retention_days": retention.num_days() }),
            )?;
            info!(purged, "purged expired trash items");
        } else {
            debug!("no expired trash items to purge");
        }

        Ok(purged)
    })
}
