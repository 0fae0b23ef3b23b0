use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::*;

// Rows that can be moved to the trash derive `Insertable` on the full struct
// so a snapshot re-inserts every column unchanged.

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Insertable)]
#[derive(Serialize, Deserialize)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Insertable)]
#[derive(Serialize, Deserialize)]
#[diesel(table_name = dossiers)]
pub struct Dossier {
    pub id: Uuid,
    pub reference: String,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub client_id: Option<Uuid>,
    pub partner_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = dossiers)]
pub struct NewDossier {
    pub id: Uuid,
    pub reference: String,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub client_id: Option<Uuid>,
    pub partner_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Insertable)]
#[derive(Serialize, Deserialize)]
#[diesel(table_name = documents)]
pub struct CaseDocument {
    pub id: Uuid,
    pub dossier_id: Option<Uuid>,
    pub title: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub uploaded_by: Option<Uuid>,
    pub uploaded_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct NewCaseDocument {
    pub id: Uuid,
    pub dossier_id: Option<Uuid>,
    pub title: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub uploaded_by: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Insertable)]
#[derive(Serialize, Deserialize)]
#[diesel(table_name = appointments)]
pub struct Appointment {
    pub id: Uuid,
    pub dossier_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub title: String,
    pub location: Option<String>,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    pub status: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = appointments)]
pub struct NewAppointment {
    pub id: Uuid,
    pub dossier_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub title: String,
    pub location: Option<String>,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Insertable)]
#[derive(Serialize, Deserialize)]
#[diesel(table_name = messages)]
pub struct Message {
    pub id: Uuid,
    pub dossier_id: Option<Uuid>,
    pub sender_id: Option<Uuid>,
    pub recipient_id: Option<Uuid>,
    pub subject: Option<String>,
    pub body: String,
    pub read_at: Option<NaiveDateTime>,
    pub sent_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage {
    pub id: Uuid,
    pub dossier_id: Option<Uuid>,
    pub sender_id: Option<Uuid>,
    pub recipient_id: Option<Uuid>,
    pub subject: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Insertable)]
#[derive(Serialize, Deserialize)]
#[diesel(table_name = tasks)]
pub struct Task {
    pub id: Uuid,
    pub dossier_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub due_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTask {
    pub id: Uuid,
    pub dossier_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub due_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Insertable)]
#[derive(Serialize, Deserialize)]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    pub read_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Insertable)]
#[derive(Serialize, Deserialize)]
#[diesel(table_name = temoignages)]
pub struct Temoignage {
    pub id: Uuid,
    pub author_name: String,
    pub content: String,
    pub rating: i32,
    pub published: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = temoignages)]
pub struct NewTemoignage {
    pub id: Uuid,
    pub author_name: String,
    pub content: String,
    pub rating: i32,
    pub published: bool,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = trash_items)]
pub struct TrashItem {
    pub id: Uuid,
    pub item_type: String,
    pub item_id: Uuid,
    pub label: String,
    pub item_data: serde_json::Value,
    pub deleted_by: Option<Uuid>,
    pub deleted_at: NaiveDateTime,
    pub origin: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = trash_items)]
pub struct NewTrashItem {
    pub id: Uuid,
    pub item_type: String,
    pub item_id: Uuid,
    pub label: String,
    pub item_data: serde_json::Value,
    pub deleted_by: Option<Uuid>,
    pub deleted_at: NaiveDateTime,
    pub origin: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = audit_logs)]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = audit_logs)]
pub struct NewAuditLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: NaiveDateTime,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub run_after: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = refresh_tokens)]
#[diesel(belongs_to(User))]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub revoked_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}
