use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDateTime;
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{optional_text, required_text};
use crate::{
    audit::{self, Actor},
    auth::StaffUser,
    error::{AppError, AppResult},
    models::{Appointment, NewAppointment},
    pagination::{PageRequest, Paginated},
    schema::appointments,
    state::AppState,
    trash::ItemType,
};

pub const APPOINTMENT_STATUSES: &[&str] = &["planifie", "confirme", "annule"];

#[derive(Debug, Deserialize)]
pub struct AppointmentListQuery {
    pub dossier_id: Option<Uuid>,
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

fn scoped(query: &AppointmentListQuery) -> appointments::BoxedQuery<'static, Pg> {
    let mut boxed = appointments::table.into_boxed();
    if let Some(dossier_id) = query.dossier_id {
        boxed = boxed.filter(appointments::dossier_id.eq(dossier_id));
    }
    if let Some(from) = query.from {
        boxed = boxed.filter(appointments::starts_at.ge(from));
    }
    if let Some(to) = query.to {
        boxed = boxed.filter(appointments::starts_at.lt(to));
    }
    boxed
}

pub async fn list_appointments(
    State(state): State<AppState>,
    _staff: StaffUser,
    Query(query): Query<AppointmentListQuery>,
) -> AppResult<Json<Paginated<Appointment>>> {
    let page = PageRequest::new(query.page, query.limit);
    let mut conn = state.db()?;

    let total: i64 = scoped(&query).count().get_result(&mut conn)?;
    let items: Vec<Appointment> = scoped(&query)
        .order(appointments::starts_at.asc())
        .limit(page.limit)
        .offset(page.offset())
        .load(&mut conn)?;

    Ok(Json(Paginated::new(items, page, total)))
}

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub dossier_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub title: String,
    pub location: Option<String>,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    pub status: Option<String>,
}

pub async fn create_appointment(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Json(payload): Json<CreateAppointmentRequest>,
) -> AppResult<(StatusCode, Json<Appointment>)> {
    if payload.ends_at < payload.starts_at {
        return Err(AppError::bad_request(
            "la fin du rendez-vous doit suivre son début",
        ));
    }
    let status = payload
        .status
        .as_deref()
        .map(|value| value.trim().to_lowercase())
        .unwrap_or_else(|| APPOINTMENT_STATUSES[0].to_string());
    if !APPOINTMENT_STATUSES.contains(&status.as_str()) {
        return Err(AppError::bad_request(format!(
            "statut invalide '{status}'. Statuts acceptés: {}",
            APPOINTMENT_STATUSES.join(", ")
        )));
    }

    let new_appointment = NewAppointment {
        id: Uuid::new_v4(),
        dossier_id: payload.dossier_id,
        client_id: payload.client_id,
        title: required_text(&payload.title, "title")?,
        location: optional_text(payload.location),
        starts_at: payload.starts_at,
        ends_at: payload.ends_at,
        status,
    };

    let mut conn = state.db()?;
    let appointment = conn.transaction::<Appointment, AppError, _>(|conn| {
        let appointment = diesel::insert_into(appointments::table)
            .values(&new_appointment)
            .returning(Appointment::as_returning())
            .get_result(conn)?;
        audit::record(
            conn,
            &Actor::from(&user),
            audit::ACTION_CREATE,
            Some((ItemType::Appointment.as_str(), new_appointment.id)),
            json!({ "title": new_appointment.title, "starts_at": new_appointment.starts_at }),
        )?;
        Ok(appointment)
    })?;

    Ok((StatusCode::CREATED, Json(appointment)))
}
