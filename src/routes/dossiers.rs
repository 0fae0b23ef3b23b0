use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use super::{optional_text, pdf_attachment, required_text};
use crate::{
    audit::{self, Actor},
    auth::StaffUser,
    error::{AppError, AppResult},
    models::{Appointment, CaseDocument, Dossier, NewDossier, Task},
    pagination::{PageRequest, Paginated},
    pdf::{
        self,
        recap::{self, DossierRecap},
    },
    schema::{appointments, documents, dossiers, tasks},
    state::AppState,
    trash::ItemType,
};

pub const DOSSIER_STATUSES: &[&str] = &["ouvert", "en_cours", "clos"];
const DEFAULT_STATUS: &str = "ouvert";

fn validate_status(value: &str) -> AppResult<String> {
    let normalized = value.trim().to_lowercase();
    if DOSSIER_STATUSES.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(AppError::bad_request(format!(
            "statut invalide '{value}'. Statuts acceptés: {}",
            DOSSIER_STATUSES.join(", ")
        )))
    }
}

#[derive(Debug, Deserialize)]
pub struct DossierListQuery {
    pub status: Option<String>,
    pub q: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

fn filtered_dossiers<'a>(status: Option<&'a str>, search: Option<&'a str>) -> dossiers::BoxedQuery<'a, Pg> {
    let mut query = dossiers::table.into_boxed();
    if let Some(status) = status {
        query = query.filter(dossiers::status.eq(status));
    }
    if let Some(search) = search {
        let pattern = format!("%{}%", search.replace('%', "\\%").replace('_', "\\_"));
        query = query.filter(
            dossiers::reference
                .ilike(pattern.clone())
                .or(dossiers::title.ilike(pattern)),
        );
    }
    query
}

pub async fn list_dossiers(
    State(state): State<AppState>,
    _staff: StaffUser,
    Query(query): Query<DossierListQuery>,
) -> AppResult<Json<Paginated<Dossier>>> {
    let status = optional_text(query.status)
        .map(|status| validate_status(&status))
        .transpose()?;
    let search = optional_text(query.q);
    let page = PageRequest::new(query.page, query.limit);

    let mut conn = state.db()?;
    let total: i64 = filtered_dossiers(status.as_deref(), search.as_deref())
        .count()
        .get_result(&mut conn)?;
    let items: Vec<Dossier> = filtered_dossiers(status.as_deref(), search.as_deref())
        .order(dossiers::updated_at.desc())
        .limit(page.limit)
        .offset(page.offset())
        .load(&mut conn)?;

    Ok(Json(Paginated::new(items, page, total)))
}

#[derive(Debug, Deserialize)]
pub struct CreateDossierRequest {
    pub reference: String,
    pub title: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub client_id: Option<Uuid>,
    pub partner_id: Option<Uuid>,
}

fn map_reference_conflict(err: DieselError, reference: &str) -> AppError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            AppError::conflict(format!("la référence {reference} est déjà utilisée"))
        }
        other => AppError::from(other),
    }
}

pub async fn create_dossier(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Json(payload): Json<CreateDossierRequest>,
) -> AppResult<(StatusCode, Json<Dossier>)> {
    let reference = required_text(&payload.reference, "reference")?;
    let title = required_text(&payload.title, "title")?;
    let status = match payload.status.as_deref() {
        Some(status) => validate_status(status)?,
        None => DEFAULT_STATUS.to_string(),
    };

    let new_dossier = NewDossier {
        id: Uuid::new_v4(),
        reference,
        title,
        description: optional_text(payload.description),
        status,
        client_id: payload.client_id,
        partner_id: payload.partner_id,
        created_by: Some(user.user_id),
    };

    let mut conn = state.db()?;
    let dossier = conn.transaction::<Dossier, AppError, _>(|conn| {
        let dossier: Dossier = diesel::insert_into(dossiers::table)
            .values(&new_dossier)
            .returning(Dossier::as_returning())
            .get_result(conn)
            .map_err(|err| map_reference_conflict(err, &new_dossier.reference))?;

        audit::record(
            conn,
            &Actor::from(&user),
            audit::ACTION_CREATE,
            Some((ItemType::Dossier.as_str(), dossier.id)),
            json!({ "reference": dossier.reference, "title": dossier.title }),
        )?;
        Ok(dossier)
    })?;

    info!(dossier_id = %dossier.id, reference = %dossier.reference, "created dossier");
    Ok((StatusCode::CREATED, Json(dossier)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateDossierRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = dossiers)]
struct DossierChanges {
    title: Option<String>,
    description: Option<String>,
    status: Option<String>,
    updated_at: NaiveDateTime,
}

pub async fn update_dossier(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Path(dossier_id): Path<Uuid>,
    Json(payload): Json<UpdateDossierRequest>,
) -> AppResult<Json<Dossier>> {
    let title = payload
        .title
        .as_deref()
        .map(|title| required_text(title, "title"))
        .transpose()?;
    let status = payload
        .status
        .as_deref()
        .map(validate_status)
        .transpose()?;
    let description = payload.description.map(|text| text.trim().to_string());

    if title.is_none() && status.is_none() && description.is_none() {
        return Err(AppError::bad_request("aucune modification fournie"));
    }

    let changes = DossierChanges {
        title,
        description,
        status,
        updated_at: Utc::now().naive_utc(),
    };
    let changed_fields: Vec<&str> = [
        changes.title.as_ref().map(|_| "title"),
        changes.description.as_ref().map(|_| "description"),
        changes.status.as_ref().map(|_| "status"),
    ]
    .into_iter()
    .flatten()
    .collect();

    let mut conn = state.db()?;
    let dossier = conn.transaction::<Dossier, AppError, _>(|conn| {
        let dossier: Dossier = diesel::update(dossiers::table.find(dossier_id))
            .set(&changes)
            .returning(Dossier::as_returning())
            .get_result(conn)
            .optional()?
            .ok_or_else(|| AppError::not_found_with("dossier introuvable"))?;

        audit::record(
            conn,
            &Actor::from(&user),
            audit::ACTION_UPDATE,
            Some((ItemType::Dossier.as_str(), dossier.id)),
            json!({ "fields": changed_fields }),
        )?;
        Ok(dossier)
    })?;

    Ok(Json(dossier))
}

fn load_recap(conn: &mut PgConnection, dossier_id: Uuid) -> AppResult<DossierRecap> {
    let dossier = dossiers::table
        .find(dossier_id)
        .select(Dossier::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_with("dossier introuvable"))?;

    let documents = documents::table
        .filter(documents::dossier_id.eq(dossier_id))
        .order(documents::uploaded_at.asc())
        .select(CaseDocument::as_select())
        .load(conn)?;
    let appointments = appointments::table
        .filter(appointments::dossier_id.eq(dossier_id))
        .order(appointments::starts_at.asc())
        .select(Appointment::as_select())
        .load(conn)?;
    let tasks = tasks::table
        .filter(tasks::dossier_id.eq(dossier_id))
        .order((tasks::due_at.asc(), tasks::created_at.asc()))
        .select(Task::as_select())
        .load(conn)?;

    Ok(DossierRecap {
        dossier,
        documents,
        appointments,
        tasks,
    })
}

/// `GET /api/dossiers/:id/recap/pdf`
pub async fn export_recap_pdf(
    State(state): State<AppState>,
    _staff: StaffUser,
    Path(dossier_id): Path<Uuid>,
) -> AppResult<Response> {
    let recap = {
        let mut conn = state.db()?;
        load_recap(&mut conn, dossier_id)?
    };

    let filename = recap::recap_filename(&recap.dossier);
    let layout = recap::build_recap(state.config.letterhead(), Utc::now().naive_utc(), &recap);

    let bytes = pdf::render_blocking(state.renderer.clone(), layout)
        .await
        .map_err(|err| {
            error!(error = %err, %dossier_id, "failed to render dossier recap");
            AppError::internal("la génération du PDF a échoué")
        })?;

    pdf_attachment(bytes, &filename)
}

#[cfg(test)]
mod tests {
    use super::validate_status;

    #[test]
    fn validates_dossier_status() {
        assert_eq!(validate_status(" En_Cours ").unwrap(), "en_cours");
        let err = validate_status("archived").unwrap_err();
        assert!(err.message().contains("ouvert, en_cours, clos"));
    }
}
