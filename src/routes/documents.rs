use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{optional_text, required_text};
use crate::{
    audit::{self, Actor},
    auth::StaffUser,
    error::{AppError, AppResult},
    models::{CaseDocument, NewCaseDocument},
    pagination::{PageRequest, Paginated},
    schema::documents,
    state::AppState,
    trash::ItemType,
};

#[derive(Debug, Deserialize)]
pub struct DocumentListQuery {
    pub dossier_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_documents(
    State(state): State<AppState>,
    _staff: StaffUser,
    Query(query): Query<DocumentListQuery>,
) -> AppResult<Json<Paginated<CaseDocument>>> {
    let page = PageRequest::new(query.page, query.limit);
    let mut conn = state.db()?;

    let (total, items) = match query.dossier_id {
        Some(dossier_id) => {
            let scope = documents::dossier_id.eq(dossier_id);
            let total: i64 = documents::table.filter(scope.clone()).count().get_result(&mut conn)?;
            let items = documents::table
                .filter(scope)
                .order(documents::uploaded_at.desc())
                .limit(page.limit)
                .offset(page.offset())
                .select(CaseDocument::as_select())
                .load(&mut conn)?;
            (total, items)
        }
        None => {
            let total: i64 = documents::table.count().get_result(&mut conn)?;
            let items = documents::table
                .order(documents::uploaded_at.desc())
                .limit(page.limit)
                .offset(page.offset())
                .select(CaseDocument::as_select())
                .load(&mut conn)?;
            (total, items)
        }
    };

    Ok(Json(Paginated::new(items, page, total)))
}

/// Metadata only; the file itself lives in external storage.
#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    pub dossier_id: Option<Uuid>,
    pub title: String,
    pub filename: String,
    pub content_type: Option<String>,
    #[serde(default)]
    pub size_bytes: i64,
}

pub async fn create_document(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Json(payload): Json<CreateDocumentRequest>,
) -> AppResult<(StatusCode, Json<CaseDocument>)> {
    if payload.size_bytes < 0 {
        return Err(AppError::bad_request("la taille ne peut pas être négative"));
    }

    let new_document = NewCaseDocument {
        id: Uuid::new_v4(),
        dossier_id: payload.dossier_id,
        title: required_text(&payload.title, "title")?,
        filename: required_text(&payload.filename, "filename")?,
        content_type: optional_text(payload.content_type),
        size_bytes: payload.size_bytes,
        uploaded_by: Some(user.user_id),
    };

    let mut conn = state.db()?;
    let document = conn.transaction::<CaseDocument, AppError, _>(|conn| {
        let document = diesel::insert_into(documents::table)
            .values(&new_document)
            .returning(CaseDocument::as_returning())
            .get_result(conn)?;
        audit::record(
            conn,
            &Actor::from(&user),
            audit::ACTION_CREATE,
            Some((ItemType::Document.as_str(), new_document.id)),
            json!({ "title": new_document.title, "dossier_id": new_document.dossier_id }),
        )?;
        Ok(document)
    })?;

    Ok((StatusCode::CREATED, Json(document)))
}
