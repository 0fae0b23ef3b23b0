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
    models::{NewTask, Task},
    pagination::{PageRequest, Paginated},
    schema::tasks,
    state::AppState,
    trash::ItemType,
};

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub dossier_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub completed: Option<bool>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

fn scoped(query: &TaskListQuery) -> tasks::BoxedQuery<'static, Pg> {
    let mut boxed = tasks::table.into_boxed();
    if let Some(dossier_id) = query.dossier_id {
        boxed = boxed.filter(tasks::dossier_id.eq(dossier_id));
    }
    if let Some(assignee) = query.assigned_to {
        boxed = boxed.filter(tasks::assigned_to.eq(assignee));
    }
    match query.completed {
        Some(true) => boxed = boxed.filter(tasks::completed_at.is_not_null()),
        Some(false) => boxed = boxed.filter(tasks::completed_at.is_null()),
        None => {}
    }
    boxed
}

pub async fn list_tasks(
    State(state): State<AppState>,
    _staff: StaffUser,
    Query(query): Query<TaskListQuery>,
) -> AppResult<Json<Paginated<Task>>> {
    let page = PageRequest::new(query.page, query.limit);
    let mut conn = state.db()?;

    let total: i64 = scoped(&query).count().get_result(&mut conn)?;
    let items: Vec<Task> = scoped(&query)
        .order((tasks::due_at.asc(), tasks::created_at.asc()))
        .limit(page.limit)
        .offset(page.offset())
        .load(&mut conn)?;

    Ok(Json(Paginated::new(items, page, total)))
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub dossier_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub due_at: Option<NaiveDateTime>,
}

pub async fn create_task(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Json(payload): Json<CreateTaskRequest>,
) -> AppResult<(StatusCode, Json<Task>)> {
    let new_task = NewTask {
        id: Uuid::new_v4(),
        dossier_id: payload.dossier_id,
        title: required_text(&payload.title, "title")?,
        description: optional_text(payload.description),
        assigned_to: payload.assigned_to,
        due_at: payload.due_at,
    };

    let mut conn = state.db()?;
    let task = conn.transaction::<Task, AppError, _>(|conn| {
        let task = diesel::insert_into(tasks::table)
            .values(&new_task)
            .returning(Task::as_returning())
            .get_result(conn)?;
        audit::record(
            conn,
            &Actor::from(&user),
            audit::ACTION_CREATE,
            Some((ItemType::Task.as_str(), new_task.id)),
            json!({ "title": new_task.title, "assigned_to": new_task.assigned_to }),
        )?;
        Ok(task)
    })?;

    Ok((StatusCode::CREATED, Json(task)))
}
