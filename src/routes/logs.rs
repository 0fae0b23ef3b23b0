use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    response::Response,
    Json,
};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use diesel::dsl::count_star;
use diesel::pg::Pg;
use diesel::prelude::*;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use super::pdf_attachment;
use crate::{
    audit::{self, Actor},
    auth::{StaffUser, SuperAdmin},
    error::{AppError, AppResult},
    models::AuditLog,
    pagination::{PageRequest, Paginated},
    pdf::{self, dlog},
    schema::audit_logs,
    state::AppState,
};

static DATE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date pattern"));

const STATS_WINDOW_DAYS: i64 = 7;

/// Parses a `YYYY-MM-DD` query value. Shape is checked before the calendar
/// so `2024-1-5` and `2024-02-30` are both rejected.
pub fn parse_log_date(raw: Option<&str>) -> AppResult<NaiveDate> {
    let raw = raw
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::bad_request("le paramètre date est requis (format AAAA-MM-JJ)"))?;

    if !DATE_PATTERN.is_match(raw) {
        return Err(AppError::bad_request(
            "format de date invalide, attendu AAAA-MM-JJ",
        ));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::bad_request(format!("date invalide : {raw}")))
}

fn day_bounds(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = date.and_time(NaiveTime::default());
    (start, start + Duration::days(1))
}

#[derive(Debug, Deserialize)]
pub struct LogListQuery {
    pub action: Option<String>,
    pub user_id: Option<String>,
    pub entity_type: Option<String>,
    pub date: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default)]
struct LogFilter {
    action: Option<String>,
    user_id: Option<Uuid>,
    entity_type: Option<String>,
    day: Option<(NaiveDateTime, NaiveDateTime)>,
}

fn filtered_logs(filter: &LogFilter) -> audit_logs::BoxedQuery<'_, Pg> {
    let mut query = audit_logs::table.into_boxed();
    if let Some(action) = filter.action.as_deref() {
        query = query.filter(audit_logs::action.eq(action));
    }
    if let Some(user_id) = filter.user_id {
        query = query.filter(audit_logs::user_id.eq(user_id));
    }
    if let Some(entity_type) = filter.entity_type.as_deref() {
        query = query.filter(audit_logs::entity_type.eq(entity_type));
    }
    if let Some((start, end)) = filter.day {
        query = query
            .filter(audit_logs::created_at.ge(start))
            .filter(audit_logs::created_at.lt(end));
    }
    query
}

fn parse_user_filter(raw: Option<String>) -> AppResult<Option<Uuid>> {
    non_empty(raw)
        .map(|value| {
            Uuid::parse_str(&value)
                .map_err(|_| AppError::bad_request(format!("identifiant utilisateur invalide : {value}")))
        })
        .transpose()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub async fn list_logs(
    State(state): State<AppState>,
    _staff: StaffUser,
    Query(query): Query<LogListQuery>,
) -> AppResult<Json<Paginated<AuditLog>>> {
    let day = match query.date.as_deref() {
        Some(raw) if !raw.trim().is_empty() => Some(day_bounds(parse_log_date(Some(raw))?)),
        _ => None,
    };
    let filter = LogFilter {
        action: non_empty(query.action),
        user_id: parse_user_filter(query.user_id)?,
        entity_type: non_empty(query.entity_type),
        day,
    };
    let page = PageRequest::new(query.page, query.limit);

    let mut conn = state.db()?;
    let total: i64 = filtered_logs(&filter).count().get_result(&mut conn)?;
    let items: Vec<AuditLog> = filtered_logs(&filter)
        .order((audit_logs::created_at.desc(), audit_logs::id.asc()))
        .limit(page.limit)
        .offset(page.offset())
        .load(&mut conn)?;

    Ok(Json(Paginated::new(items, page, total)))
}

#[derive(Debug, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct LogStats {
    pub total: i64,
    pub today: i64,
    pub by_action: BTreeMap<String, i64>,
    pub last_7_days: Vec<DailyCount>,
}

fn bucket_by_day(today: NaiveDate, timestamps: &[NaiveDateTime]) -> Vec<DailyCount> {
    (0..STATS_WINDOW_DAYS)
        .rev()
        .map(|offset| {
            let date = today - Duration::days(offset);
            let count = timestamps
                .iter()
                .filter(|created_at| created_at.date() == date)
                .count() as i64;
            DailyCount { date, count }
        })
        .collect()
}

pub async fn log_stats(
    State(state): State<AppState>,
    _staff: StaffUser,
) -> AppResult<Json<LogStats>> {
    let today = Utc::now().date_naive();
    let (today_start, _) = day_bounds(today);
    let window_start = today_start - Duration::days(STATS_WINDOW_DAYS - 1);

    let mut conn = state.db()?;
    let total: i64 = audit_logs::table.count().get_result(&mut conn)?;

    let by_action: Vec<(String, i64)> = audit_logs::table
        .group_by(audit_logs::action)
        .select((audit_logs::action, count_star()))
        .load(&mut conn)?;

    let recent: Vec<NaiveDateTime> = audit_logs::table
        .filter(audit_logs::created_at.ge(window_start))
        .select(audit_logs::created_at)
        .load(&mut conn)?;

    let last_7_days = bucket_by_day(today, &recent);
    let today_count = last_7_days.last().map(|day| day.count).unwrap_or(0);

    Ok(Json(LogStats {
        total,
        today: today_count,
        by_action: by_action.into_iter().collect(),
        last_7_days,
    }))
}

#[derive(Debug, Deserialize)]
pub struct DlogQuery {
    pub date: Option<String>,
}

/// `GET /api/logs/dlog/pdf?date=YYYY-MM-DD`
pub async fn export_dlog_pdf(
    State(state): State<AppState>,
    SuperAdmin(user): SuperAdmin,
    Query(query): Query<DlogQuery>,
) -> AppResult<Response> {
    let date = parse_log_date(query.date.as_deref())?;
    let (start, end) = day_bounds(date);

    let logs: Vec<AuditLog> = {
        let mut conn = state.db()?;
        audit_logs::table
            .filter(audit_logs::created_at.ge(start))
            .filter(audit_logs::created_at.lt(end))
            .order((audit_logs::created_at.asc(), audit_logs::id.asc()))
            .load(&mut conn)?
    };

    if logs.is_empty() {
        return Err(AppError::not_found_with(format!(
            "aucune activité enregistrée le {}",
            date.format("%d/%m/%Y")
        )));
    }

    let entries = logs.len();
    let layout = dlog::build_dlog(
        state.config.letterhead(),
        Utc::now().naive_utc(),
        date,
        &logs,
    );
    let pages = layout.page_count();

    let bytes = pdf::render_blocking(state.renderer.clone(), layout)
        .await
        .map_err(|err| {
            error!(error = %err, %date, "failed to render DLOG");
            AppError::internal("la génération du PDF a échoué")
        })?;

    {
        let mut conn = state.db()?;
        audit::record(
            &mut conn,
            &Actor::from(&user),
            audit::ACTION_DLOG_EXPORT,
            None,
            json!({ "date": date.to_string(), "entries": entries, "pages": pages }),
        )?;
    }

    info!(%date, entries, pages, "exported DLOG");
    pdf_attachment(bytes, &dlog::dlog_filename(date))
}
