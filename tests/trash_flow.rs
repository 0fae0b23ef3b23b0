mod common;

use anyhow::Result;
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{acquire_db_lock, read_json, TestApp};
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Deserialize)]
struct Trashed {
    trash_item_id: Uuid,
    item_type: String,
    item_id: Uuid,
    origin: String,
}

#[derive(Deserialize)]
struct TrashPage {
    items: Vec<TrashEntry>,
    pagination: PageInfo,
}

#[derive(Deserialize)]
struct TrashEntry {
    id: Uuid,
    item_type: String,
    days_remaining: i64,
}

#[derive(Deserialize)]
struct PageInfo {
    total: i64,
}

#[derive(Deserialize)]
struct BatchReport {
    results: Vec<BatchResult>,
    succeeded: usize,
    failed: usize,
}

#[derive(Deserialize)]
struct BatchResult {
    id: Uuid,
    status: String,
}

async fn create_dossier(app: &TestApp, token: &str, reference: &str) -> Result<Value> {
    let response = app
        .post_json(
            "/api/dossiers",
            &json!({ "reference": reference, "title": format!("Affaire {reference}") }),
            Some(token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    read_json(response).await
}

async fn trash_dossier(app: &TestApp, token: &str, id: &str) -> Result<Trashed> {
    let response = app
        .delete(&format!("/api/dossiers/{id}"), Some(token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    read_json(response).await
}

#[tokio::test]
async fn deleted_dossier_restores_unchanged() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let token = app.token_for("admin-anne", "admin").await?;

    let created = create_dossier(&app, &token, "PL-2024-001").await?;
    let id = created["id"].as_str().unwrap_or_default().to_string();

    let trashed = trash_dossier(&app, &token, &id).await?;
    assert_eq!(trashed.item_type, "dossier");
    assert_eq!(trashed.item_id.to_string(), id);
    assert_eq!(trashed.origin, "admin.dossiers");

    let response = app.get(&format!("/api/dossiers/{id}"), Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let detail: Value = read_json(
        app.get(&format!("/api/trash/{}", trashed.trash_item_id), Some(&token))
            .await?,
    )
    .await?;
    assert_eq!(detail["item_data"]["reference"], "PL-2024-001");
    assert_eq!(detail["days_remaining"], 30);

    let response = app
        .post_empty(
            &format!("/api/trash/{}/restore", trashed.trash_item_id),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let restored: Value = read_json(app.get(&format!("/api/dossiers/{id}"), Some(&token)).await?).await?;
    assert_eq!(restored, created);

    let page: TrashPage = read_json(app.get("/api/trash", Some(&token)).await?).await?;
    assert!(page.items.is_empty());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn restore_conflicts_when_entity_was_recreated() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let token = app.token_for("admin-basile", "admin").await?;

    let created = create_dossier(&app, &token, "PL-2024-002").await?;
    let id = created["id"].as_str().unwrap_or_default().to_string();
    let trashed = trash_dossier(&app, &token, &id).await?;

    // A new dossier reusing the reference blocks the restore.
    create_dossier(&app, &token, "PL-2024-002").await?;
    let response = app
        .post_empty(
            &format!("/api/trash/{}/restore", trashed.trash_item_id),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let page: TrashPage = read_json(app.get("/api/trash", Some(&token)).await?).await?;
    assert_eq!(page.pagination.total, 1);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn purge_is_permanent_and_batch_reports_partial_failure() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let token = app.token_for("admin-chloe", "admin").await?;

    let mut trash_ids = Vec::new();
    for reference in ["PL-B-1", "PL-B-2", "PL-B-3"] {
        let created = create_dossier(&app, &token, reference).await?;
        let id = created["id"].as_str().unwrap_or_default().to_string();
        trash_ids.push(trash_dossier(&app, &token, &id).await?.trash_item_id);
    }

    let purged = trash_ids[2];
    let response = app.delete(&format!("/api/trash/{purged}"), Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = app.delete(&format!("/api/trash/{purged}"), Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .post_json(
            "/api/trash/batch/restore",
            &json!({ "ids": trash_ids }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::MULTI_STATUS);
    let report: BatchReport = read_json(response).await?;
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    let missing = report
        .results
        .iter()
        .find(|result| result.id == purged)
        .map(|result| result.status.as_str());
    assert_eq!(missing, Some("not_found"));

    let response = app
        .post_json("/api/trash/batch/delete", &json!({ "ids": [] }), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn expired_items_are_hidden_and_cannot_be_restored() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let token = app.token_for("admin-denis", "admin").await?;
    let superadmin = app.token_for("root", "superadmin").await?;

    let fresh = create_dossier(&app, &token, "PL-E-1").await?;
    let stale = create_dossier(&app, &token, "PL-E-2").await?;
    let fresh_id = fresh["id"].as_str().unwrap_or_default().to_string();
    let stale_id = stale["id"].as_str().unwrap_or_default().to_string();
    trash_dossier(&app, &token, &fresh_id).await?;
    let stale_item = trash_dossier(&app, &token, &stale_id).await?.trash_item_id;

    app.with_conn(move |conn| {
        use paw_legal::schema::trash_items;
        diesel::update(trash_items::table.find(stale_item))
            .set(trash_items::deleted_at.eq((Utc::now() - Duration::days(31)).naive_utc()))
            .execute(conn)?;
        Ok(())
    })
    .await?;

    let page: TrashPage = read_json(app.get("/api/trash", Some(&token)).await?).await?;
    assert_eq!(page.pagination.total, 1);
    assert!(page.items.iter().all(|item| item.id != stale_item));
    assert!(page.items.iter().all(|item| item.days_remaining <= 30));

    let response = app
        .post_empty(&format!("/api/trash/{stale_item}/restore"), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .post_empty("/api/trash/purge-expired", Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = app
        .post_empty("/api/trash/purge-expired", Some(&superadmin))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = read_json(response).await?;
    assert_eq!(body["purged"], 1);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn stats_and_filters_group_by_type() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let token = app.token_for("admin-emma", "admin").await?;

    let dossier = create_dossier(&app, &token, "PL-S-1").await?;
    let dossier_id = dossier["id"].as_str().unwrap_or_default().to_string();
    trash_dossier(&app, &token, &dossier_id).await?;

    let response = app
        .post_json(
            "/api/temoignages",
            &json!({ "author_name": "Mme Martin", "content": "Très bon suivi", "rating": 5 }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let temoignage: Value = read_json(response).await?;
    let temoignage_id = temoignage["id"].as_str().unwrap_or_default().to_string();
    let response = app
        .delete(
            &format!("/api/temoignages/{temoignage_id}?origin=site.vitrine"),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let stats: Value = read_json(app.get("/api/trash/stats", Some(&token)).await?).await?;
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["by_type"]["dossier"], 1);
    assert_eq!(stats["by_type"]["temoignage"], 1);
    assert_eq!(stats["by_origin"]["site.vitrine"], 1);
    assert_eq!(stats["retention_days"], 30);

    let page: TrashPage = read_json(
        app.get("/api/trash?item_type=temoignage", Some(&token))
            .await?,
    )
    .await?;
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].item_type, "temoignage");

    let response = app.get("/api/trash?item_type=chat", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn user_snapshots_hide_the_password_hash_and_need_a_superadmin() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let superadmin = app.token_for("root", "superadmin").await?;
    let admin = app.token_for("admin-jules", "admin").await?;

    let response = app
        .post_json(
            "/api/users",
            &json!({ "username": "victor", "password": "victor-secret", "role": "client" }),
            Some(&superadmin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let user: Value = read_json(response).await?;
    let user_id = user["id"].as_str().unwrap_or_default().to_string();

    let response = app.delete(&format!("/api/users/{user_id}"), Some(&superadmin)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let trashed: Trashed = read_json(response).await?;
    assert_eq!(trashed.item_type, "user");
    let item = trashed.trash_item_id;

    let detail: Value = read_json(app.get(&format!("/api/trash/{item}"), Some(&admin)).await?).await?;
    assert_eq!(detail["item_data"]["username"], "victor");
    assert!(detail["item_data"].get("password_hash").is_none());

    let response = app
        .post_empty(&format!("/api/trash/{item}/restore"), Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = app.delete(&format!("/api/trash/{item}"), Some(&admin)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_json("/api/trash/batch/restore", &json!({ "ids": [item] }), Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::MULTI_STATUS);
    let report: BatchReport = read_json(response).await?;
    assert_eq!(report.results[0].status, "forbidden");

    let response = app
        .post_empty(&format!("/api/trash/{item}/restore"), Some(&superadmin))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let restored: Value = read_json(response).await?;
    assert_eq!(restored["data"]["username"], "victor");
    assert!(restored["data"].get("password_hash").is_none());

    // The stored snapshot kept the hash, so the account still signs in.
    app.login_token("victor", "victor-secret").await?;

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn every_entity_type_survives_a_trash_round_trip() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let token = app.token_for("root", "superadmin").await?;
    let someone = Uuid::new_v4();

    let cases = [
        ("dossiers", "dossier", json!({ "reference": "PL-RT-1", "title": "Bail commercial" })),
        ("documents", "document", json!({ "title": "Contrat", "filename": "contrat.pdf", "size_bytes": 2048 })),
        (
            "appointments",
            "appointment",
            json!({
                "title": "Audience",
                "starts_at": "2024-06-03T09:00:00",
                "ends_at": "2024-06-03T11:00:00",
            }),
        ),
        ("messages", "message", json!({ "subject": "Convocation", "body": "Merci de venir lundi." })),
        ("tasks", "task", json!({ "title": "Préparer les conclusions" })),
        (
            "notifications",
            "notification",
            json!({ "user_id": someone, "title": "Rappel", "body": "Audience demain" }),
        ),
        (
            "temoignages",
            "temoignage",
            json!({ "author_name": "M. Girard", "content": "Excellent", "rating": 4 }),
        ),
        (
            "users",
            "user",
            json!({ "username": "karim", "password": "karim-secret", "role": "partenaire" }),
        ),
    ];

    for (collection, item_type, payload) in cases {
        let response = app
            .post_json(&format!("/api/{collection}"), &payload, Some(&token))
            .await?;
        assert_eq!(response.status(), StatusCode::CREATED, "{collection}");
        let created: Value = read_json(response).await?;
        let id = created["id"].as_str().unwrap_or_default().to_string();

        let before: Value =
            read_json(app.get(&format!("/api/{collection}/{id}"), Some(&token)).await?).await?;

        let response = app
            .delete(&format!("/api/{collection}/{id}"), Some(&token))
            .await?;
        assert_eq!(response.status(), StatusCode::OK, "{collection}");
        let trashed: Trashed = read_json(response).await?;
        assert_eq!(trashed.item_type, item_type);
        assert_eq!(trashed.origin, format!("admin.{collection}"));

        let response = app.get(&format!("/api/{collection}/{id}"), Some(&token)).await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{collection}");

        let response = app
            .post_empty(
                &format!("/api/trash/{}/restore", trashed.trash_item_id),
                Some(&token),
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK, "{collection}");
        let restored: Value = read_json(response).await?;
        assert_eq!(restored["item_type"], item_type);
        assert_eq!(restored["data"], before, "{collection}");

        let after: Value =
            read_json(app.get(&format!("/api/{collection}/{id}"), Some(&token)).await?).await?;
        assert_eq!(after, before, "{collection}");
    }

    let page: TrashPage = read_json(app.get("/api/trash", Some(&token)).await?).await?;
    assert_eq!(page.pagination.total, 0);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn restore_conflicts_with_a_live_row_of_the_same_id() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let token = app.token_for("admin-lea", "admin").await?;

    let created = create_dossier(&app, &token, "PL-ID-1").await?;
    let id = created["id"].as_str().unwrap_or_default().to_string();
    let trashed = trash_dossier(&app, &token, &id).await?;

    let live_id = trashed.item_id;
    app.with_conn(move |conn| {
        use paw_legal::schema::dossiers;
        diesel::insert_into(dossiers::table)
            .values((
                dossiers::id.eq(live_id),
                dossiers::reference.eq("PL-ID-AUTRE"),
                dossiers::title.eq("Recréé à la main"),
                dossiers::status.eq("ouvert"),
            ))
            .execute(conn)?;
        Ok(())
    })
    .await?;

    let response = app
        .post_empty(
            &format!("/api/trash/{}/restore", trashed.trash_item_id),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .post_json(
            "/api/trash/batch/restore",
            &json!({ "ids": [trashed.trash_item_id] }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::MULTI_STATUS);
    let report: BatchReport = read_json(response).await?;
    assert_eq!(report.results[0].status, "conflict");

    let page: TrashPage = read_json(app.get("/api/trash", Some(&token)).await?).await?;
    assert_eq!(page.pagination.total, 1);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn other_items_cannot_be_restored() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let token = app.token_for("admin-marc", "admin").await?;

    let other_item = Uuid::new_v4();
    app.with_conn(move |conn| {
        use paw_legal::models::NewTrashItem;
        use paw_legal::schema::trash_items;
        diesel::insert_into(trash_items::table)
            .values(&NewTrashItem {
                id: other_item,
                item_type: "other".to_string(),
                item_id: Uuid::new_v4(),
                label: "Brouillon importé".to_string(),
                item_data: json!({ "note": "ancien format" }),
                deleted_by: None,
                deleted_at: Utc::now().naive_utc(),
                origin: "import.legacy".to_string(),
            })
            .execute(conn)?;
        Ok(())
    })
    .await?;

    let created = create_dossier(&app, &token, "PL-O-1").await?;
    let id = created["id"].as_str().unwrap_or_default().to_string();
    let dossier_item = trash_dossier(&app, &token, &id).await?.trash_item_id;

    let response = app
        .post_empty(&format!("/api/trash/{other_item}/restore"), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .post_json(
            "/api/trash/batch/restore",
            &json!({ "ids": [other_item, dossier_item] }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::MULTI_STATUS);
    let report: BatchReport = read_json(response).await?;
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.results[0].status, "unsupported");
    assert_eq!(report.results[1].status, "restored");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn batch_delete_purges_every_item() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let token = app.token_for("admin-nina", "admin").await?;

    let mut items = Vec::new();
    for reference in ["PL-D-1", "PL-D-2"] {
        let created = create_dossier(&app, &token, reference).await?;
        let id = created["id"].as_str().unwrap_or_default().to_string();
        items.push(trash_dossier(&app, &token, &id).await?.trash_item_id);
    }

    let response = app
        .post_json("/api/trash/batch/delete", &json!({ "ids": items }), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let report: BatchReport = read_json(response).await?;
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 0);
    assert!(report.results.iter().all(|result| result.status == "deleted"));

    let page: TrashPage = read_json(app.get("/api/trash", Some(&token)).await?).await?;
    assert_eq!(page.pagination.total, 0);

    app.cleanup().await?;
    Ok(())
}
