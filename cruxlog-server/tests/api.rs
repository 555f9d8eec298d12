//! End-to-end API tests over the in-memory backend

mod support;

use axum::http::StatusCode;
use chrono::NaiveDate;
use cruxlog_server::db::{DbError, NewUser, Row, UserRepo};
use serde_json::json;

use support::{app, send, send_text};

fn at(y: i32, m: u32, d: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

#[tokio::test]
async fn root_reports_running() {
    let (app, _, _) = app(2);
    let (status, body) = send_text(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Server is running!");
}

#[tokio::test]
async fn health_reports_pool_status() {
    let (app, _, _) = app(3);
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["pool"]["max_size"], 3);
    assert_eq!(body["pool"]["active"], 0);
    assert_eq!(body["pool"]["closed"], false);
}

#[tokio::test]
async fn saving_a_user_twice_updates_in_place() {
    let (app, _, _) = app(2);

    let (status, first) = send(
        &app,
        "POST",
        "/user",
        Some(json!({"googleId": "g-1", "name": "Ada", "email": "ada@example.com", "photo": null})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, second) = send(
        &app,
        "POST",
        "/user",
        Some(json!({
            "googleId": "g-1",
            "name": "Ada L.",
            "email": "ada@example.com",
            "photo": "p.png"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["id"], second["id"]);

    let (_, users) = send(&app, "GET", "/user", None).await;
    let users = users.as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["Name"], "Ada L.");
    assert_eq!(users[0]["Photo"], "p.png");

    let id = first["id"].as_i64().unwrap();
    let (status, user) = send(&app, "GET", &format!("/user/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["GoogleID"], "g-1");
}

#[tokio::test]
async fn upsert_surfaces_other_constraint_violations() {
    let (app, db, store) = app(2);
    store.fail_next(DbError::ConstraintViolation("Column 'Name' cannot be null".into()));

    let user = NewUser {
        google_id: "g-new".into(),
        name: None,
        email: None,
        photo: None,
    };
    match UserRepo::new(&db).upsert(&user).await {
        Err(DbError::ConstraintViolation(reason)) => assert!(reason.contains("'Name'")),
        other => panic!("expected ConstraintViolation, got {other:?}"),
    }

    let (_, users) = send(&app, "GET", "/user", None).await;
    assert!(users.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn distinct_google_ids_get_distinct_users() {
    let (app, _, _) = app(2);
    let (_, a) = send(&app, "POST", "/user", Some(json!({"googleId": "a"}))).await;
    let (_, b) = send(&app, "POST", "/user", Some(json!({"googleId": "b"}))).await;
    assert_ne!(a["id"], b["id"]);
}

#[tokio::test]
async fn missing_user_is_404() {
    let (app, _, _) = app(2);
    let (status, body) = send(&app, "GET", "/user/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "user '99' not found");
}

#[tokio::test]
async fn non_numeric_id_is_400() {
    let (app, _, _) = app(2);
    let (status, body) = send(&app, "GET", "/climbs/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn malformed_body_is_400() {
    let (app, _, _) = app(2);
    let (status, body) = send(&app, "POST", "/climbs", Some(json!({"difficulty": 3}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn climbs_are_logged_listed_and_deleted() {
    let (app, _, _) = app(2);

    let (status, created) = send(
        &app,
        "POST",
        "/climbs",
        Some(json!({
            "difficulty": 4,
            "description": "Slab",
            "flash": true,
            "completed": true,
            "userID": 1
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let climb_id = created["id"].as_i64().unwrap();

    send(
        &app,
        "POST",
        "/climbs",
        Some(json!({"difficulty": 2, "userID": 2})),
    )
    .await;

    let (_, all) = send(&app, "GET", "/climbs", None).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (_, mine) = send(&app, "GET", "/climbs/1", None).await;
    let mine = mine.as_array().unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["Description"], "Slab");
    assert_eq!(mine[0]["Flashed"], true);
    assert!(mine[0]["UploadDateTime"].is_string());

    // Another user's id does not match the climb.
    let (status, _) = send(&app, "DELETE", &format!("/climbs/2/{climb_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "DELETE", &format!("/climbs/1/{climb_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Climb deleted successfully");

    let (_, mine) = send(&app, "GET", "/climbs/1", None).await;
    assert!(mine.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn monthly_average_groups_by_month_in_order() {
    let (app, _, store) = app(2);
    store.add_climb(5, Some(6), at(2024, 3, 2));
    store.add_climb(5, Some(2), at(2024, 1, 10));
    store.add_climb(5, Some(4), at(2024, 1, 28));
    store.add_climb(5, None, at(2024, 2, 14));
    store.add_climb(6, Some(9), at(2024, 1, 5));

    let (status, body) = send(&app, "GET", "/climbs/average/5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([
            {"month": "2024-01", "average": 3.0},
            {"month": "2024-02", "average": null},
            {"month": "2024-03", "average": 6.0},
        ])
    );

    let (_, none) = send(&app, "GET", "/climbs/average/42", None).await;
    assert_eq!(none, json!([]));
}

#[tokio::test]
async fn tutorials_pass_rows_through() {
    let (app, _, store) = app(2);
    store.add_tutorial(
        Row::new()
            .with("ID", 1i64)
            .with("Title", "Footwork basics")
            .with("URL", "https://example.com/footwork"),
    );

    let (status, body) = send(&app, "GET", "/tutorials", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([{"ID": 1, "Title": "Footwork basics", "URL": "https://example.com/footwork"}])
    );
}

#[tokio::test]
async fn database_failure_is_opaque_500() {
    let (app, db, store) = app(2);
    store.fail_next(DbError::ConnectionLost("broken pipe".into()));

    let (status, body) = send(&app, "GET", "/climbs", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "Database error"}));

    // The broken connection was destroyed; the next request opens a new one.
    assert_eq!(db.pool().status().idle, 0);
    let (status, _) = send(&app, "GET", "/climbs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(store.connects(), 2);
}

#[tokio::test]
async fn requests_after_shutdown_fail() {
    let (app, db, _) = app(2);
    send(&app, "GET", "/user", None).await;

    db.pool().shutdown().await;

    let (status, body) = send(&app, "GET", "/user", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Database error");

    let (_, health) = send(&app, "GET", "/health", None).await;
    assert_eq!(health["status"], "closing");
}

#[tokio::test]
async fn connections_are_reused_across_requests() {
    let (app, db, store) = app(4);
    for _ in 0..5 {
        send(&app, "GET", "/tutorials", None).await;
    }
    assert_eq!(store.connects(), 1);
    assert_eq!(db.pool().status().idle, 1);
}

#[tokio::test]
async fn concurrent_requests_stay_within_pool_size() {
    let (app, db, store) = app(2);
    let mut handles = Vec::new();
    for i in 0..16 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            send(&app, "POST", "/user", Some(json!({"googleId": format!("g-{}", i % 4)}))).await
        }));
    }
    for handle in handles {
        let (status, _) = handle.await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
    }

    assert!(store.connects() <= 2);
    assert_eq!(db.pool().status().active, 0);

    let (_, users) = send(&app, "GET", "/user", None).await;
    assert_eq!(users.as_array().unwrap().len(), 4);
}
