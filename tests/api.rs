use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use questup::app::now_fixed_offset;
use questup::notify::LocalNotifier;
use questup::store::{MemoryKv, Persistence};
use questup::{App, AppHandle};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

fn router() -> Router {
    let app = App::open(
        Persistence::new(Arc::new(MemoryKv::new())),
        Arc::new(LocalNotifier::new(true)),
        now_fixed_offset(),
    );
    questup::router(AppHandle::new(app))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = match body {
        Some(v) => Body::from(v.to_string()),
        None => Body::empty(),
    };
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn daily_task_lifecycle_through_confirmation() {
    let app = router();

    let (status, created) = call(
        &app,
        "POST",
        "/api/daily",
        Some(json!({ "name": "Water plants", "time": "09:30" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["time"], "09:30");
    assert_eq!(created["notificationId"], format!("daily-task-{id}"));

    let (_, ignored) = call(&app, "POST", "/api/daily", Some(json!({ "name": "  " }))).await;
    assert!(ignored.is_null());

    let (_, pending) = call(&app, "DELETE", &format!("/api/daily/{id}"), None).await;
    assert_eq!(pending["kind"], "confirm");
    assert_eq!(pending["on_confirm"]["type"], "delete_daily_task");

    let (_, resolved) = call(
        &app,
        "POST",
        "/api/confirmation",
        Some(json!({ "confirm": false })),
    )
    .await;
    assert_eq!(resolved["action"]["type"], "dismiss");
    let (_, list) = call(&app, "GET", "/api/daily", None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    call(&app, "DELETE", &format!("/api/daily/{id}"), None).await;
    call(
        &app,
        "POST",
        "/api/confirmation",
        Some(json!({ "confirm": true })),
    )
    .await;
    let (_, list) = call(&app, "GET", "/api/daily", None).await;
    assert!(list.as_array().unwrap().is_empty());
    let (_, scheduled) = call(&app, "GET", "/api/notifications", None).await;
    assert!(scheduled.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn bad_ids_and_unknown_ids() {
    let app = router();
    let (status, _) = call(&app, "DELETE", "/api/daily/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = Uuid::new_v4();
    let (status, _) = call(&app, "POST", &format!("/api/tasks/{missing}/toggle"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        "POST",
        "/api/tasks",
        Some(json!({ "title": "x", "due_at": "tomorrow-ish" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn general_task_with_future_due_date_is_scheduled() {
    let app = router();
    let due = (now_fixed_offset() + chrono::Duration::days(2)).to_rfc3339();
    let (_, task) = call(
        &app,
        "POST",
        "/api/tasks",
        Some(json!({ "title": "Dentist", "due_at": due, "subtasks": ["call ahead"] })),
    )
    .await;
    let id = task["id"].as_str().unwrap().to_string();
    assert_eq!(task["subtasks"][0]["text"], "call ahead");
    assert!(task["notificationId"].is_string());

    let (_, done) = call(&app, "POST", &format!("/api/tasks/{id}/toggle"), None).await;
    assert_eq!(done["completed"], true);
    assert!(done["completedAt"].is_string());
    assert!(done["notificationId"].is_null());

    let (_, scheduled) = call(&app, "GET", "/api/notifications", None).await;
    assert!(scheduled.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn timer_controls_and_lockout() {
    let app = router();

    let (_, r) = call(
        &app,
        "PUT",
        "/api/timer/duration",
        Some(json!({ "minutes": "abc" })),
    )
    .await;
    assert_eq!(r["changed"], false);
    assert_eq!(r["timer"]["duration_seconds"], 1500);

    let (_, r) = call(
        &app,
        "PUT",
        "/api/timer/duration",
        Some(json!({ "minutes": 10 })),
    )
    .await;
    assert_eq!(r["changed"], true);
    assert_eq!(r["timer"]["display"], "10:00");

    let (_, r) = call(&app, "POST", "/api/timer/exit", None).await;
    assert_eq!(r["changed"], false);

    let (_, r) = call(&app, "POST", "/api/timer/start", None).await;
    assert_eq!(r["timer"]["lockout"], true);
    assert_eq!(r["timer"]["phase"], "running");

    let (_, r) = call(&app, "POST", "/api/timer/exit", None).await;
    assert_eq!(r["changed"], true);
    assert_eq!(r["pending"]["on_confirm"]["type"], "end_focus_session");

    call(
        &app,
        "POST",
        "/api/confirmation",
        Some(json!({ "confirm": true })),
    )
    .await;
    let (_, r) = call(&app, "GET", "/api/timer", None).await;
    assert_eq!(r["timer"]["lockout"], false);
    assert_eq!(r["timer"]["remaining_seconds"], 600);
}

#[tokio::test]
async fn birthdays_and_settings() {
    let app = router();
    let (_, b) = call(
        &app,
        "POST",
        "/api/birthdays",
        Some(json!({ "name": "Ana", "date": "1990-12-25" })),
    )
    .await;
    assert_eq!(b["date"], "12-25");

    let (_, bad) = call(
        &app,
        "POST",
        "/api/birthdays",
        Some(json!({ "name": "Bo", "date": "02-30" })),
    )
    .await;
    assert!(bad.is_null());

    let (_, s) = call(
        &app,
        "PUT",
        "/api/settings",
        Some(json!({ "theme_mode": "dark", "user_name": " Sam " })),
    )
    .await;
    assert_eq!(s["themeMode"], "dark");
    assert_eq!(s["userName"], "Sam");
    assert_eq!(s["selectedThemeName"], "default");

    let (_, state) = call(&app, "GET", "/api/state", None).await;
    assert_eq!(state["birthdays"].as_array().unwrap().len(), 1);
    assert_eq!(state["permission"], "granted");
}
