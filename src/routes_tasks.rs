// --------------------------------------------------
// Handles API endpoints for the three collections
// and for settings.
//
// Responsibilities:
// - Create / read / update daily tasks, general tasks, birthdays
// - Toggle completion (daily per local day, general tasks, subtasks)
// - Raise delete / reset-all confirmations
// - Get / update settings
// - List pending notifications
//
// Input that fails validation (empty names, bad MM-DD) is ignored and
// answered with `null`; malformed ids and timestamps are 400s.
// --------------------------------------------------

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::{AppHandle, TaskDraft, now_fixed_offset};
use crate::models::{Settings, ThemeMode};
use crate::notify::NotificationRequest;
use crate::reminders;

pub(crate) fn parse_id(id: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(id).map_err(|_| (StatusCode::BAD_REQUEST, "invalid id").into_response())
}

fn parse_due(due_at: Option<&str>) -> Result<Option<DateTime<FixedOffset>>, Response> {
    match due_at.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(Some)
            .map_err(|_| (StatusCode::BAD_REQUEST, "invalid due_at").into_response()),
    }
}

fn found<T: Serialize>(value: Option<T>, what: &'static str) -> Response {
    match value {
        Some(v) => Json(v).into_response(),
        None => (StatusCode::NOT_FOUND, what).into_response(),
    }
}

// -----------------------------
// GET /api/state
// Everything the UI renders, in one response
// -----------------------------
pub async fn get_state(State(handle): State<AppHandle>) -> impl IntoResponse {
    let now = now_fixed_offset();
    Json(handle.with(|app| {
        app.refresh_day(now);
        app.view(now.date_naive())
    }))
}

// -----------------------------
// Daily tasks
// -----------------------------

#[derive(Debug, Deserialize)]
pub struct CreateDailyInput {
    pub name: String,
    pub time: Option<String>, // "HH:MM"
}

pub async fn get_daily(State(handle): State<AppHandle>) -> impl IntoResponse {
    let now = now_fixed_offset();
    Json(handle.with(|app| {
        app.refresh_day(now);
        app.data().daily_tasks.clone()
    }))
}

pub async fn create_daily(
    State(handle): State<AppHandle>,
    Json(input): Json<CreateDailyInput>,
) -> impl IntoResponse {
    let now = now_fixed_offset();
    Json(handle.with(|app| app.add_daily_task(&input.name, input.time.as_deref(), now)))
}

pub async fn complete_daily(
    State(handle): State<AppHandle>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(u) => u,
        Err(r) => return r,
    };
    let now = now_fixed_offset();
    found(
        handle.with(|app| app.mark_daily_complete(id, now)),
        "task not found",
    )
}

pub async fn uncomplete_daily(
    State(handle): State<AppHandle>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(u) => u,
        Err(r) => return r,
    };
    let now = now_fixed_offset();
    found(
        handle.with(|app| app.unmark_daily_complete(id, now)),
        "task not found",
    )
}

// -----------------------------
// DELETE /api/daily/:id
// Only raises the confirmation; the delete happens on confirm
// -----------------------------
pub async fn delete_daily(State(handle): State<AppHandle>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(u) => u,
        Err(r) => return r,
    };
    found(
        handle.with(|app| app.request_delete_daily_task(id).then(|| app.pending())),
        "task not found",
    )
}

// -----------------------------
// General tasks
// -----------------------------

#[derive(Debug, Deserialize)]
pub struct TaskInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub color: Option<String>,
    #[serde(default)]
    pub important: bool,
    pub due_at: Option<String>, // RFC3339
    #[serde(default)]
    pub subtasks: Vec<String>,
}

impl TaskInput {
    fn into_draft(self) -> Result<TaskDraft, Response> {
        let due_date = parse_due(self.due_at.as_deref())?;
        Ok(TaskDraft {
            title: self.title,
            description: self.description,
            color: self.color,
            important: self.important,
            due_date,
            subtasks: self.subtasks,
        })
    }
}

pub async fn get_tasks(State(handle): State<AppHandle>) -> impl IntoResponse {
    Json(handle.with(|app| app.data().tasks.clone()))
}

pub async fn create_task(
    State(handle): State<AppHandle>,
    Json(input): Json<TaskInput>,
) -> Response {
    let draft = match input.into_draft() {
        Ok(d) => d,
        Err(r) => return r,
    };
    let now = now_fixed_offset();
    Json(handle.with(|app| app.add_task(draft, now))).into_response()
}

// -----------------------------
// PUT /api/tasks/:id
// Replaces the editable fields; a new due date re-arms the reminder
// -----------------------------
pub async fn update_task(
    State(handle): State<AppHandle>,
    Path(id): Path<String>,
    Json(input): Json<TaskInput>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(u) => u,
        Err(r) => return r,
    };
    let draft = match input.into_draft() {
        Ok(d) => d,
        Err(r) => return r,
    };
    let now = now_fixed_offset();
    found(
        handle.with(|app| app.update_task(id, draft, now)),
        "task not found",
    )
}

pub async fn toggle_task(State(handle): State<AppHandle>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(u) => u,
        Err(r) => return r,
    };
    let now = now_fixed_offset();
    found(handle.with(|app| app.toggle_task(id, now)), "task not found")
}

pub async fn delete_task(State(handle): State<AppHandle>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(u) => u,
        Err(r) => return r,
    };
    found(
        handle.with(|app| app.request_delete_task(id).then(|| app.pending())),
        "task not found",
    )
}

#[derive(Debug, Deserialize)]
pub struct SubtaskInput {
    pub text: String,
}

pub async fn add_subtask(
    State(handle): State<AppHandle>,
    Path(id): Path<String>,
    Json(input): Json<SubtaskInput>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(u) => u,
        Err(r) => return r,
    };
    let now = now_fixed_offset();
    found(
        handle.with(|app| app.add_subtask(id, &input.text, now)),
        "task not found",
    )
}

pub async fn toggle_subtask(
    State(handle): State<AppHandle>,
    Path((id, index)): Path<(String, usize)>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(u) => u,
        Err(r) => return r,
    };
    let now = now_fixed_offset();
    found(
        handle.with(|app| app.toggle_subtask(id, index, now)),
        "subtask not found",
    )
}

pub async fn remove_subtask(
    State(handle): State<AppHandle>,
    Path((id, index)): Path<(String, usize)>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(u) => u,
        Err(r) => return r,
    };
    let now = now_fixed_offset();
    found(
        handle.with(|app| app.remove_subtask(id, index, now)),
        "subtask not found",
    )
}

// -----------------------------
// Birthdays
// -----------------------------

#[derive(Debug, Deserialize)]
pub struct BirthdayInput {
    pub name: String,
    pub date: String, // "MM-DD" or "YYYY-MM-DD"
}

pub async fn get_birthdays(State(handle): State<AppHandle>) -> impl IntoResponse {
    Json(handle.with(|app| app.data().birthdays.clone()))
}

pub async fn create_birthday(
    State(handle): State<AppHandle>,
    Json(input): Json<BirthdayInput>,
) -> impl IntoResponse {
    let now = now_fixed_offset();
    Json(handle.with(|app| app.add_birthday(&input.name, &input.date, now)))
}

pub async fn delete_birthday(
    State(handle): State<AppHandle>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(u) => u,
        Err(r) => return r,
    };
    found(
        handle.with(|app| app.request_delete_birthday(id).then(|| app.pending())),
        "birthday not found",
    )
}

// -----------------------------
// Settings / reset
// -----------------------------

#[derive(Debug, Deserialize)]
pub struct SettingsInput {
    pub theme_mode: Option<ThemeMode>,
    pub selected_theme_name: Option<String>,
    pub user_name: Option<String>,
}

pub async fn get_settings(State(handle): State<AppHandle>) -> impl IntoResponse {
    Json(handle.with(|app| app.data().settings.clone()))
}

// -----------------------------
// PUT /api/settings
// Fields left out keep their current value
// -----------------------------
pub async fn put_settings(
    State(handle): State<AppHandle>,
    Json(input): Json<SettingsInput>,
) -> impl IntoResponse {
    let now = now_fixed_offset();
    Json(handle.with(|app| {
        let current = app.data().settings.clone();
        let next = Settings {
            theme_mode: input.theme_mode.unwrap_or(current.theme_mode),
            selected_theme_name: input
                .selected_theme_name
                .unwrap_or(current.selected_theme_name),
            user_name: input
                .user_name
                .map(|n| n.trim().to_string())
                .unwrap_or(current.user_name),
        };
        app.update_settings(next, now)
    }))
}

pub async fn reset_all(State(handle): State<AppHandle>) -> impl IntoResponse {
    Json(handle.with(|app| {
        app.request_reset_all();
        app.pending()
    }))
}

// -----------------------------
// GET /api/notifications
// What the scheduler currently holds, with the next fire time
// -----------------------------

#[derive(Debug, Serialize)]
pub struct PendingNotification {
    #[serde(flatten)]
    pub request: NotificationRequest,
    pub next_fire: Option<String>,
}

pub async fn get_notifications(State(handle): State<AppHandle>) -> impl IntoResponse {
    let now = now_fixed_offset();
    let pending: Vec<PendingNotification> = handle
        .with(|app| app.notifier().pending())
        .into_iter()
        .map(|request| PendingNotification {
            next_fire: reminders::next_fire(&request.trigger, now).map(|t| t.to_rfc3339()),
            request,
        })
        .collect();
    Json(pending)
}
