use axum::{Json, extract::State, response::IntoResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app::{AppHandle, now_fixed_offset};
use crate::confirm::{Action, PendingAction};
use crate::timer::TimerStatus;

#[derive(Debug, Serialize)]
pub struct TimerResponse {
    pub changed: bool,
    pub timer: TimerStatus,
    pub pending: PendingAction,
}

#[derive(Debug, Deserialize)]
pub struct DurationInput {
    pub minutes: Value, // text field contents or a number
}

#[derive(Debug, Deserialize)]
pub struct ConfirmationInput {
    pub confirm: bool,
}

#[derive(Debug, Serialize)]
pub struct ConfirmationResponse {
    pub action: Option<Action>,
    pub pending: PendingAction,
}

fn respond(handle: &AppHandle, changed: bool) -> Json<TimerResponse> {
    Json(handle.with(|app| TimerResponse {
        changed,
        timer: app.timer().status(),
        pending: app.pending(),
    }))
}

pub async fn get_timer(State(handle): State<AppHandle>) -> impl IntoResponse {
    respond(&handle, false)
}

// PUT /api/timer/duration
pub async fn set_duration(
    State(handle): State<AppHandle>,
    Json(input): Json<DurationInput>,
) -> impl IntoResponse {
    let minutes = match input.minutes {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    };
    let now = now_fixed_offset();
    let changed = handle.with(|app| app.set_timer_duration(&minutes, now));
    respond(&handle, changed)
}

pub async fn start(State(handle): State<AppHandle>) -> impl IntoResponse {
    let now = now_fixed_offset();
    let changed = handle.with(|app| app.start_timer(now).is_some());
    respond(&handle, changed)
}

pub async fn pause(State(handle): State<AppHandle>) -> impl IntoResponse {
    let now = now_fixed_offset();
    let changed = handle.with(|app| app.pause_timer(now));
    respond(&handle, changed)
}

// POST /api/timer/reset -- asks first
pub async fn reset(State(handle): State<AppHandle>) -> impl IntoResponse {
    handle.with(|app| app.request_timer_reset());
    respond(&handle, false)
}

// POST /api/timer/exit
// changed=false means the caller may leave right away
pub async fn exit(State(handle): State<AppHandle>) -> impl IntoResponse {
    let asked = handle.with(|app| app.request_exit());
    respond(&handle, asked)
}

pub async fn get_confirmation(State(handle): State<AppHandle>) -> impl IntoResponse {
    Json(handle.with(|app| app.pending()))
}

// POST /api/confirmation
pub async fn resolve_confirmation(
    State(handle): State<AppHandle>,
    Json(input): Json<ConfirmationInput>,
) -> impl IntoResponse {
    let now = now_fixed_offset();
    Json(handle.with(|app| ConfirmationResponse {
        action: app.resolve(input.confirm, now),
        pending: app.pending(),
    }))
}
