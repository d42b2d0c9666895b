// Define data modules
pub mod models; // Data structures (tasks, birthdays, timer state, snapshot)
pub mod error; // Error taxonomy
pub mod config; // Environment configuration
pub mod store; // Persistence bridge (key-value store, versioned snapshot)
pub mod notify; // Notification scheduling contract
pub mod reminders; // Reminder derivation and reconciliation
pub mod timer; // Focus timer state machine
pub mod ticker; // One-second tick source
pub mod confirm; // Pending confirmation prompts
pub mod app; // The application store
pub mod routes_tasks; // HTTP handlers for collections & settings
pub mod routes_timer; // HTTP handlers for the focus timer & confirmations

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

pub use app::{App, AppHandle};
pub use config::Config;

/// The presentation API, mounted under `/api`.
pub fn router(handle: AppHandle) -> Router {
    let api = Router::new()
        .route("/state", get(routes_tasks::get_state))
        // daily tasks
        .route("/daily", get(routes_tasks::get_daily).post(routes_tasks::create_daily))
        .route("/daily/:id", axum::routing::delete(routes_tasks::delete_daily))
        .route("/daily/:id/complete", post(routes_tasks::complete_daily))
        .route("/daily/:id/uncomplete", post(routes_tasks::uncomplete_daily))
        // general tasks
        .route("/tasks", get(routes_tasks::get_tasks).post(routes_tasks::create_task))
        .route("/tasks/:id", put(routes_tasks::update_task).delete(routes_tasks::delete_task))
        .route("/tasks/:id/toggle", post(routes_tasks::toggle_task))
        .route("/tasks/:id/subtasks", post(routes_tasks::add_subtask))
        .route(
            "/tasks/:id/subtasks/:index",
            axum::routing::delete(routes_tasks::remove_subtask),
        )
        .route("/tasks/:id/subtasks/:index/toggle", post(routes_tasks::toggle_subtask))
        // birthdays
        .route(
            "/birthdays",
            get(routes_tasks::get_birthdays).post(routes_tasks::create_birthday),
        )
        .route("/birthdays/:id", axum::routing::delete(routes_tasks::delete_birthday))
        // settings
        .route("/settings", get(routes_tasks::get_settings).put(routes_tasks::put_settings))
        .route("/reset", post(routes_tasks::reset_all))
        .route("/notifications", get(routes_tasks::get_notifications))
        // timer
        .route("/timer", get(routes_timer::get_timer))
        .route("/timer/duration", put(routes_timer::set_duration))
        .route("/timer/start", post(routes_timer::start))
        .route("/timer/pause", post(routes_timer::pause))
        .route("/timer/reset", post(routes_timer::reset))
        .route("/timer/exit", post(routes_timer::exit))
        // confirmations
        .route(
            "/confirmation",
            get(routes_timer::get_confirmation).post(routes_timer::resolve_confirmation),
        );

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(handle)
}
