use std::io;

/// Failures inside the crate. All of them are recovered where they happen;
/// this type exists so the recovery sites can log one thing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot schema {found:?} does not match {expected}")]
    SchemaMismatch { found: Option<u32>, expected: u32 },
}

/// Failures reported by the notification scheduler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("notification permission denied")]
    PermissionDenied,

    #[error("trigger is in the past: {0}")]
    TriggerInPast(String),
}

pub type Result<T> = std::result::Result<T, Error>;
