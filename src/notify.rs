//! Notification scheduling contract.
//!
//! The host's notification service accepts content plus a trigger and
//! hands back an identifier that can later be cancelled. `LocalNotifier`
//! is the in-process stand-in used by the server binary and by tests.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Local};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::NotifyError;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Fire now.
    Immediate,
    /// Every day at hour:minute local time.
    Daily { hour: u32, minute: u32 },
    /// Every year on month/day (1-based) at hour:minute local time.
    Yearly {
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
    },
    /// Once, at an absolute instant.
    At { at: DateTime<FixedOffset> },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub sound: Option<String>,
}

impl NotificationContent {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            sound: Some("default".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NotificationRequest {
    pub identifier: Option<String>,
    pub content: NotificationContent,
    pub trigger: Trigger,
}

impl NotificationRequest {
    pub fn immediate(content: NotificationContent) -> Self {
        Self {
            identifier: None,
            content,
            trigger: Trigger::Immediate,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
}

pub trait NotificationScheduler: Send + Sync {
    fn request_permission(&self) -> PermissionStatus;

    /// Schedules the request, replacing any pending request with the same
    /// identifier. Returns the identifier to cancel it with.
    fn schedule(&self, request: NotificationRequest) -> Result<String, NotifyError>;

    /// Cancelling an identifier that is not pending is not an error.
    fn cancel(&self, identifier: &str) -> Result<(), NotifyError>;

    fn cancel_all(&self) -> Result<(), NotifyError>;

    /// Requests that have not fired yet (repeating ones stay pending).
    fn pending(&self) -> Vec<NotificationRequest>;
}

#[derive(Debug)]
pub struct LocalNotifier {
    granted: bool,
    pending: Mutex<BTreeMap<String, NotificationRequest>>,
    delivered: Mutex<Vec<NotificationContent>>,
}

impl LocalNotifier {
    pub fn new(granted: bool) -> Self {
        Self {
            granted,
            pending: Mutex::new(BTreeMap::new()),
            delivered: Mutex::new(Vec::new()),
        }
    }

    /// Immediate notifications shown so far, oldest first.
    pub fn delivered(&self) -> Vec<NotificationContent> {
        self.delivered.lock().clone()
    }
}

impl NotificationScheduler for LocalNotifier {
    fn request_permission(&self) -> PermissionStatus {
        if self.granted {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        }
    }

    fn schedule(&self, request: NotificationRequest) -> Result<String, NotifyError> {
        if !self.granted {
            return Err(NotifyError::PermissionDenied);
        }

        let identifier = request
            .identifier
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        match &request.trigger {
            Trigger::Immediate => {
                info!(
                    title = %request.content.title,
                    body = %request.content.body,
                    "notification delivered"
                );
                self.delivered.lock().push(request.content);
                return Ok(identifier);
            }
            Trigger::At { at } if *at <= Local::now().fixed_offset() => {
                return Err(NotifyError::TriggerInPast(at.to_rfc3339()));
            }
            _ => {}
        }

        debug!(identifier = %identifier, trigger = ?request.trigger, "notification scheduled");
        let mut stored = request;
        stored.identifier = Some(identifier.clone());
        self.pending.lock().insert(identifier.clone(), stored);
        Ok(identifier)
    }

    fn cancel(&self, identifier: &str) -> Result<(), NotifyError> {
        self.pending.lock().remove(identifier);
        Ok(())
    }

    fn cancel_all(&self) -> Result<(), NotifyError> {
        self.pending.lock().clear();
        Ok(())
    }

    fn pending(&self) -> Vec<NotificationRequest> {
        self.pending.lock().values().cloned().collect()
    }
}
