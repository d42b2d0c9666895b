use std::mem;

use serde::Serialize;
use uuid::Uuid;

/// What happens when the user answers the pending prompt.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Action {
    Dismiss,
    DeleteDailyTask(Uuid),
    DeleteTask(Uuid),
    DeleteBirthday(Uuid),
    ResetTimer,
    ResetAllData,
    EndFocusSession,
}

/// A prompt waiting for the user. Answering it is the only way out.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingAction {
    #[default]
    None,
    Confirm {
        message: String,
        on_confirm: Action,
        on_cancel: Action,
    },
}

impl PendingAction {
    pub fn confirm(message: impl Into<String>, on_confirm: Action) -> Self {
        PendingAction::Confirm {
            message: message.into(),
            on_confirm,
            on_cancel: Action::Dismiss,
        }
    }

    /// An acknowledgement: both answers just close it.
    pub fn notice(message: impl Into<String>) -> Self {
        Self::confirm(message, Action::Dismiss)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, PendingAction::Confirm { .. })
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            PendingAction::None => None,
            PendingAction::Confirm { message, .. } => Some(message),
        }
    }

    /// Closes the prompt and hands back the action chosen by the answer.
    pub fn resolve(&mut self, confirmed: bool) -> Option<Action> {
        match mem::take(self) {
            PendingAction::None => None,
            PendingAction::Confirm {
                on_confirm,
                on_cancel,
                ..
            } => Some(if confirmed { on_confirm } else { on_cancel }),
        }
    }
}
