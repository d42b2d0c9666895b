use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Focus session length used on first run and after a full reset (25:00).
pub const DEFAULT_TIMER_SECS: u32 = 25 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyTask {
    pub id: Uuid,
    pub name: String,
    pub last_completed_date: Option<NaiveDate>,
    pub time: Option<String>, // "HH:MM"
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub notification_id: Option<String>,
}

impl DailyTask {
    /// A daily task is due on every local calendar day it has not been done yet.
    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.last_completed_date != Some(today)
    }

    pub fn roll_over(&mut self, today: NaiveDate) {
        self.completed = self.last_completed_date == Some(today);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subtask {
    pub text: String,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GeneralTask {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub color: Option<String>, // "#RRGGBB"
    #[serde(default)]
    pub important: bool,
    pub due_date: Option<DateTime<FixedOffset>>,
    pub completed: bool,
    pub completed_at: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub notification_id: Option<String>,
}

impl GeneralTask {
    // completed_at is Some exactly when completed is true
    pub fn set_completed(&mut self, completed: bool, now: DateTime<FixedOffset>) {
        self.completed = completed;
        self.completed_at = completed.then_some(now);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Birthday {
    pub id: Uuid,
    pub name: String,
    pub date: String, // "MM-DD"
}

impl Birthday {
    pub fn month_day(&self) -> Option<(u32, u32)> {
        parse_month_day(&self.date)
    }
}

/// Parse "MM-DD" into (month, day). 02-29 is accepted.
pub fn parse_month_day(s: &str) -> Option<(u32, u32)> {
    let (m, d) = s.trim().split_once('-')?;
    if m.len() != 2 || d.len() != 2 {
        return None;
    }
    let month: u32 = m.parse().ok()?;
    let day: u32 = d.parse().ok()?;
    // 2000 is a leap year, so every real month-day validates
    NaiveDate::from_ymd_opt(2000, month, day)?;
    Some((month, day))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub duration_seconds: u32,
    pub remaining_seconds: u32,
    pub is_running: bool,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub start_timestamp: Option<DateTime<Utc>>,
}

impl Default for TimerState {
    fn default() -> Self {
        Self {
            duration_seconds: DEFAULT_TIMER_SECS,
            remaining_seconds: DEFAULT_TIMER_SECS,
            is_running: false,
            start_timestamp: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub theme_mode: ThemeMode,
    pub selected_theme_name: String,
    pub user_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme_mode: ThemeMode::Light,
            selected_theme_name: "default".to_string(),
            user_name: String::new(),
        }
    }
}

/// Everything the user owns except the timer, which lives in its own engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppData {
    pub daily_tasks: Vec<DailyTask>,
    pub birthdays: Vec<Birthday>,
    pub tasks: Vec<GeneralTask>,
    pub settings: Settings,
}

/// The persisted unit. Always written whole.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppSnapshot {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub daily_tasks: Vec<DailyTask>,
    #[serde(default)]
    pub birthdays: Vec<Birthday>,
    #[serde(default)]
    pub tasks: Vec<GeneralTask>,
    #[serde(default)]
    pub timer_state: TimerState,
    #[serde(flatten)]
    pub settings: Settings,
}

impl AppSnapshot {
    pub fn into_parts(self) -> (AppData, TimerState) {
        let data = AppData {
            daily_tasks: self.daily_tasks,
            birthdays: self.birthdays,
            tasks: self.tasks,
            settings: self.settings,
        };
        (data, self.timer_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_day_accepts_leap_day_and_rejects_garbage() {
        assert_eq!(parse_month_day("02-29"), Some((2, 29)));
        assert_eq!(parse_month_day("12-31"), Some((12, 31)));
        assert_eq!(parse_month_day("13-01"), None);
        assert_eq!(parse_month_day("04-31"), None);
        assert_eq!(parse_month_day("4-1"), None);
        assert_eq!(parse_month_day(""), None);
    }

    #[test]
    fn completed_at_follows_completed() {
        let now = DateTime::parse_from_rfc3339("2026-03-01T10:00:00+09:00").unwrap();
        let mut t = GeneralTask {
            id: Uuid::new_v4(),
            title: "read".into(),
            description: String::new(),
            subtasks: vec![],
            color: None,
            important: false,
            due_date: None,
            completed: false,
            completed_at: None,
            notification_id: None,
        };
        t.set_completed(true, now);
        assert_eq!(t.completed_at, Some(now));
        t.set_completed(false, now);
        assert!(t.completed_at.is_none());
    }

    #[test]
    fn daily_task_rolls_over_at_local_midnight() {
        let today = NaiveDate::from_ymd_opt(2026, 5, 2).unwrap();
        let yesterday = today.pred_opt().unwrap();
        let mut t = DailyTask {
            id: Uuid::new_v4(),
            name: "stretch".into(),
            last_completed_date: Some(yesterday),
            time: None,
            completed: true,
            notification_id: None,
        };
        assert!(t.is_due(today));
        t.roll_over(today);
        assert!(!t.completed);
    }

    #[test]
    fn snapshot_uses_flat_camel_case_keys() {
        let snap = AppSnapshot {
            version: 1,
            timestamp: Utc::now(),
            daily_tasks: vec![],
            birthdays: vec![],
            tasks: vec![],
            timer_state: TimerState::default(),
            settings: Settings::default(),
        };
        let v = serde_json::to_value(&snap).unwrap();
        for key in [
            "dailyTasks",
            "birthdays",
            "tasks",
            "timerState",
            "themeMode",
            "selectedThemeName",
            "userName",
            "version",
            "timestamp",
        ] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
        assert_eq!(v["timerState"]["durationSeconds"], 1500);
        assert!(v["timerState"]["startTimestamp"].is_null());
    }
}
