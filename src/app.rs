// --------------------------------------------------
// The application store.
//
// Responsibilities:
// - Own the in-memory aggregate (collections, settings, timer)
// - Expose one entry point per user action
// - Reconcile reminders and save after every collection change
// - Gate destructive actions behind a confirmation prompt
// --------------------------------------------------

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::confirm::{Action, PendingAction};
use crate::models::{
    AppData, AppSnapshot, Birthday, DailyTask, GeneralTask, Settings, Subtask, parse_month_day,
};
use crate::notify::{
    NotificationContent, NotificationRequest, NotificationScheduler, PermissionStatus,
};
use crate::reminders::{self, parse_hhmm};
use crate::store::{Persistence, SCHEMA_VERSION};
use crate::ticker::{TickControl, Ticker};
use crate::timer::{Resumed, TickOutcome, TimerEngine, TimerStatus};

pub const PERMISSION_WARNING: &str =
    "Please enable notification permissions in your device settings to receive reminders.";
pub const SESSION_COMPLETE: &str = "Focus session complete! Great job!";

// Local -> FixedOffset (current system offset)
pub fn now_fixed_offset() -> DateTime<FixedOffset> {
    chrono::Local::now().fixed_offset()
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppEvent {
    LockoutEngaged,
    LockoutDisengaged,
    SessionComplete,
    DataChanged,
}

/// Fields of a general task the user edits as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub color: Option<String>,
    pub important: bool,
    pub due_date: Option<DateTime<FixedOffset>>,
    pub subtasks: Vec<String>,
}

/// Everything a presentation layer renders.
#[derive(Debug, Clone, Serialize)]
pub struct AppView {
    pub daily_tasks: Vec<DailyTask>,
    /// Daily tasks not yet done on the local day.
    pub due_today: Vec<Uuid>,
    pub birthdays: Vec<Birthday>,
    pub tasks: Vec<GeneralTask>,
    pub settings: Settings,
    pub timer: TimerStatus,
    pub pending: PendingAction,
    pub permission: PermissionStatus,
}

pub struct App {
    data: AppData,
    timer: TimerEngine,
    prompts: VecDeque<PendingAction>,
    persistence: Persistence,
    notifier: Arc<dyn NotificationScheduler>,
    permission: PermissionStatus,
    events: broadcast::Sender<AppEvent>,
}

impl App {
    /// Loads persisted state (or starts empty), resumes the timer, asks for
    /// notification permission and brings scheduled reminders in line.
    pub fn open(
        mut persistence: Persistence,
        notifier: Arc<dyn NotificationScheduler>,
        now: DateTime<FixedOffset>,
    ) -> Self {
        let (data, timer) = match persistence.load() {
            Some(snapshot) => {
                let (data, state) = snapshot.into_parts();
                let (timer, resumed) = TimerEngine::resume(&state, now.with_timezone(&Utc));
                match resumed {
                    Resumed::Running => info!(
                        remaining = timer.remaining(),
                        "focus session resumed"
                    ),
                    Resumed::ElapsedWhileClosed => {
                        info!("focus session ended while the app was closed")
                    }
                    Resumed::Stopped => {}
                }
                (data, timer)
            }
            None => (AppData::default(), TimerEngine::default()),
        };

        let permission = notifier.request_permission();
        let (events, _) = broadcast::channel(64);
        let mut app = Self {
            data,
            timer,
            prompts: VecDeque::new(),
            persistence,
            notifier,
            permission,
            events,
        };

        if permission == PermissionStatus::Denied {
            warn!("notification permission denied; reminders are disabled");
            app.ask(PendingAction::notice(PERMISSION_WARNING));
        }
        app.roll_over(now.date_naive());
        app.collections_changed(now);
        app
    }

    pub fn data(&self) -> &AppData {
        &self.data
    }

    pub fn timer(&self) -> &TimerEngine {
        &self.timer
    }

    pub fn permission(&self) -> PermissionStatus {
        self.permission
    }

    pub fn lockout(&self) -> bool {
        self.timer.lockout()
    }

    pub fn pending(&self) -> PendingAction {
        self.prompts.front().cloned().unwrap_or_default()
    }

    pub fn notifier(&self) -> &dyn NotificationScheduler {
        self.notifier.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.events.subscribe()
    }

    pub fn view(&self, today: NaiveDate) -> AppView {
        AppView {
            daily_tasks: self.data.daily_tasks.clone(),
            due_today: self
                .data
                .daily_tasks
                .iter()
                .filter(|t| t.is_due(today))
                .map(|t| t.id)
                .collect(),
            birthdays: self.data.birthdays.clone(),
            tasks: self.data.tasks.clone(),
            settings: self.data.settings.clone(),
            timer: self.timer.status(),
            pending: self.pending(),
            permission: self.permission,
        }
    }

    pub fn snapshot(&self, now: DateTime<FixedOffset>) -> AppSnapshot {
        let now = now.with_timezone(&Utc);
        AppSnapshot {
            version: SCHEMA_VERSION,
            timestamp: now,
            daily_tasks: self.data.daily_tasks.clone(),
            birthdays: self.data.birthdays.clone(),
            tasks: self.data.tasks.clone(),
            timer_state: self.timer.to_state(now),
            settings: self.data.settings.clone(),
        }
    }

    fn save(&self, now: DateTime<FixedOffset>) {
        self.persistence.save(&self.snapshot(now));
    }

    fn emit(&self, event: AppEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn ask(&mut self, prompt: PendingAction) {
        if !self.prompts.contains(&prompt) {
            self.prompts.push_back(prompt);
        }
    }

    fn collections_changed(&mut self, now: DateTime<FixedOffset>) {
        reminders::reconcile(self.notifier.as_ref(), &mut self.data, now);
        if let Some(greeting) = reminders::announce_birthdays(
            self.notifier.as_ref(),
            &self.persistence,
            &self.data.birthdays,
            now.date_naive(),
        ) {
            self.ask(PendingAction::notice(greeting));
        }
        self.save(now);
        self.emit(AppEvent::DataChanged);
    }

    fn cancel_notification(&self, id: Option<&str>) {
        if let Some(id) = id {
            if let Err(e) = self.notifier.cancel(id) {
                warn!(identifier = id, error = %e, "failed to cancel notification");
            }
        }
    }

    /// Recomputes each daily task's `completed` flag for the local day.
    /// Returns whether anything changed.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        let mut changed = false;
        for t in &mut self.data.daily_tasks {
            let before = t.completed;
            t.roll_over(today);
            changed |= before != t.completed;
        }
        changed
    }

    /// Rolls the daily tasks over to the day of `now` and saves when that
    /// changed anything.
    pub fn refresh_day(&mut self, now: DateTime<FixedOffset>) -> bool {
        let changed = self.roll_over(now.date_naive());
        if changed {
            self.save(now);
        }
        changed
    }

    // -----------------------------
    // Daily tasks
    // -----------------------------

    pub fn add_daily_task(
        &mut self,
        name: &str,
        time: Option<&str>,
        now: DateTime<FixedOffset>,
    ) -> Option<DailyTask> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let time = time.map(str::trim).filter(|t| !t.is_empty()).and_then(|t| {
            let parsed = parse_hhmm(t);
            if parsed.is_none() {
                warn!(time = t, "ignoring malformed reminder time");
            }
            parsed.map(|(h, m)| format!("{h:02}:{m:02}"))
        });

        self.data.daily_tasks.push(DailyTask {
            id: Uuid::new_v4(),
            name: name.to_string(),
            last_completed_date: None,
            time,
            completed: false,
            notification_id: None,
        });
        self.collections_changed(now);
        self.data.daily_tasks.last().cloned()
    }

    pub fn mark_daily_complete(
        &mut self,
        id: Uuid,
        now: DateTime<FixedOffset>,
    ) -> Option<DailyTask> {
        let today = now.date_naive();
        let t = self.data.daily_tasks.iter_mut().find(|t| t.id == id)?;
        t.last_completed_date = Some(today);
        t.completed = true;
        self.collections_changed(now);
        self.daily_task(id)
    }

    pub fn unmark_daily_complete(
        &mut self,
        id: Uuid,
        now: DateTime<FixedOffset>,
    ) -> Option<DailyTask> {
        let t = self.data.daily_tasks.iter_mut().find(|t| t.id == id)?;
        t.last_completed_date = None;
        t.completed = false;
        self.collections_changed(now);
        self.daily_task(id)
    }

    pub fn request_delete_daily_task(&mut self, id: Uuid) -> bool {
        if self.daily_task(id).is_none() {
            return false;
        }
        self.ask(PendingAction::confirm(
            "Are you sure you want to delete this daily task?",
            Action::DeleteDailyTask(id),
        ));
        true
    }

    fn daily_task(&self, id: Uuid) -> Option<DailyTask> {
        self.data.daily_tasks.iter().find(|t| t.id == id).cloned()
    }

    fn delete_daily_task(&mut self, id: Uuid, now: DateTime<FixedOffset>) {
        let Some(pos) = self.data.daily_tasks.iter().position(|t| t.id == id) else {
            return;
        };
        let removed = self.data.daily_tasks.remove(pos);
        self.cancel_notification(removed.notification_id.as_deref());
        self.collections_changed(now);
    }

    // -----------------------------
    // General tasks
    // -----------------------------

    pub fn add_task(
        &mut self,
        draft: TaskDraft,
        now: DateTime<FixedOffset>,
    ) -> Option<GeneralTask> {
        let title = draft.title.trim();
        if title.is_empty() {
            return None;
        }
        let subtasks = draft
            .subtasks
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|text| Subtask {
                text: text.to_string(),
                completed: false,
            })
            .collect();

        let id = Uuid::new_v4();
        self.data.tasks.push(GeneralTask {
            id,
            title: title.to_string(),
            description: draft.description,
            subtasks,
            color: draft.color,
            important: draft.important,
            due_date: draft.due_date,
            completed: false,
            completed_at: None,
            notification_id: None,
        });
        self.collections_changed(now);
        self.task(id)
    }

    pub fn update_task(
        &mut self,
        id: Uuid,
        draft: TaskDraft,
        now: DateTime<FixedOffset>,
    ) -> Option<GeneralTask> {
        let title = draft.title.trim().to_string();
        if title.is_empty() {
            return self.task(id);
        }
        let t = self.data.tasks.iter_mut().find(|t| t.id == id)?;

        let stale = if t.due_date != draft.due_date {
            t.notification_id.take()
        } else {
            None
        };
        t.title = title;
        t.description = draft.description;
        t.color = draft.color;
        t.important = draft.important;
        t.due_date = draft.due_date;

        self.cancel_notification(stale.as_deref());
        self.collections_changed(now);
        self.task(id)
    }

    pub fn toggle_task(&mut self, id: Uuid, now: DateTime<FixedOffset>) -> Option<GeneralTask> {
        let t = self.data.tasks.iter_mut().find(|t| t.id == id)?;
        let completed = !t.completed;
        t.set_completed(completed, now);
        self.collections_changed(now);
        self.task(id)
    }

    pub fn add_subtask(
        &mut self,
        id: Uuid,
        text: &str,
        now: DateTime<FixedOffset>,
    ) -> Option<GeneralTask> {
        let t = self.data.tasks.iter_mut().find(|t| t.id == id)?;
        let text = text.trim();
        if text.is_empty() {
            return self.task(id);
        }
        t.subtasks.push(Subtask {
            text: text.to_string(),
            completed: false,
        });
        self.collections_changed(now);
        self.task(id)
    }

    pub fn toggle_subtask(
        &mut self,
        id: Uuid,
        index: usize,
        now: DateTime<FixedOffset>,
    ) -> Option<GeneralTask> {
        let t = self.data.tasks.iter_mut().find(|t| t.id == id)?;
        let s = t.subtasks.get_mut(index)?;
        s.completed = !s.completed;
        self.collections_changed(now);
        self.task(id)
    }

    pub fn remove_subtask(
        &mut self,
        id: Uuid,
        index: usize,
        now: DateTime<FixedOffset>,
    ) -> Option<GeneralTask> {
        let t = self.data.tasks.iter_mut().find(|t| t.id == id)?;
        if index >= t.subtasks.len() {
            return None;
        }
        t.subtasks.remove(index);
        self.collections_changed(now);
        self.task(id)
    }

    pub fn request_delete_task(&mut self, id: Uuid) -> bool {
        if self.task(id).is_none() {
            return false;
        }
        self.ask(PendingAction::confirm(
            "Are you sure you want to delete this task?",
            Action::DeleteTask(id),
        ));
        true
    }

    fn task(&self, id: Uuid) -> Option<GeneralTask> {
        self.data.tasks.iter().find(|t| t.id == id).cloned()
    }

    fn delete_task(&mut self, id: Uuid, now: DateTime<FixedOffset>) {
        let Some(pos) = self.data.tasks.iter().position(|t| t.id == id) else {
            return;
        };
        let removed = self.data.tasks.remove(pos);
        self.cancel_notification(removed.notification_id.as_deref());
        self.collections_changed(now);
    }

    // -----------------------------
    // Birthdays
    // -----------------------------

    /// `date` is "MM-DD" or a picker's "YYYY-MM-DD"; the year is dropped.
    pub fn add_birthday(
        &mut self,
        name: &str,
        date: &str,
        now: DateTime<FixedOffset>,
    ) -> Option<Birthday> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let date = date.trim();
        let month_day = match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
            Ok(d) => d.format("%m-%d").to_string(),
            Err(_) => date.to_string(),
        };
        parse_month_day(&month_day)?;

        let birthday = Birthday {
            id: Uuid::new_v4(),
            name: name.to_string(),
            date: month_day,
        };
        self.data.birthdays.push(birthday.clone());
        self.collections_changed(now);
        Some(birthday)
    }

    pub fn request_delete_birthday(&mut self, id: Uuid) -> bool {
        if !self.data.birthdays.iter().any(|b| b.id == id) {
            return false;
        }
        self.ask(PendingAction::confirm(
            "Are you sure you want to delete this birthday?",
            Action::DeleteBirthday(id),
        ));
        true
    }

    fn delete_birthday(&mut self, id: Uuid, now: DateTime<FixedOffset>) {
        let before = self.data.birthdays.len();
        self.data.birthdays.retain(|b| b.id != id);
        if self.data.birthdays.len() != before {
            self.cancel_notification(Some(&reminders::birthday_identifier(id)));
            self.collections_changed(now);
        }
    }

    // -----------------------------
    // Settings and reset
    // -----------------------------

    pub fn update_settings(&mut self, settings: Settings, now: DateTime<FixedOffset>) -> Settings {
        self.data.settings = settings;
        self.save(now);
        self.data.settings.clone()
    }

    pub fn request_reset_all(&mut self) {
        self.ask(PendingAction::confirm(
            "This will delete all tasks, birthdays and settings. Continue?",
            Action::ResetAllData,
        ));
    }

    fn reset_all(&mut self, now: DateTime<FixedOffset>) {
        let was_running = self.timer.is_running();
        self.data = AppData::default();
        self.timer.restore_default();
        if let Err(e) = self.notifier.cancel_all() {
            warn!(error = %e, "failed to cancel scheduled notifications");
        }
        if was_running {
            self.emit(AppEvent::LockoutDisengaged);
        }
        info!("all data reset");
        self.collections_changed(now);
    }

    // -----------------------------
    // Focus timer
    // -----------------------------

    pub fn set_timer_duration(&mut self, minutes: &str, now: DateTime<FixedOffset>) -> bool {
        let changed = self.timer.set_duration(minutes);
        if changed {
            self.save(now);
        }
        changed
    }

    pub fn start_timer(&mut self, now: DateTime<FixedOffset>) -> Option<u64> {
        let run = self.timer.start(now.with_timezone(&Utc))?;
        info!(run, remaining = self.timer.remaining(), "focus session started");
        self.emit(AppEvent::LockoutEngaged);
        self.save(now);
        Some(run)
    }

    pub fn pause_timer(&mut self, now: DateTime<FixedOffset>) -> bool {
        if !self.timer.pause() {
            return false;
        }
        info!(remaining = self.timer.remaining(), "focus session paused");
        self.emit(AppEvent::LockoutDisengaged);
        self.save(now);
        true
    }

    pub fn request_timer_reset(&mut self) {
        self.ask(PendingAction::confirm(
            "Are you sure you want to reset the timer?",
            Action::ResetTimer,
        ));
    }

    /// Leaving the focus screen is free unless a session is running, in
    /// which case the user has to confirm ending it. Returns whether a
    /// confirmation was raised.
    pub fn request_exit(&mut self) -> bool {
        if !self.timer.lockout() {
            return false;
        }
        self.ask(PendingAction::confirm(
            "A focus session is running. End it and leave?",
            Action::EndFocusSession,
        ));
        true
    }

    fn reset_timer(&mut self, now: DateTime<FixedOffset>) {
        let was_running = self.timer.is_running();
        self.timer.reset();
        if was_running {
            self.emit(AppEvent::LockoutDisengaged);
        }
        self.save(now);
    }

    /// Feeds one tick from the ticker bound to `run`.
    pub fn on_tick(&mut self, run: u64, now: DateTime<FixedOffset>) -> TickControl {
        match self.timer.tick(run) {
            TickOutcome::Stale => TickControl::Stop,
            TickOutcome::Running { .. } => TickControl::Continue,
            TickOutcome::Expired => {
                info!(run, "focus session complete");
                let request = NotificationRequest::immediate(NotificationContent::new(
                    "QuestUp Focus Timer",
                    "Your focus session is complete! Great job!",
                ));
                if let Err(e) = self.notifier.schedule(request) {
                    warn!(error = %e, "failed to deliver completion notification");
                }
                self.ask(PendingAction::notice(SESSION_COMPLETE));
                self.emit(AppEvent::LockoutDisengaged);
                self.emit(AppEvent::SessionComplete);
                self.save(now);
                TickControl::Stop
            }
        }
    }

    // -----------------------------
    // Confirmation
    // -----------------------------

    /// Answers the oldest open prompt. Cancelling never changes state.
    pub fn resolve(&mut self, confirmed: bool, now: DateTime<FixedOffset>) -> Option<Action> {
        let action = self.prompts.pop_front()?.resolve(confirmed)?;
        match action {
            Action::Dismiss => {}
            Action::DeleteDailyTask(id) => self.delete_daily_task(id, now),
            Action::DeleteTask(id) => self.delete_task(id, now),
            Action::DeleteBirthday(id) => self.delete_birthday(id, now),
            Action::ResetTimer | Action::EndFocusSession => self.reset_timer(now),
            Action::ResetAllData => self.reset_all(now),
        }
        Some(action)
    }
}

/// Shared, cloneable access to the `App` plus the ticker that drives it.
///
/// Every mutation goes through `with`, which afterwards makes the ticker
/// match the timer: one loop while running, none otherwise.
#[derive(Clone)]
pub struct AppHandle {
    app: Arc<Mutex<App>>,
    ticker: Arc<Mutex<Ticker>>,
}

impl AppHandle {
    /// Must be called inside a tokio runtime: a resumed session starts
    /// ticking right away.
    pub fn new(app: App) -> Self {
        let handle = Self {
            app: Arc::new(Mutex::new(app)),
            ticker: Arc::new(Mutex::new(Ticker::new())),
        };
        handle.with(|_| ());
        handle
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut App) -> R) -> R {
        let mut app = self.app.lock();
        let out = f(&mut app);
        self.sync_ticker(&app);
        out
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.app.lock().subscribe()
    }

    pub fn ticker_active(&self) -> bool {
        self.ticker.lock().is_active()
    }

    fn tick(&self, run: u64) -> TickControl {
        self.app.lock().on_tick(run, now_fixed_offset())
    }

    fn sync_ticker(&self, app: &App) {
        let handle = self.clone();
        self.ticker
            .lock()
            .sync(app.timer().active_run(), move |run| {
                move || std::future::ready(handle.tick(run))
            });
    }
}
