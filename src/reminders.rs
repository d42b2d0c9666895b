/*
Reminder derivation and reconciliation.
Module is independent from HTTP and from the App store so that the
derive -> cancel -> reschedule sequence can be tested as plain calls.
*/

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{AppData, Birthday, DailyTask, GeneralTask};
use crate::notify::{NotificationContent, NotificationRequest, NotificationScheduler, Trigger};
use crate::store::Persistence;

/// Which record a derived request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Daily(Uuid),
    Task(Uuid),
    Birthday(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derived {
    pub owner: Owner,
    pub request: NotificationRequest,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub scheduled: usize,
    pub failed: usize,
}

pub fn daily_identifier(id: Uuid) -> String {
    format!("daily-task-{id}")
}

pub fn task_identifier(id: Uuid) -> String {
    format!("general-task-{id}")
}

pub fn birthday_identifier(id: Uuid) -> String {
    format!("birthday-{id}")
}

// Parse "HH:MM" (hour may be one digit) into (hour, minute).
pub fn parse_hhmm(hhmm: &str) -> Option<(u32, u32)> {
    let parts: Vec<&str> = hhmm.trim().split(':').collect();
    if parts.len() != 2 || parts[1].len() != 2 || parts[0].is_empty() || parts[0].len() > 2 {
        return None;
    }
    let h: u32 = parts[0].parse().ok()?;
    let m: u32 = parts[1].parse().ok()?;
    (h < 24 && m < 60).then_some((h, m))
}

// Feb 29 is observed on Feb 28 in common years.
fn month_day_in_year(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).or_else(|| {
        (month == 2 && day == 29)
            .then(|| NaiveDate::from_ymd_opt(year, 2, 28))
            .flatten()
    })
}

fn at_local(
    date: NaiveDate,
    hour: u32,
    minute: u32,
    offset: FixedOffset,
) -> Option<DateTime<FixedOffset>> {
    let naive = date.and_hms_opt(hour, minute, 0)?;
    offset.from_local_datetime(&naive).single()
}

/// When a trigger would next fire, seen from `now`.
pub fn next_fire(trigger: &Trigger, now: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
    let offset = *now.offset();
    match *trigger {
        Trigger::Immediate => Some(now),
        Trigger::Daily { hour, minute } => {
            let today = at_local(now.date_naive(), hour, minute, offset)?;
            if today <= now {
                Some(today + Duration::days(1))
            } else {
                Some(today)
            }
        }
        Trigger::Yearly {
            month,
            day,
            hour,
            minute,
        } => {
            // once this year's moment has passed, the next one is next year
            let this_year = month_day_in_year(now.year(), month, day)?;
            let at = at_local(this_year, hour, minute, offset)?;
            if at < now {
                let next = month_day_in_year(now.year() + 1, month, day)?;
                at_local(next, hour, minute, offset)
            } else {
                Some(at)
            }
        }
        Trigger::At { at } => (at > now).then_some(at),
    }
}

pub fn daily_request(task: &DailyTask) -> Option<NotificationRequest> {
    let (hour, minute) = parse_hhmm(task.time.as_deref()?)?;
    Some(NotificationRequest {
        identifier: Some(daily_identifier(task.id)),
        content: NotificationContent::new(
            "QuestUp Daily Reminder",
            format!("It's time to do your daily task: \"{}\"", task.name),
        ),
        trigger: Trigger::Daily { hour, minute },
    })
}

/// Only open tasks with a due date still ahead of `now` get a reminder.
pub fn task_request(task: &GeneralTask, now: DateTime<FixedOffset>) -> Option<NotificationRequest> {
    if task.completed {
        return None;
    }
    let due = task.due_date.filter(|due| *due > now)?;
    Some(NotificationRequest {
        identifier: Some(task_identifier(task.id)),
        content: NotificationContent::new(
            "QuestUp Task Reminder",
            format!("It's time to do your task: \"{}\"", task.title),
        ),
        trigger: Trigger::At { at: due },
    })
}

pub fn birthday_request(birthday: &Birthday) -> Option<NotificationRequest> {
    let (month, day) = birthday.month_day()?;
    Some(NotificationRequest {
        identifier: Some(birthday_identifier(birthday.id)),
        content: NotificationContent::new(
            "QuestUp Birthday Reminder",
            format!("Happy Birthday to {}!", birthday.name),
        ),
        trigger: Trigger::Yearly {
            month,
            day,
            hour: 0,
            minute: 0,
        },
    })
}

/// The full set of requests that should exist for the given collections.
pub fn derive(data: &AppData, now: DateTime<FixedOffset>) -> Vec<Derived> {
    let daily = data.daily_tasks.iter().filter_map(|t| {
        daily_request(t).map(|request| Derived {
            owner: Owner::Daily(t.id),
            request,
        })
    });
    let tasks = data.tasks.iter().filter_map(|t| {
        task_request(t, now).map(|request| Derived {
            owner: Owner::Task(t.id),
            request,
        })
    });
    let birthdays = data.birthdays.iter().filter_map(|b| {
        birthday_request(b).map(|request| Derived {
            owner: Owner::Birthday(b.id),
            request,
        })
    });
    daily.chain(tasks).chain(birthdays).collect()
}

/// Cancel everything, then schedule the derived set again and record the
/// identifiers on the owning records. A failed request leaves its owner
/// without an identifier and is otherwise ignored.
pub fn reconcile(
    scheduler: &dyn NotificationScheduler,
    data: &mut AppData,
    now: DateTime<FixedOffset>,
) -> ReconcileReport {
    if let Err(e) = scheduler.cancel_all() {
        warn!(error = %e, "failed to cancel scheduled notifications");
    }
    for t in &mut data.daily_tasks {
        t.notification_id = None;
    }
    for t in &mut data.tasks {
        t.notification_id = None;
    }

    let mut report = ReconcileReport::default();
    for Derived { owner, request } in derive(data, now) {
        match scheduler.schedule(request) {
            Ok(id) => {
                report.scheduled += 1;
                match owner {
                    Owner::Daily(oid) => {
                        if let Some(t) = data.daily_tasks.iter_mut().find(|t| t.id == oid) {
                            t.notification_id = Some(id);
                        }
                    }
                    Owner::Task(oid) => {
                        if let Some(t) = data.tasks.iter_mut().find(|t| t.id == oid) {
                            t.notification_id = Some(id);
                        }
                    }
                    Owner::Birthday(_) => {}
                }
            }
            Err(e) => {
                report.failed += 1;
                warn!(?owner, error = %e, "failed to schedule notification");
            }
        }
    }

    info!(
        scheduled = report.scheduled,
        failed = report.failed,
        "notifications reconciled"
    );
    report
}

pub fn birthday_marker_key(today: NaiveDate) -> String {
    format!("questup_birthday_notified_{}", today.format("%Y-%m-%d"))
}

pub fn birthdays_on(birthdays: &[Birthday], today: NaiveDate) -> Vec<&Birthday> {
    birthdays
        .iter()
        .filter(|b| {
            b.month_day()
                .and_then(|(m, d)| month_day_in_year(today.year(), m, d))
                == Some(today)
        })
        .collect()
}

/// Fires the "birthday today" notification at most once per calendar day.
/// Returns the greeting when it fired, for the caller to acknowledge.
pub fn announce_birthdays(
    scheduler: &dyn NotificationScheduler,
    persistence: &Persistence,
    birthdays: &[Birthday],
    today: NaiveDate,
) -> Option<String> {
    let key = birthday_marker_key(today);
    if persistence.flag(&key) {
        return None;
    }
    let todays = birthdays_on(birthdays, today);
    if todays.is_empty() {
        return None;
    }

    let names: Vec<&str> = todays.iter().map(|b| b.name.as_str()).collect();
    let greeting = format!("Happy Birthday to: {}!", names.join(", "));
    persistence.set_flag(&key);

    let request = NotificationRequest::immediate(NotificationContent::new(
        "QuestUp Birthday Reminder",
        greeting.clone(),
    ));
    if let Err(e) = scheduler.schedule(request) {
        warn!(error = %e, "failed to deliver birthday notification");
    }
    Some(greeting)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LocalNotifier;
    use crate::store::MemoryKv;
    use std::sync::Arc;

    fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn daily(name: &str, time: Option<&str>) -> DailyTask {
        DailyTask {
            id: Uuid::new_v4(),
            name: name.into(),
            last_completed_date: None,
            time: time.map(str::to_string),
            completed: false,
            notification_id: None,
        }
    }

    fn task(title: &str, due: Option<DateTime<FixedOffset>>) -> GeneralTask {
        GeneralTask {
            id: Uuid::new_v4(),
            title: title.into(),
            description: String::new(),
            subtasks: vec![],
            color: None,
            important: false,
            due_date: due,
            completed: false,
            completed_at: None,
            notification_id: None,
        }
    }

    fn birthday(name: &str, date: &str) -> Birthday {
        Birthday {
            id: Uuid::new_v4(),
            name: name.into(),
            date: date.into(),
        }
    }

    #[test]
    fn hhmm_parsing() {
        assert_eq!(parse_hhmm("09:30"), Some((9, 30)));
        assert_eq!(parse_hhmm("9:05"), Some((9, 5)));
        assert_eq!(parse_hhmm("23:59"), Some((23, 59)));
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("12:60"), None);
        assert_eq!(parse_hhmm("12:5"), None);
        assert_eq!(parse_hhmm("noon"), None);
    }

    #[test]
    fn daily_trigger_does_not_special_case_a_passed_time() {
        let now = at("2026-06-10T10:00:00+02:00");
        let req = daily_request(&daily("water plants", Some("09:30"))).unwrap();
        assert_eq!(req.trigger, Trigger::Daily { hour: 9, minute: 30 });
        assert_eq!(
            next_fire(&req.trigger, now),
            Some(at("2026-06-11T09:30:00+02:00"))
        );
    }

    #[test]
    fn daily_task_without_valid_time_is_not_scheduled() {
        assert!(daily_request(&daily("a", None)).is_none());
        assert!(daily_request(&daily("b", Some("25:00"))).is_none());
    }

    #[test]
    fn only_future_open_tasks_are_scheduled() {
        let now = at("2026-06-10T10:00:00+00:00");
        let past = task("past", Some(at("2026-06-09T10:00:00+00:00")));
        let undated = task("undated", None);
        let mut done = task("done", Some(at("2026-06-11T10:00:00+00:00")));
        done.set_completed(true, now);
        let future = task("future", Some(at("2026-06-11T10:00:00+00:00")));

        assert!(task_request(&past, now).is_none());
        assert!(task_request(&undated, now).is_none());
        assert!(task_request(&done, now).is_none());
        let req = task_request(&future, now).unwrap();
        assert_eq!(
            req.trigger,
            Trigger::At {
                at: at("2026-06-11T10:00:00+00:00")
            }
        );
    }

    #[test]
    fn birthday_trigger_date_law() {
        let next = |date: &str, now: DateTime<FixedOffset>| {
            let req = birthday_request(&birthday("Ana", date)).unwrap();
            next_fire(&req.trigger, now)
        };
        let now = at("2026-06-10T10:00:00+00:00");
        assert_eq!(next("03-01", now), Some(at("2027-03-01T00:00:00+00:00")));
        assert_eq!(next("12-24", now), Some(at("2026-12-24T00:00:00+00:00")));
        // the day itself, after midnight, already counts as passed
        assert_eq!(next("06-10", now), Some(at("2027-06-10T00:00:00+00:00")));
        assert_eq!(
            next("06-10", at("2026-06-10T00:00:00+00:00")),
            Some(at("2026-06-10T00:00:00+00:00"))
        );
        assert_eq!(next("02-29", now), Some(at("2027-02-28T00:00:00+00:00")));
    }

    #[test]
    fn birthday_request_is_annual_at_midnight() {
        let req = birthday_request(&birthday("Ana", "07-04")).unwrap();
        assert_eq!(
            req.trigger,
            Trigger::Yearly {
                month: 7,
                day: 4,
                hour: 0,
                minute: 0
            }
        );
        assert_eq!(req.content.body, "Happy Birthday to Ana!");
    }

    #[test]
    fn derivation_is_idempotent() {
        let now = at("2026-06-10T10:00:00+00:00");
        let data = AppData {
            daily_tasks: vec![daily("a", Some("07:00")), daily("b", None)],
            birthdays: vec![birthday("Ana", "07-04")],
            tasks: vec![task("t", Some(at("2026-07-01T08:00:00+00:00")))],
            ..AppData::default()
        };
        let ids = |d: &[Derived]| -> Vec<Option<String>> {
            d.iter().map(|x| x.request.identifier.clone()).collect()
        };
        let first = derive(&data, now);
        let second = derive(&data, now);
        assert_eq!(first.len(), 3);
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(
            first[0].request.identifier,
            Some(daily_identifier(data.daily_tasks[0].id))
        );
    }

    #[test]
    fn reconcile_assigns_ids_and_converges() {
        let notifier = LocalNotifier::new(true);
        let now = chrono::Local::now().fixed_offset();
        let mut data = AppData {
            daily_tasks: vec![daily("a", Some("07:00"))],
            tasks: vec![
                task("soon", Some(now + Duration::days(1))),
                task("gone", Some(now - Duration::days(1))),
            ],
            birthdays: vec![birthday("Ana", "07-04")],
            ..AppData::default()
        };

        let report = reconcile(&notifier, &mut data, now);
        assert_eq!(report, ReconcileReport { scheduled: 3, failed: 0 });
        assert!(data.daily_tasks[0].notification_id.is_some());
        assert!(data.tasks[0].notification_id.is_some());
        assert!(data.tasks[1].notification_id.is_none());
        assert_eq!(data.tasks[1].due_date, Some(now - Duration::days(1)));

        reconcile(&notifier, &mut data, now);
        reconcile(&notifier, &mut data, now);
        assert_eq!(notifier.pending().len(), 3);

        data.daily_tasks.clear();
        reconcile(&notifier, &mut data, now);
        assert_eq!(notifier.pending().len(), 2);
    }

    #[test]
    fn denied_scheduling_leaves_tasks_without_ids() {
        let notifier = LocalNotifier::new(false);
        let now = chrono::Local::now().fixed_offset();
        let mut data = AppData {
            daily_tasks: vec![daily("a", Some("07:00"))],
            ..AppData::default()
        };
        data.daily_tasks[0].notification_id = Some("stale".into());
        let report = reconcile(&notifier, &mut data, now);
        assert_eq!(report.failed, 1);
        assert!(data.daily_tasks[0].notification_id.is_none());
        assert_eq!(data.daily_tasks[0].name, "a");
    }

    #[test]
    fn birthday_announcement_fires_once_per_day() {
        let notifier = LocalNotifier::new(true);
        let mut persistence = Persistence::new(Arc::new(MemoryKv::new()));
        persistence.load();
        let today = NaiveDate::from_ymd_opt(2026, 7, 4).unwrap();
        let birthdays = vec![
            birthday("Ana", "07-04"),
            birthday("Bo", "07-04"),
            birthday("Cy", "01-01"),
        ];

        assert_eq!(
            announce_birthdays(&notifier, &persistence, &birthdays, today).as_deref(),
            Some("Happy Birthday to: Ana, Bo!")
        );
        assert!(announce_birthdays(&notifier, &persistence, &birthdays, today).is_none());
        assert_eq!(notifier.delivered().len(), 1);

        let tomorrow = today.succ_opt().unwrap();
        assert!(announce_birthdays(&notifier, &persistence, &birthdays, tomorrow).is_none());
        assert!(!persistence.flag(&birthday_marker_key(tomorrow)));
    }

    #[test]
    fn leap_day_birthdays_are_observed_on_feb_28() {
        let b = vec![birthday("Leap", "02-29")];
        let feb28 = NaiveDate::from_ymd_opt(2027, 2, 28).unwrap();
        assert_eq!(birthdays_on(&b, feb28).len(), 1);
        let leap_feb28 = NaiveDate::from_ymd_opt(2028, 2, 28).unwrap();
        assert!(birthdays_on(&b, leap_feb28).is_empty());
    }
}
