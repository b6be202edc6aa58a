use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::task::Task;

/// A reminder computed for a past deadline fires shortly after "now"
/// instead of never.
const PAST_DUE_GRACE_SECS: i64 = 10;

/// Reminder instant derived from a deadline and a lead-time offset.
/// A result at or before `now` clamps to the near future.
#[must_use]
pub fn remind_at_from_offset(
    due: DateTime<Utc>,
    offset_min: i64,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let candidate = due - Duration::minutes(offset_min);
    if candidate <= now {
        now + Duration::seconds(PAST_DUE_GRACE_SECS)
    } else {
        candidate
    }
}

/// The instant at which a task should be reminded: its explicit
/// `remind_at`, falling back to the deadline itself.
#[must_use]
pub fn effective_remind_at(task: &Task) -> Option<DateTime<Utc>> {
    task.remind_at.or(task.due_at)
}

/// Active tasks whose reminder instant has arrived. This is the selection
/// the background sweep feeds to the notification dispatcher; dispatching
/// itself happens outside the engine.
#[must_use]
pub fn due_reminders<'a>(tasks: &'a [Task], now: DateTime<Utc>) -> Vec<&'a Task> {
    let due: Vec<&Task> = tasks
        .iter()
        .filter(|task| task.is_active())
        .filter(|task| effective_remind_at(task).is_some_and(|at| at <= now))
        .collect();
    debug!(count = due.len(), "selected due reminders");
    due
}

/// Active tasks with a reminder still ahead of `now` — what a restarting
/// dispatcher needs to re-schedule.
#[must_use]
pub fn scheduled_reminders<'a>(tasks: &'a [Task], now: DateTime<Utc>) -> Vec<&'a Task> {
    tasks
        .iter()
        .filter(|task| task.is_active())
        .filter(|task| effective_remind_at(task).is_some_and(|at| at > now))
        .collect()
}

/// Active tasks for the daily digest listing, in snapshot order.
#[must_use]
pub fn digest_tasks(tasks: &[Task]) -> Vec<&Task> {
    tasks.iter().filter(|task| task.is_active()).collect()
}
