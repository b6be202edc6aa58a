use chrono::{DateTime, Utc};
use tracing::trace;

use crate::datekey::date_key_of;
use crate::task::Task;

/// Derived, ephemeral classification of a task at one instant. Never
/// persisted; recomputed on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bucket {
    Overdue,
    DueToday,
    Upcoming,
    NoDeadline,
    Completed,
}

impl Bucket {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Overdue => "Overdue",
            Self::DueToday => "Due Today",
            Self::Upcoming => "Upcoming",
            Self::NoDeadline => "No Deadline",
            Self::Completed => "Completed",
        }
    }
}

/// One non-empty bucket and its members, in snapshot insertion order.
#[derive(Debug)]
pub struct BucketGroup<'a> {
    pub bucket: Bucket,
    pub tasks: Vec<&'a Task>,
}

/// Classifies one task. First matching rule wins:
/// completed, then past-due, then due on today's calendar date in the given
/// zone, then future, then deadline-less.
#[must_use]
pub fn classify(task: &Task, now: DateTime<Utc>, timezone: &str) -> Bucket {
    if task.completed_at.is_some() {
        return Bucket::Completed;
    }

    match task.due_at {
        Some(due) if due < now => Bucket::Overdue,
        Some(due) if date_key_of(due, timezone) == date_key_of(now, timezone) => Bucket::DueToday,
        Some(_) => Bucket::Upcoming,
        None => Bucket::NoDeadline,
    }
}

/// Partitions an active-view snapshot. Completed tasks are excluded
/// entirely; the remaining buckets are emitted in the fixed order Overdue,
/// Due Today, Upcoming, No Deadline, with empty buckets omitted.
#[must_use]
pub fn bucketize<'a>(tasks: &'a [Task], now: DateTime<Utc>, timezone: &str) -> Vec<BucketGroup<'a>> {
    partition(tasks, now, timezone, false)
}

/// Archive-style variant: same ordering, with Completed appended last.
#[must_use]
pub fn bucketize_with_completed<'a>(
    tasks: &'a [Task],
    now: DateTime<Utc>,
    timezone: &str,
) -> Vec<BucketGroup<'a>> {
    partition(tasks, now, timezone, true)
}

fn partition<'a>(
    tasks: &'a [Task],
    now: DateTime<Utc>,
    timezone: &str,
    include_completed: bool,
) -> Vec<BucketGroup<'a>> {
    let mut overdue = Vec::new();
    let mut due_today = Vec::new();
    let mut upcoming = Vec::new();
    let mut no_deadline = Vec::new();
    let mut completed = Vec::new();

    for task in tasks {
        let bucket = classify(task, now, timezone);
        trace!(id = task.id, bucket = bucket.label(), "classified task");
        match bucket {
            Bucket::Overdue => overdue.push(task),
            Bucket::DueToday => due_today.push(task),
            Bucket::Upcoming => upcoming.push(task),
            Bucket::NoDeadline => no_deadline.push(task),
            Bucket::Completed => completed.push(task),
        }
    }

    let mut ordered = vec![
        (Bucket::Overdue, overdue),
        (Bucket::DueToday, due_today),
        (Bucket::Upcoming, upcoming),
        (Bucket::NoDeadline, no_deadline),
    ];
    if include_completed {
        ordered.push((Bucket::Completed, completed));
    }

    ordered
        .into_iter()
        .filter(|(_, tasks)| !tasks.is_empty())
        .map(|(bucket, tasks)| BucketGroup { bucket, tasks })
        .collect()
}
