use anyhow::anyhow;
use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::datekey::{DateKey, date_key_of};
use crate::task::Task;

/// One day cell of the month grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayCell {
    pub day: u32,
    pub date_key: DateKey,
    pub is_today: bool,
    pub has_tasks: bool,
}

/// One Monday-first week row; `None` cells are blank placeholders, never
/// days of an adjacent month.
pub type GridRow = Vec<Option<DayCell>>;

/// Number of days in a month: the day before day 1 of the next month.
pub fn days_in_month(year: i32, month: u32) -> anyhow::Result<u32> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .ok_or_else(|| anyhow!("invalid month: {year}-{month:02}"))?;
    let last = first_of_next
        .pred_opt()
        .ok_or_else(|| anyhow!("no day precedes {first_of_next}"))?;
    Ok(last.day())
}

/// Builds the presentation grid for one month.
///
/// `month0` is the zero-based month index (0 = January). Weeks run
/// Monday-first; a month starting on Sunday gets six leading placeholders.
/// Day cells carry `is_today` (date key equals the key of `now` in the
/// zone) and `has_tasks` (at least one active task due that day).
pub fn month_grid(
    year: i32,
    month0: u32,
    tasks: &[Task],
    timezone: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<GridRow>> {
    let month = month0
        .checked_add(1)
        .filter(|m| (1..=12).contains(m))
        .ok_or_else(|| anyhow!("month index out of range: {month0}"))?;

    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| anyhow!("invalid month: {year}-{month:02}"))?;
    let day_count = days_in_month(year, month)?;
    let today = date_key_of(now, timezone);

    let due_keys: Vec<DateKey> = tasks
        .iter()
        .filter(|task| task.is_active())
        .filter_map(|task| task.due_at)
        .map(|due| date_key_of(due, timezone))
        .collect();

    // Monday maps to 0, Sunday to 6.
    let leading = first.weekday().num_days_from_monday() as usize;
    let mut cells: Vec<Option<DayCell>> = vec![None; leading];

    for day in 1..=day_count {
        let date_key = DateKey::new(year, month, day);
        cells.push(Some(DayCell {
            day,
            date_key,
            is_today: date_key == today,
            has_tasks: due_keys.contains(&date_key),
        }));
    }

    while cells.len() % 7 != 0 {
        cells.push(None);
    }

    Ok(cells.chunks(7).map(|week| week.to_vec()).collect())
}

/// Active tasks due on the given date, ascending by due instant. Completed
/// and deadline-less tasks are excluded.
#[must_use]
pub fn tasks_on_date<'a>(date_key: DateKey, tasks: &'a [Task], timezone: &str) -> Vec<&'a Task> {
    let mut hits: Vec<&Task> = tasks
        .iter()
        .filter(|task| task.is_active())
        .filter(|task| {
            task.due_at
                .map(|due| date_key_of(due, timezone) == date_key)
                .unwrap_or(false)
        })
        .collect();
    hits.sort_by_key(|task| task.due_at);
    hits
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{days_in_month, month_grid, tasks_on_date};
    use crate::datekey::DateKey;
    use crate::task::Task;

    const TZ: &str = "UTC";

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 10, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    fn day_cell_count(grid: &[super::GridRow]) -> usize {
        grid.iter().flatten().filter(|cell| cell.is_some()).count()
    }

    #[test]
    fn leap_february_has_29_cells() {
        let grid = month_grid(2024, 1, &[], TZ, now()).expect("grid");
        assert_eq!(day_cell_count(&grid), 29);
    }

    #[test]
    fn plain_february_has_28_cells() {
        let grid = month_grid(2023, 1, &[], TZ, now()).expect("grid");
        assert_eq!(day_cell_count(&grid), 28);
    }

    #[test]
    fn month_starting_sunday_gets_six_leading_blanks() {
        // January 2023 starts on a Sunday.
        let grid = month_grid(2023, 0, &[], TZ, now()).expect("grid");
        let leading = grid[0].iter().take_while(|cell| cell.is_none()).count();
        assert_eq!(leading, 6);
    }

    #[test]
    fn month_starting_monday_gets_no_leading_blanks() {
        // May 2023 starts on a Monday.
        let grid = month_grid(2023, 4, &[], TZ, now()).expect("grid");
        assert!(grid[0][0].is_some());
    }

    #[test]
    fn rows_are_always_full_weeks() {
        let grid = month_grid(2024, 1, &[], TZ, now()).expect("grid");
        assert!(grid.iter().all(|row| row.len() == 7));
    }

    #[test]
    fn today_and_task_flags_are_set() {
        let mut due_today = Task::new(1, "due today");
        due_today.due_at = Utc.with_ymd_and_hms(2024, 2, 10, 18, 0, 0).single();
        let mut done = Task::new(2, "already done");
        done.due_at = Utc.with_ymd_and_hms(2024, 2, 11, 9, 0, 0).single();
        done.completed_at = Utc.with_ymd_and_hms(2024, 2, 9, 9, 0, 0).single();

        let grid = month_grid(2024, 1, &[due_today, done], TZ, now()).expect("grid");
        let cells: Vec<super::DayCell> = grid.into_iter().flatten().flatten().collect();

        let tenth = cells.iter().find(|c| c.day == 10).expect("day 10");
        assert!(tenth.is_today);
        assert!(tenth.has_tasks);

        // Completed tasks never light up a day.
        let eleventh = cells.iter().find(|c| c.day == 11).expect("day 11");
        assert!(!eleventh.is_today);
        assert!(!eleventh.has_tasks);
    }

    #[test]
    fn tasks_on_date_sorts_by_due_and_skips_completed() {
        let mut late = Task::new(1, "evening");
        late.due_at = Utc.with_ymd_and_hms(2024, 2, 10, 20, 0, 0).single();
        let mut early = Task::new(2, "morning");
        early.due_at = Utc.with_ymd_and_hms(2024, 2, 10, 8, 0, 0).single();
        let mut done = Task::new(3, "done");
        done.due_at = Utc.with_ymd_and_hms(2024, 2, 10, 9, 0, 0).single();
        done.completed_at = Utc.with_ymd_and_hms(2024, 2, 10, 9, 30, 0).single();
        let dateless = Task::new(4, "dateless");

        let tasks = vec![late, early, done, dateless];
        let hits = tasks_on_date(DateKey::new(2024, 2, 10), &tasks, TZ);
        let ids: Vec<i64> = hits.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn days_in_month_handles_year_boundary() {
        assert_eq!(days_in_month(2023, 12).expect("december"), 31);
        assert_eq!(days_in_month(2024, 2).expect("leap february"), 29);
        assert_eq!(days_in_month(2023, 2).expect("february"), 28);
        assert!(days_in_month(2023, 13).is_err());
    }

    #[test]
    fn out_of_range_month_index_is_rejected() {
        assert!(month_grid(2024, 12, &[], TZ, now()).is_err());
    }
}
