use std::io::{self, IsTerminal, Write};

use chrono::NaiveDate;
use nudge_core::bucket::{Bucket, BucketGroup};
use nudge_core::calendar::GridRow;
use nudge_core::datekey::DateKey;
use nudge_core::deadline::denormalize;
use nudge_core::reminder::effective_remind_at;
use nudge_core::task::{Task, UserSettings};
use unicode_width::UnicodeWidthStr;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    #[tracing::instrument(skip(self, groups))]
    pub fn print_buckets(
        &mut self,
        groups: &[BucketGroup<'_>],
        timezone: &str,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        if groups.is_empty() {
            writeln!(out, "no tasks")?;
            return Ok(());
        }

        for group in groups {
            let label = self.paint(group.bucket.label(), bucket_color(group.bucket));
            writeln!(out, "{label}")?;

            let headers = vec![
                "ID".to_string(),
                "Due".to_string(),
                "Repeat".to_string(),
                "Task".to_string(),
            ];
            let mut rows = Vec::with_capacity(group.tasks.len());
            for task in &group.tasks {
                rows.push(self.task_row(task, group.bucket, timezone));
            }
            write_table(&mut out, headers, rows)?;
            writeln!(out)?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn print_archive(&mut self, tasks: &[Task], timezone: &str) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        if tasks.is_empty() {
            writeln!(out, "archive is empty")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Completed".to_string(),
            "Due".to_string(),
            "Task".to_string(),
        ];
        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let completed = task
                .completed_at
                .map(|at| denormalize(at, timezone))
                .unwrap_or_else(|| "-".to_string());
            let due = task
                .due_at
                .map(|at| denormalize(at, timezone))
                .unwrap_or_default();
            rows.push(vec![
                self.paint(&task.id.to_string(), "33"),
                completed,
                due,
                task.text.clone(),
            ]);
        }
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, grid))]
    pub fn print_month(&mut self, grid: &[GridRow], year: i32, month: u32) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let title = NaiveDate::from_ymd_opt(year, month, 1)
            .map(|date| date.format("%B %Y").to_string())
            .unwrap_or_else(|| format!("{year}-{month:02}"));
        writeln!(out, "{title}")?;
        writeln!(out, "Mo  Tu  We  Th  Fr  Sa  Su")?;

        for week in grid {
            let mut line = String::new();
            for cell in week {
                match cell {
                    Some(cell) => {
                        let marker = if cell.has_tasks { '*' } else { ' ' };
                        let day = format!("{:>2}{marker}", cell.day);
                        if cell.is_today {
                            line.push_str(&self.paint(&day, "7"));
                        } else {
                            line.push_str(&day);
                        }
                    }
                    None => line.push_str("   "),
                }
                line.push(' ');
            }
            writeln!(out, "{}", line.trim_end())?;
        }

        writeln!(out, "* day with due tasks")?;
        Ok(())
    }

    #[tracing::instrument(skip(self, settings))]
    pub fn print_settings(&mut self, settings: &UserSettings) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "user      {}", settings.user_id)?;
        writeln!(out, "timezone  {}", settings.timezone)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, due, scheduled, active))]
    pub fn print_digest(
        &mut self,
        due: &[&Task],
        scheduled: &[&Task],
        active: &[&Task],
        timezone: &str,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "daily digest: {} active tasks", active.len())?;
        writeln!(out)?;

        writeln!(out, "{}", self.paint("Reminders due", "31"))?;
        if due.is_empty() {
            writeln!(out, "  none")?;
        }
        for task in due {
            writeln!(
                out,
                "  {:>4}  {}  {}",
                task.id,
                remind_label(task, timezone),
                task.text
            )?;
        }

        writeln!(out, "{}", self.paint("Scheduled", "36"))?;
        if scheduled.is_empty() {
            writeln!(out, "  none")?;
        }
        for task in scheduled {
            writeln!(
                out,
                "  {:>4}  {}  {}",
                task.id,
                remind_label(task, timezone),
                task.text
            )?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn print_day(
        &mut self,
        date_key: DateKey,
        tasks: &[&Task],
        timezone: &str,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "{date_key}")?;
        if tasks.is_empty() {
            writeln!(out, "  nothing due")?;
            return Ok(());
        }
        for task in tasks {
            let due = task
                .due_at
                .map(|at| denormalize(at, timezone))
                .unwrap_or_default();
            writeln!(out, "  {:>4}  {}  {}", task.id, due, task.text)?;
        }
        Ok(())
    }

    fn task_row(&self, task: &Task, bucket: Bucket, timezone: &str) -> Vec<String> {
        let id = self.paint(&task.id.to_string(), "33");

        let due = task
            .due_at
            .map(|at| denormalize(at, timezone))
            .unwrap_or_default();
        let due = if bucket == Bucket::Overdue {
            self.paint(&due, "31")
        } else {
            due
        };

        let repeat = task
            .recurrence()
            .map(|recurrence| recurrence.rule.as_str().to_string())
            .unwrap_or_default();

        vec![id, due, repeat, task.text.clone()]
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn remind_label(task: &Task, timezone: &str) -> String {
    effective_remind_at(task)
        .map(|at| denormalize(at, timezone))
        .unwrap_or_default()
}

fn bucket_color(bucket: Bucket) -> &'static str {
    match bucket {
        Bucket::Overdue => "31",
        Bucket::DueToday => "33",
        Bucket::Upcoming => "36",
        Bucket::NoDeadline => "37",
        Bucket::Completed => "32",
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::strip_ansi;

    #[test]
    fn strip_ansi_removes_color_codes() {
        assert_eq!(strip_ansi("\x1b[31m2025-01-01\x1b[0m"), "2025-01-01");
        assert_eq!(strip_ansi("plain"), "plain");
    }
}
