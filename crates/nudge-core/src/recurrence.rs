use chrono::{DateTime, Duration, Months, Utc};
use tracing::warn;

/// How a recurring task rolls forward when completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurrenceRule {
    Daily,
    Weekly,
    Monthly,
    /// Every `interval_days` days.
    Custom,
}

impl RecurrenceRule {
    /// Unknown rule names behave as daily rather than failing; the store is
    /// the authority on what it accepts.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "daily" => Self::Daily,
            "weekly" => Self::Weekly,
            "monthly" => Self::Monthly,
            "custom" => Self::Custom,
            other => {
                if !other.is_empty() {
                    warn!(rule = %other, "unknown recurrence rule; treating as daily");
                }
                Self::Daily
            }
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recurrence {
    pub rule: RecurrenceRule,
    pub interval_days: i64,
}

/// Next occurrence of a recurring deadline, preserving the time of day.
///
/// Monthly recurrence adds one calendar month and clamps to the last day of
/// the shorter month (Jan 31 rolls to Feb 28, or Feb 29 in a leap year).
/// A custom interval below one day counts as one day.
#[must_use]
pub fn next_occurrence(current: DateTime<Utc>, recurrence: Recurrence) -> DateTime<Utc> {
    match recurrence.rule {
        RecurrenceRule::Daily => current + Duration::days(1),
        RecurrenceRule::Weekly => current + Duration::days(7),
        RecurrenceRule::Monthly => current
            .checked_add_months(Months::new(1))
            .unwrap_or(current),
        RecurrenceRule::Custom => current + Duration::days(recurrence.interval_days.max(1)),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{Recurrence, RecurrenceRule, next_occurrence};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s)
            .single()
            .expect("valid instant")
    }

    fn rule(rule: RecurrenceRule) -> Recurrence {
        Recurrence {
            rule,
            interval_days: 1,
        }
    }

    #[test]
    fn daily_adds_one_day() {
        assert_eq!(
            next_occurrence(at(2026, 1, 1, 10, 0, 0), rule(RecurrenceRule::Daily)),
            at(2026, 1, 2, 10, 0, 0)
        );
    }

    #[test]
    fn weekly_adds_seven_days() {
        assert_eq!(
            next_occurrence(at(2026, 1, 1, 10, 0, 0), rule(RecurrenceRule::Weekly)),
            at(2026, 1, 8, 10, 0, 0)
        );
    }

    #[test]
    fn monthly_adds_one_month() {
        assert_eq!(
            next_occurrence(at(2026, 1, 15, 10, 0, 0), rule(RecurrenceRule::Monthly)),
            at(2026, 2, 15, 10, 0, 0)
        );
    }

    #[test]
    fn monthly_clamps_to_end_of_shorter_month() {
        assert_eq!(
            next_occurrence(at(2026, 1, 31, 10, 0, 0), rule(RecurrenceRule::Monthly)),
            at(2026, 2, 28, 10, 0, 0)
        );
    }

    #[test]
    fn custom_adds_interval_days() {
        let recurrence = Recurrence {
            rule: RecurrenceRule::Custom,
            interval_days: 3,
        };
        assert_eq!(
            next_occurrence(at(2026, 1, 1, 10, 0, 0), recurrence),
            at(2026, 1, 4, 10, 0, 0)
        );
    }

    #[test]
    fn custom_interval_below_one_counts_as_one() {
        let recurrence = Recurrence {
            rule: RecurrenceRule::Custom,
            interval_days: 0,
        };
        assert_eq!(
            next_occurrence(at(2026, 1, 1, 10, 0, 0), recurrence),
            at(2026, 1, 2, 10, 0, 0)
        );
    }

    #[test]
    fn time_of_day_is_preserved() {
        assert_eq!(
            next_occurrence(at(2026, 1, 1, 15, 30, 45), rule(RecurrenceRule::Daily)),
            at(2026, 1, 2, 15, 30, 45)
        );
    }

    #[test]
    fn unknown_rule_defaults_to_daily() {
        assert_eq!(RecurrenceRule::parse("unknown_type"), RecurrenceRule::Daily);
        assert_eq!(RecurrenceRule::parse("WEEKLY"), RecurrenceRule::Weekly);
    }
}
