use std::fmt;

use chrono::{DateTime, Datelike, Local, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::warn;

/// Calendar date as observed in some timezone. No time component; equality
/// is exact (year, month, day).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl DateKey {
    #[must_use]
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }
}

impl From<NaiveDate> for DateKey {
    fn from(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
        }
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl std::str::FromStr for DateKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|err| anyhow::anyhow!("invalid date key {s:?}: {err}"))?;
        Ok(date.into())
    }
}

/// Parses an IANA zone id. Returns `None` on anything the tz database does
/// not know, leaving the fallback decision to the caller.
pub fn resolve_zone(timezone: &str) -> Option<Tz> {
    let trimmed = timezone.trim();
    if trimmed.is_empty() {
        warn!("timezone id was empty");
        return None;
    }

    match trimmed.parse::<Tz>() {
        Ok(tz) => Some(tz),
        Err(err) => {
            warn!(timezone = %trimmed, error = %err, "unrecognized timezone id");
            None
        }
    }
}

/// Calendar date of `instant` as observed in `timezone`.
///
/// An invalid or unsupported zone id degrades to the machine's local zone.
/// The fallback only ever affects display and bucketing; stored instants are
/// never rewritten through it.
#[must_use]
pub fn date_key_of(instant: DateTime<Utc>, timezone: &str) -> DateKey {
    match resolve_zone(timezone) {
        Some(tz) => instant.with_timezone(&tz).date_naive().into(),
        None => instant.with_timezone(&Local).date_naive().into(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone, Utc};

    use super::{DateKey, date_key_of, resolve_zone};

    #[test]
    fn same_instant_lands_on_different_dates_per_zone() {
        let instant = Utc
            .with_ymd_and_hms(2025, 1, 1, 22, 0, 0)
            .single()
            .expect("valid instant");

        assert_eq!(
            date_key_of(instant, "Asia/Almaty"),
            DateKey::new(2025, 1, 2)
        );
        assert_eq!(
            date_key_of(instant, "America/New_York"),
            DateKey::new(2025, 1, 1)
        );
    }

    #[test]
    fn invalid_zone_falls_back_to_local() {
        let instant = Utc
            .with_ymd_and_hms(2025, 6, 15, 12, 0, 0)
            .single()
            .expect("valid instant");

        let expected: DateKey = instant.with_timezone(&Local).date_naive().into();
        assert_eq!(date_key_of(instant, "Not/A_Zone"), expected);
        assert_eq!(date_key_of(instant, ""), expected);
    }

    #[test]
    fn resolve_zone_accepts_known_ids() {
        assert!(resolve_zone("Europe/Berlin").is_some());
        assert!(resolve_zone("  Asia/Tokyo  ").is_some());
        assert!(resolve_zone("Mars/Olympus").is_none());
    }

    #[test]
    fn date_key_renders_padded() {
        assert_eq!(DateKey::new(2025, 3, 7).to_string(), "2025-03-07");
    }

    #[test]
    fn date_key_parses_its_own_rendering() {
        let key: DateKey = "2025-03-07".parse().expect("parse");
        assert_eq!(key, DateKey::new(2025, 3, 7));
        assert!("03/07/2025".parse::<DateKey>().is_err());
    }
}
