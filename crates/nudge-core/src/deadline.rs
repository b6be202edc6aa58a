use anyhow::anyhow;
use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime,
    TimeZone, Utc,
};
use regex::Regex;
use tracing::warn;

use crate::datekey::resolve_zone;

/// Offset appended to deadline strings that carry no zone information.
/// Kept as a single configuration constant; callers that know the user's
/// zone pass a zone-correct offset instead.
pub const DEFAULT_UTC_OFFSET: &str = "+05:00";

/// Normalizes a raw deadline input into the canonical wire form.
///
/// Precedence, first match wins:
/// 1. blank input is an explicit "no deadline";
/// 2. a bare `YYYY-MM-DD` date passes through unchanged — the receiving
///    side owns the end-of-day policy for date-only deadlines;
/// 3. a local `YYYY-MM-DD(T| )HH:MM` gets a `T` separator, `:00` seconds,
///    and `default_offset` appended;
/// 4. anything else passes through unchanged; rejection, if any, happens
///    at the storage boundary.
#[must_use]
pub fn normalize(raw: &str, default_offset: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if is_bare_date(trimmed) {
        return Some(trimmed.to_string());
    }

    if let Some((date, time)) = split_local_datetime(trimmed) {
        return Some(format!("{date}T{time}:00{default_offset}"));
    }

    Some(trimmed.to_string())
}

/// Local wall-clock display string for a stored instant.
///
/// An unknown zone id degrades to the machine's local zone, same as
/// [`crate::datekey::date_key_of`].
#[must_use]
pub fn denormalize(instant: DateTime<Utc>, timezone: &str) -> String {
    match resolve_zone(timezone) {
        Some(tz) => instant
            .with_timezone(&tz)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
        None => instant
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
    }
}

fn is_bare_date(token: &str) -> bool {
    Regex::new(r"^\d{4}-\d{2}-\d{2}$")
        .map(|re| re.is_match(token))
        .unwrap_or(false)
}

fn split_local_datetime(token: &str) -> Option<(String, String)> {
    let re = Regex::new(r"^(\d{4}-\d{2}-\d{2})[T ](\d{2}:\d{2})$").ok()?;
    let caps = re.captures(token)?;
    let date = caps.get(1)?.as_str().to_string();
    let time = caps.get(2)?.as_str().to_string();
    Some((date, time))
}

/// Named relative deadline, set as an operation rather than parsed out of
/// free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineShortcut {
    Today,
    Tomorrow,
    NextWeek,
}

impl DeadlineShortcut {
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "today" => Some(Self::Today),
            "tomorrow" => Some(Self::Tomorrow),
            "next_week" => Some(Self::NextWeek),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Tomorrow => "tomorrow",
            Self::NextWeek => "next_week",
        }
    }

    /// Resolves the shortcut against the caller's current local context.
    ///
    /// `today` and `tomorrow` land on 23:59:00 of the respective local
    /// calendar day; `next_week` lands on 09:00 of the coming Monday and
    /// never resolves to the current day, even when `now` is a Monday.
    pub fn resolve<Z: TimeZone>(self, now: &DateTime<Z>) -> anyhow::Result<DateTime<Z>> {
        let today = now.date_naive();

        let local = match self {
            Self::Today => today.and_hms_opt(23, 59, 0),
            Self::Tomorrow => today
                .checked_add_signed(Duration::days(1))
                .and_then(|date| date.and_hms_opt(23, 59, 0)),
            Self::NextWeek => today
                .checked_add_signed(Duration::days(days_until_next_monday(today)))
                .and_then(|date| date.and_hms_opt(9, 0, 0)),
        }
        .ok_or_else(|| anyhow!("failed to construct wall-clock time for {}", self.as_str()))?;

        from_local_in_zone(&now.timezone(), local, self.as_str())
    }
}

fn days_until_next_monday(today: NaiveDate) -> i64 {
    // ISO numbering, Monday = 1 .. Sunday = 7.
    let weekday = i64::from(today.weekday().number_from_monday());
    if weekday == 1 { 7 } else { (8 - weekday) % 7 }
}

fn from_local_in_zone<Z: TimeZone>(
    tz: &Z,
    local: NaiveDateTime,
    context: &str,
) -> anyhow::Result<DateTime<Z>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::Ambiguous(first, second) => {
            warn!(context, "ambiguous local datetime; using earliest");
            Ok(if first <= second { first } else { second })
        }
        LocalResult::None => Err(anyhow!(
            "local datetime does not exist in timezone: {context}"
        )),
    }
}

/// Parses an instant in the wire format: ISO-8601 with an explicit offset,
/// or a naive date/datetime assumed to be in [`DEFAULT_UTC_OFFSET`]. A bare
/// date is a date-only deadline marker and resolves to 23:59:00 local —
/// this is the receiving-side end-of-day policy the normalizer defers to.
pub fn parse_wire_instant(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(anyhow!("empty instant string"));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(token) {
        return Ok(dt.with_timezone(&Utc));
    }

    let offset: FixedOffset = DEFAULT_UTC_OFFSET
        .parse()
        .map_err(|err| anyhow!("invalid default offset {DEFAULT_UTC_OFFSET}: {err}"))?;

    for fmt in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(token, fmt) {
            return fixed_local_to_utc(offset, ndt);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
        let end_of_day = date
            .and_hms_opt(23, 59, 0)
            .ok_or_else(|| anyhow!("failed to construct end of day for {token}"))?;
        return fixed_local_to_utc(offset, end_of_day);
    }

    Err(anyhow!("unrecognized instant: {raw}"))
}

#[must_use]
pub fn format_wire_instant(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn fixed_local_to_utc(offset: FixedOffset, local: NaiveDateTime) -> anyhow::Result<DateTime<Utc>> {
    offset
        .from_local_datetime(&local)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| anyhow!("fixed-offset local datetime did not resolve: {local}"))
}

pub mod wire_instant_serde {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_wire_instant(*dt))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_wire_instant(&raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(dt: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match dt {
                Some(value) => super::serialize(value, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let opt = Option::<String>::deserialize(deserializer)?;
            match opt {
                Some(raw) => super::super::parse_wire_instant(&raw)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{
        DEFAULT_UTC_OFFSET, DeadlineShortcut, denormalize, format_wire_instant, normalize,
        parse_wire_instant,
    };

    #[test]
    fn blank_input_means_no_deadline() {
        assert_eq!(normalize("", DEFAULT_UTC_OFFSET), None);
        assert_eq!(normalize("   ", DEFAULT_UTC_OFFSET), None);
    }

    #[test]
    fn bare_date_passes_through() {
        assert_eq!(
            normalize("2025-03-10", DEFAULT_UTC_OFFSET),
            Some("2025-03-10".to_string())
        );
    }

    #[test]
    fn local_datetime_gets_seconds_and_offset() {
        assert_eq!(
            normalize("2025-03-10 09:30", DEFAULT_UTC_OFFSET),
            Some("2025-03-10T09:30:00+05:00".to_string())
        );
        assert_eq!(
            normalize("2025-03-10T09:30", DEFAULT_UTC_OFFSET),
            Some("2025-03-10T09:30:00+05:00".to_string())
        );
        assert_eq!(
            normalize("2025-03-10 09:30", "+02:00"),
            Some("2025-03-10T09:30:00+02:00".to_string())
        );
    }

    #[test]
    fn qualified_instant_passes_through() {
        assert_eq!(
            normalize("2025-03-10T09:30:00Z", DEFAULT_UTC_OFFSET),
            Some("2025-03-10T09:30:00Z".to_string())
        );
        assert_eq!(
            normalize("whenever", DEFAULT_UTC_OFFSET),
            Some("whenever".to_string())
        );
    }

    #[test]
    fn today_resolves_to_end_of_day() {
        let now = Utc
            .with_ymd_and_hms(2026, 2, 17, 12, 0, 0)
            .single()
            .expect("valid now");
        let resolved = DeadlineShortcut::Today.resolve(&now).expect("resolve today");
        assert_eq!(format_wire_instant(resolved), "2026-02-17T23:59:00Z");
    }

    #[test]
    fn tomorrow_resolves_to_next_end_of_day() {
        let now = Utc
            .with_ymd_and_hms(2026, 2, 17, 12, 0, 0)
            .single()
            .expect("valid now");
        let resolved = DeadlineShortcut::Tomorrow
            .resolve(&now)
            .expect("resolve tomorrow");
        assert_eq!(format_wire_instant(resolved), "2026-02-18T23:59:00Z");
    }

    #[test]
    fn next_week_from_monday_skips_to_following_monday() {
        // 2026-02-16 is a Monday.
        let now = Utc
            .with_ymd_and_hms(2026, 2, 16, 8, 0, 0)
            .single()
            .expect("valid now");
        let resolved = DeadlineShortcut::NextWeek
            .resolve(&now)
            .expect("resolve next_week");
        assert_eq!(format_wire_instant(resolved), "2026-02-23T09:00:00Z");
    }

    #[test]
    fn next_week_from_midweek_lands_on_coming_monday() {
        // 2026-02-19 is a Thursday.
        let now = Utc
            .with_ymd_and_hms(2026, 2, 19, 8, 0, 0)
            .single()
            .expect("valid now");
        let resolved = DeadlineShortcut::NextWeek
            .resolve(&now)
            .expect("resolve next_week");
        assert_eq!(format_wire_instant(resolved), "2026-02-23T09:00:00Z");
    }

    #[test]
    fn shortcut_tokens_parse() {
        assert_eq!(
            DeadlineShortcut::parse("next_week"),
            Some(DeadlineShortcut::NextWeek)
        );
        assert_eq!(DeadlineShortcut::parse("Today"), Some(DeadlineShortcut::Today));
        assert_eq!(DeadlineShortcut::parse("someday"), None);
    }

    #[test]
    fn wire_instant_with_offset_converts_to_utc() {
        let parsed = parse_wire_instant("2025-06-15T15:00:00+05:00").expect("parse");
        assert_eq!(format_wire_instant(parsed), "2025-06-15T10:00:00Z");
    }

    #[test]
    fn naive_wire_instant_assumes_default_offset() {
        let parsed = parse_wire_instant("2025-06-15T15:00:00").expect("parse");
        assert_eq!(format_wire_instant(parsed), "2025-06-15T10:00:00Z");
    }

    #[test]
    fn date_only_wire_instant_lands_on_end_of_day() {
        let parsed = parse_wire_instant("2025-06-15").expect("parse");
        assert_eq!(format_wire_instant(parsed), "2025-06-15T18:59:00Z");
    }

    #[test]
    fn denormalize_formats_in_requested_zone() {
        let instant = Utc
            .with_ymd_and_hms(2025, 6, 15, 10, 0, 0)
            .single()
            .expect("valid instant");
        assert_eq!(denormalize(instant, "Asia/Almaty"), "2025-06-15 15:00");
    }
}
