//! Timestamp helpers shared by the database layer and the context framing.
//!
//! Everything is stored as RFC 3339 UTC. The local offset only matters when
//! talking to the character about "today", "this morning" and so on.

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDateTime, Offset, SecondsFormat, Timelike, Utc, Weekday,
};

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Canonical storage format. Fixed width so lexical order equals time order.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp. Accepts RFC 3339 and the naive `YYYY-MM-DD HH:MM:SS` form
/// that older imports use.
pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let trimmed = raw.split('.').next().unwrap_or(raw).replace('T', " ");
    NaiveDateTime::parse_from_str(&trimmed, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Hours elapsed between two instants, never negative.
pub fn hours_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let secs = (later - earlier).num_seconds().max(0);
    secs as f64 / 3600.0
}

/// Coarse part of the day the character reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DayPart {
    Morning,
    Afternoon,
    Evening,
    LateNight,
}

impl DayPart {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => DayPart::Morning,
            12..=17 => DayPart::Afternoon,
            18..=22 => DayPart::Evening,
            _ => DayPart::LateNight,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DayPart::Morning => "morning",
            DayPart::Afternoon => "afternoon",
            DayPart::Evening => "evening",
            DayPart::LateNight => "late night",
        }
    }
}

/// Converts UTC instants into the user's local wall clock.
#[derive(Debug, Clone, Copy)]
pub struct LocalClock {
    offset: FixedOffset,
}

impl LocalClock {
    pub fn new(utc_offset_hours: i32) -> Self {
        let offset =
            FixedOffset::east_opt(utc_offset_hours.clamp(-23, 23) * 3600).unwrap_or(Utc.fix());
        Self { offset }
    }

    pub fn local(&self, ts: DateTime<Utc>) -> DateTime<FixedOffset> {
        ts.with_timezone(&self.offset)
    }

    pub fn day_part(&self, ts: DateTime<Utc>) -> DayPart {
        DayPart::from_hour(self.local(ts).hour())
    }

    pub fn same_local_day(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        self.local(a).date_naive() == self.local(b).date_naive()
    }

    /// "Tuesday, 14/05/2024 - 21:05 (evening)"
    pub fn describe(&self, ts: DateTime<Utc>) -> String {
        let local = self.local(ts);
        format!(
            "{}, {} - {} ({})",
            weekday_name(local.weekday()),
            local.format("%d/%m/%Y"),
            local.format("%H:%M"),
            DayPart::from_hour(local.hour()).label()
        )
    }

    /// Short "5 Mar" date used in timelines.
    pub fn short_date(&self, ts: DateTime<Utc>) -> String {
        let local = self.local(ts);
        format!("{} {}", local.day(), MONTHS[local.month0() as usize])
    }

    /// "5 March" date used in diary prompts.
    pub fn long_date(&self, ts: DateTime<Utc>) -> String {
        let local = self.local(ts);
        format!("{} {}", local.day(), MONTHS_LONG[local.month0() as usize])
    }
}

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

const MONTHS_LONG: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_and_parse_roundtrip_is_stable() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 14, 21, 5, 0).unwrap();
        let stored = format_ts(ts);
        assert_eq!(stored, "2024-05-14T21:05:00.000000Z");
        assert_eq!(parse_ts(&stored), Some(ts));
    }

    #[test]
    fn test_parse_naive_timestamp() {
        let parsed = parse_ts("2024-05-14 21:05:00.123").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 5, 14, 21, 5, 0).unwrap());
    }

    #[test]
    fn test_day_part_bands() {
        assert_eq!(DayPart::from_hour(5), DayPart::Morning);
        assert_eq!(DayPart::from_hour(11), DayPart::Morning);
        assert_eq!(DayPart::from_hour(12), DayPart::Afternoon);
        assert_eq!(DayPart::from_hour(18), DayPart::Evening);
        assert_eq!(DayPart::from_hour(23), DayPart::LateNight);
        assert_eq!(DayPart::from_hour(3), DayPart::LateNight);
    }

    #[test]
    fn test_local_clock_applies_offset() {
        let clock = LocalClock::new(-3);
        let ts = Utc.with_ymd_and_hms(2024, 5, 15, 1, 30, 0).unwrap();
        // 22:30 on the 14th locally
        assert_eq!(clock.day_part(ts), DayPart::Evening);
        assert_eq!(clock.short_date(ts), "14 May");
        assert!(clock.describe(ts).starts_with("Tuesday, 14/05/2024 - 22:30"));
    }
}
