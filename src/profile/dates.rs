//! Tolerant timestamp parsing for comment dates
//!
//! The community site renders comment times in several shapes depending on
//! age and locale: unix seconds in a data attribute, relative phrases
//! ("3 hours ago", "yesterday"), month-day strings with or without a year,
//! and full timestamps with a US timezone suffix. Every result is a UTC
//! naive timestamp; anything unrecognised yields `None`.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Parses a date string relative to the current time
pub fn parse_steam_date(input: &str) -> Option<NaiveDateTime> {
    parse_steam_date_at(input, Utc::now().naive_utc())
}

/// Parses a date string relative to `now`
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use steam_sentinel::profile::parse_steam_date_at;
///
/// let now = NaiveDate::from_ymd_opt(2025, 8, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
/// let parsed = parse_steam_date_at("2 hours ago", now).unwrap();
/// assert_eq!(parsed, now - chrono::Duration::hours(2));
/// ```
pub fn parse_steam_date_at(input: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let raw = input.trim();
    if raw.is_empty() {
        return None;
    }
    let text = raw.to_lowercase();

    let parsed = parse_unix(&text)
        .or_else(|| parse_keyword(&text, now))
        .or_else(|| parse_relative(&text, now))
        .or_else(|| parse_month_first(&text, now))
        .or_else(|| parse_day_first(&text, now))
        .or_else(|| parse_standard(raw));

    if parsed.is_none() {
        tracing::debug!("Could not parse comment date '{}'", raw);
    }
    parsed
}

fn parse_unix(text: &str) -> Option<NaiveDateTime> {
    if !(9..=11).contains(&text.len()) || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let seconds: i64 = text.parse().ok()?;
    DateTime::from_timestamp(seconds, 0).map(|dt| dt.naive_utc())
}

fn parse_keyword(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    match text {
        "just now" | "now" | "today" => Some(now),
        "yesterday" => Some(now - Duration::days(1)),
        _ => None,
    }
}

fn parse_relative(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    static RELATIVE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RELATIVE
        .get_or_init(|| {
            Regex::new(
                r"^(\d+|an?)\s*(seconds?|secs?|minutes?|mins?|hours?|hrs?|days?|weeks?|months?|years?)\s+ago$",
            )
            .ok()
        })
        .as_ref()?;

    let caps = re.captures(text)?;
    let amount: i64 = match &caps[1] {
        "a" | "an" => 1,
        n => n.parse().ok()?,
    };

    let unit = &caps[2];
    let delta = if unit.starts_with("sec") {
        Duration::try_seconds(amount)
    } else if unit.starts_with("min") {
        Duration::try_minutes(amount)
    } else if unit.starts_with("h") {
        Duration::try_hours(amount)
    } else if unit.starts_with("day") {
        Duration::try_days(amount)
    } else if unit.starts_with("week") {
        Duration::try_weeks(amount)
    } else if unit.starts_with("month") {
        amount.checked_mul(30).and_then(Duration::try_days)
    } else {
        amount.checked_mul(365).and_then(Duration::try_days)
    }?;

    now.checked_sub_signed(delta)
}

/// "jul 26", "july 26, 2025", "july 26, 2025 @ 1:59:22 pm pdt"
fn parse_month_first(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    static MONTH_FIRST: OnceLock<Option<Regex>> = OnceLock::new();
    let re = MONTH_FIRST
        .get_or_init(|| {
            Regex::new(
                r"^([a-z]+)\.?\s+(\d{1,2})(?:,?\s*(\d{4}))?(?:\s*@\s*(\d{1,2}):(\d{2})(?::(\d{2}))?\s*(am|pm)?)?(?:\s+([a-z]{3}))?$",
            )
            .ok()
        })
        .as_ref()?;

    let caps = re.captures(text)?;
    let parts = DateParts {
        month: month_number(&caps[1])?,
        day: caps[2].parse().ok()?,
        year: caps.get(3).and_then(|m| m.as_str().parse().ok()),
        hour: caps.get(4).and_then(|m| m.as_str().parse().ok()),
        minute: caps.get(5).and_then(|m| m.as_str().parse().ok()),
        second: caps.get(6).and_then(|m| m.as_str().parse().ok()),
        meridiem: caps.get(7).map(|m| m.as_str()),
        zone: caps.get(8).map(|m| m.as_str()),
    };
    parts.resolve(now)
}

/// "26 jul", "26 jul, 2025 @ 1:59pm"
fn parse_day_first(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    static DAY_FIRST: OnceLock<Option<Regex>> = OnceLock::new();
    let re = DAY_FIRST
        .get_or_init(|| {
            Regex::new(
                r"^(\d{1,2})\s+([a-z]+)\.?(?:,?\s*(\d{4}))?(?:\s*@\s*(\d{1,2}):(\d{2})(?::(\d{2}))?\s*(am|pm)?)?(?:\s+([a-z]{3}))?$",
            )
            .ok()
        })
        .as_ref()?;

    let caps = re.captures(text)?;
    let parts = DateParts {
        month: month_number(&caps[2])?,
        day: caps[1].parse().ok()?,
        year: caps.get(3).and_then(|m| m.as_str().parse().ok()),
        hour: caps.get(4).and_then(|m| m.as_str().parse().ok()),
        minute: caps.get(5).and_then(|m| m.as_str().parse().ok()),
        second: caps.get(6).and_then(|m| m.as_str().parse().ok()),
        meridiem: caps.get(7).map(|m| m.as_str()),
        zone: caps.get(8).map(|m| m.as_str()),
    };
    parts.resolve(now)
}

fn parse_standard(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }

    for format in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}

/// Accepts a full month name or any prefix of at least three letters
fn month_number(name: &str) -> Option<u32> {
    if name.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|m| m.starts_with(name))
        .map(|i| i as u32 + 1)
}

/// UTC offset in hours for the zone suffixes the site emits
fn zone_offset_hours(zone: &str) -> Option<i64> {
    match zone {
        "utc" | "gmt" => Some(0),
        "edt" => Some(-4),
        "est" | "cdt" => Some(-5),
        "cst" | "mdt" => Some(-6),
        "mst" | "pdt" => Some(-7),
        "pst" => Some(-8),
        _ => None,
    }
}

struct DateParts<'a> {
    month: u32,
    day: u32,
    year: Option<i32>,
    hour: Option<u32>,
    minute: Option<u32>,
    second: Option<u32>,
    meridiem: Option<&'a str>,
    zone: Option<&'a str>,
}

impl DateParts<'_> {
    fn resolve(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let hour = match (self.hour, self.meridiem) {
            (None, _) => 0,
            (Some(h), None) if h < 24 => h,
            (Some(h), Some(m)) if (1..=12).contains(&h) => match (m, h) {
                ("am", 12) => 0,
                ("am", h) => h,
                ("pm", 12) => 12,
                (_, h) => h + 12,
            },
            _ => return None,
        };
        let minute = self.minute.unwrap_or(0);
        let second = self.second.unwrap_or(0);

        let offset = match self.zone {
            Some(zone) => zone_offset_hours(zone)?,
            None => 0,
        };

        let build = |year: i32| {
            NaiveDate::from_ymd_opt(year, self.month, self.day)
                .and_then(|d| d.and_hms_opt(hour, minute, second))
                .and_then(|local| local.checked_sub_signed(Duration::try_hours(offset)?))
        };

        match self.year {
            Some(year) => build(year),
            None => {
                // Yearless dates are from the past twelve months
                let candidate = build(now.year())?;
                if candidate > now {
                    build(now.year() - 1)
                } else {
                    Some(candidate)
                }
            }
        }
    }
}
