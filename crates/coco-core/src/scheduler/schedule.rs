//! Schedule language: natural-language schedules and raw 5-field cron,
//! canonicalized to a single `CanonicalCron` representation `next_run_at`
//! is computed from.
//!
//! `next_run_at` is always the smallest strictly-future match
//! (`>= t0 + 1s`); see DESIGN.md for why that resolution was chosen over
//! a same-minute match.

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use regex::Regex;

use crate::error::{CocoError, Result};

/// A single cron-style field: minute, hour, month, or day-of-week.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CronField {
    Any,
    Exact(u32),
    List(Vec<u32>),
    Step { start: u32, every: u32 },
}

impl CronField {
    fn matches(&self, value: u32) -> bool {
        match self {
            CronField::Any => true,
            CronField::Exact(n) => value == *n,
            CronField::List(values) => values.contains(&value),
            CronField::Step { start, every } => *every > 0 && value >= *start && (value - start) % every == 0,
        }
    }

    fn render(&self) -> String {
        match self {
            CronField::Any => "*".to_string(),
            CronField::Exact(n) => n.to_string(),
            CronField::List(values) => values.iter().map(u32::to_string).collect::<Vec<_>>().join(","),
            CronField::Step { start, every } if *start == 0 => format!("*/{every}"),
            CronField::Step { start, every } => format!("{start}/{every}"),
        }
    }
}

/// Day-of-month field, with a "last day of month" extension raw cron
/// doesn't have a standard symbol for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomField {
    Any,
    Exact(u32),
    List(Vec<u32>),
    Step { start: u32, every: u32 },
    LastDayOfMonth,
}

impl DomField {
    fn matches(&self, date: DateTime<Utc>) -> bool {
        match self {
            DomField::Any => true,
            DomField::Exact(n) => date.day() == *n,
            DomField::List(values) => values.contains(&date.day()),
            DomField::Step { start, every } => {
                *every > 0 && date.day() >= *start && (date.day() - start) % every == 0
            }
            DomField::LastDayOfMonth => date.day() == days_in_month(date.year(), date.month()),
        }
    }

    fn render(&self) -> String {
        match self {
            DomField::Any => "*".to_string(),
            DomField::Exact(n) => n.to_string(),
            DomField::List(values) => values.iter().map(u32::to_string).collect::<Vec<_>>().join(","),
            DomField::Step { start, every } if *start == 0 => format!("*/{every}"),
            DomField::Step { start, every } => format!("{start}/{every}"),
            DomField::LastDayOfMonth => "L".to_string(),
        }
    }
}

/// A canonicalized schedule: 5 cron-like fields plus a timezone. Every
/// schedule accepted by the natural-language parser or raw cron reduces
/// to this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalCron {
    pub minute: CronField,
    pub hour: CronField,
    pub dom: DomField,
    pub month: CronField,
    pub dow: CronField,
    pub timezone: String,
}

impl CanonicalCron {
    /// Render as `minute hour dom month dow` (`L` substitutes for the
    /// day-of-month field on a last-day-of-month schedule).
    pub fn to_cron_string(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.minute.render(),
            self.hour.render(),
            self.dom.render(),
            self.month.render(),
            self.dow.render(),
        )
    }

    fn matches(&self, t: DateTime<Utc>) -> bool {
        self.minute.matches(t.minute())
            && self.hour.matches(t.hour())
            && self.month.matches(t.month())
            && self.dow.matches(t.weekday().num_days_from_sunday())
            && self.dom.matches(t)
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let first_of_this_month = NaiveDate::from_ymd_opt(year, month, 1).expect("valid y/m");
    let first_of_next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("valid y/m");
    (first_of_next_month - first_of_this_month).num_days() as u32
}

fn ceil_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    if t.second() == 0 && t.nanosecond() == 0 {
        return t;
    }
    let truncated = t - Duration::seconds(t.second() as i64) - Duration::nanoseconds(t.nanosecond() as i64);
    truncated + Duration::minutes(1)
}

/// Smallest time `>= from + 1s` matching `cron`, guaranteeing
/// `next_run_at(schedule, t0) > t0`. Bounded to a ~370-day search horizon
/// so a malformed field combination (e.g. Feb 30) fails loudly instead of
/// looping forever.
pub fn next_run_at(cron: &CanonicalCron, from: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let mut candidate = ceil_to_minute(from + Duration::seconds(1));
    let horizon = from + Duration::days(370);

    while candidate <= horizon {
        if cron.matches(candidate) {
            return Ok(candidate);
        }
        candidate += Duration::minutes(1);
    }

    Err(CocoError::InvalidInput(format!(
        "no matching run time found for schedule `{}` within the search horizon",
        cron.to_cron_string()
    )))
}

fn parse_cron_field(raw: &str, min: u32, max: u32) -> Result<CronField> {
    if raw == "*" {
        return Ok(CronField::Any);
    }
    if let Some(step) = raw.strip_prefix("*/") {
        let every: u32 = step
            .parse()
            .map_err(|_| CocoError::InvalidInput(format!("invalid cron step `{raw}`")))?;
        return Ok(CronField::Step { start: 0, every });
    }
    if raw.contains(',') {
        let values: Result<Vec<u32>> = raw
            .split(',')
            .map(|v| v.parse::<u32>().map_err(|_| CocoError::InvalidInput(format!("invalid cron value `{v}`"))))
            .collect();
        return Ok(CronField::List(values?));
    }
    let value: u32 = raw
        .parse()
        .map_err(|_| CocoError::InvalidInput(format!("invalid cron field `{raw}`")))?;
    if value < min || value > max {
        return Err(CocoError::InvalidInput(format!("cron field `{raw}` out of range [{min},{max}]")));
    }
    Ok(CronField::Exact(value))
}

fn parse_dom_field(raw: &str) -> Result<DomField> {
    if raw == "L" || raw == "l" {
        return Ok(DomField::LastDayOfMonth);
    }
    Ok(match parse_cron_field(raw, 1, 31)? {
        CronField::Any => DomField::Any,
        CronField::Exact(n) => DomField::Exact(n),
        CronField::List(v) => DomField::List(v),
        CronField::Step { start, every } => DomField::Step { start, every },
    })
}

fn try_parse_raw_cron(text: &str) -> Option<Result<CanonicalCron>> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    if fields.len() != 5 {
        return None;
    }
    if !fields.iter().all(|f| f.chars().all(|c| c.is_ascii_digit() || matches!(c, '*' | '/' | ','))) {
        return None;
    }

    let parsed = (|| -> Result<CanonicalCron> {
        Ok(CanonicalCron {
            minute: parse_cron_field(fields[0], 0, 59)?,
            hour: parse_cron_field(fields[1], 0, 23)?,
            dom: parse_dom_field(fields[2])?,
            month: parse_cron_field(fields[3], 1, 12)?,
            dow: parse_cron_field(fields[4], 0, 6)?,
            timezone: "UTC".to_string(),
        })
    })();
    Some(parsed)
}

fn weekday_number(name: &str) -> Option<u32> {
    Some(match name {
        "sunday" => 0,
        "monday" => 1,
        "tuesday" => 2,
        "wednesday" => 3,
        "thursday" => 4,
        "friday" => 5,
        "saturday" => 6,
        _ => return None,
    })
}

/// Parse a clock time like "9", "9:30", "9pm", "9:30 am" into 24-hour
/// (hour, minute).
fn parse_time_of_day(raw: &str) -> Result<(u32, u32)> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(\d{1,2})(?::(\d{2}))?\s*(am|pm)?\s*$").expect("valid regex")
    });
    let caps = re
        .captures(raw.trim())
        .ok_or_else(|| CocoError::InvalidInput(format!("unrecognized time of day `{raw}`")))?;

    let mut hour: u32 = caps[1]
        .parse()
        .map_err(|_| CocoError::InvalidInput(format!("invalid hour in `{raw}`")))?;
    let minute: u32 = caps
        .get(2)
        .map(|m| m.as_str().parse().unwrap_or(0))
        .unwrap_or(0);
    let meridiem = caps.get(3).map(|m| m.as_str().to_lowercase());

    match meridiem.as_deref() {
        Some("am") => {
            if hour == 12 {
                hour = 0;
            }
        }
        Some("pm") => {
            if hour != 12 {
                hour += 12;
            }
        }
        _ => {}
    }

    if hour > 23 || minute > 59 {
        return Err(CocoError::InvalidInput(format!("time of day out of range in `{raw}`")));
    }
    Ok((hour, minute))
}

/// Parse a natural-language or raw-cron schedule into a canonical cron.
/// Natural-language forms are matched case-insensitively.
pub fn parse_schedule(text: &str) -> Result<CanonicalCron> {
    let trimmed = text.trim();
    let lower = trimmed.to_lowercase();

    if let Some(result) = try_parse_raw_cron(trimmed) {
        return result;
    }

    static EVERY_N_MINUTES: OnceLock<Regex> = OnceLock::new();
    let every_n_minutes =
        EVERY_N_MINUTES.get_or_init(|| Regex::new(r"^every\s+(\d+)\s+minutes?$").expect("valid regex"));
    if let Some(caps) = every_n_minutes.captures(&lower) {
        let every: u32 = caps[1].parse().unwrap_or(1).max(1);
        return Ok(CanonicalCron {
            minute: CronField::Step { start: 0, every },
            hour: CronField::Any,
            dom: DomField::Any,
            month: CronField::Any,
            dow: CronField::Any,
            timezone: "UTC".to_string(),
        });
    }

    static EVERY_N_HOURS: OnceLock<Regex> = OnceLock::new();
    let every_n_hours =
        EVERY_N_HOURS.get_or_init(|| Regex::new(r"^every\s+(\d+)\s+hours?$").expect("valid regex"));
    if let Some(caps) = every_n_hours.captures(&lower) {
        let every: u32 = caps[1].parse().unwrap_or(1).max(1);
        return Ok(CanonicalCron {
            minute: CronField::Exact(0),
            hour: CronField::Step { start: 0, every },
            dom: DomField::Any,
            month: CronField::Any,
            dow: CronField::Any,
            timezone: "UTC".to_string(),
        });
    }

    static DAILY_AT: OnceLock<Regex> = OnceLock::new();
    let daily_at =
        DAILY_AT.get_or_init(|| Regex::new(r"^(?:every day|daily)\s+at\s+(.+)$").expect("valid regex"));
    if let Some(caps) = daily_at.captures(&lower) {
        let (hour, minute) = parse_time_of_day(&caps[1])?;
        return Ok(CanonicalCron {
            minute: CronField::Exact(minute),
            hour: CronField::Exact(hour),
            dom: DomField::Any,
            month: CronField::Any,
            dow: CronField::Any,
            timezone: "UTC".to_string(),
        });
    }

    static WEEKDAY_AT: OnceLock<Regex> = OnceLock::new();
    let weekday_at =
        WEEKDAY_AT.get_or_init(|| Regex::new(r"^every\s+weekday\s+at\s+(.+)$").expect("valid regex"));
    if let Some(caps) = weekday_at.captures(&lower) {
        let (hour, minute) = parse_time_of_day(&caps[1])?;
        return Ok(CanonicalCron {
            minute: CronField::Exact(minute),
            hour: CronField::Exact(hour),
            dom: DomField::Any,
            month: CronField::Any,
            dow: CronField::List(vec![1, 2, 3, 4, 5]),
            timezone: "UTC".to_string(),
        });
    }

    static NAMED_WEEKDAY_AT: OnceLock<Regex> = OnceLock::new();
    let named_weekday_at = NAMED_WEEKDAY_AT.get_or_init(|| {
        Regex::new(r"^every\s+(sunday|monday|tuesday|wednesday|thursday|friday|saturday)\s+at\s+(.+)$")
            .expect("valid regex")
    });
    if let Some(caps) = named_weekday_at.captures(&lower) {
        let dow = weekday_number(&caps[1]).expect("regex only matches known weekdays");
        let (hour, minute) = parse_time_of_day(&caps[2])?;
        return Ok(CanonicalCron {
            minute: CronField::Exact(minute),
            hour: CronField::Exact(hour),
            dom: DomField::Any,
            month: CronField::Any,
            dow: CronField::Exact(dow),
            timezone: "UTC".to_string(),
        });
    }

    static FIRST_DAY: OnceLock<Regex> = OnceLock::new();
    let first_day =
        FIRST_DAY.get_or_init(|| Regex::new(r"^first day of month\s+at\s+(.+)$").expect("valid regex"));
    if let Some(caps) = first_day.captures(&lower) {
        let (hour, minute) = parse_time_of_day(&caps[1])?;
        return Ok(CanonicalCron {
            minute: CronField::Exact(minute),
            hour: CronField::Exact(hour),
            dom: DomField::Exact(1),
            month: CronField::Any,
            dow: CronField::Any,
            timezone: "UTC".to_string(),
        });
    }

    static LAST_DAY: OnceLock<Regex> = OnceLock::new();
    let last_day =
        LAST_DAY.get_or_init(|| Regex::new(r"^last day of month\s+at\s+(.+)$").expect("valid regex"));
    if let Some(caps) = last_day.captures(&lower) {
        let (hour, minute) = parse_time_of_day(&caps[1])?;
        return Ok(CanonicalCron {
            minute: CronField::Exact(minute),
            hour: CronField::Exact(hour),
            dom: DomField::LastDayOfMonth,
            month: CronField::Any,
            dow: CronField::Any,
            timezone: "UTC".to_string(),
        });
    }

    Err(CocoError::InvalidInput(format!("unrecognized schedule: `{text}`")))
}
