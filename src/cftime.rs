// ─────────────────────────────────────────────────────────────────────
// CF `"<unit> since <reference>"` time units
// ─────────────────────────────────────────────────────────────────────

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::{fmt, str::FromStr};

use crate::error::CubeError;

/// Calendars whose dates chrono represents exactly.
const STANDARD_CALENDARS: &[&str] = &["standard", "gregorian", "proleptic_gregorian"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl TimeUnit {
    fn millis(self) -> i64 {
        match self {
            TimeUnit::Days => 86_400_000,
            TimeUnit::Hours => 3_600_000,
            TimeUnit::Minutes => 60_000,
            TimeUnit::Seconds => 1_000,
        }
    }

    fn name(self) -> &'static str {
        match self {
            TimeUnit::Days => "days",
            TimeUnit::Hours => "hours",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Seconds => "seconds",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeUnits {
    pub unit: TimeUnit,
    pub reference: NaiveDateTime,
}

/// Numeric time values ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub enum Encoded {
    /// Every offset is a whole number of units.
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl TimeUnits {
    /// `days since <date> 00:00:00`, the encoding of every period archive.
    pub fn days_since(date: NaiveDate) -> Self {
        TimeUnits {
            unit: TimeUnit::Days,
            reference: date.and_time(NaiveTime::MIN),
        }
    }

    /// Offsets are rounded to the millisecond.
    pub fn decode(&self, value: f64) -> Result<NaiveDateTime, CubeError> {
        if !value.is_finite() {
            return Err(CubeError::InvalidTime {
                reason: format!("non-finite time value {value}"),
            });
        }
        let millis = (value * self.unit.millis() as f64).round() as i64;
        Duration::try_milliseconds(millis)
            .and_then(|d| self.reference.checked_add_signed(d))
            .ok_or_else(|| CubeError::InvalidTime {
                reason: format!("{value} {} overflows the calendar", self.unit.name()),
            })
    }

    pub fn encode(&self, times: &[NaiveDateTime]) -> Encoded {
        let step = self.unit.millis();
        let offsets: Vec<i64> = times
            .iter()
            .map(|t| (*t - self.reference).num_milliseconds())
            .collect();
        if offsets.iter().all(|ms| ms % step == 0) {
            Encoded::Int(offsets.into_iter().map(|ms| ms / step).collect())
        } else {
            Encoded::Float(offsets.into_iter().map(|ms| ms as f64 / step as f64).collect())
        }
    }
}

impl fmt::Display for TimeUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} since {}",
            self.unit.name(),
            self.reference.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

impl FromStr for TimeUnits {
    type Err = CubeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| CubeError::InvalidTime {
            reason: format!("'{s}': {why}"),
        };

        let lower = s.trim().to_ascii_lowercase();
        let (unit, reference) = lower
            .split_once(" since ")
            .ok_or_else(|| invalid("expected '<unit> since <reference>'"))?;
        let unit = match unit.trim() {
            "days" | "day" | "d" => TimeUnit::Days,
            "hours" | "hour" | "hr" | "h" => TimeUnit::Hours,
            "minutes" | "minute" | "min" => TimeUnit::Minutes,
            "seconds" | "second" | "sec" | "s" => TimeUnit::Seconds,
            _ => return Err(invalid("unsupported unit")),
        };
        let reference = parse_reference(reference.trim()).ok_or_else(|| invalid("bad reference date"))?;

        Ok(TimeUnits { unit, reference })
    }
}

fn parse_reference(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim_end_matches(" utc").trim_end_matches('z');
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dt%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// A missing calendar attribute means `standard`.
pub fn is_standard_calendar(calendar: Option<&str>) -> bool {
    calendar.map_or(true, |c| {
        STANDARD_CALENDARS.contains(&c.trim().to_ascii_lowercase().as_str())
    })
}
