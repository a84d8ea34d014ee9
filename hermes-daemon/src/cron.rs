//! Five-field cron expressions and next-fire computation.
//!
//! Fields: minute (0-59), hour (0-23), day-of-month (1-31), month (1-12 or
//! `JAN`-`DEC`), day-of-week (0-7 or `SUN`-`SAT`, 7 is Sunday). Each field is
//! a comma list of `*`, `N` or `A-B`, optionally followed by `/step`.
//!
//! Day matching follows Vixie cron: when both day-of-month and day-of-week
//! are restricted (neither starts with `*`), a day matches if either does.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use thiserror::Error;

/// Furthest a next-fire search looks ahead before giving up.
const SEARCH_YEARS: i32 = 5;

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronField {
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl CronField {
    const ALL: [CronField; 5] = [
        CronField::Minute,
        CronField::Hour,
        CronField::DayOfMonth,
        CronField::Month,
        CronField::DayOfWeek,
    ];

    fn bounds(self) -> (u32, u32) {
        match self {
            CronField::Minute => (0, 59),
            CronField::Hour => (0, 23),
            CronField::DayOfMonth => (1, 31),
            CronField::Month => (1, 12),
            // 7 is accepted as Sunday and folded onto 0.
            CronField::DayOfWeek => (0, 7),
        }
    }

    fn names(self) -> Option<(&'static [&'static str], u32)> {
        match self {
            CronField::Month => Some((&MONTH_NAMES, 1)),
            CronField::DayOfWeek => Some((&DAY_NAMES, 0)),
            _ => None,
        }
    }
}

impl fmt::Display for CronField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CronField::Minute => "minute",
            CronField::Hour => "hour",
            CronField::DayOfMonth => "day-of-month",
            CronField::Month => "month",
            CronField::DayOfWeek => "day-of-week",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronParseError {
    #[error("expected 5 fields in cron expression '{expr}', found {found}")]
    FieldCount { expr: String, found: usize },

    #[error("unknown cron macro '{0}'")]
    UnknownMacro(String),

    #[error("invalid {field} field '{value}': {reason}")]
    InvalidField {
        field: CronField,
        value: String,
        reason: String,
    },
}

/// A parsed cron schedule. Each field is stored as a bitset of allowed values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self, CronParseError> {
        let trimmed = expr.trim();
        let expanded = if trimmed.starts_with('@') {
            expand_macro(trimmed)?
        } else {
            trimmed
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronParseError::FieldCount {
                expr: expr.to_string(),
                found: fields.len(),
            });
        }

        let mut sets = [0u64; 5];
        for (slot, (field, text)) in sets.iter_mut().zip(CronField::ALL.into_iter().zip(&fields)) {
            *slot = parse_field(field, text)?;
        }

        // Fold Sunday-as-7 onto 0.
        let mut days_of_week = sets[4];
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            source: trimmed.to_string(),
            minutes: sets[0],
            hours: sets[1],
            days_of_month: sets[2],
            months: sets[3],
            days_of_week,
            dom_restricted: !fields[2].starts_with('*'),
            dow_restricted: !fields[4].starts_with('*'),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `t` (truncated to the minute) is a fire time.
    pub fn matches(&self, t: &NaiveDateTime) -> bool {
        bit(self.minutes, t.minute())
            && bit(self.hours, t.hour())
            && bit(self.months, t.month())
            && self.day_matches(&t.date())
    }

    /// First fire time strictly after `after`, or `None` if the expression
    /// never fires within the search horizon (e.g. `0 0 30 2 *`).
    pub fn next_after(&self, after: &NaiveDateTime) -> Option<NaiveDateTime> {
        let mut t = after.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let horizon = after.year() + SEARCH_YEARS;

        while t.year() <= horizon {
            if !bit(self.months, t.month()) {
                t = first_of_next_month(&t.date())?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.day_matches(&t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !bit(self.hours, t.hour()) {
                t = t.with_minute(0)? + Duration::hours(1);
                continue;
            }
            if !bit(self.minutes, t.minute()) {
                t += Duration::minutes(1);
                continue;
            }
            return Some(t);
        }
        None
    }

    fn day_matches(&self, date: &NaiveDate) -> bool {
        let dom = bit(self.days_of_month, date.day());
        let dow = bit(self.days_of_week, date.weekday().num_days_from_sunday());
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl FromStr for CronExpr {
    type Err = CronParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn expand_macro(expr: &str) -> Result<&'static str, CronParseError> {
    match expr.to_ascii_lowercase().as_str() {
        "@yearly" | "@annually" => Ok("0 0 1 1 *"),
        "@monthly" => Ok("0 0 1 * *"),
        "@weekly" => Ok("0 0 * * 0"),
        "@daily" | "@midnight" => Ok("0 0 * * *"),
        "@hourly" => Ok("0 * * * *"),
        _ => Err(CronParseError::UnknownMacro(expr.to_string())),
    }
}

fn parse_field(field: CronField, text: &str) -> Result<u64, CronParseError> {
    let invalid = |reason: String| CronParseError::InvalidField {
        field,
        value: text.to_string(),
        reason,
    };
    let (min, max) = field.bounds();
    let mut set = 0u64;

    for part in text.split(',') {
        if part.is_empty() {
            return Err(invalid("empty list element".to_string()));
        }
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| invalid(format!("bad step '{step}'")))?;
                if step == 0 {
                    return Err(invalid("step must be positive".to_string()));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_value(field, a).map_err(invalid)?, parse_value(field, b).map_err(invalid)?)
        } else {
            let value = parse_value(field, range).map_err(invalid)?;
            // `N/step` runs from N to the end of the field.
            (value, if step.is_some() { max } else { value })
        };

        if start < min || end > max {
            return Err(invalid(format!("values must be within {min}-{max}")));
        }
        if start > end {
            return Err(invalid(format!("range {start}-{end} is reversed")));
        }

        let step = step.unwrap_or(1) as usize;
        for value in (start..=end).step_by(step) {
            set |= 1 << value;
        }
    }
    Ok(set)
}

fn parse_value(field: CronField, text: &str) -> Result<u32, String> {
    if let Ok(value) = text.parse::<u32>() {
        return Ok(value);
    }
    if let Some((names, offset)) = field.names() {
        let upper = text.to_ascii_uppercase();
        if let Some(index) = names.iter().position(|n| *n == upper) {
            return Ok(index as u32 + offset);
        }
    }
    Err(format!("'{text}' is not a valid value"))
}

fn bit(set: u64, value: u32) -> bool {
    set & (1 << value) != 0
}

fn first_of_next_month(date: &NaiveDate) -> Option<NaiveDate> {
    if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    }
}
