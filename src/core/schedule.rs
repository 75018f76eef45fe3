//! Schedule parsing and next occurrence calculation.
//!
//! Supports standard cron expressions, extended 6-field cron (with seconds),
//! shortcuts (@daily, @hourly, etc.), and interval expressions (@every).

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when parsing or using schedules.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Invalid cron expression.
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),

    /// Invalid interval expression.
    #[error("invalid interval expression: {0}")]
    InvalidInterval(String),

    /// Invalid timezone.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    /// No more occurrences.
    #[error("no more occurrences")]
    NoMoreOccurrences,
}

/// A recurrence definition for a job: a cron expression or a fixed interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawSchedule", into = "RawSchedule")]
pub struct Schedule {
    /// The original expression string.
    expression: String,
    /// The timezone for this schedule.
    timezone: String,
    /// Parsed schedule type.
    schedule_type: ScheduleType,
}

#[derive(Debug, Clone)]
enum ScheduleType {
    /// Cron schedule, always normalized to 6 fields.
    Cron(Box<CronSchedule>),
    /// Interval-based schedule (e.g., @every 5m).
    Interval(Duration),
}

#[derive(Serialize, Deserialize)]
struct RawSchedule {
    expression: String,
    #[serde(default = "default_timezone")]
    timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl TryFrom<RawSchedule> for Schedule {
    type Error = ScheduleError;

    fn try_from(raw: RawSchedule) -> Result<Self, Self::Error> {
        Schedule::with_timezone(raw.expression, raw.timezone)
    }
}

impl From<Schedule> for RawSchedule {
    fn from(schedule: Schedule) -> Self {
        RawSchedule {
            expression: schedule.expression,
            timezone: schedule.timezone,
        }
    }
}

impl Schedule {
    /// Create a new schedule from an expression, in UTC.
    ///
    /// Supports:
    /// - Standard 5-field cron: `minute hour day month weekday`
    /// - Extended 6-field cron: `second minute hour day month weekday`
    /// - Shortcuts: `@yearly`, `@monthly`, `@weekly`, `@daily`, `@hourly`
    /// - Intervals: `@every 5m`, `@every 1h30m`, `@every 250ms`
    pub fn new(expression: impl Into<String>) -> Result<Self, ScheduleError> {
        Self::with_timezone(expression, "UTC")
    }

    /// Create a new schedule with a specific timezone.
    pub fn with_timezone(
        expression: impl Into<String>,
        timezone: impl Into<String>,
    ) -> Result<Self, ScheduleError> {
        let expression = expression.into().trim().to_string();
        let timezone = timezone.into();

        timezone
            .parse::<Tz>()
            .map_err(|_| ScheduleError::InvalidTimezone(timezone.clone()))?;

        let schedule_type = Self::parse_expression(&expression)?;

        Ok(Self {
            expression,
            timezone,
            schedule_type,
        })
    }

    /// Create a fixed-interval schedule.
    pub fn every(interval: Duration) -> Result<Self, ScheduleError> {
        if interval.is_zero() {
            return Err(ScheduleError::InvalidInterval("0s".to_string()));
        }
        Ok(Self {
            expression: format!("@every {}ms", interval.as_millis()),
            timezone: default_timezone(),
            schedule_type: ScheduleType::Interval(interval),
        })
    }

    /// Parse the expression into a schedule type.
    fn parse_expression(expression: &str) -> Result<ScheduleType, ScheduleError> {
        if expression.starts_with('@') {
            return Self::parse_shortcut(expression);
        }
        Self::parse_cron(expression)
    }

    /// Parse a shortcut expression (@daily, @every, etc.).
    fn parse_shortcut(expression: &str) -> Result<ScheduleType, ScheduleError> {
        match expression.to_lowercase().as_str() {
            "@yearly" | "@annually" => Self::parse_cron("0 0 1 1 *"),
            "@monthly" => Self::parse_cron("0 0 1 * *"),
            "@weekly" => Self::parse_cron("0 0 * * SUN"),
            "@daily" | "@midnight" => Self::parse_cron("0 0 * * *"),
            "@hourly" => Self::parse_cron("0 * * * *"),
            s if s.starts_with("@every ") => Self::parse_interval(&s[7..]),
            _ => Err(ScheduleError::InvalidCron(format!(
                "unknown shortcut: {}",
                expression
            ))),
        }
    }

    /// Parse an interval expression (e.g., "5m", "1h30m", "500ms").
    fn parse_interval(interval: &str) -> Result<ScheduleType, ScheduleError> {
        let duration = parse_duration(interval.trim())?;
        Ok(ScheduleType::Interval(duration))
    }

    /// Parse a cron expression.
    fn parse_cron(expression: &str) -> Result<ScheduleType, ScheduleError> {
        let fields = expression.split_whitespace().count();

        let cron_expr = match fields {
            5 => format!("0 {}", expression),
            6 => expression.to_string(),
            _ => {
                return Err(ScheduleError::InvalidCron(format!(
                    "expected 5 or 6 fields, got {}",
                    fields
                )));
            }
        };

        let schedule = CronSchedule::from_str(&cron_expr)
            .map_err(|e| ScheduleError::InvalidCron(e.to_string()))?;

        Ok(ScheduleType::Cron(Box::new(schedule)))
    }

    fn tz(&self) -> Result<Tz, ScheduleError> {
        self.timezone
            .parse()
            .map_err(|_| ScheduleError::InvalidTimezone(self.timezone.clone()))
    }

    /// Get the next occurrence after the given time.
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        match &self.schedule_type {
            ScheduleType::Cron(schedule) => {
                let local_time = after.with_timezone(&self.tz()?);
                schedule
                    .after(&local_time)
                    .next()
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok_or(ScheduleError::NoMoreOccurrences)
            }
            ScheduleType::Interval(duration) => after
                .checked_add_signed(chrono_duration(*duration)?)
                .ok_or(ScheduleError::NoMoreOccurrences),
        }
    }

    /// Get the next occurrence from now.
    pub fn next(&self) -> Result<DateTime<Utc>, ScheduleError> {
        self.next_after(Utc::now())
    }

    /// Get the next N occurrences after the given time.
    pub fn next_n_after(
        &self,
        after: DateTime<Utc>,
        n: usize,
    ) -> Result<Vec<DateTime<Utc>>, ScheduleError> {
        match &self.schedule_type {
            ScheduleType::Cron(schedule) => {
                let local_time = after.with_timezone(&self.tz()?);
                Ok(schedule
                    .after(&local_time)
                    .take(n)
                    .map(|dt| dt.with_timezone(&Utc))
                    .collect())
            }
            ScheduleType::Interval(duration) => {
                let step = chrono_duration(*duration)?;
                let mut results = Vec::with_capacity(n);
                let mut current = after;
                for _ in 0..n {
                    current = current
                        .checked_add_signed(step)
                        .ok_or(ScheduleError::NoMoreOccurrences)?;
                    results.push(current);
                }
                Ok(results)
            }
        }
    }

    /// Time to wait from `now` until the next occurrence.
    ///
    /// Intervals are measured from `now`; cron schedules wait for the next
    /// wall-clock match.
    pub fn delay_after(&self, now: DateTime<Utc>) -> Result<Duration, ScheduleError> {
        match &self.schedule_type {
            ScheduleType::Interval(duration) => Ok(*duration),
            ScheduleType::Cron(_) => {
                let next = self.next_after(now)?;
                Ok((next - now).to_std().unwrap_or(Duration::ZERO))
            }
        }
    }

    /// Whether this is a fixed-interval schedule.
    pub fn is_interval(&self) -> bool {
        matches!(self.schedule_type, ScheduleType::Interval(_))
    }

    /// Get the original expression string.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Get the timezone.
    pub fn timezone(&self) -> &str {
        &self.timezone
    }
}

impl FromStr for Schedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Schedule::new(s)
    }
}

fn chrono_duration(duration: Duration) -> Result<chrono::Duration, ScheduleError> {
    chrono::Duration::from_std(duration)
        .map_err(|_| ScheduleError::InvalidInterval(format!("{:?}", duration)))
}

/// Parse a duration string like "5m", "1h", "1h30m", "30s", "250ms".
fn parse_duration(s: &str) -> Result<Duration, ScheduleError> {
    let invalid = || ScheduleError::InvalidInterval(s.to_string());
    let mut total = Duration::ZERO;
    let mut current_num = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            current_num.push(c);
            continue;
        }

        let num: u64 = current_num.parse().map_err(|_| invalid())?;
        current_num.clear();

        let part = match c {
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                Some(Duration::from_millis(num))
            }
            's' => Some(Duration::from_secs(num)),
            'm' => num.checked_mul(60).map(Duration::from_secs),
            'h' => num.checked_mul(3600).map(Duration::from_secs),
            'd' => num.checked_mul(86400).map(Duration::from_secs),
            _ => return Err(invalid()),
        };
        total = part
            .and_then(|part| total.checked_add(part))
            .ok_or_else(invalid)?;
    }

    if !current_num.is_empty() || total.is_zero() {
        return Err(invalid());
    }

    Ok(total)
}
