//! Resolution of user-configured job schedules.
//!
//! Settings may hold a 6-field cron expression (`"0 */5 * * * *"`) or, for
//! installations configured before cron support, a bare number of minutes
//! (`"120"`). Resolution always yields a usable expression: anything that
//! cannot be interpreted falls back to the job's default.

use crate::settings::SettingsProvider;

use super::schedule::{Schedule, ScheduleError};

/// Number of fields in a canonical (seconds-granularity) cron expression.
const CANONICAL_FIELDS: usize = 6;

const MINUTES_PER_DAY: u64 = 24 * 60;

/// Resolve a raw settings value into a schedule expression.
///
/// Never fails; invalid input is logged and replaced by `default_expr`.
pub fn resolve(value: &str, default_expr: &str) -> String {
    match classify(value) {
        Resolved::Empty => default_expr.to_string(),
        Resolved::Expression(expr) | Resolved::Legacy(expr) => expr,
        Resolved::Invalid => {
            tracing::warn!(
                value,
                default = default_expr,
                "Invalid schedule value, falling back to default"
            );
            default_expr.to_string()
        }
    }
}

/// Resolve the schedule stored under `key`.
///
/// A legacy minute count is migrated in place: the converted expression is
/// written back so later reads see the canonical form.
pub fn resolve_setting(settings: &dyn SettingsProvider, key: &str, default_expr: &str) -> String {
    let raw = settings.get_string(key, "");
    match classify(&raw) {
        Resolved::Legacy(expr) => {
            tracing::info!(
                key,
                legacy = raw.trim(),
                schedule = %expr,
                "Migrating legacy minute interval to cron expression"
            );
            settings.set_string(key, &expr);
            expr
        }
        _ => resolve(&raw, default_expr),
    }
}

/// Resolve the schedule stored under `key` and parse it in `timezone`.
///
/// Only fails if `default_expr` itself is not a valid expression.
pub fn resolve_schedule(
    settings: &dyn SettingsProvider,
    key: &str,
    default_expr: &str,
    timezone: &str,
) -> Result<Schedule, ScheduleError> {
    let expr = resolve_setting(settings, key, default_expr);
    Schedule::with_timezone(expr, timezone)
}

/// Convert a legacy "every N minutes" value into a cron expression.
///
/// Whole days use a day-of-month step, whole hours an hour step and
/// everything else a minute step. A step that does not fit its field pins
/// the field to its first value, the way `*/N` behaves for such a step.
pub fn legacy_minutes_to_cron(minutes: u64) -> String {
    if minutes % MINUTES_PER_DAY == 0 {
        match minutes / MINUTES_PER_DAY {
            days if days < 31 => format!("0 0 0 */{} * *", days),
            _ => "0 0 0 1 * *".to_string(),
        }
    } else if minutes % 60 == 0 {
        match minutes / 60 {
            hours if hours < 24 => format!("0 0 */{} * * *", hours),
            _ => "0 0 0 * * *".to_string(),
        }
    } else if minutes < 60 {
        format!("0 */{} * * * *", minutes)
    } else {
        "0 0 * * * *".to_string()
    }
}

/// Whether `expr` is a valid 6-field cron expression.
pub fn is_canonical(expr: &str) -> bool {
    expr.split_whitespace().count() == CANONICAL_FIELDS && Schedule::new(expr).is_ok()
}

enum Resolved {
    Empty,
    Expression(String),
    Legacy(String),
    Invalid,
}

fn classify(value: &str) -> Resolved {
    let value = value.trim();
    if value.is_empty() {
        return Resolved::Empty;
    }

    if is_canonical(value) {
        return Resolved::Expression(value.to_string());
    }

    match value.parse::<u64>() {
        Ok(minutes) if minutes > 0 => {
            let expr = legacy_minutes_to_cron(minutes);
            if is_canonical(&expr) {
                Resolved::Legacy(expr)
            } else {
                Resolved::Invalid
            }
        }
        _ => Resolved::Invalid,
    }
}
