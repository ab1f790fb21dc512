use std::str::FromStr;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;

use outpost_store::types::ScheduleType;

use crate::error::{Result, SchedulerError};

/// The `cron` crate requires a 6- or 7-field expression (seconds first,
/// optional year last). Standard 5-field cron — `min hour day month dow`,
/// the form the spec's own example uses — has no seconds field, so accept
/// it by prepending `"0"` for seconds.
fn normalize_cron_expr(expr: &str) -> String {
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

/// Compute the next UTC run instant for a task whose last completed (or
/// scheduled) run was `from`. Returns `None` when the schedule is
/// exhausted — a `once` task always is, regardless of outcome.
pub fn compute_next_run(
    schedule_type: ScheduleType,
    schedule_value: &str,
    timezone: &str,
    from: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    match schedule_type {
        ScheduleType::Once => Ok(None),

        ScheduleType::Interval => {
            let ms: i64 = schedule_value.parse().map_err(|_| {
                SchedulerError::InvalidSchedule(format!(
                    "interval value {schedule_value:?} is not an integer number of milliseconds"
                ))
            })?;
            if ms <= 0 {
                return Err(SchedulerError::InvalidSchedule(format!(
                    "interval value {ms} must be a positive integer number of milliseconds"
                )));
            }
            Ok(Some(from + ChronoDuration::milliseconds(ms)))
        }

        ScheduleType::Cron => {
            let tz: Tz = timezone
                .parse()
                .map_err(|_| SchedulerError::InvalidSchedule(format!("unknown timezone {timezone:?}")))?;
            let normalized = normalize_cron_expr(schedule_value);
            let schedule = CronSchedule::from_str(&normalized).map_err(|e| {
                SchedulerError::InvalidSchedule(format!("bad cron expression {schedule_value:?}: {e}"))
            })?;
            let from_in_tz = from.with_timezone(&tz);
            let next = schedule
                .after(&from_in_tz)
                .next()
                .ok_or_else(|| SchedulerError::InvalidSchedule("cron schedule has no future occurrence".into()))?;
            Ok(Some(next.with_timezone(&Utc)))
        }
    }
}
