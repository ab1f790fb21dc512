use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;

use outpost_store::types::ScheduleType;

/// The first `next_run` for a freshly created task. Unlike
/// [`outpost_scheduler::compute_next_run`], `once` is meaningful here: its
/// `schedule_value` names the instant the task should fire, not an interval
/// relative to a prior run.
pub fn initial_next_run(
    schedule_type: ScheduleType,
    schedule_value: &str,
    timezone: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, String> {
    match schedule_type {
        ScheduleType::Once => parse_local_timestamp(schedule_value, timezone),
        ScheduleType::Interval | ScheduleType::Cron => {
            outpost_scheduler::compute_next_run(schedule_type, schedule_value, timezone, now)
                .map_err(|e| e.to_string())?
                .ok_or_else(|| "schedule has no future occurrence".to_string())
        }
    }
}

fn parse_local_timestamp(value: &str, timezone: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    let tz: Tz = timezone.parse().map_err(|_| format!("unknown timezone {timezone:?}"))?;
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .map_err(|e| format!("cannot parse {value:?} as a timestamp: {e}"))?;
    naive
        .and_local_timezone(tz)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| format!("ambiguous or invalid local time {value:?} in {timezone:?}"))
}
