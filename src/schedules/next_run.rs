//! Next-run computation, evaluated in UTC.

use super::models::ScheduleType;
use crate::timestamps::parse_utc;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use thiserror::Error;

/// Longest accepted custom interval: one year.
pub const MAX_INTERVAL_MINUTES: i64 = 366 * 24 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NextRunError {
    #[error("schedule_time is required for one-time schedules")]
    MissingScheduleTime,
    #[error("schedule_time '{0}' is not a valid date and time")]
    InvalidScheduleTime(String),
    #[error("interval must be between 1 and 527040 minutes")]
    InvalidInterval,
    #[error("day_of_month must be between 1 and 31")]
    InvalidDayOfMonth,
}

/// Timing fields of a schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct Timing<'a> {
    pub schedule_type: ScheduleType,
    pub schedule_time: Option<&'a str>,
    pub interval: Option<i64>,
    pub day_of_month: Option<i64>,
}

impl Timing<'_> {
    fn fixed_step(&self) -> Option<Duration> {
        match self.schedule_type {
            ScheduleType::Daily => Some(Duration::days(1)),
            ScheduleType::Weekly => Some(Duration::weeks(1)),
            ScheduleType::Custom => self
                .interval
                .filter(|minutes| (1..=MAX_INTERVAL_MINUTES).contains(minutes))
                .and_then(Duration::try_minutes),
            _ => None,
        }
    }
}

/// First run of a newly created (or re-timed) schedule.
///
/// | type | next run |
/// |---|---|
/// | once | `schedule_time` |
/// | daily / weekly | now + 1 day / 7 days |
/// | monthly | now + 1 calendar month, clamped to the month's last day |
/// | custom | now + `interval` minutes |
/// | anything else | now |
pub fn first_run(timing: &Timing, now: DateTime<Utc>) -> Result<DateTime<Utc>, NextRunError> {
    if let Some(day) = timing.day_of_month {
        if !(1..=31).contains(&day) {
            return Err(NextRunError::InvalidDayOfMonth);
        }
    }
    match &timing.schedule_type {
        ScheduleType::Once => {
            let raw = timing
                .schedule_time
                .filter(|s| !s.trim().is_empty())
                .ok_or(NextRunError::MissingScheduleTime)?;
            parse_utc(raw).ok_or_else(|| NextRunError::InvalidScheduleTime(raw.to_string()))
        }
        ScheduleType::Custom => {
            timing
                .fixed_step()
                .and_then(|step| now.checked_add_signed(step))
                .ok_or(NextRunError::InvalidInterval)
        }
        ScheduleType::Daily | ScheduleType::Weekly => {
            Ok(now + timing.fixed_step().unwrap_or_else(Duration::zero))
        }
        ScheduleType::Monthly => Ok(add_months(now, 1, timing.day_of_month)),
        ScheduleType::Unrecognized(_) => Ok(now),
    }
}

/// Run after a firing whose slot was `previous`.
///
/// Recurring schedules stay on the grid anchored at `previous`; the result
/// is the first grid point strictly after `now`, so missed slots collapse
/// into the firing that just happened. Returns `None` for schedules that
/// fire only once.
pub fn following_run(
    timing: &Timing,
    previous: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match timing.schedule_type {
        ScheduleType::Daily | ScheduleType::Weekly | ScheduleType::Custom => {
            let step = timing.fixed_step()?;
            let step_ms = step.num_milliseconds();
            let behind_ms = (now - previous).num_milliseconds().max(0);
            let steps = behind_ms / step_ms + 1;
            let advance = Duration::try_milliseconds(steps.checked_mul(step_ms)?)?;
            previous.checked_add_signed(advance)
        }
        ScheduleType::Monthly => {
            let mut months = 1;
            loop {
                let candidate = add_months(previous, months, timing.day_of_month);
                if candidate > now {
                    return Some(candidate);
                }
                months += 1;
            }
        }
        ScheduleType::Once | ScheduleType::Unrecognized(_) => None,
    }
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// `from` plus `months` calendar months. With `day_of_month`, lands on that
/// day, or on the last day of months too short to have it.
fn add_months(from: DateTime<Utc>, months: u32, day_of_month: Option<i64>) -> DateTime<Utc> {
    let shifted = from
        .checked_add_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    let Some(day) = day_of_month else {
        return shifted;
    };
    let last = last_day_of_month(shifted.year(), shifted.month());
    let target = (day.clamp(1, 31) as u32).min(last);
    shifted.with_day(target).unwrap_or(shifted)
}
