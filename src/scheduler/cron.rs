//! Minimal five-field cron expressions anchored to one timezone.
//!
//! Only minute, hour and day-of-week may be restricted; day-of-month and
//! month must be `*`. That is enough for daily and weekly jobs and keeps
//! next-fire computation to a bounded scan of the coming week.

use crate::error::{Result, ScraperError};
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: BTreeSet<u32>,
    hours: BTreeSet<u32>,
    /// 0 = Sunday; `None` means every day
    weekdays: Option<BTreeSet<u32>>,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid(expression, "expected 5 fields"));
        }
        if fields[2] != "*" || fields[3] != "*" {
            return Err(invalid(expression, "day-of-month and month must be '*'"));
        }
        let minutes = parse_field(fields[0], 0, 59).map_err(|m| invalid(expression, &m))?;
        let hours = parse_field(fields[1], 0, 23).map_err(|m| invalid(expression, &m))?;
        let weekdays = if fields[4] == "*" {
            None
        } else {
            // 7 is an alias for Sunday
            let days = parse_field(fields[4], 0, 7).map_err(|m| invalid(expression, &m))?;
            Some(days.into_iter().map(|d| d % 7).collect())
        };
        Ok(Self { expression: expression.trim().to_string(), minutes, hours, weekdays })
    }

    /// `(hour, minute)` when the schedule fires exactly once every day.
    pub fn daily_time(&self) -> Option<(u32, u32)> {
        if self.weekdays.is_some() || self.hours.len() != 1 || self.minutes.len() != 1 {
            return None;
        }
        let hour = *self.hours.iter().next()?;
        let minute = *self.minutes.iter().next()?;
        Some((hour, minute))
    }

    /// First fire instant strictly after `after`, evaluated on `tz`'s wall clock.
    ///
    /// Wall-clock times skipped by a DST transition do not fire that day;
    /// ambiguous ones fire on their first occurrence.
    pub fn next_after(&self, after: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        let local_today = after.with_timezone(&tz).date_naive();
        for offset in 0..=8 {
            let day = local_today + Duration::days(offset);
            if let Some(days) = &self.weekdays {
                if !days.contains(&day.weekday().num_days_from_sunday()) {
                    continue;
                }
            }
            for hour in &self.hours {
                for minute in &self.minutes {
                    let Some(naive) = day.and_hms_opt(*hour, *minute, 0) else { continue };
                    let Some(local) = tz.from_local_datetime(&naive).earliest() else { continue };
                    let candidate = local.with_timezone(&Utc);
                    if candidate > after {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cron[{}]", self.expression)
    }
}

fn invalid(expression: &str, reason: &str) -> ScraperError {
    ScraperError::Config(format!("invalid cron expression '{}': {}", expression, reason))
}

fn parse_field(field: &str, min: u32, max: u32) -> std::result::Result<BTreeSet<u32>, String> {
    let mut values = BTreeSet::new();
    for part in field.split(',') {
        if part == "*" {
            values.extend(min..=max);
        } else if let Some(step) = part.strip_prefix("*/") {
            let step: u32 = step.parse().map_err(|_| format!("bad step '{}'", part))?;
            if step == 0 {
                return Err("step must be positive".into());
            }
            values.extend((min..=max).step_by(step as usize));
        } else if let Some((lo, hi)) = part.split_once('-') {
            let lo: u32 = lo.parse().map_err(|_| format!("bad range '{}'", part))?;
            let hi: u32 = hi.parse().map_err(|_| format!("bad range '{}'", part))?;
            if lo > hi || lo < min || hi > max {
                return Err(format!("range '{}' outside {}-{}", part, min, max));
            }
            values.extend(lo..=hi);
        } else {
            let v: u32 = part.parse().map_err(|_| format!("bad value '{}'", part))?;
            if v < min || v > max {
                return Err(format!("value {} outside {}-{}", v, min, max));
            }
            values.insert(v);
        }
    }
    if values.is_empty() {
        return Err("empty field".into());
    }
    Ok(values)
}
