// SPDX-FileCopyrightText: 2025 ScanOrch Authors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Periodic task scheduling.
//!
//! Tasks carrying `is_cron` and a rule are re-fired by the loop below:
//! a CREATED task is started, a finished one retried. Running, queued and
//! paused tasks are left alone until their current run settles.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use models::TaskStatus;
use redis_bus::Bus;

use crate::controller::Context;
use crate::storage::Storage;

/// A five field cron rule: minute, hour, day of month, month, day of week.
///
/// Supports `*`, `*/n`, lists and ranges. As usual, when both day fields
/// are restricted a match on either fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronRule {
    minutes: Vec<u32>,
    hours: Vec<u32>,
    days: Vec<u32>,
    months: Vec<u32>,
    weekdays: Vec<u32>,
    day_restricted: bool,
    weekday_restricted: bool,
}

fn parse_field(field: &str, min: u32, max: u32) -> Result<(Vec<u32>, bool), String> {
    if field == "*" {
        return Ok(((min..=max).collect(), false));
    }
    let mut values = Vec::new();
    for part in field.split(',') {
        if let Some(step) = part.strip_prefix("*/") {
            let step: u32 = step
                .parse()
                .map_err(|_| format!("invalid step `{part}`"))?;
            if step == 0 {
                return Err(format!("zero step `{part}`"));
            }
            values.extend((min..=max).filter(|v| (v - min) % step == 0));
        } else if let Some((start, end)) = part.split_once('-') {
            let start: u32 = start
                .parse()
                .map_err(|_| format!("invalid range `{part}`"))?;
            let end: u32 = end.parse().map_err(|_| format!("invalid range `{part}`"))?;
            if start > end || start < min || end > max {
                return Err(format!("range `{part}` out of bounds {min}-{max}"));
            }
            values.extend(start..=end);
        } else {
            let value: u32 = part
                .parse()
                .map_err(|_| format!("invalid value `{part}`"))?;
            if value < min || value > max {
                return Err(format!("value `{part}` out of bounds {min}-{max}"));
            }
            values.push(value);
        }
    }
    values.sort_unstable();
    values.dedup();
    Ok((values, true))
}

impl CronRule {
    pub fn parse(rule: &str) -> Result<Self, String> {
        let fields: Vec<&str> = rule.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!(
                "expected 5 cron fields, got {} in `{rule}`",
                fields.len()
            ));
        }
        let (minutes, _) = parse_field(fields[0], 0, 59)?;
        let (hours, _) = parse_field(fields[1], 0, 23)?;
        let (days, day_restricted) = parse_field(fields[2], 1, 31)?;
        let (months, _) = parse_field(fields[3], 1, 12)?;
        let (weekdays, weekday_restricted) = parse_field(fields[4], 0, 6)?;
        Ok(Self {
            minutes,
            hours,
            days,
            months,
            weekdays,
            day_restricted,
            weekday_restricted,
        })
    }

    fn matches(&self, t: DateTime<Utc>) -> bool {
        if !self.minutes.contains(&t.minute())
            || !self.hours.contains(&t.hour())
            || !self.months.contains(&t.month())
        {
            return false;
        }
        let day_ok = self.days.contains(&t.day());
        let weekday_ok = self
            .weekdays
            .contains(&t.weekday().num_days_from_sunday());
        match (self.day_restricted, self.weekday_restricted) {
            (true, true) => day_ok || weekday_ok,
            (true, false) => day_ok,
            (false, true) => weekday_ok,
            (false, false) => true,
        }
    }

    /// The next fire time strictly after `after`, scanning at most one
    /// year ahead.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut t = Utc
            .with_ymd_and_hms(
                after.year(),
                after.month(),
                after.day(),
                after.hour(),
                after.minute(),
                0,
            )
            .single()?
            + chrono::Duration::minutes(1);
        let limit = after + chrono::Duration::days(366);
        while t <= limit {
            if self.matches(t) {
                return Some(t);
            }
            t = t + chrono::Duration::minutes(1);
        }
        None
    }
}

/// Runs the cron loop until the process exits.
///
/// Next-run times live in memory only; after a restart they are derived
/// again from the rules, so missed fires are skipped rather than replayed.
pub async fn run<DB, B>(ctx: Arc<Context<DB, B>>, check_interval: Duration)
where
    DB: Storage + Send + Sync + 'static,
    B: Bus + Send + Sync + 'static,
{
    let mut interval = tokio::time::interval(check_interval);
    let mut next_runs: HashMap<String, DateTime<Utc>> = HashMap::new();
    tracing::debug!("starting cron loop");
    loop {
        interval.tick().await;
        if let Err(e) = tick(&ctx, &mut next_runs).await {
            tracing::warn!(%e, "cron tick failed");
        }
    }
}

async fn tick<DB, B>(
    ctx: &Context<DB, B>,
    next_runs: &mut HashMap<String, DateTime<Utc>>,
) -> Result<(), crate::scheduling::Error>
where
    DB: Storage + Send + Sync + 'static,
    B: Bus + Send + Sync + 'static,
{
    let now = Utc::now();
    for workspace_id in ctx.tasks.storage().workspaces().await? {
        for task in ctx.tasks.storage().list_tasks(&workspace_id).await? {
            if !task.is_cron || task.cron_rule.is_empty() {
                continue;
            }
            let rule = match CronRule::parse(&task.cron_rule) {
                Ok(rule) => rule,
                Err(e) => {
                    tracing::warn!(task = %task.id, %e, "ignoring invalid cron rule");
                    continue;
                }
            };
            let due = match next_runs.get(&task.id) {
                Some(next) => *next <= now,
                // first sighting: schedule, do not fire immediately
                None => {
                    if let Some(next) = rule.next_after(now) {
                        next_runs.insert(task.id.clone(), next);
                    }
                    continue;
                }
            };
            if !due {
                continue;
            }
            if let Some(next) = rule.next_after(now) {
                next_runs.insert(task.id.clone(), next);
            }
            let fired = match task.status {
                TaskStatus::Created => ctx.tasks.start(&workspace_id, &task.id).await,
                s if s.is_terminal() => ctx.tasks.retry(&workspace_id, &task.id).await,
                // still running from the previous fire
                _ => {
                    tracing::debug!(task = %task.id, status = %task.status, "cron fire skipped");
                    continue;
                }
            };
            match fired {
                Ok(()) => tracing::info!(task = %task.id, "cron task fired"),
                Err(e) => tracing::warn!(task = %task.id, %e, "cron fire failed"),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn every_minute() {
        let rule = CronRule::parse("* * * * *").unwrap();
        let next = rule.next_after(at(2025, 3, 1, 10, 0)).unwrap();
        assert_eq!(next, at(2025, 3, 1, 10, 1));
    }

    #[test]
    fn daily_at_three() {
        let rule = CronRule::parse("0 3 * * *").unwrap();
        let next = rule.next_after(at(2025, 3, 1, 10, 0)).unwrap();
        assert_eq!(next, at(2025, 3, 2, 3, 0));
        // strictly after, even when the reference matches
        let next = rule.next_after(at(2025, 3, 2, 3, 0)).unwrap();
        assert_eq!(next, at(2025, 3, 3, 3, 0));
    }

    #[test]
    fn steps_lists_and_ranges() {
        let rule = CronRule::parse("*/15 9-17 * * 1-5").unwrap();
        // Saturday rolls over to Monday 09:00
        let next = rule.next_after(at(2025, 3, 1, 12, 0)).unwrap();
        assert_eq!(next, at(2025, 3, 3, 9, 0));
        let next = rule.next_after(at(2025, 3, 3, 9, 0)).unwrap();
        assert_eq!(next, at(2025, 3, 3, 9, 15));

        let rule = CronRule::parse("0 0 1,15 * *").unwrap();
        let next = rule.next_after(at(2025, 3, 2, 0, 0)).unwrap();
        assert_eq!(next, at(2025, 3, 15, 0, 0));
    }

    #[test]
    fn restricted_day_or_weekday_fires_on_either() {
        // the 13th or any Friday
        let rule = CronRule::parse("0 0 13 * 5").unwrap();
        let next = rule.next_after(at(2025, 6, 10, 0, 0)).unwrap();
        // 2025-06-13 is a Friday and the 13th; the first match before it
        // is Friday the 13th anyway
        assert_eq!(next, at(2025, 6, 13, 0, 0));
        // from the 13th, the next fire is the following Friday
        let next = rule.next_after(at(2025, 6, 13, 0, 0)).unwrap();
        assert_eq!(next, at(2025, 6, 20, 0, 0));
    }

    #[test]
    fn rejects_malformed_rules() {
        assert!(CronRule::parse("* * * *").is_err());
        assert!(CronRule::parse("61 * * * *").is_err());
        assert!(CronRule::parse("*/0 * * * *").is_err());
        assert!(CronRule::parse("5-1 * * * *").is_err());
        assert!(CronRule::parse("a * * * *").is_err());
    }
}
