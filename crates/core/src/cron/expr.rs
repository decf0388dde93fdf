// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parsed 5-field cron expression and its `next_fire` search.

use super::error::CronError;
use super::field::{parse_field, CronField, FieldSpec};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};

/// How far ahead `next_fire` is willing to search before giving up and
/// returning `None`. Chosen generously (just over 4 years) so Feb 29 combined
/// with a restrictive day-of-week still resolves.
const MAX_SEARCH: i64 = 4 * 366;

/// A parsed 5-field cron expression: `minute hour day_of_month month day_of_week`.
///
/// Day-of-month and day-of-week combine with OR when both fields are
/// restricted (anything other than a bare `*`): a candidate day matches if
/// either field accepts it. This mirrors the long-standing cron convention
/// (and is spelled out explicitly because it is easy to get backwards).
#[derive(Debug, Clone)]
pub struct CronExpression {
    minute: FieldSpec,
    hour: FieldSpec,
    day_of_month: FieldSpec,
    month: FieldSpec,
    day_of_week: FieldSpec,
}

impl CronExpression {
    pub fn parse(s: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        let [min_s, hour_s, dom_s, mon_s, dow_s]: [&str; 5] = fields.try_into().map_err(|_| {
            CronError::new(
                "expression",
                s,
                "expected exactly 5 whitespace-separated fields: minute hour day_of_month month day_of_week",
            )
        })?;

        Ok(Self {
            minute: parse_field(CronField::Minute, min_s)?,
            hour: parse_field(CronField::Hour, hour_s)?,
            day_of_month: parse_field(CronField::DayOfMonth, dom_s)?,
            month: parse_field(CronField::Month, mon_s)?,
            day_of_week: parse_field(CronField::DayOfWeek, dow_s)?,
        })
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom_ok = self.day_of_month.matches(date.day());
        let dow_ok = self.day_of_week.matches(date.weekday().num_days_from_sunday());
        if self.day_of_month.restricted && self.day_of_week.restricted {
            dom_ok || dow_ok
        } else {
            dom_ok && dow_ok
        }
    }

    /// Search strictly after `from` for the next matching minute, bounded to
    /// roughly 4 years out. Skips ahead by month/day/hour rather than
    /// stepping minute-by-minute across the whole window.
    pub fn next_fire(&self, from: NaiveDateTime) -> Option<NaiveDateTime> {
        let limit = from + Duration::days(MAX_SEARCH);
        let mut candidate = (from + Duration::minutes(1)).with_second(0)?.with_nanosecond(0)?;

        loop {
            if candidate > limit {
                return None;
            }
            if !self.month.matches(candidate.month()) {
                candidate = first_of_next_month(candidate.date())?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.day_matches(candidate.date()) {
                let next_day = candidate.date().succ_opt()?;
                candidate = next_day.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.hour.matches(candidate.hour()) {
                candidate = match candidate.with_hour(candidate.hour() + 1).and_then(|c| c.with_minute(0)) {
                    Some(c) => c,
                    None => {
                        let next_day = candidate.date().succ_opt()?;
                        next_day.and_hms_opt(0, 0, 0)?
                    }
                };
                continue;
            }
            if !self.minute.matches(candidate.minute()) {
                candidate += Duration::minutes(1);
                continue;
            }
            return Some(candidate);
        }
    }
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if date.month() == 12 { (date.year() + 1, 1) } else { (date.year(), date.month() + 1) };
    NaiveDate::from_ymd_opt(year, month, 1)
}

#[cfg(test)]
#[path = "expr_tests.rs"]
mod tests;
