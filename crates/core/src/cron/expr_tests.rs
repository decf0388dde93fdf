// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cron expression parsing and `next_fire` search tests.

use super::*;
use chrono::NaiveDate;

fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_opt(h, mi, 0).unwrap()
}

#[test]
fn rejects_wrong_field_count() {
    let err = CronExpression::parse("* * * *").unwrap_err();
    assert_eq!(err.field, "expression");
}

#[test]
fn every_minute_fires_one_minute_later() {
    let expr = CronExpression::parse("* * * * *").unwrap();
    let from = dt(2026, 1, 1, 12, 0);
    assert_eq!(expr.next_fire(from), Some(dt(2026, 1, 1, 12, 1)));
}

#[test]
fn top_of_hour_skips_to_next_matching_hour() {
    let expr = CronExpression::parse("0 * * * *").unwrap();
    let from = dt(2026, 1, 1, 12, 30);
    assert_eq!(expr.next_fire(from), Some(dt(2026, 1, 1, 13, 0)));
}

#[test]
fn daily_schedule_skips_to_next_day_when_past_time() {
    let expr = CronExpression::parse("30 9 * * *").unwrap();
    let from = dt(2026, 3, 5, 10, 0);
    assert_eq!(expr.next_fire(from), Some(dt(2026, 3, 6, 9, 30)));
}

#[test]
fn month_restriction_skips_to_next_matching_month() {
    let expr = CronExpression::parse("0 0 1 6 *").unwrap();
    let from = dt(2026, 1, 15, 0, 0);
    assert_eq!(expr.next_fire(from), Some(dt(2026, 6, 1, 0, 0)));
}

#[test]
fn day_of_month_and_day_of_week_combine_with_or_when_both_restricted() {
    // 15th OR Monday, at midnight.
    let expr = CronExpression::parse("0 0 15 * mon").unwrap();
    // 2026-01-01 is a Thursday; the next Monday is 2026-01-05, which comes
    // before the 15th.
    let from = dt(2026, 1, 1, 0, 0);
    assert_eq!(expr.next_fire(from), Some(dt(2026, 1, 5, 0, 0)));
}

#[test]
fn day_of_month_and_day_of_week_and_together_when_only_one_restricted() {
    // dow is "*" (unrestricted), so this is a plain day-of-month match.
    let expr = CronExpression::parse("0 0 15 * *").unwrap();
    let from = dt(2026, 1, 1, 0, 0);
    assert_eq!(expr.next_fire(from), Some(dt(2026, 1, 15, 0, 0)));
}

#[test]
fn step_expression_fires_on_multiples() {
    let expr = CronExpression::parse("*/15 * * * *").unwrap();
    let from = dt(2026, 1, 1, 0, 1);
    assert_eq!(expr.next_fire(from), Some(dt(2026, 1, 1, 0, 15)));
}

#[test]
fn crosses_year_boundary() {
    let expr = CronExpression::parse("0 0 1 1 *").unwrap();
    let from = dt(2026, 6, 1, 0, 0);
    assert_eq!(expr.next_fire(from), Some(dt(2027, 1, 1, 0, 0)));
}

#[test]
fn unsatisfiable_combination_returns_none() {
    // Feb 30th never exists.
    let expr = CronExpression::parse("0 0 30 2 *").unwrap();
    let from = dt(2026, 1, 1, 0, 0);
    assert_eq!(expr.next_fire(from), None);
}

#[test]
fn propagates_field_parse_error() {
    let err = CronExpression::parse("99 * * * *").unwrap_err();
    assert_eq!(err.field, "minute");
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn valid_expr_strategy() -> impl Strategy<Value = String> {
        (0u32..60, 0u32..24, 1u32..29, 1u32..13, 0u32..7).prop_map(|(mi, h, d, mo, dw)| {
            format!("{mi} {h} {d} {mo} {dw}")
        })
    }

    proptest! {
        /// next_fire is deterministic: calling it twice on the same input
        /// yields the same result.
        #[test]
        fn next_fire_is_deterministic(expr_str in valid_expr_strategy(), epoch in 1_735_000_000i64..1_800_000_000) {
            let expr = CronExpression::parse(&expr_str).unwrap();
            let from = chrono::DateTime::from_timestamp(epoch, 0).unwrap().naive_utc();
            let a = expr.next_fire(from);
            let b = expr.next_fire(from);
            prop_assert_eq!(a, b);
        }

        /// Whenever a fire time exists, it is strictly after the query time,
        /// and re-querying from that fire time never returns an earlier moment.
        #[test]
        fn next_fire_is_strictly_increasing(expr_str in valid_expr_strategy(), epoch in 1_735_000_000i64..1_800_000_000) {
            let expr = CronExpression::parse(&expr_str).unwrap();
            let from = chrono::DateTime::from_timestamp(epoch, 0).unwrap().naive_utc();
            if let Some(first) = expr.next_fire(from) {
                prop_assert!(first > from);
                if let Some(second) = expr.next_fire(first) {
                    prop_assert!(second > first);
                }
            }
        }
    }
}
