// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-field parsing for cron expressions: atoms, ranges, steps, and
//! symbolic month/weekday names.

use super::error::CronError;

const MONTH_NAMES: &[(&str, u32)] = &[
    ("jan", 1),
    ("feb", 2),
    ("mar", 3),
    ("apr", 4),
    ("may", 5),
    ("jun", 6),
    ("jul", 7),
    ("aug", 8),
    ("sep", 9),
    ("oct", 10),
    ("nov", 11),
    ("dec", 12),
];

const WEEKDAY_NAMES: &[(&str, u32)] =
    &[("sun", 0), ("mon", 1), ("tue", 2), ("wed", 3), ("thu", 4), ("fri", 5), ("sat", 6)];

/// Which of the five cron fields is being parsed; drives range bounds, the
/// symbolic name table (if any), and the error `field` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronField {
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl CronField {
    pub fn label(&self) -> &'static str {
        match self {
            CronField::Minute => "minute",
            CronField::Hour => "hour",
            CronField::DayOfMonth => "day_of_month",
            CronField::Month => "month",
            CronField::DayOfWeek => "day_of_week",
        }
    }

    /// Inclusive bounds accepted while parsing (before any alias normalization).
    fn bounds(&self) -> (u32, u32) {
        match self {
            CronField::Minute => (0, 59),
            CronField::Hour => (0, 23),
            CronField::DayOfMonth => (1, 31),
            CronField::Month => (1, 12),
            // 7 is accepted while parsing, then normalized to 0 (Sunday).
            CronField::DayOfWeek => (0, 7),
        }
    }

    fn names(&self) -> Option<&'static [(&'static str, u32)]> {
        match self {
            CronField::Month => Some(MONTH_NAMES),
            CronField::DayOfWeek => Some(WEEKDAY_NAMES),
            _ => None,
        }
    }

    /// The range used for the allowed-value bitmap: day-of-week collapses
    /// its 0..=7 parse range down to the canonical 0..=6.
    fn storage_max(&self) -> u32 {
        match self {
            CronField::DayOfWeek => 6,
            other => other.bounds().1,
        }
    }
}

/// A parsed field: a fixed-size "is this value allowed" bitmap, plus whether
/// the raw field text was anything other than a bare `*` (used by
/// [`super::CronExpression`] to decide the day-of-month/day-of-week OR rule).
#[derive(Debug, Clone)]
pub struct FieldSpec {
    min: u32,
    allowed: Vec<bool>,
    pub restricted: bool,
}

impl FieldSpec {
    pub fn matches(&self, value: u32) -> bool {
        let idx = value.wrapping_sub(self.min);
        (idx as usize) < self.allowed.len() && self.allowed[idx as usize]
    }
}

/// Parse one whitespace-delimited field (itself a comma-separated atom list).
pub fn parse_field(field: CronField, raw: &str) -> Result<FieldSpec, CronError> {
    let (min, max) = field.bounds();
    let storage_max = field.storage_max();
    let mut allowed = vec![false; (storage_max - min + 1) as usize];
    let restricted = raw.trim() != "*";

    for atom in raw.split(',') {
        let atom = atom.trim();
        if atom.is_empty() {
            return Err(CronError::new(field.label(), raw, "empty atom in comma list"));
        }
        let (range_part, step) = match atom.split_once('/') {
            Some((range, step_str)) => {
                let step: u32 = step_str.parse().map_err(|_| {
                    CronError::new(field.label(), raw, format!("invalid step {step_str:?}"))
                })?;
                if step == 0 {
                    return Err(CronError::new(field.label(), raw, "step must be positive"));
                }
                (range, step)
            }
            None => (atom, 1),
        };

        let (lo, hi) = if range_part == "*" {
            (min, max)
        } else if let Some((lo_str, hi_str)) = range_part.split_once('-') {
            let lo = parse_atom_value(field, lo_str, min, max)?;
            let hi = parse_atom_value(field, hi_str, min, max)?;
            if lo > hi {
                return Err(CronError::new(
                    field.label(),
                    raw,
                    format!("range start {lo} is greater than range end {hi}"),
                ));
            }
            (lo, hi)
        } else {
            let v = parse_atom_value(field, range_part, min, max)?;
            (v, v)
        };

        let mut v = lo;
        while v <= hi {
            let stored = normalize(field, v);
            allowed[(stored - min.min(storage_max)) as usize] = true;
            match v.checked_add(step) {
                Some(next) => v = next,
                None => break,
            }
        }
    }

    Ok(FieldSpec { min: min.min(storage_max), allowed, restricted })
}

/// Day-of-week's parsed value 7 aliases to the canonical 0 (Sunday).
fn normalize(field: CronField, v: u32) -> u32 {
    if matches!(field, CronField::DayOfWeek) && v == 7 {
        0
    } else {
        v
    }
}

fn parse_atom_value(field: CronField, token: &str, min: u32, max: u32) -> Result<u32, CronError> {
    if let Ok(n) = token.parse::<u32>() {
        if n < min || n > max {
            return Err(CronError::new(
                field.label(),
                token,
                format!("value {n} outside allowed range {min}-{max}"),
            ));
        }
        return Ok(n);
    }
    if let Some(names) = field.names() {
        let lower = token.to_ascii_lowercase();
        if let Some((_, n)) = names.iter().find(|(name, _)| *name == lower) {
            return Ok(*n);
        }
    }
    Err(CronError::new(
        field.label(),
        token,
        "not a valid integer or three-letter symbolic name".to_string(),
    ))
}
