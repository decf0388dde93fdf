// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured validation errors for cron expressions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A structured validation failure: `{field, value, reason}`.
///
/// Returned from [`super::CronExpression::parse`] and surfaced verbatim in
/// the `POST /cron/tasks` error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronError {
    pub field: String,
    pub value: String,
    pub reason: String,
}

impl CronError {
    pub fn new(field: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { field: field.into(), value: value.into(), reason: reason.into() }
    }
}

impl fmt::Display for CronError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} {:?}: {}", self.field, self.value, self.reason)
    }
}

impl std::error::Error for CronError {}
