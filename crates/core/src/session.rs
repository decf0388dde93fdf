// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session identifier type.
//!
//! A [`SessionId`] names a conversation thread with a single instance. It is
//! opaque to the core: minted externally by a caller (a chat-user id, a UUID
//! picked by the browser UI, or the cron scheduler's synthesized
//! `cron:<task-id>:<epoch>` form, see [`crate::id::cron_session_id`]).

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for session ids synthesized by the cron scheduler (`cron:<task-id>:<epoch>`).
    pub fn is_cron(&self) -> bool {
        self.0.starts_with("cron:")
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_cron_detects_synthesized_ids() {
        assert!(SessionId::new("cron:cron_abc:123").is_cron());
        assert!(!SessionId::new("s1").is_cron());
    }

    #[test]
    fn borrow_str_enables_hashmap_lookup_by_str() {
        use std::collections::HashMap;
        let mut map: HashMap<SessionId, u32> = HashMap::new();
        map.insert(SessionId::new("s1"), 1);
        assert_eq!(map.get("s1"), Some(&1));
    }
}
