// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque id generation.
//!
//! Cron task ids and agent ids chosen by this crate (as opposed to agent
//! ids supplied by the registering client) are built from [`new_id`]: a
//! short alphabet, fixed-length nanoid, prefixed so the kind of id is
//! obvious in logs.

const ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// Generate a short opaque id with the given prefix, e.g. `new_id("cron")` -> `cron_3f9a2b1c8d`.
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", nanoid::nanoid!(10, &ALPHABET))
}

/// Generate a cron-synthesized session id for a single task execution:
/// `cron:<task-id>:<epoch>`.
pub fn cron_session_id(task_id: &str, epoch_secs: u64) -> String {
    format!("cron:{task_id}:{epoch_secs}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_id_has_prefix_and_fixed_length() {
        let id = new_id("cron");
        assert!(id.starts_with("cron_"));
        assert_eq!(id.len(), "cron_".len() + 10);
    }

    #[test]
    fn new_id_is_unique_across_calls() {
        let a = new_id("agent");
        let b = new_id("agent");
        assert_ne!(a, b);
    }

    #[test]
    fn cron_session_id_matches_spec_format() {
        assert_eq!(cron_session_id("cron_abc123", 1_735_689_600), "cron:cron_abc123:1735689600");
    }
}
