//! One-way status hierarchy and transition checks.

use crate::models::Status;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionCheck {
    pub allowed: bool,
    pub is_conflict: bool,
    pub reason: String,
}

/// Decides whether a record may move from `current` to `new`.
///
/// Moves that keep or raise the status level are allowed, including the
/// sideways move between Interviewing and Rejected. Anything lower is refused
/// and reported as a conflict for the caller to record.
pub fn can_transition(current: Status, new: Status) -> TransitionCheck {
    let (from, to) = (current.level(), new.level());
    if to > from {
        TransitionCheck {
            allowed: true,
            is_conflict: false,
            reason: format!("Status upgrade: {current} -> {new}"),
        }
    } else if to == from {
        let reason = if current == new {
            format!("Status unchanged: {current}")
        } else {
            format!("Status sideways move: {current} -> {new}")
        };
        TransitionCheck {
            allowed: true,
            is_conflict: false,
            reason,
        }
    } else {
        TransitionCheck {
            allowed: false,
            is_conflict: true,
            reason: format!("Cannot downgrade status: {current} -> {new}"),
        }
    }
}
