//! Poll lifecycle, result visibility, vote eligibility and private-poll access.
//!
//! A poll has no stored state machine: it is `Active` while `now < ends_at`
//! and `Closed` from `ends_at` on, computed from the clock at read time. The
//! persisted `is_active` flag is not consulted here.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::Error;

/// Minimum number of options a poll is created with.
pub const MIN_OPTIONS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PollState {
    Active,
    Closed,
}

impl PollState {
    pub fn at(ends_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if now < ends_at {
            PollState::Active
        } else {
            PollState::Closed
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, PollState::Closed)
    }
}

/// Tallies are visible unless voting is secret, the poll is still running,
/// and the viewer neither voted nor created it.
pub fn show_results(secret_voting: bool, state: PollState, has_voted: bool, is_creator: bool) -> bool {
    !secret_voting || state.is_closed() || has_voted || is_creator
}

/// Private polls are visible to their creator and to granted users only.
pub fn has_access(is_private: bool, viewer: Option<Uuid>, created_by: Uuid, granted: bool) -> bool {
    if !is_private {
        return true;
    }
    match viewer {
        Some(uid) => uid == created_by || granted,
        None => false,
    }
}

/// Checks everything about a vote that can be decided before touching the
/// store. Duplicate votes are rejected by the store's uniqueness constraint.
pub fn ensure_can_vote(state: PollState, option_index: i32, option_count: usize) -> Result<(), Error> {
    if state.is_closed() {
        return Err(Error::PollEnded);
    }
    if option_index < 0 || option_index as usize >= option_count {
        return Err(Error::BusinessError(format!("invalid option index {}", option_index)));
    }
    Ok(())
}

pub fn ensure_creator(caller: Uuid, created_by: Uuid, action: &str) -> Result<(), Error> {
    if caller != created_by {
        return Err(Error::Unauthorized(action.into()));
    }
    Ok(())
}

pub fn ensure_option_count(count: usize) -> Result<(), Error> {
    if count < MIN_OPTIONS {
        return Err(Error::BusinessError(format!("a poll needs at least {} options", MIN_OPTIONS)));
    }
    Ok(())
}
