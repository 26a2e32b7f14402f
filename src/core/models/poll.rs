use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::core::models::vote::Vote;
use crate::core::rules::{self, PollState};

/// A poll row exactly as the store returns it. `options` is whatever was
/// persisted and must go through [`crate::core::normalize`] before use.
#[derive(Debug, Clone, FromRow)]
pub struct RawPoll {
    pub id: Uuid,
    pub title: String,
    pub question: Option<String>,
    pub description: Option<String>,
    pub options: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub secret_voting: Option<bool>,
    pub is_active: bool,
    pub created_by: Uuid,
    pub image_url: Option<String>,
    pub is_private: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub text: String,
}

impl PollOption {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Canonical poll with its votes.
///
/// `creator_name` and `creator_avatar` are enrichment only: they are empty
/// when the creator lookup was skipped by the rate limiter or failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollWithVotes {
    pub id: Uuid,
    pub title: String,
    pub question: String,
    pub description: String,
    pub options: Vec<PollOption>,
    pub created_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub secret_voting: bool,
    pub is_active: bool,
    pub created_by: Uuid,
    pub creator_name: String,
    pub creator_avatar: String,
    pub image_url: Option<String>,
    pub votes: Vec<Vote>,
    pub is_private: bool,
}

impl PollWithVotes {
    pub fn state(&self, now: DateTime<Utc>) -> PollState {
        PollState::at(self.ends_at, now)
    }

    pub fn is_creator(&self, user_id: Option<Uuid>) -> bool {
        user_id == Some(self.created_by)
    }

    pub fn has_voted(&self, user_id: Option<Uuid>) -> bool {
        match user_id {
            Some(uid) => self.votes.iter().any(|v| v.user_id == uid),
            None => false,
        }
    }

    pub fn show_results_for(&self, viewer: Option<Uuid>, now: DateTime<Utc>) -> bool {
        rules::show_results(self.secret_voting, self.state(now), self.has_voted(viewer), self.is_creator(viewer))
    }

    pub fn total_votes(&self) -> usize {
        self.votes.len()
    }

    pub fn option_votes(&self, index: usize) -> usize {
        self.votes.iter().filter(|v| v.option_index as i64 == index as i64).count()
    }

    pub fn vote_percentage(&self, index: usize) -> f64 {
        let total = self.total_votes();
        if total == 0 {
            return 0.0;
        }
        self.option_votes(index) as f64 / total as f64 * 100.0
    }

    pub fn tallies(&self) -> Vec<Tally> {
        self.options
            .iter()
            .enumerate()
            .map(|(i, opt)| Tally {
                text: opt.text.clone(),
                votes: self.option_votes(i),
                percentage: self.vote_percentage(i),
            })
            .collect()
    }

    /// Human readable countdown, e.g. `"2h 5m left"` or `"Ended"`.
    pub fn time_left(&self, now: DateTime<Utc>) -> String {
        let secs = (self.ends_at - now).num_seconds();
        if secs <= 0 {
            return "Ended".into();
        }
        let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
        if hours > 0 {
            format!("{}h {}m left", hours, minutes)
        } else if minutes > 0 {
            format!("{}m {}s left", minutes, seconds)
        } else {
            format!("{}s left", seconds)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tally {
    pub text: String,
    pub votes: usize,
    pub percentage: f64,
}

/// A poll as one particular viewer is allowed to see it. When results are
/// hidden the vote list is emptied and `tallies` is absent.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollView {
    pub poll: PollWithVotes,
    pub state: PollState,
    pub time_left: String,
    pub is_creator: bool,
    pub has_voted: bool,
    pub show_results: bool,
    pub tallies: Option<Vec<Tally>>,
}

impl PollView {
    pub fn new(mut poll: PollWithVotes, viewer: Option<Uuid>, now: DateTime<Utc>) -> Self {
        let show_results = poll.show_results_for(viewer, now);
        let tallies = if show_results { Some(poll.tallies()) } else { None };
        let view_state = poll.state(now);
        let is_creator = poll.is_creator(viewer);
        let has_voted = poll.has_voted(viewer);
        let time_left = poll.time_left(now);
        if !show_results {
            poll.votes.clear();
        }
        Self {
            poll,
            state: view_state,
            time_left,
            is_creator,
            has_voted,
            show_results,
            tallies,
        }
    }
}

#[derive(Debug)]
pub enum PollFetch {
    Authorized(Box<PollView>),
    Denied,
    NotFound,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollCreate {
    pub title: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub description: String,
    pub options: Vec<PollOption>,
    pub ends_at: DateTime<Utc>,
    #[serde(default = "default_secret_voting")]
    pub secret_voting: bool,
    #[serde(default)]
    pub is_private: bool,
    pub image_url: Option<String>,
    #[serde(default)]
    pub allowed_users: Vec<Uuid>,
}

fn default_secret_voting() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct Insert {
    pub title: String,
    pub question: String,
    pub description: String,
    pub options: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub secret_voting: bool,
    pub is_active: bool,
    pub created_by: Uuid,
    pub image_url: Option<String>,
    pub is_private: bool,
}

/// Filters for listing polls; results are always newest first.
#[derive(Debug, Default, Clone)]
pub struct Query {
    pub created_by_eq: Option<Uuid>,
    pub is_private_eq: Option<bool>,
    pub text_contains: Option<String>,
}
