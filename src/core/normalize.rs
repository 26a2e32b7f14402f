//! Turns stored poll rows into [`PollWithVotes`].
//!
//! Every function here is total: malformed option data never produces an
//! error, only a safe default and a `warn!` so corruption shows up in logs.

use log::warn;
use serde_json::Value;

use crate::core::models::poll::{PollOption, PollWithVotes, RawPoll};
use crate::core::models::profile::Creator;
use crate::core::models::vote::{RawVote, Vote};

const DEFAULT_OPTION_TEXT: &str = "Option";

enum OptionsShape<'a> {
    Encoded(&'a str),
    List(&'a [Value]),
    Other(&'a Value),
    Absent,
}

impl<'a> OptionsShape<'a> {
    fn of(raw: Option<&'a Value>) -> Self {
        match raw {
            None | Some(Value::Null) => OptionsShape::Absent,
            Some(Value::String(s)) => OptionsShape::Encoded(s),
            Some(Value::Array(items)) => OptionsShape::List(items),
            Some(other) => OptionsShape::Other(other),
        }
    }
}

pub fn normalize_options(raw: Option<&Value>) -> Vec<PollOption> {
    match OptionsShape::of(raw) {
        OptionsShape::List(items) => items.iter().map(normalize_option).collect(),
        OptionsShape::Encoded(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => items.iter().map(normalize_option).collect(),
            Ok(other) => {
                warn!("poll options decoded to a non-list value, treating as empty: {}", other);
                Vec::new()
            }
            Err(e) => {
                warn!("failed to parse poll options {:?}, treating as empty: {}", s, e);
                Vec::new()
            }
        },
        OptionsShape::Other(v) => {
            warn!("unexpected poll options shape, treating as empty: {}", v);
            Vec::new()
        }
        OptionsShape::Absent => {
            warn!("poll options missing, treating as empty");
            Vec::new()
        }
    }
}

fn normalize_option(item: &Value) -> PollOption {
    match item {
        Value::String(s) => PollOption::new(s.as_str()),
        Value::Object(fields) => match fields.get("text") {
            Some(Value::String(text)) if !text.is_empty() => PollOption::new(text.as_str()),
            _ => PollOption::new(DEFAULT_OPTION_TEXT),
        },
        other => {
            warn!("unexpected poll option {}, using default text", other);
            PollOption::new(DEFAULT_OPTION_TEXT)
        }
    }
}

pub fn normalize_vote(vote: &RawVote) -> Vote {
    Vote {
        id: vote.id,
        poll_id: vote.poll_id,
        user_id: vote.user_id,
        option_index: vote.option_index,
        timestamp: vote.created_at,
    }
}

pub fn normalize_poll(poll: &RawPoll, votes: &[RawVote], creator: Option<&Creator>) -> PollWithVotes {
    let question = match poll.question.as_deref() {
        Some(q) if !q.is_empty() => q.to_owned(),
        _ => poll.title.clone(),
    };
    PollWithVotes {
        id: poll.id,
        title: poll.title.clone(),
        question,
        description: poll.description.clone().unwrap_or_default(),
        options: normalize_options(poll.options.as_ref()),
        created_at: poll.created_at,
        ends_at: poll.ends_at,
        secret_voting: poll.secret_voting.unwrap_or(true),
        is_active: poll.is_active,
        created_by: poll.created_by,
        creator_name: creator.and_then(|c| c.name.clone()).unwrap_or_default(),
        creator_avatar: creator.and_then(|c| c.avatar_url.clone()).unwrap_or_default(),
        image_url: poll.image_url.clone(),
        votes: votes.iter().map(normalize_vote).collect(),
        is_private: poll.is_private.unwrap_or(false),
    }
}
