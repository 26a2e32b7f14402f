use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use itertools::Itertools;
use log::{error, warn};
use uuid::Uuid;

use crate::core::models::{
    poll::{Insert as PollInsert, PollCreate, PollFetch, PollView, PollWithVotes, Query as PollQuery, RawPoll},
    profile::{Caller, Creator},
    vote::{Insert as VoteInsert, Query as VoteQuery, RawVote},
};
use crate::core::normalize::{normalize_options, normalize_poll};
use crate::core::ports::repository::{AccessCommon, PollCommon, ProfileCommon, Store, VoteCommon};
use crate::core::resilience::{Resilience, RetryOptions};
use crate::core::rules::{self, PollState};
use crate::core::services::require_caller;
use crate::error::Error;

pub const RETRIES: u32 = 2;
pub const POLL_TTL: Duration = Duration::from_secs(30);
pub const SEARCH_TTL: Duration = Duration::from_secs(60);
pub const RATE_LIMIT: usize = 5;
pub const CREATOR_RATE_LIMIT: usize = 3;
pub const RATE_WINDOW: Duration = Duration::from_secs(10);
/// Creator profiles are only looked up for lists with at most this many
/// distinct creators.
pub const MAX_CREATOR_LOOKUP: usize = 10;

const ALL_POLLS: &str = "all_polls";
const PUBLIC_POLLS: &str = "public_polls";

pub(crate) fn retry_options(key: impl Into<String>) -> RetryOptions {
    RetryOptions::new().retries(RETRIES).rate_limit(key, RATE_LIMIT, RATE_WINDOW)
}

fn poll_key(id: Uuid) -> String {
    format!("poll_{}", id)
}

fn votes_key(id: Uuid) -> String {
    format!("votes_{}", id)
}

fn invalidate_lists(res: &Resilience) {
    let cache = res.cache();
    cache.invalidate(ALL_POLLS);
    cache.invalidate(PUBLIC_POLLS);
    cache.invalidate_prefix("search_");
    cache.invalidate_prefix("user_polls_");
    cache.invalidate_prefix("votes_list_");
}

pub(crate) async fn load_poll<S: Store>(store: &S, res: &Resilience, id: Uuid) -> Result<RawPoll, Error> {
    res.run(&retry_options(format!("getPoll_{}", id)).cache(poll_key(id), POLL_TTL), move || async move {
        PollCommon::get(store, id).await?.ok_or_else(|| Error::NotFound("poll".into()))
    })
    .await
}

/// Reads the poll past the cache, for decisions that must see stored state.
pub(crate) async fn load_poll_fresh<S: Store>(store: &S, res: &Resilience, id: Uuid) -> Result<RawPoll, Error> {
    res.run(&retry_options(format!("checkPoll_{}", id)), move || async move {
        PollCommon::get(store, id).await?.ok_or_else(|| Error::NotFound("poll".into()))
    })
    .await
}

async fn load_votes<S: Store>(store: &S, res: &Resilience, poll_id: Uuid) -> Result<Vec<RawVote>, Error> {
    res.run(&retry_options(format!("getVotes_{}", poll_id)).cache(votes_key(poll_id), POLL_TTL), move || async move {
        VoteCommon::query(
            store,
            &VoteQuery {
                poll_id_in: Some(vec![poll_id]),
                ..Default::default()
            },
        )
        .await
    })
    .await
}

/// Reads the votes past the cache after a write and stores the result.
/// The limiter stays advisory here so a saved write is never reported as failed.
async fn reload_votes<S: Store>(store: &S, res: &Resilience, poll_id: Uuid) -> Result<Vec<RawVote>, Error> {
    res.cache().invalidate(&votes_key(poll_id));
    let votes = res
        .run(&retry_options(format!("getVotes_{}", poll_id)), move || async move {
            VoteCommon::query(
                store,
                &VoteQuery {
                    poll_id_in: Some(vec![poll_id]),
                },
            )
            .await
        })
        .await?;
    res.cache().put(votes_key(poll_id), votes.clone(), POLL_TTL);
    Ok(votes)
}

/// Best effort: `None` when the lookup was rate limited, failed or found nothing.
async fn creator_of<S: Store>(store: &S, res: &Resilience, id: Uuid) -> Option<Creator> {
    if !res.limiter().check(&format!("getCreator_{}", id), CREATOR_RATE_LIMIT, RATE_WINDOW) {
        warn!("creator lookup for {} skipped by rate limiter", id);
        return None;
    }
    match ProfileCommon::get(store, id).await {
        Ok(profile) => profile.as_ref().map(Creator::from),
        Err(e) => {
            warn!("failed to load creator {}: {}", id, e);
            None
        }
    }
}

async fn creator_or_fallback<S: Store>(store: &S, res: &Resilience, caller: &Caller) -> Creator {
    let creator = creator_of(store, res, caller.id).await.unwrap_or_default();
    Creator {
        name: creator.name.filter(|n| !n.is_empty()).or_else(|| Some(caller.fallback_name())),
        avatar_url: creator.avatar_url,
    }
}

async fn creators_of<S: Store>(store: &S, res: &Resilience, polls: &[RawPoll]) -> HashMap<Uuid, Creator> {
    let ids: Vec<Uuid> = polls.iter().map(|p| p.created_by).unique().collect();
    if ids.is_empty() || ids.len() > MAX_CREATOR_LOOKUP {
        return HashMap::new();
    }
    if !res.limiter().check("getCreators", CREATOR_RATE_LIMIT, RATE_WINDOW) {
        warn!("creator lookup for {} polls skipped by rate limiter", polls.len());
        return HashMap::new();
    }
    match ProfileCommon::get_many(store, &ids).await {
        Ok(profiles) => profiles.iter().map(|p| (p.id, Creator::from(p))).collect(),
        Err(e) => {
            warn!("failed to load poll creators: {}", e);
            HashMap::new()
        }
    }
}

fn assemble(polls: &[RawPoll], votes: Vec<RawVote>, creators: &HashMap<Uuid, Creator>) -> Vec<PollWithVotes> {
    let mut by_poll = votes.into_iter().into_group_map_by(|v| v.poll_id);
    polls
        .iter()
        .map(|p| {
            let votes = by_poll.remove(&p.id).unwrap_or_default();
            normalize_poll(p, &votes, creators.get(&p.created_by))
        })
        .collect()
}

async fn list_polls<S: Store>(store: &S, res: &Resilience, cache_key: &str, query: PollQuery, ttl: Duration) -> Result<Vec<PollWithVotes>, Error> {
    let query = &query;
    let polls = res
        .run(&retry_options(format!("list_{}", cache_key)).cache(cache_key, ttl), move || async move {
            PollCommon::query(store, query).await
        })
        .await?;
    if polls.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = polls.iter().map(|p| p.id).collect();
    let ids = &ids;
    let votes = res
        .run(
            &retry_options(format!("listVotes_{}", cache_key)).cache(format!("votes_list_{}", cache_key), POLL_TTL),
            move || async move {
                VoteCommon::query(
                    store,
                    &VoteQuery {
                        poll_id_in: Some(ids.clone()),
                        ..Default::default()
                    },
                )
                .await
            },
        )
        .await?;
    let creators = creators_of(store, res, &polls).await;
    Ok(assemble(&polls, votes, &creators))
}

fn or_empty(operation: &str, result: Result<Vec<PollWithVotes>, Error>) -> Vec<PollWithVotes> {
    result.unwrap_or_else(|e| {
        error!("{} failed, returning no polls: {}", operation, e);
        Vec::new()
    })
}

pub async fn create_poll<S: Store>(store: &S, res: &Resilience, caller: Option<&Caller>, data: PollCreate) -> Result<PollWithVotes, Error> {
    let caller = require_caller(caller)?;
    rules::ensure_option_count(data.options.len())?;
    let insert = PollInsert {
        options: serde_json::to_value(&data.options)?,
        title: data.title,
        question: data.question,
        description: data.description,
        created_at: Utc::now(),
        ends_at: data.ends_at,
        secret_voting: data.secret_voting,
        is_active: true,
        created_by: caller.id,
        image_url: data.image_url,
        is_private: data.is_private,
    };
    let insert = &insert;
    let poll = res
        .run(&retry_options(format!("createPoll_{}", caller.id)), move || async move {
            PollCommon::insert(store, insert.clone()).await
        })
        .await?;
    if poll.is_private.unwrap_or(false) {
        let poll_id = poll.id;
        for user_id in data.allowed_users.iter().copied().filter(|uid| *uid != caller.id).unique() {
            res.run(&retry_options(format!("grantAccess_{}", poll_id)), move || async move {
                AccessCommon::insert(store, poll_id, user_id).await
            })
            .await?;
        }
    }
    invalidate_lists(res);
    let creator = creator_or_fallback(store, res, caller).await;
    Ok(normalize_poll(&poll, &[], Some(&creator)))
}

/// Returns the poll whether or not it is private; pair it with
/// [`crate::core::services::access::check_poll_access`] or use [`fetch_poll`].
pub async fn get_poll<S: Store>(store: &S, res: &Resilience, id: Uuid) -> Result<PollWithVotes, Error> {
    let (poll, votes) = futures::try_join!(load_poll(store, res, id), load_votes(store, res, id))?;
    let creator = creator_of(store, res, poll.created_by).await;
    Ok(normalize_poll(&poll, &votes, creator.as_ref()))
}

/// Fetches and authorizes in one step, resolving the poll for `viewer`.
pub async fn fetch_poll<S: Store>(store: &S, res: &Resilience, viewer: Option<&Caller>, id: Uuid) -> Result<PollFetch, Error> {
    let poll = match get_poll(store, res, id).await {
        Ok(poll) => poll,
        Err(Error::NotFound(_)) => return Ok(PollFetch::NotFound),
        Err(e) => return Err(e),
    };
    let viewer_id = viewer.map(|c| c.id);
    let granted = match viewer_id {
        Some(uid) if poll.is_private && uid != poll.created_by => AccessCommon::is_granted(store, id, uid).await?,
        _ => false,
    };
    if !rules::has_access(poll.is_private, viewer_id, poll.created_by, granted) {
        return Ok(PollFetch::Denied);
    }
    Ok(PollFetch::Authorized(Box::new(PollView::new(poll, viewer_id, Utc::now()))))
}

/// Duplicate votes are rejected by the store's `(poll, user)` uniqueness,
/// which surfaces as [`Error::AlreadyVoted`].
pub async fn vote_poll<S: Store>(store: &S, res: &Resilience, caller: Option<&Caller>, poll_id: Uuid, option_index: i32) -> Result<PollWithVotes, Error> {
    let caller = require_caller(caller)?;
    let poll = load_poll(store, res, poll_id).await?;
    let state = PollState::at(poll.ends_at, Utc::now());
    rules::ensure_can_vote(state, option_index, normalize_options(poll.options.as_ref()).len())?;
    let user_id = caller.id;
    res.run(&retry_options(format!("addVote_{}_{}", user_id, poll_id)), move || async move {
        VoteCommon::insert(
            store,
            VoteInsert {
                poll_id,
                user_id,
                option_index,
                created_at: Utc::now(),
            },
        )
        .await
    })
    .await?;
    res.cache().invalidate_prefix("votes_list_");
    let votes = reload_votes(store, res, poll_id).await?;
    let creator = creator_of(store, res, poll.created_by).await;
    Ok(normalize_poll(&poll, &votes, creator.as_ref()))
}

pub async fn toggle_visibility<S: Store>(store: &S, res: &Resilience, caller: Option<&Caller>, poll_id: Uuid) -> Result<PollWithVotes, Error> {
    let caller = require_caller(caller)?;
    let poll = load_poll_fresh(store, res, poll_id).await?;
    rules::ensure_creator(caller.id, poll.created_by, "change the visibility of this poll")?;
    let secret_voting = !poll.secret_voting.unwrap_or(true);
    let updated = res
        .run(&retry_options(format!("toggleVisibility_{}", poll_id)), move || async move {
            PollCommon::update_secret_voting(store, poll_id, secret_voting).await
        })
        .await?;
    res.cache().invalidate(&poll_key(poll_id));
    invalidate_lists(res);
    let votes = reload_votes(store, res, poll_id).await?;
    let creator = creator_of(store, res, updated.created_by).await;
    Ok(normalize_poll(&updated, &votes, creator.as_ref()))
}

pub async fn get_user_polls<S: Store>(store: &S, res: &Resilience, caller: Option<&Caller>) -> Result<Vec<PollWithVotes>, Error> {
    let caller = require_caller(caller)?;
    let query = PollQuery {
        created_by_eq: Some(caller.id),
        ..Default::default()
    };
    let mut polls = or_empty("getUserPolls", list_polls(store, res, &format!("user_polls_{}", caller.id), query, POLL_TTL).await);
    let fallback = caller.fallback_name();
    for poll in polls.iter_mut().filter(|p| p.creator_name.is_empty()) {
        poll.creator_name = fallback.clone();
    }
    Ok(polls)
}

pub async fn get_all_polls<S: Store>(store: &S, res: &Resilience) -> Vec<PollWithVotes> {
    or_empty("getAllPolls", list_polls(store, res, ALL_POLLS, Default::default(), POLL_TTL).await)
}

/// Like [`get_public_polls`] but reports failures, for callers that keep
/// their own last-known-good copy.
pub async fn try_public_polls<S: Store>(store: &S, res: &Resilience) -> Result<Vec<PollWithVotes>, Error> {
    let query = PollQuery {
        is_private_eq: Some(false),
        ..Default::default()
    };
    list_polls(store, res, PUBLIC_POLLS, query, POLL_TTL).await
}

pub async fn get_public_polls<S: Store>(store: &S, res: &Resilience) -> Vec<PollWithVotes> {
    or_empty("getPublicPolls", try_public_polls(store, res).await)
}

/// A blank query matches nothing.
pub async fn search_polls<S: Store>(store: &S, res: &Resilience, query: &str) -> Vec<PollWithVotes> {
    let term = query.trim();
    if term.is_empty() {
        return Vec::new();
    }
    let filter = PollQuery {
        text_contains: Some(term.to_owned()),
        ..Default::default()
    };
    or_empty("searchPolls", list_polls(store, res, &format!("search_{}", term), filter, SEARCH_TTL).await)
}

/// Resolves listed polls for `viewer`: private polls they cannot see are
/// dropped and votes are hidden wherever results are. Failed grant lookups
/// count as no grant.
pub async fn visible_to<S: Store>(store: &S, viewer: Option<&Caller>, polls: Vec<PollWithVotes>) -> Vec<PollView> {
    let viewer_id = viewer.map(|c| c.id);
    let now = Utc::now();
    let mut views = Vec::with_capacity(polls.len());
    for poll in polls {
        let granted = match viewer_id {
            Some(uid) if poll.is_private && uid != poll.created_by => AccessCommon::is_granted(store, poll.id, uid).await.unwrap_or_else(|e| {
                warn!("grant lookup for poll {} failed, hiding it: {}", poll.id, e);
                false
            }),
            _ => false,
        };
        if rules::has_access(poll.is_private, viewer_id, poll.created_by, granted) {
            views.push(PollView::new(poll, viewer_id, now));
        }
    }
    views
}
