use log::warn;
use uuid::Uuid;

use crate::core::models::access::{AccessStatus, GrantOutcome};
use crate::core::models::poll::RawPoll;
use crate::core::models::profile::{Caller, Profile};
use crate::core::ports::repository::{AccessCommon, ProfileCommon, Store};
use crate::core::resilience::Resilience;
use crate::core::rules;
use crate::core::services::poll::{load_poll, load_poll_fresh, retry_options};
use crate::core::services::require_caller;
use crate::error::Error;

async fn owned_poll<S: Store>(store: &S, res: &Resilience, caller: Option<&Caller>, poll_id: Uuid, action: &str) -> Result<RawPoll, Error> {
    let caller = require_caller(caller)?;
    let poll = load_poll_fresh(store, res, poll_id).await?;
    rules::ensure_creator(caller.id, poll.created_by, action)?;
    Ok(poll)
}

/// Granting twice is not an error.
pub async fn add_user_to_poll<S: Store>(store: &S, res: &Resilience, caller: Option<&Caller>, poll_id: Uuid, user_id: Uuid) -> Result<GrantOutcome, Error> {
    owned_poll(store, res, caller, poll_id, "manage access to this poll").await?;
    let inserted = res
        .run(&retry_options(format!("grantAccess_{}", poll_id)), move || async move {
            AccessCommon::insert(store, poll_id, user_id).await
        })
        .await?;
    Ok(if inserted { GrantOutcome::Granted } else { GrantOutcome::AlreadyGranted })
}

pub async fn remove_user_from_poll<S: Store>(store: &S, res: &Resilience, caller: Option<&Caller>, poll_id: Uuid, user_id: Uuid) -> Result<(), Error> {
    owned_poll(store, res, caller, poll_id, "manage access to this poll").await?;
    res.run(&retry_options(format!("revokeAccess_{}", poll_id)), move || async move {
        AccessCommon::delete(store, poll_id, user_id).await
    })
    .await
}

/// Profiles of the users granted access. Public polls have no grant list.
pub async fn get_poll_access_users<S: Store>(store: &S, res: &Resilience, caller: Option<&Caller>, poll_id: Uuid) -> Result<Vec<Profile>, Error> {
    let poll = owned_poll(store, res, caller, poll_id, "view access to this poll").await?;
    if !poll.is_private.unwrap_or(false) {
        return Ok(Vec::new());
    }
    let user_ids = AccessCommon::list(store, poll_id).await?;
    if user_ids.is_empty() {
        return Ok(Vec::new());
    }
    ProfileCommon::get_many(store, &user_ids).await
}

async fn evaluate_access<S: Store>(store: &S, res: &Resilience, viewer: Option<&Caller>, poll_id: Uuid) -> Result<AccessStatus, Error> {
    let poll = load_poll(store, res, poll_id).await?;
    let is_private = poll.is_private.unwrap_or(false);
    let viewer_id = viewer.map(|c| c.id);
    let is_creator = viewer_id == Some(poll.created_by);
    let granted = match viewer_id {
        Some(uid) if is_private && !is_creator => AccessCommon::is_granted(store, poll_id, uid).await?,
        _ => false,
    };
    Ok(AccessStatus {
        has_access: rules::has_access(is_private, viewer_id, poll.created_by, granted),
        is_creator,
        is_private,
    })
}

/// Fails closed: any error while evaluating yields [`AccessStatus::denied`].
pub async fn check_poll_access<S: Store>(store: &S, res: &Resilience, viewer: Option<&Caller>, poll_id: Uuid) -> AccessStatus {
    match evaluate_access(store, res, viewer, poll_id).await {
        Ok(status) => status,
        Err(e) => {
            warn!("access check for poll {} failed, denying: {}", poll_id, e);
            AccessStatus::denied()
        }
    }
}
