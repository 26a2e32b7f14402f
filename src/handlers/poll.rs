use actix_web::{
    http::StatusCode,
    web::{Data, Json, Path, Query},
    HttpResponse,
};
use serde_json::json;
use uuid::Uuid;

use super::caller_of;
use crate::context::UserInfo;
use crate::core::freshness::Refresher;
use crate::core::models::access::AccessStatus;
use crate::core::models::poll::{PollCreate, PollFetch, PollView, PollWithVotes};
use crate::core::models::vote::Submit;
use crate::core::ports::repository::Store;
use crate::core::resilience::Resilience;
use crate::core::services::{access, poll};
use crate::error::Error;
use crate::request::Search;
use crate::response::List;

/// Server-side snapshot of the public polls, kept fresh in the background.
pub type Feed = Refresher<Vec<PollWithVotes>>;

pub async fn list<S: Store + 'static>(user: Option<UserInfo>, store: Data<S>, res: Data<Resilience>) -> Json<List<PollView>> {
    let polls = poll::get_all_polls(store.get_ref(), &res).await;
    Json(List::new(poll::visible_to(store.get_ref(), caller_of(user).as_ref(), polls).await))
}

pub async fn public<S: Store + 'static>(user: Option<UserInfo>, store: Data<S>, res: Data<Resilience>) -> Json<List<PollView>> {
    let polls = poll::get_public_polls(store.get_ref(), &res).await;
    Json(List::new(poll::visible_to(store.get_ref(), caller_of(user).as_ref(), polls).await))
}

pub async fn search<S: Store + 'static>(
    user: Option<UserInfo>,
    Query(Search { q }): Query<Search>,
    store: Data<S>,
    res: Data<Resilience>,
) -> Json<List<PollView>> {
    let polls = poll::search_polls(store.get_ref(), &res, &q).await;
    Json(List::new(poll::visible_to(store.get_ref(), caller_of(user).as_ref(), polls).await))
}

pub async fn mine<S: Store + 'static>(user: Option<UserInfo>, store: Data<S>, res: Data<Resilience>) -> Result<Json<List<PollView>>, Error> {
    let caller = caller_of(user);
    let polls = poll::get_user_polls(store.get_ref(), &res, caller.as_ref()).await?;
    Ok(Json(List::new(poll::visible_to(store.get_ref(), caller.as_ref(), polls).await)))
}

pub async fn feed<S: Store + 'static>(user: Option<UserInfo>, feed: Data<Feed>, store: Data<S>) -> HttpResponse {
    match (feed.current(), feed.error()) {
        (Some(polls), _) => HttpResponse::Ok().json(List::new(poll::visible_to(store.get_ref(), caller_of(user).as_ref(), polls).await)),
        (None, Some(error)) => HttpResponse::build(StatusCode::SERVICE_UNAVAILABLE).json(json!({ "error": error })),
        (None, None) => HttpResponse::build(StatusCode::SERVICE_UNAVAILABLE).json(json!({ "error": "feed is loading" })),
    }
}

pub async fn create<S: Store + 'static>(
    user: Option<UserInfo>,
    Json(form): Json<PollCreate>,
    store: Data<S>,
    res: Data<Resilience>,
) -> Result<HttpResponse, Error> {
    let poll = poll::create_poll(store.get_ref(), &res, caller_of(user).as_ref(), form).await?;
    Ok(HttpResponse::Created().json(poll))
}

pub async fn detail<S: Store + 'static>(
    user: Option<UserInfo>,
    path: Path<(Uuid,)>,
    store: Data<S>,
    res: Data<Resilience>,
) -> Result<Json<PollView>, Error> {
    let (poll_id,) = path.into_inner();
    match poll::fetch_poll(store.get_ref(), &res, caller_of(user).as_ref(), poll_id).await? {
        PollFetch::Authorized(view) => Ok(Json(*view)),
        PollFetch::Denied => Err(Error::Unauthorized("view this poll".into())),
        PollFetch::NotFound => Err(Error::NotFound("poll".into())),
    }
}

pub async fn vote<S: Store + 'static>(
    user: Option<UserInfo>,
    path: Path<(Uuid,)>,
    Json(Submit { option_index }): Json<Submit>,
    store: Data<S>,
    res: Data<Resilience>,
) -> Result<Json<PollWithVotes>, Error> {
    let (poll_id,) = path.into_inner();
    let poll = poll::vote_poll(store.get_ref(), &res, caller_of(user).as_ref(), poll_id, option_index).await?;
    Ok(Json(poll))
}

pub async fn toggle_visibility<S: Store + 'static>(
    user: Option<UserInfo>,
    path: Path<(Uuid,)>,
    store: Data<S>,
    res: Data<Resilience>,
) -> Result<Json<PollWithVotes>, Error> {
    let (poll_id,) = path.into_inner();
    let poll = poll::toggle_visibility(store.get_ref(), &res, caller_of(user).as_ref(), poll_id).await?;
    Ok(Json(poll))
}

pub async fn check_access<S: Store + 'static>(
    user: Option<UserInfo>,
    path: Path<(Uuid,)>,
    store: Data<S>,
    res: Data<Resilience>,
) -> Json<AccessStatus> {
    let (poll_id,) = path.into_inner();
    Json(access::check_poll_access(store.get_ref(), &res, caller_of(user).as_ref(), poll_id).await)
}
