use actix_web::web::{Data, Json, Path, Query};
use uuid::Uuid;

use super::caller_of;
use crate::context::UserInfo;
use crate::core::models::profile::{Patch, Profile};
use crate::core::ports::repository::Store;
use crate::core::services::profile;
use crate::error::Error;
use crate::request::Search;
use crate::response::List;

pub async fn search<S: Store + 'static>(user: Option<UserInfo>, Query(Search { q }): Query<Search>, store: Data<S>) -> Result<Json<List<Profile>>, Error> {
    let users = profile::search_users(store.get_ref(), caller_of(user).as_ref(), &q).await?;
    Ok(Json(List::new(users)))
}

pub async fn detail<S: Store + 'static>(path: Path<(Uuid,)>, store: Data<S>) -> Result<Json<Profile>, Error> {
    let (id,) = path.into_inner();
    Ok(Json(profile::get_profile(store.get_ref(), id).await?))
}

pub async fn update<S: Store + 'static>(user: Option<UserInfo>, Json(patch): Json<Patch>, store: Data<S>) -> Result<Json<Profile>, Error> {
    Ok(Json(profile::update_profile(store.get_ref(), caller_of(user).as_ref(), patch).await?))
}
