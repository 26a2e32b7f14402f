use actix_web::web::{Data, Json, Path};
use uuid::Uuid;

use super::caller_of;
use crate::context::UserInfo;
use crate::core::models::access::GrantCreate;
use crate::core::models::profile::Profile;
use crate::core::ports::repository::Store;
use crate::core::resilience::Resilience;
use crate::core::services::access;
use crate::error::Error;
use crate::response::{List, Message};

pub async fn users<S: Store + 'static>(
    user: Option<UserInfo>,
    path: Path<(Uuid,)>,
    store: Data<S>,
    res: Data<Resilience>,
) -> Result<Json<List<Profile>>, Error> {
    let (poll_id,) = path.into_inner();
    let users = access::get_poll_access_users(store.get_ref(), &res, caller_of(user).as_ref(), poll_id).await?;
    Ok(Json(List::new(users)))
}

pub async fn grant<S: Store + 'static>(
    user: Option<UserInfo>,
    path: Path<(Uuid,)>,
    Json(GrantCreate { user_id }): Json<GrantCreate>,
    store: Data<S>,
    res: Data<Resilience>,
) -> Result<Json<Message>, Error> {
    let (poll_id,) = path.into_inner();
    let outcome = access::add_user_to_poll(store.get_ref(), &res, caller_of(user).as_ref(), poll_id, user_id).await?;
    Ok(Json(Message { message: outcome.message() }))
}

pub async fn revoke<S: Store + 'static>(
    user: Option<UserInfo>,
    path: Path<(Uuid, Uuid)>,
    store: Data<S>,
    res: Data<Resilience>,
) -> Result<Json<Message>, Error> {
    let (poll_id, user_id) = path.into_inner();
    access::remove_user_from_poll(store.get_ref(), &res, caller_of(user).as_ref(), poll_id, user_id).await?;
    Ok(Json(Message {
        message: "User access removed from this poll",
    }))
}
