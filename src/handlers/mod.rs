pub mod access;
pub mod content;
pub mod poll;
pub mod profile;
pub mod upload;

use actix_web::{
    cookie::{time::OffsetDateTime, Cookie, CookieBuilder},
    http::StatusCode,
    web::{Data, Json},
    HttpResponse, HttpResponseBuilder,
};
use chrono::{Duration, Utc};

use crate::context::UserInfo;
use crate::core::models::profile::{Caller, Login, Profile, Signup};
use crate::core::ports::repository::Store;
use crate::core::ports::tokener::Tokener;
use crate::core::services::profile::{authenticate, signup as register};
use crate::error::Error;
use crate::impls::tokener::jwt::JWT;
use crate::middlewares::jwt::{Claim, JWT_TOKEN};
use crate::response::Session;

const SESSION_DAYS: i64 = 30;

pub(crate) fn caller_of(user: Option<UserInfo>) -> Option<Caller> {
    user.map(|u| u.caller())
}

pub async fn login<S: Store + 'static>(Json(login): Json<Login>, store: Data<S>, tokener: Data<JWT>) -> Result<HttpResponse, Error> {
    let caller = authenticate(store.get_ref(), login).await?;
    let claim = Claim {
        user: caller.id.to_string(),
        email: caller.email,
        exp: (Utc::now() + Duration::days(SESSION_DAYS)).timestamp(),
    };
    let token = tokener.gen_token(&claim)?;
    Ok(HttpResponse::build(StatusCode::OK)
        .cookie(Cookie::build(JWT_TOKEN, token.clone()).path("/").http_only(true).finish())
        .json(Session { id: caller.id, token }))
}

pub async fn signup<S: Store + 'static>(Json(form): Json<Signup>, store: Data<S>) -> Result<Json<Profile>, Error> {
    let profile = register(store.get_ref(), form).await?;
    Ok(Json(profile))
}

pub async fn logout() -> HttpResponse {
    HttpResponseBuilder::new(StatusCode::OK)
        .cookie(CookieBuilder::new(JWT_TOKEN, "").path("/").expires(OffsetDateTime::now_utc()).finish())
        .finish()
}
