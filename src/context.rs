use actix_web::{dev::Payload, error::ErrorUnauthorized, Error, FromRequest, HttpMessage, HttpRequest};
use std::future::{ready, Ready};
use uuid::Uuid;

use crate::core::models::profile::Caller;

/// Identity attached by [`crate::middlewares::jwt::JWTMiddleware`].
/// Take `Option<UserInfo>` where anonymous callers are allowed.
#[derive(Debug, Clone)]
pub struct UserInfo {
    pub id: Uuid,
    pub email: String,
}

impl UserInfo {
    pub fn caller(&self) -> Caller {
        Caller {
            id: self.id,
            email: self.email.clone(),
        }
    }
}

impl FromRequest for UserInfo {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;
    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        if let Some(user) = req.extensions().get::<Self>() {
            ready(Ok(user.clone()))
        } else {
            ready(Err(ErrorUnauthorized("not authenticated")))
        }
    }
}
