use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use actix_web::{
    dev::{Service, ServiceRequest, Transform},
    error::ErrorUnauthorized,
    http::header::AUTHORIZATION,
    Error, HttpMessage,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::UserInfo;
use crate::core::ports::tokener::{Payload, Tokener};
use crate::impls::tokener::jwt::JWT;

pub static JWT_TOKEN: &str = "JWT_TOKEN";

#[derive(Debug, Deserialize, Serialize)]
pub struct Claim {
    pub user: String,
    pub email: String,
    pub exp: i64,
}

impl Payload for Claim {
    fn user(&self) -> &str {
        &self.user
    }

    fn email(&self) -> &str {
        &self.email
    }
}

/// Attaches a [`UserInfo`] when the request carries a valid token, either as
/// `Authorization: Bearer <token>` or in the `JWT_TOKEN` cookie. Requests
/// without a token pass through anonymously; a bad token is rejected.
pub(crate) struct JWTMiddleware {
    secret: Vec<u8>,
}

impl JWTMiddleware {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }
}

impl<S> Transform<S, ServiceRequest> for JWTMiddleware
where
    S: Service<ServiceRequest> + 'static,
    S::Future: 'static,
    S::Error: Into<Error>,
{
    type Error = Error;
    type Response = S::Response;
    type Transform = JWTService<S>;
    type InitError = ();
    type Future = Pin<Box<dyn Future<Output = Result<Self::Transform, Self::InitError>>>>;
    fn new_transform(&self, service: S) -> Self::Future {
        let tokener = Rc::new(JWT::new(&self.secret));
        Box::pin(async move {
            Ok(JWTService {
                tokener,
                next_service: service,
            })
        })
    }
}

pub struct JWTService<S> {
    tokener: Rc<JWT>,
    next_service: S,
}

fn token_of(req: &ServiceRequest) -> Result<Option<String>, Error> {
    if let Some(header) = req.headers().get(AUTHORIZATION) {
        let value = header.to_str().map_err(ErrorUnauthorized)?.trim();
        let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
        return Ok(Some(token.to_owned()));
    }
    Ok(req.cookie(JWT_TOKEN).map(|c| c.value().to_owned()).filter(|t| !t.is_empty()))
}

fn user_of(tokener: &JWT, token: &str) -> Result<UserInfo, Error> {
    let claim = Tokener::<Claim>::verify_token(tokener, token).map_err(ErrorUnauthorized)?;
    let id = claim.user.parse::<Uuid>().map_err(ErrorUnauthorized)?;
    Ok(UserInfo { id, email: claim.email })
}

impl<S> Service<ServiceRequest> for JWTService<S>
where
    S: Service<ServiceRequest>,
    S::Future: 'static,
    S::Error: Into<Error>,
{
    type Response = S::Response;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;
    fn poll_ready(&self, ctx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        self.next_service.poll_ready(ctx).map_err(|e| e.into())
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        match token_of(&req).and_then(|token| token.map(|t| user_of(&self.tokener, &t)).transpose()) {
            Err(e) => return Box::pin(async move { Err(e) }),
            Ok(Some(user)) => {
                req.extensions_mut().insert(user);
            }
            Ok(None) => {}
        }

        let res_fut = self.next_service.call(req);
        Box::pin(async move {
            let resp = res_fut.await.map_err(|e| e.into())?;
            Ok(resp)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use actix_web::{http::StatusCode, test, web, App, HttpResponse};

    const SECRET: &[u8] = b"test-secret";

    async fn whoami(user: Option<UserInfo>) -> HttpResponse {
        match user {
            Some(u) => HttpResponse::Ok().body(u.email),
            None => HttpResponse::Ok().body("anonymous"),
        }
    }

    fn token() -> String {
        let claim = Claim {
            user: Uuid::new_v4().to_string(),
            email: "ada@example.com".into(),
            exp: chrono::Utc::now().timestamp() + 3600,
        };
        JWT::new(SECRET).gen_token(&claim).unwrap()
    }

    #[actix_web::test]
    async fn test_optional_authentication() {
        let app = test::init_service(App::new().wrap(JWTMiddleware::new(SECRET.to_vec())).route("/", web::get().to(whoami))).await;

        let body = test::call_and_read_body(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(body, "anonymous");

        let req = test::TestRequest::get().uri("/").insert_header((AUTHORIZATION, format!("Bearer {}", token()))).to_request();
        assert_eq!(test::call_and_read_body(&app, req).await, "ada@example.com");

        let req = test::TestRequest::get().uri("/").cookie(actix_web::cookie::Cookie::new(JWT_TOKEN, token())).to_request();
        assert_eq!(test::call_and_read_body(&app, req).await, "ada@example.com");
    }

    #[actix_web::test]
    async fn test_invalid_token_is_rejected() {
        let app = test::init_service(App::new().wrap(JWTMiddleware::new(SECRET.to_vec())).route("/", web::get().to(whoami))).await;
        let req = test::TestRequest::get().uri("/").insert_header((AUTHORIZATION, "Bearer nonsense")).to_request();
        let err = test::try_call_service(&app, req).await.err().unwrap();
        assert_eq!(err.as_response_error().status_code(), StatusCode::UNAUTHORIZED);
    }
}
