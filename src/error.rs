use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use dotenv::Error as DotError;
use jsonwebtoken::errors::Error as JsonWebTokenError;
use serde_json::json;
use thiserror::Error as ThisError;

// SQLSTATE codes the store adapter cares about.
const TOO_MANY_CONNECTIONS: &str = "53300";

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("not authenticated")]
    Unauthenticated,

    #[error("not authorized to {0}")]
    Unauthorized(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("poll has ended")]
    PollEnded,

    #[error("you have already voted")]
    AlreadyVoted,

    #[error("bussiness error: {0}")]
    BusinessError(String),

    #[error("too many requests")]
    TooManyRequests,

    #[error("rate limit exceeded, please try again later")]
    RateLimitExceeded,

    #[error("request timed out")]
    Timeout,

    #[error("database error: {0}")]
    DatabaseError(sqlx::Error),

    #[error("jwt error")]
    JWTError(#[from] JsonWebTokenError),

    #[error("dotenv error")]
    DotEnvError(#[from] DotError),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("http client error: {0}")]
    HttpClientError(#[from] reqwest::Error),

    #[error("multipart error: {0}")]
    MultipartError(#[from] actix_multipart::MultipartError),

    #[error("http error")]
    ActixError(#[from] actix_web::error::Error),

    #[error("server error: {0}")]
    ServerError(String),
}

impl Error {
    /// Whether the external service asked us to slow down. Only these errors
    /// are retried by [`crate::core::resilience::Resilience::run`].
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::TooManyRequests)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut => Error::TooManyRequests,
            sqlx::Error::Database(db) if db.code().as_deref() == Some(TOO_MANY_CONNECTIONS) => Error::TooManyRequests,
            _ => Error::DatabaseError(err),
        }
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated | Error::JWTError(_) => StatusCode::UNAUTHORIZED,
            Error::Unauthorized(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::PollEnded | Error::AlreadyVoted => StatusCode::CONFLICT,
            Error::BusinessError(_) | Error::MultipartError(_) => StatusCode::BAD_REQUEST,
            Error::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Error::TooManyRequests => StatusCode::SERVICE_UNAVAILABLE,
            Error::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Error::ActixError(e) => e.as_response_error().status_code(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}
