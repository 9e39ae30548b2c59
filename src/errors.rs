use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

const NOT_FOUND_PAGE: &str = include_str!("../templates/errors/404.html");
const FORBIDDEN_PAGE: &str = include_str!("../templates/errors/403.html");
const BAD_REQUEST_PAGE: &str = include_str!("../templates/errors/400.html");
const SERVER_ERROR_PAGE: &str = include_str!("../templates/errors/500.html");

/// AppError
///
/// Everything a handler can fail with. Missing records and permission failures map to their
/// own pages; infrastructure failures are logged and shown as a generic 500 page so no
/// internal detail reaches the browser.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("template error: {0}")]
    Template(#[from] tera::Error),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("password hashing error: {0}")]
    Password(#[from] bcrypt::BcryptError),
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("bad request: {0}")]
    BadRequest(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, Html(NOT_FOUND_PAGE)).into_response(),
            AppError::Forbidden => (StatusCode::FORBIDDEN, Html(FORBIDDEN_PAGE)).into_response(),
            AppError::BadRequest(msg) => {
                tracing::warn!("Rejected request: {}", msg);
                (StatusCode::BAD_REQUEST, Html(BAD_REQUEST_PAGE)).into_response()
            }
            other => {
                error!("Internal error: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, Html(SERVER_ERROR_PAGE)).into_response()
            }
        }
    }
}

/// Turns a missing row into a 404.
pub trait OrNotFound<T> {
    fn or_not_found(self) -> AppResult<T>;
}

impl<T> OrNotFound<T> for Option<T> {
    fn or_not_found(self) -> AppResult<T> {
        self.ok_or(AppError::NotFound)
    }
}
