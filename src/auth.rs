use std::convert::Infallible;

use axum::{
    extract::{FromRef, FromRequestParts, OriginalUri},
    http::{HeaderMap, header, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tower_cookies::{
    Cookie, Cookies,
    cookie::{SameSite, time},
};

use crate::{
    config::{AppConfig, Env},
    errors::AppResult,
    repository::RepositoryState,
};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "blogicum_session";

/// Claims
///
/// Payload of the signed session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's id.
    pub sub: i64,
    /// Expiration time (seconds since epoch). Checked on every request.
    pub exp: usize,
    /// Issued at.
    pub iat: usize,
}

/// AuthUser
///
/// The resolved identity of a logged-in request. Handlers that take it as an argument are
/// login-only: anonymous visitors are redirected to the login page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub is_staff: bool,
}

/// MaybeAuthUser
///
/// Optional identity for pages that anonymous visitors can see but that render differently
/// for a logged-in user (the author bypass on the post detail page, the navigation bar).
#[derive(Debug, Clone, Default)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl MaybeAuthUser {
    pub fn id(&self) -> Option<i64> {
        self.0.as_ref().map(|user| user.id)
    }
}

/// AuthRedirect
///
/// Rejection of [`AuthUser`]: a redirect to the login page that returns to `next` afterwards.
#[derive(Debug)]
pub struct AuthRedirect {
    next: Option<String>,
}

impl IntoResponse for AuthRedirect {
    fn into_response(self) -> Response {
        match self.next {
            Some(next) => Redirect::to(&format!("/auth/login/?next={}", next)).into_response(),
            None => Redirect::to("/auth/login/").into_response(),
        }
    }
}

/// Only plain paths are echoed back into the login URL, which also keeps it free of
/// characters that would need escaping. Nested routers see a stripped URI, so the path is
/// taken from `OriginalUri` when the router recorded it.
fn login_next(parts: &Parts) -> Option<String> {
    let path = parts
        .extensions
        .get::<OriginalUri>()
        .map(|original| original.0.path())
        .unwrap_or_else(|| parts.uri.path());
    let plain = path.starts_with('/')
        && !path.starts_with("//")
        && path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.'));
    plain.then(|| path.to_string())
}

/// Reads the token from an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Reads the session token from a bearer header or, failing that, the session cookie.
fn session_token(parts: &Parts) -> Option<String> {
    bearer_token(&parts.headers).or_else(|| {
        parts
            .extensions
            .get::<Cookies>()
            .and_then(|cookies| cookies.get(SESSION_COOKIE))
            .map(|cookie| cookie.value().to_string())
            .filter(|token| !token.is_empty())
    })
}

/// AuthUser Extractor Implementation
///
/// 1. Resolved: behind the login layer the user is already in the request extensions.
/// 2. Local bypass: in `Env::Local` an `x-user-id` header naming an existing user logs the
///    request in as that user.
/// 3. Token: bearer header or session cookie, HS256-signed with `session_secret`, expiry
///    enforced.
/// 4. Lookup: the user must still exist, so deleted accounts lose access immediately.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AuthRedirect;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);
        let reject = || AuthRedirect {
            next: login_next(parts),
        };

        if config.env == Env::Local {
            if let Some(user_id) = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<i64>().ok())
            {
                if let Ok(Some(user)) = repo.get_user(user_id).await {
                    return Ok(AuthUser {
                        id: user.id,
                        username: user.username,
                        is_staff: user.is_staff,
                    });
                }
            }
        }

        let token = session_token(parts).ok_or_else(reject)?;
        let claims = decode_token(&token, &config.session_secret).ok_or_else(reject)?;

        match repo.get_user(claims.sub).await {
            Ok(Some(user)) => Ok(AuthUser {
                id: user.id,
                username: user.username,
                is_staff: user.is_staff,
            }),
            Ok(None) => Err(reject()),
            Err(e) => {
                tracing::error!("session user lookup failed: {:?}", e);
                Err(reject())
            }
        }
    }
}

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthUser(
            AuthUser::from_request_parts(parts, state).await.ok(),
        ))
    }
}

// --- Tokens, passwords and cookies ---

/// Signs a session token for `user_id` valid for `ttl_hours`.
pub fn issue_token(user_id: i64, secret: &str, ttl_hours: i64) -> AppResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        iat: now.timestamp() as usize,
        exp: (now + Duration::hours(ttl_hours)).timestamp() as usize,
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

/// Validates signature and expiry. Any failure reads as "not logged in".
pub fn decode_token(token: &str, secret: &str) -> Option<Claims> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    match decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation) {
        Ok(data) => Some(data.claims),
        Err(e) => {
            tracing::debug!("rejected session token: {:?}", e.kind());
            None
        }
    }
}

pub fn hash_password(password: &str, cost: u32) -> AppResult<String> {
    Ok(bcrypt::hash(password, cost)?)
}

/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Session cookie carrying `token`, expiring together with it.
pub fn session_cookie(token: String, ttl_hours: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::hours(ttl_hours))
        .secure(secure)
        .build()
}

/// Cookie matching the session cookie's name and path, for removal.
pub fn expired_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}
