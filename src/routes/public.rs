use crate::{AppState, handlers::{account, posts, profile}};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Listings, post pages, profiles and the account gateway. Listings only ever show posts
/// that pass the publication rules; the post page additionally lets the author see their
/// own hidden post.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // --- Blog ---
        .route("/", get(posts::index))
        .route("/posts/{id}/", get(posts::post_detail))
        .route("/category/{slug}/", get(posts::category_posts))
        .route("/profile/{username}/", get(profile::profile))
        // --- Accounts ---
        .route(
            "/auth/registration/",
            get(account::registration_form).post(account::register),
        )
        .route("/auth/login/", get(account::login_form).post(account::login))
        .route("/auth/logout/", get(account::logout).post(account::logout))
}
