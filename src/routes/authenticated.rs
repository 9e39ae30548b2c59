use crate::{AppState, handlers::{comments, posts, profile}};
use axum::{Router, routing::{get, post}};

/// Authenticated Router Module
///
/// Writing posts and comments and editing one's own profile. Anonymous visitors never reach
/// these handlers: the authentication layer sends them to the login page first. Owner checks
/// for edits and deletes happen in the handlers.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/edit_profile/", get(profile::edit_profile_form).post(profile::edit_profile))
        // --- Posts ---
        .route("/posts/create/", get(posts::create_post_form).post(posts::create_post))
        .route("/posts/{id}/edit/", get(posts::edit_post_form).post(posts::edit_post))
        .route("/posts/{id}/delete/", get(posts::delete_post_form).post(posts::delete_post))
        // --- Comments ---
        .route("/posts/{id}/add_comment/", post(comments::add_comment))
        .route(
            "/posts/{id}/edit_comment/{comment_id}/",
            get(comments::edit_comment_form).post(comments::edit_comment),
        )
        .route(
            "/posts/{id}/delete_comment/{comment_id}/",
            get(comments::delete_comment_form).post(comments::delete_comment),
        )
}
