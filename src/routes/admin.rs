use crate::{AppState, handlers::admin};
use axum::{Router, routing::{get, post}};

/// Admin Router Module
///
/// Staff management of the category and location dictionaries and post moderation.
/// Mounted under `/admin` behind the authentication layer; non-staff users get 403.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/categories/",
            get(admin::list_categories).post(admin::create_category),
        )
        // Posts in a deleted category are kept without one.
        .route("/categories/{id}/delete/", post(admin::delete_category))
        .route(
            "/locations/",
            get(admin::list_locations).post(admin::create_location),
        )
        .route("/locations/{id}/delete/", post(admin::delete_location))
        // Publish or hide any post, the flag the author's form doesn't expose.
        .route("/posts/{id}/visibility/", post(admin::set_post_visibility))
}
