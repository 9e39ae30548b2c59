//! Staff-only management of categories, locations and post publication.
//!
//! The routes sit behind the login layer; the staff check happens here, per handler, and
//! answers 403 for everyone else.

use axum::{
    Form,
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;

use super::to_post_detail;
use crate::{
    AppState,
    auth::AuthUser,
    errors::{AppError, AppResult, OrNotFound},
    forms::{CategoryForm, FormErrors, LocationForm, PostVisibilityForm, validate_form},
    repository::is_unique_violation,
};

const DUPLICATE_SLUG: &str = "Category with this slug already exists.";

fn require_staff(user: &AuthUser) -> AppResult<()> {
    if user.is_staff {
        Ok(())
    } else {
        tracing::warn!("User {} denied access to staff pages", user.id);
        Err(AppError::Forbidden)
    }
}

// --- Categories ---

async fn render_categories(
    state: &AppState,
    user: &AuthUser,
    form: &CategoryForm,
    errors: &FormErrors,
) -> AppResult<Response> {
    let categories = state.repo.list_categories().await?;
    let html = state.templates.render(
        "admin/categories.html",
        &json!({ "user": user, "categories": categories, "form": form, "errors": errors }),
    )?;
    Ok(html.into_response())
}

/// list_categories
///
/// GET /admin/categories/
pub async fn list_categories(user: AuthUser, State(state): State<AppState>) -> AppResult<Response> {
    require_staff(&user)?;
    render_categories(&state, &user, &CategoryForm::default(), &FormErrors::default()).await
}

/// create_category
///
/// POST /admin/categories/ : the slug must be unique.
pub async fn create_category(
    user: AuthUser,
    State(state): State<AppState>,
    Form(mut form): Form<CategoryForm>,
) -> AppResult<Response> {
    require_staff(&user)?;
    form.normalize();
    let mut errors = validate_form(&form);
    if !errors.has("slug") && state.repo.get_category_by_slug(&form.slug).await?.is_some() {
        errors.add("slug", DUPLICATE_SLUG);
    }
    if !errors.is_empty() {
        return render_categories(&state, &user, &form, &errors).await;
    }

    let category = match state.repo.create_category(form.clone().into_new()).await {
        Ok(category) => category,
        Err(e) if is_unique_violation(&e) => {
            errors.add("slug", DUPLICATE_SLUG);
            return render_categories(&state, &user, &form, &errors).await;
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!("Staff {} created category {} ({})", user.id, category.slug, category.id);
    Ok(Redirect::to("/admin/categories/").into_response())
}

/// delete_category
///
/// POST /admin/categories/{id}/delete/ : posts in the category stay, uncategorized.
pub async fn delete_category(
    user: AuthUser,
    State(state): State<AppState>,
    Path(category_id): Path<i64>,
) -> AppResult<Response> {
    require_staff(&user)?;
    if !state.repo.delete_category(category_id).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!("Staff {} deleted category {}", user.id, category_id);
    Ok(Redirect::to("/admin/categories/").into_response())
}

// --- Locations ---

async fn render_locations(
    state: &AppState,
    user: &AuthUser,
    form: &LocationForm,
    errors: &FormErrors,
) -> AppResult<Response> {
    let locations = state.repo.list_locations().await?;
    let html = state.templates.render(
        "admin/locations.html",
        &json!({ "user": user, "locations": locations, "form": form, "errors": errors }),
    )?;
    Ok(html.into_response())
}

/// list_locations
///
/// GET /admin/locations/
pub async fn list_locations(user: AuthUser, State(state): State<AppState>) -> AppResult<Response> {
    require_staff(&user)?;
    render_locations(&state, &user, &LocationForm::default(), &FormErrors::default()).await
}

/// create_location
///
/// POST /admin/locations/
pub async fn create_location(
    user: AuthUser,
    State(state): State<AppState>,
    Form(mut form): Form<LocationForm>,
) -> AppResult<Response> {
    require_staff(&user)?;
    form.normalize();
    let errors = validate_form(&form);
    if !errors.is_empty() {
        return render_locations(&state, &user, &form, &errors).await;
    }

    let location = state.repo.create_location(form.into_new()).await?;
    tracing::info!("Staff {} created location {}", user.id, location.id);
    Ok(Redirect::to("/admin/locations/").into_response())
}

/// delete_location
///
/// POST /admin/locations/{id}/delete/
pub async fn delete_location(
    user: AuthUser,
    State(state): State<AppState>,
    Path(location_id): Path<i64>,
) -> AppResult<Response> {
    require_staff(&user)?;
    if !state.repo.delete_location(location_id).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!("Staff {} deleted location {}", user.id, location_id);
    Ok(Redirect::to("/admin/locations/").into_response())
}

// --- Posts ---

/// set_post_visibility
///
/// POST /admin/posts/{id}/visibility/ : publishes or hides any post.
pub async fn set_post_visibility(
    user: AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Form(form): Form<PostVisibilityForm>,
) -> AppResult<Response> {
    require_staff(&user)?;
    let post = state.repo.get_post(post_id).await?.or_not_found()?;
    let is_published = form.is_published();
    state.repo.set_post_published(post.id, is_published).await?;
    tracing::info!(
        "Staff {} set post {} published={}",
        user.id,
        post.id,
        is_published
    );
    Ok(to_post_detail(post.id).into_response())
}
