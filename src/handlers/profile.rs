use axum::{
    Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::{paginate_posts, public_filter};
use crate::{
    AppState,
    auth::{AuthUser, MaybeAuthUser},
    errors::{AppResult, OrNotFound},
    forms::{FormErrors, ProfileForm, validate_form},
    pagination::PageQuery,
};

/// profile
///
/// GET /profile/{username}/ : the user's card and their publicly visible posts. The owner
/// sees the same listing as everyone else.
pub async fn profile(
    viewer: MaybeAuthUser,
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let profile = state
        .repo
        .get_user_by_username(&username)
        .await?
        .or_not_found()?;
    let filter = public_filter().by_author(profile.id);
    let page_obj = paginate_posts(&state, &filter, &query).await?;
    let is_owner = viewer.id() == Some(profile.id);
    let html = state.templates.render(
        "blog/profile.html",
        &json!({
            "user": viewer.0,
            "profile": profile,
            "display_name": profile.display_name(),
            "is_owner": is_owner,
            "page_obj": page_obj,
        }),
    )?;
    Ok(html.into_response())
}

/// edit_profile_form
///
/// GET /edit_profile/
pub async fn edit_profile_form(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Response> {
    let account = state.repo.get_user(user.id).await?.or_not_found()?;
    let form = ProfileForm {
        email: account.email,
        first_name: account.first_name,
        last_name: account.last_name,
    };
    render_profile_form(&state, &user, &form, &FormErrors::default(), false)
}

/// edit_profile
///
/// POST /edit_profile/ : saves the names and email and shows the form again with a notice.
pub async fn edit_profile(
    user: AuthUser,
    State(state): State<AppState>,
    Form(mut form): Form<ProfileForm>,
) -> AppResult<Response> {
    form.normalize();
    let errors = validate_form(&form);
    if !errors.is_empty() {
        return render_profile_form(&state, &user, &form, &errors, false);
    }

    state
        .repo
        .update_profile(user.id, form.clone().into_update())
        .await?
        .or_not_found()?;
    tracing::info!("User {} updated their profile", user.id);
    render_profile_form(&state, &user, &form, &FormErrors::default(), true)
}

fn render_profile_form(
    state: &AppState,
    user: &AuthUser,
    form: &ProfileForm,
    errors: &FormErrors,
    saved: bool,
) -> AppResult<Response> {
    let html = state.templates.render(
        "blog/user.html",
        &json!({ "user": user, "form": form, "errors": errors, "saved": saved }),
    )?;
    Ok(html.into_response())
}
