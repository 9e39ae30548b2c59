use axum::{
    Form,
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde_json::json;

use super::{PostView, to_post_detail};
use crate::{
    AppState,
    auth::AuthUser,
    errors::{AppError, AppResult, OrNotFound},
    forms::{CommentForm, FormErrors, validate_form},
    models::{Comment, Post},
    visibility::can_view,
};

/// A post the user may see, or 404.
async fn visible_post(state: &AppState, user: &AuthUser, post_id: i64) -> AppResult<Post> {
    let post = state.repo.get_post(post_id).await?.or_not_found()?;
    if can_view(&post, Some(user.id), Utc::now()) {
        Ok(post)
    } else {
        Err(AppError::NotFound)
    }
}

/// Loads a comment of `post_id` for an owner-only page. `Err` carries the redirect for
/// anybody but its author.
async fn owned_comment(
    state: &AppState,
    user: &AuthUser,
    post_id: i64,
    comment_id: i64,
) -> AppResult<Result<Comment, Redirect>> {
    let comment = state
        .repo
        .get_comment(post_id, comment_id)
        .await?
        .or_not_found()?;
    if comment.author_id != user.id {
        tracing::warn!(
            "User {} tried to modify comment {} owned by {}",
            user.id,
            comment.id,
            comment.author_id
        );
        return Ok(Err(to_post_detail(post_id)));
    }
    Ok(Ok(comment))
}

fn render_comment_page(
    state: &AppState,
    user: &AuthUser,
    mode: &str,
    comment: &Comment,
    form: &CommentForm,
    errors: &FormErrors,
) -> AppResult<Response> {
    let html = state.templates.render(
        "blog/comment.html",
        &json!({
            "user": user,
            "mode": mode,
            "comment": comment,
            "form": form,
            "errors": errors,
        }),
    )?;
    Ok(html.into_response())
}

/// add_comment
///
/// POST /posts/{id}/add_comment/ : appends a comment and returns to the post. An empty comment
/// re-renders the post page with the error.
pub async fn add_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Form(mut form): Form<CommentForm>,
) -> AppResult<Response> {
    let post = visible_post(&state, &user, post_id).await?;
    form.normalize();
    let errors = validate_form(&form);
    if !errors.is_empty() {
        let comments = state.repo.list_comments(post.id).await?;
        let html = state.templates.render(
            "blog/detail.html",
            &json!({
                "user": user,
                "post": PostView::new(post, &state),
                "comments": comments,
                "form": form,
                "errors": errors,
            }),
        )?;
        return Ok(html.into_response());
    }

    let comment = state.repo.add_comment(post.id, user.id, form.text).await?;
    tracing::debug!("User {} commented {} on post {}", user.id, comment.id, post.id);
    Ok(to_post_detail(post.id).into_response())
}

/// edit_comment_form
///
/// GET /posts/{id}/edit_comment/{comment_id}/
pub async fn edit_comment_form(
    user: AuthUser,
    State(state): State<AppState>,
    Path((post_id, comment_id)): Path<(i64, i64)>,
) -> AppResult<Response> {
    let comment = match owned_comment(&state, &user, post_id, comment_id).await? {
        Ok(comment) => comment,
        Err(redirect) => return Ok(redirect.into_response()),
    };
    let form = CommentForm {
        text: comment.text.clone(),
    };
    render_comment_page(&state, &user, "edit", &comment, &form, &FormErrors::default())
}

/// edit_comment
///
/// POST /posts/{id}/edit_comment/{comment_id}/ : only the author changes the text;
/// anyone else is sent back to the post.
pub async fn edit_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path((post_id, comment_id)): Path<(i64, i64)>,
    Form(mut form): Form<CommentForm>,
) -> AppResult<Response> {
    let comment = match owned_comment(&state, &user, post_id, comment_id).await? {
        Ok(comment) => comment,
        Err(redirect) => return Ok(redirect.into_response()),
    };
    form.normalize();
    let errors = validate_form(&form);
    if !errors.is_empty() {
        return render_comment_page(&state, &user, "edit", &comment, &form, &errors);
    }

    state
        .repo
        .update_comment(comment.id, user.id, form.text)
        .await?
        .or_not_found()?;
    Ok(to_post_detail(post_id).into_response())
}

/// delete_comment_form
///
/// GET /posts/{id}/delete_comment/{comment_id}/ : confirmation page.
pub async fn delete_comment_form(
    user: AuthUser,
    State(state): State<AppState>,
    Path((post_id, comment_id)): Path<(i64, i64)>,
) -> AppResult<Response> {
    let comment = match owned_comment(&state, &user, post_id, comment_id).await? {
        Ok(comment) => comment,
        Err(redirect) => return Ok(redirect.into_response()),
    };
    let form = CommentForm {
        text: comment.text.clone(),
    };
    render_comment_page(&state, &user, "delete", &comment, &form, &FormErrors::default())
}

/// delete_comment
///
/// POST /posts/{id}/delete_comment/{comment_id}/
pub async fn delete_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path((post_id, comment_id)): Path<(i64, i64)>,
) -> AppResult<Response> {
    let comment = match owned_comment(&state, &user, post_id, comment_id).await? {
        Ok(comment) => comment,
        Err(redirect) => return Ok(redirect.into_response()),
    };
    state.repo.delete_comment(comment.id, user.id).await?;
    Ok(to_post_detail(post_id).into_response())
}
