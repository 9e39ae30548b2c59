use std::collections::HashMap;

use axum::{
    extract::{Multipart, Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde_json::json;

use super::{PostView, paginate_posts, public_filter, to_post_detail, to_profile};
use crate::{
    AppState,
    auth::{AuthUser, MaybeAuthUser},
    errors::{AppError, AppResult, OrNotFound},
    forms::{CommentForm, FormErrors, PostForm, validate_form},
    models::{Post, PostInput},
    pagination::PageQuery,
    storage::image_key,
    visibility::can_view,
};

const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";

/// UploadedImage
///
/// The `image` part of a post form submission.
pub struct UploadedImage {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// index
///
/// GET / : published posts from published categories whose publication date has passed,
/// newest first, ten per page.
pub async fn index(
    viewer: MaybeAuthUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let page_obj = paginate_posts(&state, &public_filter(), &query).await?;
    let html = state.templates.render(
        "blog/index.html",
        &json!({ "user": viewer.0, "page_obj": page_obj }),
    )?;
    Ok(html.into_response())
}

/// post_detail
///
/// GET /posts/{id}/ : the post with its comments. Hidden posts answer 404 unless the viewer
/// wrote them.
pub async fn post_detail(
    viewer: MaybeAuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> AppResult<Response> {
    let post = state.repo.get_post(post_id).await?.or_not_found()?;
    if !can_view(&post, viewer.id(), Utc::now()) {
        return Err(AppError::NotFound);
    }
    let comments = state.repo.list_comments(post.id).await?;
    let html = state.templates.render(
        "blog/detail.html",
        &json!({
            "user": viewer.0,
            "post": PostView::new(post, &state),
            "comments": comments,
            "form": CommentForm::default(),
            "errors": FormErrors::default(),
        }),
    )?;
    Ok(html.into_response())
}

/// category_posts
///
/// GET /category/{slug}/ : the public listing narrowed to one published category.
pub async fn category_posts(
    viewer: MaybeAuthUser,
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let category = state
        .repo
        .get_category_by_slug(&slug)
        .await?
        .filter(|category| category.is_published)
        .or_not_found()?;
    let filter = public_filter().in_category(category.id);
    let page_obj = paginate_posts(&state, &filter, &query).await?;
    let html = state.templates.render(
        "blog/category.html",
        &json!({ "user": viewer.0, "category": category, "page_obj": page_obj }),
    )?;
    Ok(html.into_response())
}

// --- Create / Edit ---

/// Splits a multipart post submission into the text form and the optional picture.
/// An empty file input arrives as a part with no filename and is ignored.
pub async fn read_post_submission(
    mut multipart: Multipart,
) -> AppResult<(PostForm, Option<UploadedImage>)> {
    let mut fields = HashMap::new();
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let filename = field.file_name().unwrap_or_default().to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            if !filename.is_empty() && !bytes.is_empty() {
                image = Some(UploadedImage {
                    filename,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            fields.insert(name, value);
        }
    }

    Ok((PostForm::from_fields(&fields), image))
}

/// Field validation plus the checks that need the database: the selected category and
/// location must exist and the upload must be a picture.
async fn validate_post_submission(
    state: &AppState,
    form: &PostForm,
    image: Option<&UploadedImage>,
) -> AppResult<FormErrors> {
    let mut errors = validate_form(form);

    if let Some(category_id) = form.category_id() {
        if state.repo.get_category(category_id).await?.is_none() {
            errors.add("category", INVALID_CHOICE);
        }
    }
    if let Some(location_id) = form.location_id() {
        if state.repo.get_location(location_id).await?.is_none() {
            errors.add("location", INVALID_CHOICE);
        }
    }
    if let Some(image) = image {
        if !image.content_type.starts_with("image/") {
            errors.add(
                "image",
                "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
            );
        }
    }
    Ok(errors)
}

/// Stores the picture, returning its object key.
async fn store_image(state: &AppState, image: UploadedImage) -> AppResult<String> {
    let key = image_key(&image.filename);
    state
        .storage
        .put_object(&key, &image.content_type, image.bytes)
        .await
        .map_err(AppError::Storage)?;
    tracing::info!("Stored post image {}", key);
    Ok(key)
}

/// Removes a picture whose post never reached the database.
async fn discard_image(state: &AppState, key: Option<&str>) {
    let Some(key) = key else {
        return;
    };
    match state.storage.delete_object(key).await {
        Ok(()) => tracing::info!("Discarded post image {}", key),
        Err(e) => tracing::error!("Orphaned post image {}: {}", key, e),
    }
}

/// Builds the write model from a form that passed validation. The picture is attached once
/// it is stored.
fn post_input(form: PostForm) -> AppResult<PostInput> {
    let pub_date = form
        .pub_date()
        .ok_or_else(|| AppError::BadRequest("unparsable pub_date after validation".into()))?;
    Ok(PostInput {
        category_id: form.category_id(),
        location_id: form.location_id(),
        title: form.title,
        text: form.text,
        pub_date,
        image: None,
    })
}

/// Renders the create/edit/delete page. `mode` is one of `create`, `edit`, `delete`.
async fn render_post_form(
    state: &AppState,
    user: &AuthUser,
    mode: &str,
    post: Option<&Post>,
    form: &PostForm,
    errors: &FormErrors,
) -> AppResult<Response> {
    let categories = state.repo.list_categories().await?;
    let locations = state.repo.list_locations().await?;
    let post = post.map(|post| PostView::new(post.clone(), state));
    let html = state.templates.render(
        "blog/create.html",
        &json!({
            "user": user,
            "mode": mode,
            "post": post,
            "form": form,
            "selected_category": form.category_id(),
            "selected_location": form.location_id(),
            "errors": errors,
            "categories": categories,
            "locations": locations,
        }),
    )?;
    Ok(html.into_response())
}

/// Loads a post for an owner-only page. `Err` carries the redirect for non-authors.
async fn owned_post(
    state: &AppState,
    user: &AuthUser,
    post_id: i64,
) -> AppResult<Result<Post, Redirect>> {
    let post = state.repo.get_post(post_id).await?.or_not_found()?;
    if post.author_id != user.id {
        tracing::warn!(
            "User {} tried to modify post {} owned by {}",
            user.id,
            post.id,
            post.author_id
        );
        return Ok(Err(to_post_detail(post.id)));
    }
    Ok(Ok(post))
}

/// create_post_form
///
/// GET /posts/create/
pub async fn create_post_form(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Response> {
    let form = PostForm::default();
    render_post_form(&state, &user, "create", None, &form, &FormErrors::default()).await
}

/// create_post
///
/// POST /posts/create/ : on success the author lands on their profile page.
pub async fn create_post(
    user: AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Response> {
    let (form, image) = read_post_submission(multipart).await?;
    let errors = validate_post_submission(&state, &form, image.as_ref()).await?;
    if !errors.is_empty() {
        return render_post_form(&state, &user, "create", None, &form, &errors).await;
    }

    let input = post_input(form)?;
    let image_key = match image {
        Some(image) => Some(store_image(&state, image).await?),
        None => None,
    };
    let created = state
        .repo
        .create_post(user.id, PostInput { image: image_key.clone(), ..input })
        .await;
    if created.is_err() {
        discard_image(&state, image_key.as_deref()).await;
    }
    let post = created?;
    tracing::info!("User {} created post {}", user.id, post.id);
    Ok(to_profile(&user.username).into_response())
}

/// edit_post_form
///
/// GET /posts/{id}/edit/ : prefilled form; non-authors are sent back to the post.
pub async fn edit_post_form(
    user: AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> AppResult<Response> {
    let post = match owned_post(&state, &user, post_id).await? {
        Ok(post) => post,
        Err(redirect) => return Ok(redirect.into_response()),
    };
    let form = PostForm::from_post(&post);
    render_post_form(&state, &user, "edit", Some(&post), &form, &FormErrors::default()).await
}

/// edit_post
///
/// POST /posts/{id}/edit/ : non-authors are redirected to the detail page untouched.
pub async fn edit_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    multipart: Multipart,
) -> AppResult<Response> {
    let post = match owned_post(&state, &user, post_id).await? {
        Ok(post) => post,
        Err(redirect) => return Ok(redirect.into_response()),
    };

    let (form, image) = read_post_submission(multipart).await?;
    let errors = validate_post_submission(&state, &form, image.as_ref()).await?;
    if !errors.is_empty() {
        return render_post_form(&state, &user, "edit", Some(&post), &form, &errors).await;
    }

    let input = post_input(form)?;
    let image_key = match image {
        Some(image) => Some(store_image(&state, image).await?),
        None => None,
    };
    let updated = state
        .repo
        .update_post(post.id, user.id, PostInput { image: image_key.clone(), ..input })
        .await;
    if !matches!(updated, Ok(Some(_))) {
        discard_image(&state, image_key.as_deref()).await;
    }
    updated?.or_not_found()?;
    Ok(to_post_detail(post.id).into_response())
}

/// delete_post_form
///
/// GET /posts/{id}/delete/ : confirmation page showing the post.
pub async fn delete_post_form(
    user: AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> AppResult<Response> {
    let post = match owned_post(&state, &user, post_id).await? {
        Ok(post) => post,
        Err(redirect) => return Ok(redirect.into_response()),
    };
    let form = PostForm::from_post(&post);
    render_post_form(&state, &user, "delete", Some(&post), &form, &FormErrors::default()).await
}

/// delete_post
///
/// POST /posts/{id}/delete/ : removes the post and its comments, then returns to the index.
pub async fn delete_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> AppResult<Response> {
    let post = match owned_post(&state, &user, post_id).await? {
        Ok(post) => post,
        Err(redirect) => return Ok(redirect.into_response()),
    };
    if state.repo.delete_post(post.id, user.id).await? {
        tracing::info!("User {} deleted post {}", user.id, post.id);
    }
    Ok(Redirect::to("/").into_response())
}
