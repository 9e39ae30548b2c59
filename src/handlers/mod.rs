//! Request handlers, one per route. Each composes the visibility rules, form validation and
//! pagination and answers with a rendered page or a redirect.

use axum::response::Redirect;
use chrono::Utc;
use serde::Serialize;

use crate::{
    AppState,
    errors::AppResult,
    models::Post,
    pagination::{PAGE_SIZE, Page, PageQuery, Paginator},
    visibility::PostFilter,
};

pub mod account;
pub mod admin;
pub mod comments;
pub mod posts;
pub mod profile;

/// PostView
///
/// A post as handed to templates: the row plus the browser URL of its picture.
#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub image_url: Option<String>,
}

impl PostView {
    pub fn new(post: Post, state: &AppState) -> Self {
        let image_url = post.image.as_deref().map(|key| state.storage.public_url(key));
        Self { post, image_url }
    }
}

/// Counts, clamps the requested page and loads one page of posts matching `filter`.
pub async fn paginate_posts(
    state: &AppState,
    filter: &PostFilter,
    query: &PageQuery,
) -> AppResult<Page<PostView>> {
    let total = state.repo.count_posts(filter).await?;
    let window = Paginator::new(total, PAGE_SIZE).window(query.page.as_deref());
    let posts = state
        .repo
        .list_posts(filter, window.limit, window.offset)
        .await?
        .into_iter()
        .map(|post| PostView::new(post, state))
        .collect();
    Ok(Page::new(posts, window, total))
}

/// The public listing filter as of this request.
pub fn public_filter() -> PostFilter {
    PostFilter::public(Utc::now())
}

pub fn to_post_detail(post_id: i64) -> Redirect {
    Redirect::to(&format!("/posts/{}/", post_id))
}

pub fn to_profile(username: &str) -> Redirect {
    Redirect::to(&format!("/profile/{}/", username))
}
