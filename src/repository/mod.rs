use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    models::{
        Category, Comment, Location, NewCategory, NewLocation, NewUser, Post, PostInput,
        ProfileUpdate, User,
    },
    visibility::PostFilter,
};

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// Result of every repository call. The in-memory backend only fails on unique violations.
pub type RepoResult<T> = Result<T, sqlx::Error>;

/// True when an insert lost a race for a unique column (Postgres `23505`, or the in-memory
/// equivalent).
pub fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .is_some_and(|db_error| db_error.is_unique_violation())
}

/// Repository Trait
///
/// Persistence contract used by the handlers. Owner-restricted mutations take the acting
/// user's id and only touch rows that user owns, returning `None`/`false` otherwise; the
/// handlers never see another user's row through them.
///
/// **Send + Sync + async_trait** make `Arc<dyn Repository>` shareable across Axum tasks.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: i64) -> RepoResult<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    async fn update_profile(&self, id: i64, update: ProfileUpdate) -> RepoResult<Option<User>>;
    // Grants or revokes staff rights by username. Returns false for unknown users.
    async fn set_staff(&self, username: &str, is_staff: bool) -> RepoResult<bool>;

    // --- Categories & Locations ---
    async fn list_categories(&self) -> RepoResult<Vec<Category>>;
    async fn get_category(&self, id: i64) -> RepoResult<Option<Category>>;
    async fn get_category_by_slug(&self, slug: &str) -> RepoResult<Option<Category>>;
    async fn create_category(&self, category: NewCategory) -> RepoResult<Category>;
    // Posts filed under the category keep existing with no category.
    async fn delete_category(&self, id: i64) -> RepoResult<bool>;

    async fn list_locations(&self) -> RepoResult<Vec<Location>>;
    async fn get_location(&self, id: i64) -> RepoResult<Option<Location>>;
    async fn create_location(&self, location: NewLocation) -> RepoResult<Location>;
    async fn delete_location(&self, id: i64) -> RepoResult<bool>;

    // --- Posts ---
    async fn count_posts(&self, filter: &PostFilter) -> RepoResult<i64>;
    /// Newest publication date first.
    async fn list_posts(
        &self,
        filter: &PostFilter,
        limit: i64,
        offset: i64,
    ) -> RepoResult<Vec<Post>>;
    /// Unfiltered lookup; callers apply the visibility rules.
    async fn get_post(&self, id: i64) -> RepoResult<Option<Post>>;
    async fn create_post(&self, author_id: i64, input: PostInput) -> RepoResult<Post>;
    /// Owner-only. An input without an image keeps the stored one.
    async fn update_post(
        &self,
        id: i64,
        author_id: i64,
        input: PostInput,
    ) -> RepoResult<Option<Post>>;
    /// Owner-only. Comments go with the post.
    async fn delete_post(&self, id: i64, author_id: i64) -> RepoResult<bool>;
    /// Staff moderation of the publication flag.
    async fn set_post_published(&self, id: i64, is_published: bool) -> RepoResult<bool>;

    // --- Comments ---
    /// Oldest first.
    async fn list_comments(&self, post_id: i64) -> RepoResult<Vec<Comment>>;
    /// The comment only if it belongs to `post_id`.
    async fn get_comment(&self, post_id: i64, comment_id: i64) -> RepoResult<Option<Comment>>;
    async fn add_comment(&self, post_id: i64, author_id: i64, text: String) -> RepoResult<Comment>;
    /// Owner-only.
    async fn update_comment(
        &self,
        id: i64,
        author_id: i64,
        text: String,
    ) -> RepoResult<Option<Comment>>;
    /// Owner-only.
    async fn delete_comment(&self, id: i64, author_id: i64) -> RepoResult<bool>;
}

/// RepositoryState
///
/// Shared handle to the persistence layer inside `AppState`.
pub type RepositoryState = Arc<dyn Repository>;
