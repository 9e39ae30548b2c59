use async_trait::async_trait;
use chrono::Utc;
use sqlx::error::{DatabaseError, ErrorKind};
use std::{collections::BTreeMap, error::Error as StdError};
use thiserror::Error;
use tokio::sync::RwLock;

use super::{RepoResult, Repository};
use crate::{
    models::{
        Category, Comment, Location, NewCategory, NewLocation, NewUser, Post, PostInput,
        ProfileUpdate, User,
    },
    visibility::PostFilter,
};

/// UniqueViolation
///
/// Raised on a duplicate username or slug, shaped like the Postgres error so callers can
/// treat both backends alike.
#[derive(Debug, Error)]
#[error("duplicate key value violates unique constraint \"{constraint}\"")]
pub struct UniqueViolation {
    constraint: &'static str,
}

impl UniqueViolation {
    fn error(constraint: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(UniqueViolation { constraint }))
    }
}

impl DatabaseError for UniqueViolation {
    fn message(&self) -> &str {
        "duplicate key value violates unique constraint"
    }

    fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
        self
    }

    fn constraint(&self) -> Option<&str> {
        Some(self.constraint)
    }

    fn kind(&self) -> ErrorKind {
        ErrorKind::UniqueViolation
    }
}

/// Raw tables. Posts and comments are stored without their joined columns, which are
/// filled in on every read so renames and deletions show up immediately.
#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, User>,
    categories: BTreeMap<i64, Category>,
    locations: BTreeMap<i64, Location>,
    posts: BTreeMap<i64, Post>,
    comments: BTreeMap<i64, Comment>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn hydrate_post(&self, row: &Post) -> Post {
        let mut post = row.clone();
        post.author_username = self
            .users
            .get(&row.author_id)
            .map(|u| u.username.clone())
            .unwrap_or_default();

        let category = row.category_id.and_then(|id| self.categories.get(&id));
        post.category_title = category.map(|c| c.title.clone());
        post.category_slug = category.map(|c| c.slug.clone());
        post.category_is_published = category.map(|c| c.is_published);

        let location = row.location_id.and_then(|id| self.locations.get(&id));
        post.location_name = location.map(|l| l.name.clone());
        post.location_is_published = location.map(|l| l.is_published);

        post.comment_count = self
            .comments
            .values()
            .filter(|c| c.post_id == row.id)
            .count() as i64;
        post
    }

    fn hydrate_comment(&self, row: &Comment) -> Comment {
        let mut comment = row.clone();
        comment.author_username = self
            .users
            .get(&row.author_id)
            .map(|u| u.username.clone())
            .unwrap_or_default();
        comment
    }

    fn filtered_posts(&self, filter: &PostFilter) -> Vec<Post> {
        let mut posts: Vec<Post> = self
            .posts
            .values()
            .map(|row| self.hydrate_post(row))
            .filter(|post| filter.matches(post))
            .collect();
        posts.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
        posts
    }
}

/// InMemoryRepository
///
/// `Repository` kept entirely in process memory. Backs the test suite and local runs
/// without `DATABASE_URL`. Follows the same cascade and set-null rules as the SQL schema.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    // --- USERS ---

    async fn get_user(&self, id: i64) -> RepoResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(UniqueViolation::error("users_username_key"));
        }
        let id = tables.allocate_id();
        let created = User {
            id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            password_hash: user.password_hash,
            is_staff: false,
            date_joined: Utc::now(),
        };
        tables.users.insert(id, created.clone());
        Ok(created)
    }

    async fn update_profile(&self, id: i64, update: ProfileUpdate) -> RepoResult<Option<User>> {
        let mut tables = self.tables.write().await;
        Ok(tables.users.get_mut(&id).map(|user| {
            user.email = update.email;
            user.first_name = update.first_name;
            user.last_name = update.last_name;
            user.clone()
        }))
    }

    async fn set_staff(&self, username: &str, is_staff: bool) -> RepoResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.users.values_mut().find(|u| u.username == username) {
            Some(user) => {
                user.is_staff = is_staff;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // --- CATEGORIES & LOCATIONS ---

    async fn list_categories(&self) -> RepoResult<Vec<Category>> {
        let tables = self.tables.read().await;
        let mut categories: Vec<Category> = tables.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(categories)
    }

    async fn get_category(&self, id: i64) -> RepoResult<Option<Category>> {
        Ok(self.tables.read().await.categories.get(&id).cloned())
    }

    async fn get_category_by_slug(&self, slug: &str) -> RepoResult<Option<Category>> {
        let tables = self.tables.read().await;
        Ok(tables.categories.values().find(|c| c.slug == slug).cloned())
    }

    async fn create_category(&self, category: NewCategory) -> RepoResult<Category> {
        let mut tables = self.tables.write().await;
        if tables.categories.values().any(|c| c.slug == category.slug) {
            return Err(UniqueViolation::error("categories_slug_key"));
        }
        let id = tables.allocate_id();
        let created = Category {
            id,
            title: category.title,
            description: category.description,
            slug: category.slug,
            is_published: category.is_published,
            created_at: Utc::now(),
        };
        tables.categories.insert(id, created.clone());
        Ok(created)
    }

    async fn delete_category(&self, id: i64) -> RepoResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.categories.remove(&id).is_none() {
            return Ok(false);
        }
        for post in tables.posts.values_mut() {
            if post.category_id == Some(id) {
                post.category_id = None;
            }
        }
        Ok(true)
    }

    async fn list_locations(&self) -> RepoResult<Vec<Location>> {
        let tables = self.tables.read().await;
        let mut locations: Vec<Location> = tables.locations.values().cloned().collect();
        locations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(locations)
    }

    async fn get_location(&self, id: i64) -> RepoResult<Option<Location>> {
        Ok(self.tables.read().await.locations.get(&id).cloned())
    }

    async fn create_location(&self, location: NewLocation) -> RepoResult<Location> {
        let mut tables = self.tables.write().await;
        let id = tables.allocate_id();
        let created = Location {
            id,
            name: location.name,
            is_published: location.is_published,
            created_at: Utc::now(),
        };
        tables.locations.insert(id, created.clone());
        Ok(created)
    }

    async fn delete_location(&self, id: i64) -> RepoResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.locations.remove(&id).is_none() {
            return Ok(false);
        }
        for post in tables.posts.values_mut() {
            if post.location_id == Some(id) {
                post.location_id = None;
            }
        }
        Ok(true)
    }

    // --- POSTS ---

    async fn count_posts(&self, filter: &PostFilter) -> RepoResult<i64> {
        Ok(self.tables.read().await.filtered_posts(filter).len() as i64)
    }

    async fn list_posts(
        &self,
        filter: &PostFilter,
        limit: i64,
        offset: i64,
    ) -> RepoResult<Vec<Post>> {
        let posts = self.tables.read().await.filtered_posts(filter);
        Ok(posts
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn get_post(&self, id: i64) -> RepoResult<Option<Post>> {
        let tables = self.tables.read().await;
        Ok(tables.posts.get(&id).map(|row| tables.hydrate_post(row)))
    }

    async fn create_post(&self, author_id: i64, input: PostInput) -> RepoResult<Post> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&author_id) {
            return Err(sqlx::Error::RowNotFound);
        }
        let id = tables.allocate_id();
        let row = Post {
            id,
            title: input.title,
            text: input.text,
            pub_date: input.pub_date,
            is_published: true,
            created_at: Utc::now(),
            author_id,
            location_id: input.location_id,
            category_id: input.category_id,
            image: input.image,
            ..Post::default()
        };
        tables.posts.insert(id, row.clone());
        Ok(tables.hydrate_post(&row))
    }

    async fn update_post(
        &self,
        id: i64,
        author_id: i64,
        input: PostInput,
    ) -> RepoResult<Option<Post>> {
        let mut tables = self.tables.write().await;
        let Some(row) = tables
            .posts
            .get_mut(&id)
            .filter(|row| row.author_id == author_id)
        else {
            return Ok(None);
        };
        row.title = input.title;
        row.text = input.text;
        row.pub_date = input.pub_date;
        row.category_id = input.category_id;
        row.location_id = input.location_id;
        if input.image.is_some() {
            row.image = input.image;
        }
        let row = row.clone();
        Ok(Some(tables.hydrate_post(&row)))
    }

    async fn delete_post(&self, id: i64, author_id: i64) -> RepoResult<bool> {
        let mut tables = self.tables.write().await;
        let owned = tables
            .posts
            .get(&id)
            .is_some_and(|row| row.author_id == author_id);
        if !owned {
            return Ok(false);
        }
        tables.posts.remove(&id);
        tables.comments.retain(|_, comment| comment.post_id != id);
        Ok(true)
    }

    async fn set_post_published(&self, id: i64, is_published: bool) -> RepoResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.posts.get_mut(&id) {
            Some(row) => {
                row.is_published = is_published;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // --- COMMENTS ---

    async fn list_comments(&self, post_id: i64) -> RepoResult<Vec<Comment>> {
        let tables = self.tables.read().await;
        // BTreeMap order is insertion order here, which is creation order.
        Ok(tables
            .comments
            .values()
            .filter(|c| c.post_id == post_id)
            .map(|c| tables.hydrate_comment(c))
            .collect())
    }

    async fn get_comment(&self, post_id: i64, comment_id: i64) -> RepoResult<Option<Comment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .comments
            .get(&comment_id)
            .filter(|c| c.post_id == post_id)
            .map(|c| tables.hydrate_comment(c)))
    }

    async fn add_comment(&self, post_id: i64, author_id: i64, text: String) -> RepoResult<Comment> {
        let mut tables = self.tables.write().await;
        if !tables.posts.contains_key(&post_id) || !tables.users.contains_key(&author_id) {
            return Err(sqlx::Error::RowNotFound);
        }
        let id = tables.allocate_id();
        let row = Comment {
            id,
            text,
            author_id,
            post_id,
            created_at: Utc::now(),
            author_username: String::new(),
        };
        tables.comments.insert(id, row.clone());
        Ok(tables.hydrate_comment(&row))
    }

    async fn update_comment(
        &self,
        id: i64,
        author_id: i64,
        text: String,
    ) -> RepoResult<Option<Comment>> {
        let mut tables = self.tables.write().await;
        let Some(row) = tables
            .comments
            .get_mut(&id)
            .filter(|row| row.author_id == author_id)
        else {
            return Ok(None);
        };
        row.text = text;
        let row = row.clone();
        Ok(Some(tables.hydrate_comment(&row)))
    }

    async fn delete_comment(&self, id: i64, author_id: i64) -> RepoResult<bool> {
        let mut tables = self.tables.write().await;
        let owned = tables
            .comments
            .get(&id)
            .is_some_and(|row| row.author_id == author_id);
        if owned {
            tables.comments.remove(&id);
        }
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::is_unique_violation;
    use chrono::Duration;

    async fn seed() -> (InMemoryRepository, User, Category) {
        let repo = InMemoryRepository::new();
        let author = repo
            .create_user(NewUser {
                username: "author".into(),
                ..NewUser::default()
            })
            .await
            .unwrap();
        let category = repo
            .create_category(NewCategory {
                title: "Travel".into(),
                description: "Trips".into(),
                slug: "travel".into(),
                is_published: true,
            })
            .await
            .unwrap();
        (repo, author, category)
    }

    fn input(title: &str, category_id: i64, hours_ago: i64) -> PostInput {
        PostInput {
            title: title.into(),
            text: "text".into(),
            pub_date: Utc::now() - Duration::hours(hours_ago),
            category_id: Some(category_id),
            ..PostInput::default()
        }
    }

    #[tokio::test]
    async fn duplicate_username_and_slug_are_unique_violations() {
        let (repo, _, _) = seed().await;

        let err = repo
            .create_user(NewUser {
                username: "author".into(),
                ..NewUser::default()
            })
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));

        let err = repo
            .create_category(NewCategory {
                title: "Travel again".into(),
                description: String::new(),
                slug: "travel".into(),
                is_published: true,
            })
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[tokio::test]
    async fn deleting_a_category_detaches_its_posts() {
        let (repo, author, category) = seed().await;
        let post = repo.create_post(author.id, input("a", category.id, 1)).await.unwrap();

        assert!(repo.delete_category(category.id).await.unwrap());

        let post = repo.get_post(post.id).await.unwrap().expect("post survives");
        assert_eq!(post.category_id, None);
        assert_eq!(post.category_is_published, None);
    }

    #[tokio::test]
    async fn deleting_a_post_removes_its_comments() {
        let (repo, author, category) = seed().await;
        let post = repo.create_post(author.id, input("a", category.id, 1)).await.unwrap();
        let comment = repo.add_comment(post.id, author.id, "hi".into()).await.unwrap();

        assert!(repo.delete_post(post.id, author.id).await.unwrap());
        assert!(repo.get_comment(post.id, comment.id).await.unwrap().is_none());
        assert!(repo.list_comments(post.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn owner_checks_block_other_users() {
        let (repo, author, category) = seed().await;
        let other = repo
            .create_user(NewUser {
                username: "other".into(),
                ..NewUser::default()
            })
            .await
            .unwrap();
        let post = repo.create_post(author.id, input("a", category.id, 1)).await.unwrap();
        let comment = repo.add_comment(post.id, author.id, "mine".into()).await.unwrap();

        let theirs = repo.update_post(post.id, other.id, input("b", category.id, 1));
        assert!(theirs.await.unwrap().is_none());
        assert!(!repo.delete_post(post.id, other.id).await.unwrap());
        let theirs = repo.update_comment(comment.id, other.id, "theirs".into());
        assert!(theirs.await.unwrap().is_none());
        assert!(!repo.delete_comment(comment.id, other.id).await.unwrap());

        let comment = repo.get_comment(post.id, comment.id).await.unwrap().unwrap();
        assert_eq!(comment.text, "mine");
    }

    #[tokio::test]
    async fn listing_is_newest_first_with_comment_counts() {
        let (repo, author, category) = seed().await;
        let old = repo.create_post(author.id, input("old", category.id, 5)).await.unwrap();
        repo.create_post(author.id, input("new", category.id, 1)).await.unwrap();
        repo.add_comment(old.id, author.id, "x".into()).await.unwrap();

        let filter = PostFilter::public(Utc::now());
        let posts = repo.list_posts(&filter, 10, 0).await.unwrap();
        let titles: Vec<_> = posts.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, ["new", "old"]);
        assert_eq!(posts[1].comment_count, 1);
        assert_eq!(repo.count_posts(&filter).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn update_without_image_keeps_the_stored_one() {
        let (repo, author, category) = seed().await;
        let mut with_image = input("a", category.id, 1);
        with_image.image = Some("posts/a.png".into());
        let post = repo.create_post(author.id, with_image).await.unwrap();

        let updated = repo
            .update_post(post.id, author.id, input("b", category.id, 1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "b");
        assert_eq!(updated.image.as_deref(), Some("posts/a.png"));
    }
}
