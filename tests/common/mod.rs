#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, StatusCode, header},
};
use async_trait::async_trait;
use blogicum::{
    AppConfig, AppState, InMemoryRepository, MockStorageService, Templates, create_router,
    auth::hash_password,
    models::{
        Category, Comment, Location, NewCategory, NewLocation, NewUser, Post, PostInput,
        ProfileUpdate, User,
    },
    repository::{RepoResult, Repository, RepositoryState},
    storage::StorageState,
    visibility::PostFilter,
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tower::ServiceExt;

pub const PASSWORD: &str = "war-and-peace";
const BOUNDARY: &str = "blogicum-test-boundary";

/// The full router wired to in-memory services, plus handles to inspect them.
pub struct TestApp {
    pub router: Router,
    pub repo: Arc<InMemoryRepository>,
    pub storage: Arc<MockStorageService>,
}

pub fn spawn_app() -> TestApp {
    spawn_app_with_storage(MockStorageService::new())
}

pub fn spawn_app_with_storage(storage: MockStorageService) -> TestApp {
    let repo = Arc::new(InMemoryRepository::new());
    build(repo.clone(), repo, storage)
}

/// An app whose database rejects every post insert and update.
pub fn spawn_app_failing_post_writes() -> TestApp {
    let repo = Arc::new(InMemoryRepository::new());
    let failing = Arc::new(FailingPostWrites(repo.clone()));
    build(repo, failing, MockStorageService::new())
}

fn build(
    repo: Arc<InMemoryRepository>,
    served: RepositoryState,
    storage: MockStorageService,
) -> TestApp {
    let storage = Arc::new(storage);
    let state = AppState {
        repo: served,
        storage: storage.clone() as StorageState,
        config: AppConfig::default(),
        templates: Arc::new(Templates::new().expect("templates compile")),
    };
    TestApp {
        router: create_router(state),
        repo,
        storage,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn get(&self, uri: &str, user: Option<i64>) -> Response<Body> {
        self.send(request("GET", uri, user).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_form(&self, uri: &str, user: Option<i64>, body: &str) -> Response<Body> {
        self.send(
            request("POST", uri, user)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_multipart(
        &self,
        uri: &str,
        user: Option<i64>,
        fields: &[(&str, &str)],
        image: Option<(&str, &str, &[u8])>,
    ) -> Response<Body> {
        self.send(
            request("POST", uri, user)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(multipart_body(fields, image)))
                .unwrap(),
        )
        .await
    }

    // --- Seeding ---

    pub async fn user(&self, username: &str) -> User {
        self.repo
            .create_user(NewUser {
                username: username.into(),
                email: format!("{}@example.com", username),
                password_hash: hash_password(PASSWORD, 4).unwrap(),
                ..NewUser::default()
            })
            .await
            .unwrap()
    }

    pub async fn staff(&self, username: &str) -> User {
        let user = self.user(username).await;
        assert!(self.repo.set_staff(username, true).await.unwrap());
        user
    }

    pub async fn category(&self, slug: &str, is_published: bool) -> Category {
        self.repo
            .create_category(NewCategory {
                title: format!("Category {}", slug),
                description: "About things".into(),
                slug: slug.into(),
                is_published,
            })
            .await
            .unwrap()
    }

    pub async fn location(&self, name: &str) -> Location {
        self.repo
            .create_location(NewLocation {
                name: name.into(),
                is_published: true,
            })
            .await
            .unwrap()
    }

    /// A published post dated `hours_ago` hours in the past (negative means scheduled).
    pub async fn post(
        &self,
        author: &User,
        category: &Category,
        title: &str,
        hours_ago: i64,
    ) -> Post {
        self.repo
            .create_post(
                author.id,
                PostInput {
                    title: title.into(),
                    text: format!("Body of {}", title),
                    pub_date: Utc::now() - Duration::hours(hours_ago),
                    category_id: Some(category.id),
                    ..PostInput::default()
                },
            )
            .await
            .unwrap()
    }
}

fn request(method: &str, uri: &str, user: Option<i64>) -> axum::http::request::Builder {
    let builder = Request::builder().method(method).uri(uri);
    match user {
        Some(id) => builder.header("x-user-id", id.to_string()),
        None => builder,
    }
}

pub fn multipart_body(fields: &[(&str, &str)], image: Option<(&str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((filename, content_type, bytes)) = image {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, filename, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Asserts a 303 redirect and returns its target.
pub fn redirect_target(response: &Response<Body>) -> String {
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub fn post_cards(html: &str) -> usize {
    html.matches("class=\"post-card\"").count()
}

/// Delegates to the in-memory repository but fails post inserts and updates.
pub struct FailingPostWrites(pub Arc<InMemoryRepository>);

#[async_trait]
impl Repository for FailingPostWrites {
    async fn get_user(&self, id: i64) -> RepoResult<Option<User>> {
        self.0.get_user(id).await
    }
    async fn get_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        self.0.get_user_by_username(username).await
    }
    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        self.0.create_user(user).await
    }
    async fn update_profile(&self, id: i64, update: ProfileUpdate) -> RepoResult<Option<User>> {
        self.0.update_profile(id, update).await
    }
    async fn set_staff(&self, username: &str, is_staff: bool) -> RepoResult<bool> {
        self.0.set_staff(username, is_staff).await
    }
    async fn list_categories(&self) -> RepoResult<Vec<Category>> {
        self.0.list_categories().await
    }
    async fn get_category(&self, id: i64) -> RepoResult<Option<Category>> {
        self.0.get_category(id).await
    }
    async fn get_category_by_slug(&self, slug: &str) -> RepoResult<Option<Category>> {
        self.0.get_category_by_slug(slug).await
    }
    async fn create_category(&self, category: NewCategory) -> RepoResult<Category> {
        self.0.create_category(category).await
    }
    async fn delete_category(&self, id: i64) -> RepoResult<bool> {
        self.0.delete_category(id).await
    }
    async fn list_locations(&self) -> RepoResult<Vec<Location>> {
        self.0.list_locations().await
    }
    async fn get_location(&self, id: i64) -> RepoResult<Option<Location>> {
        self.0.get_location(id).await
    }
    async fn create_location(&self, location: NewLocation) -> RepoResult<Location> {
        self.0.create_location(location).await
    }
    async fn delete_location(&self, id: i64) -> RepoResult<bool> {
        self.0.delete_location(id).await
    }
    async fn count_posts(&self, filter: &PostFilter) -> RepoResult<i64> {
        self.0.count_posts(filter).await
    }
    async fn list_posts(
        &self,
        filter: &PostFilter,
        limit: i64,
        offset: i64,
    ) -> RepoResult<Vec<Post>> {
        self.0.list_posts(filter, limit, offset).await
    }
    async fn get_post(&self, id: i64) -> RepoResult<Option<Post>> {
        self.0.get_post(id).await
    }
    async fn create_post(&self, _author_id: i64, _input: PostInput) -> RepoResult<Post> {
        Err(sqlx::Error::PoolTimedOut)
    }
    async fn update_post(
        &self,
        _id: i64,
        _author_id: i64,
        _input: PostInput,
    ) -> RepoResult<Option<Post>> {
        Err(sqlx::Error::PoolTimedOut)
    }
    async fn delete_post(&self, id: i64, author_id: i64) -> RepoResult<bool> {
        self.0.delete_post(id, author_id).await
    }
    async fn set_post_published(&self, id: i64, is_published: bool) -> RepoResult<bool> {
        self.0.set_post_published(id, is_published).await
    }
    async fn list_comments(&self, post_id: i64) -> RepoResult<Vec<Comment>> {
        self.0.list_comments(post_id).await
    }
    async fn get_comment(&self, post_id: i64, comment_id: i64) -> RepoResult<Option<Comment>> {
        self.0.get_comment(post_id, comment_id).await
    }
    async fn add_comment(&self, post_id: i64, author_id: i64, text: String) -> RepoResult<Comment> {
        self.0.add_comment(post_id, author_id, text).await
    }
    async fn update_comment(
        &self,
        id: i64,
        author_id: i64,
        text: String,
    ) -> RepoResult<Option<Comment>> {
        self.0.update_comment(id, author_id, text).await
    }
    async fn delete_comment(&self, id: i64, author_id: i64) -> RepoResult<bool> {
        self.0.delete_comment(id, author_id).await
    }
}
