use async_trait::async_trait;
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder};

use super::{RepoResult, Repository};
use crate::{
    models::{
        Category, Comment, Location, NewCategory, NewLocation, NewUser, Post, PostInput,
        ProfileUpdate, User,
    },
    visibility::PostFilter,
};

const USER_COLUMNS: &str =
    "id, username, email, first_name, last_name, password_hash, is_staff, date_joined";

const POST_SELECT: &str = r#"
    SELECT
        p.id, p.title, p.text, p.pub_date, p.is_published, p.created_at,
        p.author_id, p.location_id, p.category_id, p.image,
        u.username AS author_username,
        c.title AS category_title,
        c.slug AS category_slug,
        c.is_published AS category_is_published,
        l.name AS location_name,
        l.is_published AS location_is_published,
        (SELECT COUNT(*) FROM comments cm WHERE cm.post_id = p.id) AS comment_count
    FROM posts p
    JOIN users u ON u.id = p.author_id
    LEFT JOIN categories c ON c.id = p.category_id
    LEFT JOIN locations l ON l.id = p.location_id
"#;

const COMMENT_SELECT: &str = r#"
    SELECT cm.id, cm.text, cm.author_id, cm.post_id, cm.created_at, u.username AS author_username
    FROM comments cm
    JOIN users u ON u.id = cm.author_id
"#;

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. Cascades and nullification are declared on the
/// foreign keys in `migrations/`, so deletes here are single statements.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the embedded migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

/// Appends the listing filter to a query that already selects from `posts p` joined with
/// `categories c`. The visibility predicate mirrors `visibility::is_publicly_visible`.
fn push_post_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &PostFilter) {
    builder.push(" WHERE TRUE");
    if filter.published_only {
        builder.push(" AND p.is_published = true AND c.is_published = true AND p.pub_date <= ");
        builder.push_bind(filter.now);
    }
    if let Some(category_id) = filter.category_id {
        builder.push(" AND p.category_id = ");
        builder.push_bind(category_id);
    }
    if let Some(author_id) = filter.author_id {
        builder.push(" AND p.author_id = ");
        builder.push_bind(author_id);
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- USERS ---

    async fn get_user(&self, id: i64) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, email, first_name, last_name, password_hash) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        ))
        .bind(user.username)
        .bind(user.email)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.password_hash)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_profile(&self, id: i64, update: ProfileUpdate) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET email = $2, first_name = $3, last_name = $4 \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(update.email)
        .bind(update.first_name)
        .bind(update.last_name)
        .fetch_optional(&self.pool)
        .await
    }

    async fn set_staff(&self, username: &str, is_staff: bool) -> RepoResult<bool> {
        let result = sqlx::query("UPDATE users SET is_staff = $2 WHERE username = $1")
            .bind(username)
            .bind(is_staff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- CATEGORIES & LOCATIONS ---

    async fn list_categories(&self) -> RepoResult<Vec<Category>> {
        sqlx::query_as::<_, Category>(
            "SELECT id, title, description, slug, is_published, created_at FROM categories \
             ORDER BY title",
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn get_category(&self, id: i64) -> RepoResult<Option<Category>> {
        sqlx::query_as::<_, Category>(
            "SELECT id, title, description, slug, is_published, created_at FROM categories \
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_category_by_slug(&self, slug: &str) -> RepoResult<Option<Category>> {
        sqlx::query_as::<_, Category>(
            "SELECT id, title, description, slug, is_published, created_at FROM categories \
             WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_category(&self, category: NewCategory) -> RepoResult<Category> {
        sqlx::query_as::<_, Category>(
            "INSERT INTO categories (title, description, slug, is_published) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, title, description, slug, is_published, created_at",
        )
        .bind(category.title)
        .bind(category.description)
        .bind(category.slug)
        .bind(category.is_published)
        .fetch_one(&self.pool)
        .await
    }

    /// `ON DELETE SET NULL` on `posts.category_id` detaches the posts.
    async fn delete_category(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_locations(&self) -> RepoResult<Vec<Location>> {
        sqlx::query_as::<_, Location>(
            "SELECT id, name, is_published, created_at FROM locations ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn get_location(&self, id: i64) -> RepoResult<Option<Location>> {
        sqlx::query_as::<_, Location>(
            "SELECT id, name, is_published, created_at FROM locations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_location(&self, location: NewLocation) -> RepoResult<Location> {
        sqlx::query_as::<_, Location>(
            "INSERT INTO locations (name, is_published) VALUES ($1, $2) \
             RETURNING id, name, is_published, created_at",
        )
        .bind(location.name)
        .bind(location.is_published)
        .fetch_one(&self.pool)
        .await
    }

    async fn delete_location(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM locations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- POSTS ---

    async fn count_posts(&self, filter: &PostFilter) -> RepoResult<i64> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT COUNT(*) FROM posts p LEFT JOIN categories c ON c.id = p.category_id",
        );
        push_post_filter(&mut builder, filter);
        builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
    }

    async fn list_posts(
        &self,
        filter: &PostFilter,
        limit: i64,
        offset: i64,
    ) -> RepoResult<Vec<Post>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(POST_SELECT);
        push_post_filter(&mut builder, filter);
        builder.push(" ORDER BY p.pub_date DESC, p.id DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        builder.build_query_as::<Post>().fetch_all(&self.pool).await
    }

    async fn get_post(&self, id: i64) -> RepoResult<Option<Post>> {
        sqlx::query_as::<_, Post>(&format!("{POST_SELECT} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn create_post(&self, author_id: i64, input: PostInput) -> RepoResult<Post> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO posts (title, text, pub_date, author_id, category_id, location_id, image) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(input.title)
        .bind(input.text)
        .bind(input.pub_date)
        .bind(author_id)
        .bind(input.category_id)
        .bind(input.location_id)
        .bind(input.image)
        .fetch_one(&self.pool)
        .await?;

        self.get_post(id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    async fn update_post(
        &self,
        id: i64,
        author_id: i64,
        input: PostInput,
    ) -> RepoResult<Option<Post>> {
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE posts
            SET title = $3,
                text = $4,
                pub_date = $5,
                category_id = $6,
                location_id = $7,
                image = COALESCE($8, image)
            WHERE id = $1 AND author_id = $2
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(author_id)
        .bind(input.title)
        .bind(input.text)
        .bind(input.pub_date)
        .bind(input.category_id)
        .bind(input.location_id)
        .bind(input.image)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(id) => self.get_post(id).await,
            None => Ok(None),
        }
    }

    /// `ON DELETE CASCADE` on `comments.post_id` removes the comments.
    async fn delete_post(&self, id: i64, author_id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1 AND author_id = $2")
            .bind(id)
            .bind(author_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_post_published(&self, id: i64, is_published: bool) -> RepoResult<bool> {
        let result = sqlx::query("UPDATE posts SET is_published = $2 WHERE id = $1")
            .bind(id)
            .bind(is_published)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- COMMENTS ---

    async fn list_comments(&self, post_id: i64) -> RepoResult<Vec<Comment>> {
        sqlx::query_as::<_, Comment>(&format!(
            "{COMMENT_SELECT} WHERE cm.post_id = $1 ORDER BY cm.created_at ASC, cm.id ASC"
        ))
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_comment(&self, post_id: i64, comment_id: i64) -> RepoResult<Option<Comment>> {
        sqlx::query_as::<_, Comment>(&format!(
            "{COMMENT_SELECT} WHERE cm.id = $1 AND cm.post_id = $2"
        ))
        .bind(comment_id)
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn add_comment(&self, post_id: i64, author_id: i64, text: String) -> RepoResult<Comment> {
        // Insert and join the author's name in one round trip.
        sqlx::query_as::<_, Comment>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (post_id, author_id, text) VALUES ($1, $2, $3)
                RETURNING id, text, author_id, post_id, created_at
            )
            SELECT i.id, i.text, i.author_id, i.post_id, i.created_at, u.username AS author_username
            FROM inserted i JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(post_id)
        .bind(author_id)
        .bind(text)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_comment(
        &self,
        id: i64,
        author_id: i64,
        text: String,
    ) -> RepoResult<Option<Comment>> {
        sqlx::query_as::<_, Comment>(
            r#"
            WITH updated AS (
                UPDATE comments SET text = $3 WHERE id = $1 AND author_id = $2
                RETURNING id, text, author_id, post_id, created_at
            )
            SELECT up.id, up.text, up.author_id, up.post_id, up.created_at,
                   u.username AS author_username
            FROM updated up JOIN users u ON u.id = up.author_id
            "#,
        )
        .bind(id)
        .bind(author_id)
        .bind(text)
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete_comment(&self, id: i64, author_id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1 AND author_id = $2")
            .bind(id)
            .bind(author_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
