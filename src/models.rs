use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// A registered account from the `users` table. Owns posts and comments.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    // Never rendered into templates.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    // Staff users manage categories and locations.
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
}

impl User {
    /// Display name used on profile pages: "First Last", or the username when both are empty.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

/// Category
///
/// A thematic section of the blog (`categories` table). Unpublished categories hide
/// every post filed under them.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct Category {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub slug: String,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

/// Location
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct Location {
    pub id: i64,
    pub name: String,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

/// Post
///
/// A row of the `posts` table joined with the author, category and location it points to,
/// plus the number of comments. Every repository read returns this shape so templates
/// and the visibility predicate work on one type.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub text: String,
    pub pub_date: DateTime<Utc>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub author_id: i64,
    // Both are set to NULL when the referenced row is deleted.
    pub location_id: Option<i64>,
    pub category_id: Option<i64>,
    // Object storage key of the uploaded picture.
    pub image: Option<String>,

    // Joined columns.
    pub author_username: String,
    pub category_title: Option<String>,
    pub category_slug: Option<String>,
    pub category_is_published: Option<bool>,
    pub location_name: Option<String>,
    pub location_is_published: Option<bool>,
    pub comment_count: i64,
}

/// Comment
///
/// A row of the `comments` table joined with the author's username.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct Comment {
    pub id: i64,
    pub text: String,
    pub author_id: i64,
    pub post_id: i64,
    pub created_at: DateTime<Utc>,
    pub author_username: String,
}

// --- Write Models (validated form output) ---

/// NewUser
///
/// Registration data after validation; the password is already hashed.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
}

/// ProfileUpdate
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// PostInput
///
/// Fields a user may set when creating or editing a post. The author comes from the
/// session; `is_published` is only changed by staff.
#[derive(Debug, Clone, Default)]
pub struct PostInput {
    pub title: String,
    pub text: String,
    pub pub_date: DateTime<Utc>,
    pub category_id: Option<i64>,
    pub location_id: Option<i64>,
    // `None` on edit keeps the current image.
    pub image: Option<String>,
}

/// NewCategory
#[derive(Debug, Clone, Default)]
pub struct NewCategory {
    pub title: String,
    pub description: String,
    pub slug: String,
    pub is_published: bool,
}

/// NewLocation
#[derive(Debug, Clone, Default)]
pub struct NewLocation {
    pub name: String,
    pub is_published: bool,
}
