//! Publication rules for posts.
//!
//! A post is shown to the public only when it is published, filed under a published
//! category and its publication date has passed. The author sees their own post no matter
//! what, but only on the detail page: listings always apply the full predicate.

use chrono::{DateTime, Utc};

use crate::models::Post;

/// True when `post` may appear in public pages at instant `now`.
///
/// A post without a category is never public.
pub fn is_publicly_visible(post: &Post, now: DateTime<Utc>) -> bool {
    post.is_published && post.category_is_published == Some(true) && post.pub_date <= now
}

/// Detail-page check: the author bypasses every condition.
pub fn can_view(post: &Post, viewer_id: Option<i64>, now: DateTime<Utc>) -> bool {
    viewer_id == Some(post.author_id) || is_publicly_visible(post, now)
}

/// PostFilter
///
/// Listing criteria interpreted by each repository backend. The Postgres repository turns
/// it into `WHERE` clauses, the in-memory one calls [`PostFilter::matches`].
#[derive(Debug, Clone)]
pub struct PostFilter {
    pub published_only: bool,
    pub category_id: Option<i64>,
    pub author_id: Option<i64>,
    pub now: DateTime<Utc>,
}

impl PostFilter {
    /// The filter used by every public listing (index, category, profile).
    pub fn public(now: DateTime<Utc>) -> Self {
        Self {
            published_only: true,
            category_id: None,
            author_id: None,
            now,
        }
    }

    pub fn in_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn by_author(mut self, author_id: i64) -> Self {
        self.author_id = Some(author_id);
        self
    }

    pub fn matches(&self, post: &Post) -> bool {
        if self.published_only && !is_publicly_visible(post, self.now) {
            return false;
        }
        if let Some(category_id) = self.category_id {
            if post.category_id != Some(category_id) {
                return false;
            }
        }
        if let Some(author_id) = self.author_id {
            if post.author_id != author_id {
                return false;
            }
        }
        true
    }
}
