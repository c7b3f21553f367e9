//! Data sources that the feed loads pages from.
//!
//! The feed core never talks to a backend directly. It goes through two
//! narrow traits:
//!
//! - [`DataSource`] - executes one page fetch for a filter/offset/limit
//! - [`CategoryDirectory`] - lists categories to populate filter options
//!
//! Two implementations ship with the crate:
//!
//! - [`graphql`] - the site's GraphQL endpoint over HTTP
//! - [`catalog`] - a local SQLite catalog, for offline browsing and demos

pub mod catalog;
pub mod graphql;

use crate::feed::{FeedItem, FilterCriteria};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use catalog::{Catalog, CatalogError};
pub use graphql::GraphqlSource;

// ============================================================================
// Error Types
// ============================================================================

/// Errors a data source can fail a page or category fetch with.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Connection, DNS or TLS failure before a response arrived
    #[error("Network error: {0}")]
    Network(String),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Backend answered with a 5xx status
    #[error("Server error: status {status}")]
    Server { status: u16 },
    /// Backend rejected the query (bad filter, GraphQL errors, 4xx)
    #[error("Invalid request: {0}")]
    Validation(String),
    /// Requested resource does not exist
    #[error("Not found")]
    NotFound,
    /// Response body could not be decoded
    #[error("Malformed response: {0}")]
    Decode(String),
    /// Local backend (catalog database) could not serve the request
    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// Data Structures
// ============================================================================

/// Category reference embedded in a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: String,
    pub name: String,
}

/// A post as listed by the site.
///
/// `id` is the deduplication key used by the feed store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub categories: Vec<CategoryRef>,
}

impl Post {
    /// Path of the post's detail page, relative to the site root.
    pub fn detail_path(&self) -> String {
        let key = self
            .slug
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.id);
        format!("/posts/{}", key)
    }
}

impl FeedItem for Post {
    fn item_id(&self) -> &str {
        &self.id
    }
}

/// A category available as a filter option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub subcategory_ids: Vec<String>,
}

/// One successful page fetch. Produced once, never mutated.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub offset: usize,
    pub limit: usize,
    pub items: Vec<T>,
    pub fetched_at: DateTime<Utc>,
}

impl<T> Page<T> {
    pub fn new(offset: usize, limit: usize, items: Vec<T>) -> Self {
        Self {
            offset,
            limit,
            items,
            fetched_at: Utc::now(),
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Executes paginated list queries against a backend.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Short name for logs and the status bar.
    fn name(&self) -> &str;

    /// Fetch `limit` posts matching `filter`, starting at `offset`.
    async fn fetch_page(
        &self,
        filter: &FilterCriteria,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Post>, SourceError>;
}

/// Lists the categories used to populate filter options.
#[async_trait]
pub trait CategoryDirectory: Send + Sync {
    async fn list_categories(&self) -> Result<Vec<Category>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str, slug: Option<&str>) -> Post {
        Post {
            id: id.to_string(),
            title: "Title".to_string(),
            content: String::new(),
            slug: slug.map(str::to_string),
            published_at: None,
            updated_at: None,
            status: None,
            categories: Vec::new(),
        }
    }

    #[test]
    fn detail_path_prefers_slug() {
        assert_eq!(post("7", Some("hello-world")).detail_path(), "/posts/hello-world");
    }

    #[test]
    fn detail_path_falls_back_to_id() {
        assert_eq!(post("7", None).detail_path(), "/posts/7");
        assert_eq!(post("7", Some("")).detail_path(), "/posts/7");
    }

    #[test]
    fn post_deserializes_from_camel_case() {
        let json = r#"{
            "id": "p1",
            "title": "Hello",
            "content": "Body",
            "slug": "hello",
            "publishedAt": "2024-03-01T10:00:00Z",
            "status": "published",
            "categories": [{"id": "c1", "name": "Youth"}]
        }"#;
        let post: Post = serde_json::from_str(json).unwrap();
        assert_eq!(post.id, "p1");
        assert_eq!(post.slug.as_deref(), Some("hello"));
        assert!(post.published_at.is_some());
        assert!(post.updated_at.is_none());
        assert_eq!(post.categories[0].name, "Youth");
    }

    #[test]
    fn source_error_messages() {
        assert_eq!(SourceError::Timeout.to_string(), "Request timed out");
        assert_eq!(
            SourceError::Server { status: 502 }.to_string(),
            "Server error: status 502"
        );
    }
}
