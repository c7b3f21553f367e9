//! Local SQLite catalog of posts and categories.
//!
//! Serves the same queries as the GraphQL endpoint from a file on disk, so
//! the browser works offline. Data gets in through [`Catalog::import_json`],
//! which accepts the `{ "categories": [...], "posts": [...] }` document the
//! endpoint's queries produce.

use super::{Category, CategoryDirectory, CategoryRef, DataSource, Page, Post, SourceError};
use crate::feed::{FilterCriteria, SortKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    QueryBuilder, Sqlite, SqlitePool,
};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Largest page the catalog will return.
pub const MAX_PAGE_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Another process holds the database lock
    #[error("The catalog is locked by another process. Close it and try again.")]
    Locked,

    #[error("Catalog migration failed: {0}")]
    Migration(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Import document is invalid: {0}")]
    InvalidDocument(#[from] serde_json::Error),

    #[error("Catalog error: {0}")]
    Database(#[from] sqlx::Error),
}

impl CatalogError {
    fn from_sqlx(err: sqlx::Error) -> Self {
        let message = err.to_string().to_lowercase();
        if message.contains("database is locked")
            || message.contains("database table is locked")
            || message.contains("unable to open database file")
        {
            return Self::Locked;
        }
        Self::Database(err)
    }
}

impl From<CatalogError> for SourceError {
    fn from(err: CatalogError) -> Self {
        SourceError::Unavailable(err.to_string())
    }
}

// ============================================================================
// Import Document
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ImportDocument {
    #[serde(default)]
    pub categories: Vec<ImportCategory>,
    #[serde(default)]
    pub posts: Vec<Post>,
}

#[derive(Debug, Deserialize)]
pub struct ImportCategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub parent: Option<ParentRef>,
}

#[derive(Debug, Deserialize)]
pub struct ParentRef {
    pub id: String,
}

/// Counts of rows written by an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    pub categories: usize,
    pub posts: usize,
}

// ============================================================================
// Catalog
// ============================================================================

type PostRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<i64>,
    Option<i64>,
);

#[derive(Debug, Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    /// Open (creating if needed) the catalog at `path` and run migrations.
    ///
    /// `":memory:"` opens a private in-memory catalog.
    pub async fn open(path: &str) -> Result<Self, CatalogError> {
        let in_memory = path == ":memory:";
        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(CatalogError::from_sqlx)?
            .pragma("busy_timeout", "5000")
            .foreign_keys(true);
        // An in-memory database exists per connection.
        let max_connections = if in_memory { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(CatalogError::from_sqlx)?;

        let catalog = Self { pool };
        catalog
            .migrate()
            .await
            .map_err(|e| CatalogError::Migration(e.to_string()))?;
        tracing::debug!(path, "Catalog opened");
        Ok(catalog)
    }

    /// Create tables and indexes in one transaction. Idempotent.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                slug TEXT,
                parent_id TEXT
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL DEFAULT '',
                slug TEXT,
                status TEXT,
                published_at INTEGER,
                updated_at INTEGER
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS post_categories (
                post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                category_id TEXT NOT NULL,
                PRIMARY KEY (post_id, category_id)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_published ON posts(published_at DESC)")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_post_categories_category ON post_categories(category_id)",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_categories_parent ON categories(parent_id)")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Import a JSON document from `path`.
    pub async fn import_json(&self, path: impl AsRef<Path>) -> Result<ImportSummary, CatalogError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CatalogError::Io {
                path: path.display().to_string(),
                source,
            })?;
        self.import_str(&raw).await
    }

    pub async fn import_str(&self, raw: &str) -> Result<ImportSummary, CatalogError> {
        let document: ImportDocument = serde_json::from_str(raw)?;
        self.import(&document).await
    }

    /// Upsert every category and post of `document` in one transaction.
    ///
    /// A post's category links are replaced by the ones in the document.
    /// Categories only referenced from posts are created by name.
    pub async fn import(&self, document: &ImportDocument) -> Result<ImportSummary, CatalogError> {
        let mut tx = self.pool.begin().await.map_err(CatalogError::from_sqlx)?;

        for category in &document.categories {
            sqlx::query(
                r#"
                INSERT INTO categories (id, name, slug, parent_id)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    slug = excluded.slug,
                    parent_id = excluded.parent_id
            "#,
            )
            .bind(&category.id)
            .bind(&category.name)
            .bind(&category.slug)
            .bind(category.parent.as_ref().map(|p| p.id.as_str()))
            .execute(&mut *tx)
            .await
            .map_err(CatalogError::from_sqlx)?;
        }

        for post in &document.posts {
            sqlx::query(
                r#"
                INSERT INTO posts (id, title, content, slug, status, published_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    content = excluded.content,
                    slug = excluded.slug,
                    status = excluded.status,
                    published_at = excluded.published_at,
                    updated_at = excluded.updated_at
            "#,
            )
            .bind(&post.id)
            .bind(&post.title)
            .bind(&post.content)
            .bind(&post.slug)
            .bind(&post.status)
            .bind(post.published_at.map(|t| t.timestamp()))
            .bind(post.updated_at.map(|t| t.timestamp()))
            .execute(&mut *tx)
            .await
            .map_err(CatalogError::from_sqlx)?;

            sqlx::query("DELETE FROM post_categories WHERE post_id = ?")
                .bind(&post.id)
                .execute(&mut *tx)
                .await
                .map_err(CatalogError::from_sqlx)?;

            for category in &post.categories {
                sqlx::query("INSERT OR IGNORE INTO categories (id, name) VALUES (?, ?)")
                    .bind(&category.id)
                    .bind(&category.name)
                    .execute(&mut *tx)
                    .await
                    .map_err(CatalogError::from_sqlx)?;
                sqlx::query(
                    "INSERT OR IGNORE INTO post_categories (post_id, category_id) VALUES (?, ?)",
                )
                .bind(&post.id)
                .bind(&category.id)
                .execute(&mut *tx)
                .await
                .map_err(CatalogError::from_sqlx)?;
            }
        }

        tx.commit().await.map_err(CatalogError::from_sqlx)?;

        let summary = ImportSummary {
            categories: document.categories.len(),
            posts: document.posts.len(),
        };
        tracing::info!(
            categories = summary.categories,
            posts = summary.posts,
            "Catalog import complete"
        );
        Ok(summary)
    }

    /// List published posts matching `filter`.
    pub async fn query_posts(
        &self,
        filter: &FilterCriteria,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Post>, CatalogError> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT p.id, p.title, p.content, p.slug, p.status, p.published_at, p.updated_at \
             FROM posts p WHERE (p.status IS NULL OR p.status = 'published')",
        );

        if let Some(category_id) = &filter.category_id {
            query
                .push(
                    " AND EXISTS (SELECT 1 FROM post_categories pc \
                     JOIN categories c ON c.id = pc.category_id \
                     WHERE pc.post_id = p.id AND (c.id = ",
                )
                .push_bind(category_id.clone())
                .push(" OR c.parent_id = ")
                .push_bind(category_id.clone())
                .push("))");
        }

        if let Some(search) = &filter.search_text {
            let pattern = format!("%{}%", escape_like(search.trim()));
            query
                .push(" AND (p.title LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR p.content LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }

        query.push(match filter.sort_key.unwrap_or(SortKey::Newest) {
            SortKey::Newest => " ORDER BY p.published_at IS NULL, p.published_at DESC, p.id",
            SortKey::Oldest => " ORDER BY p.published_at IS NULL, p.published_at ASC, p.id",
            SortKey::Title => " ORDER BY p.title COLLATE NOCASE, p.id",
        });

        query
            .push(" LIMIT ")
            .push_bind(limit as i64)
            .push(" OFFSET ")
            .push_bind(offset as i64);

        let rows: Vec<PostRow> = query.build_query_as().fetch_all(&self.pool).await?;
        let mut posts: Vec<Post> = rows
            .into_iter()
            .map(
                |(id, title, content, slug, status, published_at, updated_at)| Post {
                    id,
                    title,
                    content,
                    slug,
                    status,
                    published_at: published_at.and_then(from_unix),
                    updated_at: updated_at.and_then(from_unix),
                    categories: Vec::new(),
                },
            )
            .collect();

        self.attach_categories(&mut posts).await?;
        Ok(posts)
    }

    async fn attach_categories(&self, posts: &mut [Post]) -> Result<(), CatalogError> {
        if posts.is_empty() {
            return Ok(());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT pc.post_id, c.id, c.name FROM post_categories pc \
             JOIN categories c ON c.id = pc.category_id WHERE pc.post_id IN (",
        );
        let mut ids = query.separated(", ");
        for post in posts.iter() {
            ids.push_bind(post.id.clone());
        }
        query.push(") ORDER BY c.name");

        let rows: Vec<(String, String, String)> =
            query.build_query_as().fetch_all(&self.pool).await?;
        let mut by_post: HashMap<String, Vec<CategoryRef>> = HashMap::new();
        for (post_id, id, name) in rows {
            by_post.entry(post_id).or_default().push(CategoryRef { id, name });
        }
        for post in posts.iter_mut() {
            post.categories = by_post.remove(&post.id).unwrap_or_default();
        }
        Ok(())
    }

    /// All categories, with their direct subcategories resolved.
    pub async fn categories(&self) -> Result<Vec<Category>, CatalogError> {
        let rows: Vec<(String, String, Option<String>)> =
            sqlx::query_as("SELECT id, name, parent_id FROM categories ORDER BY name COLLATE NOCASE, id")
                .fetch_all(&self.pool)
                .await?;

        let mut children: HashMap<&str, Vec<String>> = HashMap::new();
        for (id, _, parent_id) in &rows {
            if let Some(parent) = parent_id {
                children.entry(parent.as_str()).or_default().push(id.clone());
            }
        }

        Ok(rows
            .iter()
            .map(|(id, name, parent_id)| Category {
                id: id.clone(),
                name: name.clone(),
                parent_id: parent_id.clone(),
                subcategory_ids: children.get(id.as_str()).cloned().unwrap_or_default(),
            })
            .collect())
    }
}

#[async_trait]
impl DataSource for Catalog {
    fn name(&self) -> &str {
        "catalog"
    }

    async fn fetch_page(
        &self,
        filter: &FilterCriteria,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Post>, SourceError> {
        if limit == 0 {
            return Err(SourceError::Validation("limit must be positive".to_string()));
        }
        let limit = limit.min(MAX_PAGE_LIMIT);
        let posts = self.query_posts(filter, offset, limit).await?;
        Ok(Page::new(offset, limit, posts))
    }
}

#[async_trait]
impl CategoryDirectory for Catalog {
    async fn list_categories(&self) -> Result<Vec<Category>, SourceError> {
        Ok(self.categories().await?)
    }
}

fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Escape `%`, `_` and the escape character itself for a LIKE pattern.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOCUMENT: &str = r#"{
        "categories": [
            { "id": "youth", "name": "Youth", "slug": "youth" },
            { "id": "camps", "name": "Camps", "parent": { "id": "youth" } },
            { "id": "men", "name": "Men" }
        ],
        "posts": [
            { "id": "p1", "title": "Summer camp recap", "content": "Kids had fun",
              "publishedAt": "2024-07-01T00:00:00Z", "status": "published",
              "categories": [{ "id": "camps", "name": "Camps" }] },
            { "id": "p2", "title": "Youth night", "content": "Pizza and games",
              "publishedAt": "2024-06-01T00:00:00Z",
              "categories": [{ "id": "youth", "name": "Youth" }] },
            { "id": "p3", "title": "Breakfast", "content": "Men's 100% breakfast",
              "publishedAt": "2024-05-01T00:00:00Z", "status": "published",
              "categories": [{ "id": "men", "name": "Men" }] },
            { "id": "p4", "title": "Draft", "content": "unfinished",
              "status": "draft", "categories": [{ "id": "youth", "name": "Youth" }] }
        ]
    }"#;

    async fn catalog() -> Catalog {
        let catalog = Catalog::open(":memory:").await.unwrap();
        catalog.import_str(DOCUMENT).await.unwrap();
        catalog
    }

    fn ids(posts: &[Post]) -> Vec<&str> {
        posts.iter().map(|p| p.id.as_str()).collect()
    }

    #[tokio::test]
    async fn lists_published_posts_newest_first() {
        let catalog = catalog().await;
        let page = catalog
            .fetch_page(&FilterCriteria::default(), 0, 12)
            .await
            .unwrap();
        assert_eq!(ids(&page.items), vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn category_filter_includes_direct_subcategories() {
        let catalog = catalog().await;
        let page = catalog
            .fetch_page(&FilterCriteria::for_category("youth"), 0, 12)
            .await
            .unwrap();
        assert_eq!(ids(&page.items), vec!["p1", "p2"]);
        assert_eq!(page.items[0].categories[0].name, "Camps");
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_treats_wildcards_literally() {
        let catalog = catalog().await;
        let filter = FilterCriteria::new(None, Some("PIZZA".into()), None);
        let page = catalog.fetch_page(&filter, 0, 12).await.unwrap();
        assert_eq!(ids(&page.items), vec!["p2"]);

        let filter = FilterCriteria::new(None, Some("100%".into()), None);
        let page = catalog.fetch_page(&filter, 0, 12).await.unwrap();
        assert_eq!(ids(&page.items), vec!["p3"]);

        let filter = FilterCriteria::new(None, Some("_".into()), None);
        let page = catalog.fetch_page(&filter, 0, 12).await.unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn sort_keys_change_order() {
        let catalog = catalog().await;
        let oldest = FilterCriteria::new(None, None, Some(SortKey::Oldest));
        let page = catalog.fetch_page(&oldest, 0, 12).await.unwrap();
        assert_eq!(ids(&page.items), vec!["p3", "p2", "p1"]);

        let title = FilterCriteria::new(None, None, Some(SortKey::Title));
        let page = catalog.fetch_page(&title, 0, 12).await.unwrap();
        assert_eq!(ids(&page.items), vec!["p3", "p1", "p2"]);
    }

    #[tokio::test]
    async fn offset_and_limit_page_through_results() {
        let catalog = catalog().await;
        let first = catalog.fetch_page(&FilterCriteria::default(), 0, 2).await.unwrap();
        let second = catalog.fetch_page(&FilterCriteria::default(), 2, 2).await.unwrap();
        assert_eq!(ids(&first.items), vec!["p1", "p2"]);
        assert_eq!(ids(&second.items), vec!["p3"]);
    }

    #[tokio::test]
    async fn zero_limit_is_rejected_and_large_limit_is_capped() {
        let catalog = catalog().await;
        let err = catalog
            .fetch_page(&FilterCriteria::default(), 0, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Validation(_)));

        let page = catalog
            .fetch_page(&FilterCriteria::default(), 0, 5000)
            .await
            .unwrap();
        assert_eq!(page.limit, MAX_PAGE_LIMIT);
    }

    #[tokio::test]
    async fn reimport_upserts_instead_of_duplicating() {
        let catalog = catalog().await;
        catalog
            .import_str(r#"{ "posts": [{ "id": "p1", "title": "Renamed", "status": "published" }] }"#)
            .await
            .unwrap();

        let page = catalog
            .fetch_page(&FilterCriteria::default(), 0, 12)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 3);
        let p1 = page.items.iter().find(|p| p.id == "p1").unwrap();
        assert_eq!(p1.title, "Renamed");
        assert!(p1.categories.is_empty(), "links replaced by the new document");
    }

    #[tokio::test]
    async fn categories_resolve_subcategories() {
        let catalog = catalog().await;
        let categories = catalog.list_categories().await.unwrap();
        let youth = categories.iter().find(|c| c.id == "youth").unwrap();
        assert_eq!(youth.subcategory_ids, vec!["camps".to_string()]);
        let camps = categories.iter().find(|c| c.id == "camps").unwrap();
        assert_eq!(camps.parent_id.as_deref(), Some("youth"));
    }

    #[tokio::test]
    async fn invalid_document_is_rejected() {
        let catalog = Catalog::open(":memory:").await.unwrap();
        let err = catalog.import_str("{ not json").await.unwrap_err();
        assert!(matches!(err, CatalogError::InvalidDocument(_)));
    }

    #[tokio::test]
    async fn missing_import_file_reports_path() {
        let catalog = Catalog::open(":memory:").await.unwrap();
        let err = catalog
            .import_json("/definitely/not/here.json")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }

    #[tokio::test]
    async fn import_into_a_locked_catalog_reports_locked() {
        use sqlx::Connection;

        let path = std::env::temp_dir().join(format!("postfeed-lock-{}.db", std::process::id()));
        let path_str = path.to_str().unwrap().to_string();
        let _ = std::fs::remove_file(&path);
        let catalog = Catalog::open(&path_str).await.unwrap();

        let mut holder = sqlx::SqliteConnection::connect(&format!("sqlite:{}", path_str))
            .await
            .unwrap();
        sqlx::query("BEGIN EXCLUSIVE").execute(&mut holder).await.unwrap();

        let err = catalog.import_str(DOCUMENT).await.unwrap_err();
        assert!(matches!(err, CatalogError::Locked), "got {:?}", err);

        sqlx::query("ROLLBACK").execute(&mut holder).await.unwrap();
        drop(holder);
        drop(catalog);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn lock_errors_map_to_locked() {
        let err = CatalogError::from_sqlx(sqlx::Error::Protocol("database is locked".into()));
        assert!(matches!(err, CatalogError::Locked));
        let err = CatalogError::from_sqlx(sqlx::Error::RowNotFound);
        assert!(matches!(err, CatalogError::Database(_)));
    }

    #[test]
    fn escape_like_escapes_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
