//! GraphQL data source.
//!
//! Posts a `filteredPosts` query per page and a `categories` query for the
//! filter options. HTTP and GraphQL failures are mapped onto
//! [`SourceError`] so the feed can classify them.

use super::{Category, CategoryDirectory, DataSource, Page, Post, SourceError};
use crate::feed::FilterCriteria;
use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// Largest response body accepted.
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB

const POSTS_QUERY: &str = r#"query FilteredPosts($filter: PostFilter, $limit: Int, $offset: Int) {
  filteredPosts(filter: $filter, limit: $limit, offset: $offset) {
    id
    title
    content
    slug
    publishedAt
    updatedAt
    status
    categories { id name }
  }
}"#;

const CATEGORIES_QUERY: &str = r#"query GetCategories {
  categories {
    id
    name
    slug
    description
    parent { id name }
    subcategories { id name }
  }
}"#;

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PostFilter<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    category_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    search_text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sort_key: Option<&'static str>,
}

impl<'a> From<&'a FilterCriteria> for PostFilter<'a> {
    fn from(filter: &'a FilterCriteria) -> Self {
        Self {
            category_id: filter.category_id.as_deref(),
            search_text: filter.search_text.as_deref(),
            sort_key: filter.sort_key.map(|k| k.as_str()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostsData {
    filtered_posts: Option<Vec<Post>>,
}

#[derive(Debug, Deserialize)]
struct CategoriesData {
    categories: Option<Vec<WireCategory>>,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WireCategory {
    id: String,
    name: String,
    #[serde(default)]
    parent: Option<IdOnly>,
    #[serde(default)]
    subcategories: Vec<IdOnly>,
}

impl From<WireCategory> for Category {
    fn from(wire: WireCategory) -> Self {
        Self {
            id: wire.id,
            name: wire.name,
            parent_id: wire.parent.map(|p| p.id),
            subcategory_ids: wire.subcategories.into_iter().map(|s| s.id).collect(),
        }
    }
}

// ============================================================================
// Source
// ============================================================================

/// Data source backed by the site's GraphQL endpoint.
pub struct GraphqlSource {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    token: Option<SecretString>,
}

impl std::fmt::Debug for GraphqlSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphqlSource")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl GraphqlSource {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            timeout,
            token: None,
        }
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: Option<SecretString>) -> Self {
        self.token = token;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn execute<T>(&self, query: &str, variables: serde_json::Value) -> Result<T, SourceError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| SourceError::Timeout)?
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), endpoint = %self.endpoint, "GraphQL request rejected");
            return Err(match status.as_u16() {
                404 => SourceError::NotFound,
                code @ 500..=599 => SourceError::Server { status: code },
                code => SourceError::Validation(format!("HTTP {}", code)),
            });
        }

        let body = tokio::time::timeout(self.timeout, read_limited_bytes(response, MAX_RESPONSE_SIZE))
            .await
            .map_err(|_| SourceError::Timeout)??;

        let parsed: GraphqlResponse<T> =
            serde_json::from_slice(&body).map_err(|e| SourceError::Decode(e.to_string()))?;

        if !parsed.errors.is_empty() {
            let message = parsed
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(SourceError::Validation(message));
        }

        parsed
            .data
            .ok_or_else(|| SourceError::Decode("response has no data".to_string()))
    }
}

#[async_trait]
impl DataSource for GraphqlSource {
    fn name(&self) -> &str {
        "graphql"
    }

    async fn fetch_page(
        &self,
        filter: &FilterCriteria,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Post>, SourceError> {
        let variables = json!({
            "filter": PostFilter::from(filter),
            "limit": limit,
            "offset": offset,
        });
        let data: PostsData = self.execute(POSTS_QUERY, variables).await?;
        let posts = data.filtered_posts.unwrap_or_default();
        tracing::debug!(offset, limit, returned = posts.len(), "Fetched posts page");
        Ok(Page::new(offset, limit, posts))
    }
}

#[async_trait]
impl CategoryDirectory for GraphqlSource {
    async fn list_categories(&self) -> Result<Vec<Category>, SourceError> {
        let data: CategoriesData = self.execute(CATEGORIES_QUERY, json!({})).await?;
        Ok(data
            .categories
            .unwrap_or_default()
            .into_iter()
            .map(Category::from)
            .collect())
    }
}

fn map_transport_error(e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout
    } else {
        SourceError::Network(e.to_string())
    }
}

async fn read_limited_bytes(response: reqwest::Response, limit: usize) -> Result<Vec<u8>, SourceError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(SourceError::Decode(format!("response exceeds {} bytes", limit)));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(map_transport_error)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(SourceError::Decode(format!("response exceeds {} bytes", limit)));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::SortKey;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer) -> GraphqlSource {
        GraphqlSource::new(reqwest::Client::new(), server.uri(), Duration::from_secs(5))
    }

    fn posts_body(ids: &[&str]) -> serde_json::Value {
        let posts: Vec<_> = ids
            .iter()
            .map(|id| json!({ "id": id, "title": format!("Post {}", id), "content": "Body" }))
            .collect();
        json!({ "data": { "filteredPosts": posts } })
    }

    #[tokio::test]
    async fn fetch_page_sends_filter_and_paging_variables() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "variables": {
                    "filter": { "categoryId": "C1", "searchText": "rust", "sortKey": "oldest" },
                    "limit": 12,
                    "offset": 24
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(posts_body(&["a", "b"])))
            .expect(1)
            .mount(&server)
            .await;

        let filter = FilterCriteria::new(Some("C1".into()), Some("rust".into()), Some(SortKey::Oldest));
        let page = source(&server).fetch_page(&filter, 24, 12).await.unwrap();

        assert_eq!(page.offset, 24);
        let ids: Vec<_> = page.items.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn unset_filter_fields_are_omitted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "variables": { "filter": {} } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(posts_body(&[])))
            .mount(&server)
            .await;

        let page = source(&server)
            .fetch_page(&FilterCriteria::default(), 0, 12)
            .await
            .unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn bearer_token_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(posts_body(&["a"])))
            .expect(1)
            .mount(&server)
            .await;

        let source = source(&server).with_token(Some(SecretString::from("s3cret".to_string())));
        assert!(source.fetch_page(&FilterCriteria::default(), 0, 12).await.is_ok());
        assert!(!format!("{:?}", source).contains("s3cret"));
    }

    #[tokio::test]
    async fn http_statuses_map_to_source_errors() {
        for (status, expected) in [
            (404, SourceError::NotFound),
            (400, SourceError::Validation("HTTP 400".into())),
            (503, SourceError::Server { status: 503 }),
        ] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let err = source(&server)
                .fetch_page(&FilterCriteria::default(), 0, 12)
                .await
                .unwrap_err();
            assert_eq!(err, expected);
        }
    }

    #[tokio::test]
    async fn graphql_errors_are_validation_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": null,
                "errors": [{ "message": "Unknown category" }, { "message": "bad offset" }]
            })))
            .mount(&server)
            .await;

        let err = source(&server)
            .fetch_page(&FilterCriteria::default(), 0, 12)
            .await
            .unwrap_err();
        assert_eq!(err, SourceError::Validation("Unknown category; bad offset".into()));
    }

    #[tokio::test]
    async fn garbage_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = source(&server)
            .fetch_page(&FilterCriteria::default(), 0, 12)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(posts_body(&["a"]))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let source = GraphqlSource::new(reqwest::Client::new(), server.uri(), Duration::from_millis(100));
        let err = source
            .fetch_page(&FilterCriteria::default(), 0, 12)
            .await
            .unwrap_err();
        assert_eq!(err, SourceError::Timeout);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_network_error() {
        let source = GraphqlSource::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1/graphql",
            Duration::from_secs(5),
        );
        let err = source
            .fetch_page(&FilterCriteria::default(), 0, 12)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Network(_)));
    }

    #[tokio::test]
    async fn categories_map_parent_and_subcategories() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "categories": [
                    { "id": "youth", "name": "Youth", "slug": "youth", "parent": null,
                      "subcategories": [{ "id": "camps", "name": "Camps" }] },
                    { "id": "camps", "name": "Camps", "slug": "camps",
                      "parent": { "id": "youth", "name": "Youth" }, "subcategories": [] }
                ] }
            })))
            .mount(&server)
            .await;

        let categories = source(&server).list_categories().await.unwrap();
        assert_eq!(
            categories,
            vec![
                Category {
                    id: "youth".into(),
                    name: "Youth".into(),
                    parent_id: None,
                    subcategory_ids: vec!["camps".into()],
                },
                Category {
                    id: "camps".into(),
                    name: "Camps".into(),
                    parent_id: Some("youth".into()),
                    subcategory_ids: vec![],
                },
            ]
        );
    }
}
