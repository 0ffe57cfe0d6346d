//! NeoDB catalog search client.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::config::NeoDbConfig;
use crate::error::FetchError;

/// Catalog categories the search accepts.
pub const CATEGORIES: &[&str] = &["book", "movie", "tv", "album"];

/// Cache key for a search: `"{category}:{query}"`, trimmed and lowercased.
/// An absent category leaves the prefix empty.
pub fn query_key(category: Option<&str>, query: &str) -> String {
    let category = category.map(str::trim).unwrap_or_default();
    format!("{category}:{}", query.trim()).to_lowercase()
}

#[derive(Debug, Clone)]
pub struct NeoDbClient {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl NeoDbClient {
    pub fn new(config: &NeoDbConfig, token: Option<String>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| FetchError::Upstream(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, api_url: config.api_url.clone(), token })
    }

    /// Raw catalog items matching `query`, optionally within one category.
    pub async fn search(&self, query: &str, category: Option<&str>) -> Result<Vec<Value>, FetchError> {
        let Some(token) = &self.token else {
            return Err(FetchError::Upstream("NEODB_ACCESS_TOKEN is not set".into()));
        };

        let mut params = vec![("query", query)];
        if let Some(category) = category {
            params.push(("category", category));
        }

        let response = self
            .client
            .get(&self.api_url)
            .query(&params)
            .header(reqwest::header::ACCEPT, "application/json")
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.api_url, error = %e, "neodb request failed");
                if e.is_timeout() { FetchError::Timeout } else { FetchError::Upstream(e.to_string()) }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "neodb returned error status");
            return Err(FetchError::Upstream(format!("HTTP {status}: {body}")));
        }

        let parsed = response
            .json::<SearchResponse>()
            .await
            .map_err(|e| FetchError::Upstream(format!("failed to parse search response: {e}")))?;
        debug!(query, items = parsed.data.len(), "neodb search done");
        Ok(parsed.data)
    }
}

/// One line per item: title, year and catalog link.
pub fn describe(item: &Value) -> String {
    let title = item.get("title").and_then(Value::as_str).unwrap_or("untitled");
    let category = item
        .get("category")
        .or_else(|| item.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("item");
    let url = item_url(item);
    match item.get("year").or_else(|| item.get("pub_year")).and_then(Value::as_u64) {
        Some(year) => format!("[{category}] {title} ({year}) {url}"),
        None => format!("[{category}] {title} {url}"),
    }
}

fn item_url(item: &Value) -> String {
    let raw = item
        .get("url")
        .or_else(|| item.get("id"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    if raw.starts_with("http") {
        raw.to_string()
    } else {
        format!("https://neodb.social/{}", raw.trim_start_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_is_normalised() {
        assert_eq!(query_key(Some("Book"), "  Dune "), "book:dune");
        assert_eq!(query_key(None, "Dune"), ":dune");
        assert_eq!(query_key(Some("book"), "dune"), query_key(Some(" BOOK"), "DUNE"));
    }

    #[test]
    fn describe_builds_absolute_link() {
        let item = json!({ "title": "Dune", "category": "book", "pub_year": 1965, "url": "/book/abc" });
        assert_eq!(describe(&item), "[book] Dune (1965) https://neodb.social/book/abc");
        let bare = json!({ "title": "X", "type": "album", "url": "https://neodb.social/album/1" });
        assert_eq!(describe(&bare), "[album] X https://neodb.social/album/1");
    }

    fn config(api_url: String) -> NeoDbConfig {
        NeoDbConfig { api_url, timeout_seconds: 1 }
    }

    #[tokio::test]
    async fn search_without_token_fails_fast() {
        let client = NeoDbClient::new(&config("http://localhost:0".into()), None).unwrap();
        assert!(matches!(client.search("dune", None).await, Err(FetchError::Upstream(_))));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = NeoDbClient::new(&config(format!("http://{addr}/api/catalog/search")), Some("t".into())).unwrap();
        let res = tokio::time::timeout(Duration::from_secs(10), client.search("dune", None))
            .await
            .expect("request must give up on its own");
        assert!(matches!(res, Err(FetchError::Timeout)));
        server.abort();
    }
}
