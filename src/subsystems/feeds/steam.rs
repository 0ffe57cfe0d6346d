//! Steam storefront search client (`storesearch`).
//!
//! Results are priced in one region's currency; the region code is part of
//! the cache key.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::SteamConfig;
use crate::error::FetchError;

/// Store regions a search may be priced in. The first is the default.
pub const REGIONS: &[&str] = &["cn", "us", "jp", "hk", "my", "ca", "eu", "ru", "tr", "ar"];

/// Cache key for a search: `"{region}:{term}"`, trimmed and lowercased.
pub fn query_key(region: &str, term: &str) -> String {
    format!("{}:{}", region.trim(), term.trim()).to_lowercase()
}

/// Cached shape of one store hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SteamItem {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub price: Option<SteamPrice>,
}

/// Prices are in the currency's minor unit (cents).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SteamPrice {
    pub currency: String,
    pub initial: u64,
    #[serde(rename = "final")]
    pub final_price: u64,
}

impl SteamItem {
    pub fn store_link(&self) -> String {
        format!("https://store.steampowered.com/app/{}", self.id)
    }

    /// One line: name, price (with discount when on sale) and store link.
    pub fn describe(&self) -> String {
        let price = match &self.price {
            None => "free or unpriced".to_string(),
            Some(p) if p.final_price < p.initial => {
                let off = 100 - p.final_price * 100 / p.initial;
                format!("{} {} (-{off}%)", p.currency, minor_units(p.final_price))
            }
            Some(p) => format!("{} {}", p.currency, minor_units(p.final_price)),
        };
        format!("{} | {price} | {}", self.name, self.store_link())
    }
}

fn minor_units(cents: u64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

/// The hit that best matches `term`: an exact name match, else a name
/// containing `term` with no extra digits (so "Portal" does not pick
/// "Portal 2"), else the first hit.
pub fn best_match<'a>(items: &'a [SteamItem], term: &str) -> Option<&'a SteamItem> {
    let wanted = term.trim().to_lowercase();
    items
        .iter()
        .find(|item| item.name.to_lowercase() == wanted)
        .or_else(|| {
            items.iter().find(|item| {
                let name = item.name.to_lowercase();
                name.contains(&wanted) && !name.replace(&wanted, "").chars().any(|c| c.is_ascii_digit())
            })
        })
        .or_else(|| items.first())
}

#[derive(Debug, Clone)]
pub struct SteamClient {
    client: Client,
    api_url: String,
    language: String,
}

impl SteamClient {
    pub fn new(config: &SteamConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| FetchError::Upstream(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, api_url: config.api_url.clone(), language: config.language.clone() })
    }

    /// Store hits for `term`, priced for `region`.
    pub async fn search(&self, term: &str, region: &str) -> Result<Vec<SteamItem>, FetchError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("term", term), ("cc", region), ("l", self.language.as_str())])
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.api_url, error = %e, "steam request failed");
                if e.is_timeout() { FetchError::Timeout } else { FetchError::Upstream(e.to_string()) }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, region, "steam returned error status");
            return Err(FetchError::Upstream(format!("HTTP {status}: {body}")));
        }

        let parsed = response
            .json::<SearchResponse>()
            .await
            .map_err(|e| FetchError::Upstream(format!("failed to parse store search: {e}")))?;
        debug!(term, region, items = parsed.items.len(), "steam search done");
        Ok(parsed.items)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SteamItem>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(id: u64, name: &str) -> SteamItem {
        SteamItem { id, name: name.into(), price: None }
    }

    #[test]
    fn key_is_normalised() {
        assert_eq!(query_key("US", "  Hades "), "us:hades");
    }

    #[test]
    fn best_match_prefers_exact_then_digit_free() {
        let items = vec![item(1, "Portal 2"), item(2, "Portal"), item(3, "Portal Stories: Mel")];
        assert_eq!(best_match(&items, "portal").map(|i| i.id), Some(2));

        let items = vec![item(1, "Portal 2"), item(3, "Portal Stories: Mel")];
        assert_eq!(best_match(&items, "portal").map(|i| i.id), Some(3));

        let items = vec![item(1, "Half-Life 2")];
        assert_eq!(best_match(&items, "zzz").map(|i| i.id), Some(1));
        assert!(best_match(&[], "x").is_none());
    }

    #[test]
    fn wire_items_parse_and_describe() {
        let parsed: SearchResponse = serde_json::from_value(json!({
            "total": 2,
            "items": [
                { "type": "app", "name": "Hades", "id": 1145360,
                  "price": { "currency": "USD", "initial": 2499, "final": 1249 } },
                { "type": "app", "name": "Dota 2", "id": 570 }
            ]
        }))
        .unwrap();
        assert_eq!(parsed.items.len(), 2);
        assert_eq!(
            parsed.items[0].describe(),
            "Hades | USD 12.49 (-51%) | https://store.steampowered.com/app/1145360"
        );
        assert_eq!(parsed.items[1].describe(), "Dota 2 | free or unpriced | https://store.steampowered.com/app/570");
    }
}
