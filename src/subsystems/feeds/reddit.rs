//! Public Reddit listing client (`/r/{sub}/hot.json`).
//!
//! Only media posts survive the filter: direct images, reddit-hosted video
//! and mp4/webm/gifv links. Stickied posts are skipped.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::config::RedditConfig;
use crate::error::FetchError;

const IMAGE_EXTS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif"];
const VIDEO_EXTS: &[&str] = &[".mp4", ".webm", ".gifv"];

/// Cached shape of one post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedditPost {
    pub title: String,
    pub url: String,
    pub permalink: String,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub media: Option<Value>,
    #[serde(default)]
    pub stickied: bool,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

impl RedditPost {
    pub fn is_image(&self) -> bool {
        IMAGE_EXTS.iter().any(|ext| self.url.ends_with(ext))
    }

    /// Playable link for video posts: reddit's fallback URL or the direct link.
    pub fn video_url(&self) -> Option<&str> {
        if let Some(url) = self.reddit_video_url() {
            return Some(url);
        }
        VIDEO_EXTS.iter().any(|ext| self.url.ends_with(ext)).then_some(self.url.as_str())
    }

    fn reddit_video_url(&self) -> Option<&str> {
        if !self.is_video {
            return None;
        }
        self.media.as_ref()?.get("reddit_video")?.get("fallback_url")?.as_str()
    }

    fn is_media(&self) -> bool {
        let reddit_video = self.is_video
            && self.media.as_ref().is_some_and(|m| m.get("reddit_video").is_some());
        self.is_image() || reddit_video || VIDEO_EXTS.iter().any(|ext| self.url.ends_with(ext))
    }

    /// Full link to the discussion page.
    pub fn post_link(&self) -> String {
        format!("https://reddit.com{}", self.permalink)
    }
}

#[derive(Debug, Clone)]
pub struct RedditClient {
    client: Client,
    api_url: String,
    limit: u32,
}

impl RedditClient {
    pub fn new(config: &RedditConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Upstream(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, api_url: config.api_url.trim_end_matches('/').to_string(), limit: config.limit })
    }

    /// Hot media posts of `subreddit`, in listing order.
    pub async fn hot_media(&self, subreddit: &str) -> Result<Vec<RedditPost>, FetchError> {
        let url = format!("{}/r/{subreddit}/hot.json", self.api_url);
        debug!(%url, limit = self.limit, "fetching reddit listing");

        let response = self
            .client
            .get(&url)
            .query(&[("limit", self.limit.to_string()), ("raw_json", "1".to_string())])
            .send()
            .await
            .map_err(|e| {
                error!(%url, error = %e, "reddit request failed");
                if e.is_timeout() { FetchError::Timeout } else { FetchError::Upstream(e.to_string()) }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, %subreddit, "reddit returned error status");
            return Err(FetchError::Upstream(format!("HTTP {status}: {body}")));
        }

        let listing = response.json::<Listing>().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Upstream(format!("failed to parse listing: {e}"))
            }
        })?;

        let posts = media_posts(listing);
        debug!(%subreddit, posts = posts.len(), "reddit listing filtered");
        Ok(posts)
    }
}

fn media_posts(listing: Listing) -> Vec<RedditPost> {
    listing
        .data
        .children
        .into_iter()
        .map(|child| child.data)
        .filter(|post| !post.stickied && post.is_media())
        .map(|mut post| {
            post.thumbnail = post.thumbnail.filter(|t| t.starts_with("http"));
            post
        })
        .collect()
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: RedditPost,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn listing(children: Value) -> Listing {
        serde_json::from_value(json!({ "kind": "Listing", "data": { "children": children } })).unwrap()
    }

    fn post(url: &str) -> Value {
        json!({ "kind": "t3", "data": {
            "title": "cat", "url": url, "permalink": "/r/aww/comments/x/",
            "is_video": false, "media": null, "stickied": false, "thumbnail": "self"
        }})
    }

    #[test]
    fn keeps_only_media_and_skips_stickied() {
        let mut stickied = post("https://i.redd.it/pinned.jpg");
        stickied["data"]["stickied"] = json!(true);
        let mut native = post("https://v.redd.it/abc");
        native["data"]["is_video"] = json!(true);
        native["data"]["media"] = json!({ "reddit_video": { "fallback_url": "https://v.redd.it/abc/720.mp4" } });

        let posts = media_posts(listing(json!([
            post("https://i.redd.it/a.png"),
            post("https://example.com/article"),
            stickied,
            native,
            post("https://i.imgur.com/b.gifv"),
        ])));

        let urls: Vec<&str> = posts.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["https://i.redd.it/a.png", "https://v.redd.it/abc", "https://i.imgur.com/b.gifv"]);
        assert_eq!(posts[1].video_url(), Some("https://v.redd.it/abc/720.mp4"));
        assert_eq!(posts[2].video_url(), Some("https://i.imgur.com/b.gifv"));
        assert!(posts[0].is_image());
        // Non-URL thumbnails are dropped.
        assert_eq!(posts[0].thumbnail, None);
    }

    #[test]
    fn post_link_prefixes_host() {
        let p: RedditPost = serde_json::from_value(post("https://i.redd.it/a.png")["data"].clone()).unwrap();
        assert_eq!(p.post_link(), "https://reddit.com/r/aww/comments/x/");
    }
}
