//! Cached upstream listings and the per-user "not seen yet" pick.
//!
//! A pick runs in two locked phases. First the listing is resolved through
//! the source's TTL cache under the per-source lock, so concurrent misses
//! collapse into one fetch. Then, under the user's lock, an unseen item is
//! drawn at random and recorded in the user's recency set.

pub mod neodb;
pub mod reddit;
pub mod steam;

use std::future::Future;
use std::sync::Arc;

use rand::seq::SliceRandom;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use crate::config::Config;
use crate::error::{AppError, FetchError};
use crate::subsystems::memory::{MemorySystem, SeenSet, TtlCache};
use neodb::NeoDbClient;
use reddit::{RedditClient, RedditPost};
use steam::{SteamClient, SteamItem};

/// The only subreddits `/aww` serves; a random one when none is named.
pub const CUTE_SUBREDDITS: &[&str] = &[
    "AnimalsBeingDerps",
    "AnimalsOnReddit",
    "aww",
    "Awww",
    "Birding",
    "birdwatching",
    "BirdsArentReal",
    "Catmemes",
    "Eyebleach",
    "Floof",
    "Ornithology",
    "parrots",
    "PartyParrot",
    "rarepuppers",
];

/// Canonical spelling of `name` if it is one of [`CUTE_SUBREDDITS`]
/// (case-insensitive, optional `r/` prefix).
pub fn cute_subreddit(name: &str) -> Option<&'static str> {
    let name = name.trim();
    let name = name.strip_prefix("r/").unwrap_or(name);
    CUTE_SUBREDDITS.iter().copied().find(|s| s.eq_ignore_ascii_case(name))
}

pub struct FeedService {
    memory: Arc<MemorySystem>,
    reddit: RedditClient,
    neodb: NeoDbClient,
    steam: SteamClient,
}

impl FeedService {
    pub fn new(memory: Arc<MemorySystem>, config: &Config) -> Result<Self, AppError> {
        Ok(Self {
            memory,
            reddit: RedditClient::new(&config.reddit)?,
            neodb: NeoDbClient::new(&config.neodb, config.neodb_token.clone())?,
            steam: SteamClient::new(&config.steam)?,
        })
    }

    /// A random media post from `subreddit` (or a random cute one) that
    /// `user_id` has not been shown recently.
    pub async fn aww(&self, user_id: &str, subreddit: Option<&str>) -> Result<(String, RedditPost), AppError> {
        let subreddit = match subreddit {
            Some(name) => cute_subreddit(name)
                .ok_or_else(|| AppError::InvalidInput(format!("r/{name} is not on the list; try /help")))?,
            None => CUTE_SUBREDDITS.choose(&mut rand::thread_rng()).copied().unwrap_or("aww"),
        };

        let post = pick_fresh(
            &self.memory,
            self.memory.reddit_cache(),
            self.memory.reddit_seen(),
            user_id,
            subreddit,
            post_url,
            || self.reddit.hot_media(subreddit),
        )
        .await?;
        Ok((subreddit.to_string(), post))
    }

    /// Catalog search, cached under the normalised query key.
    pub async fn neodb_search(&self, query: &str, category: Option<&str>) -> Result<Vec<Value>, AppError> {
        let key = neodb::query_key(category, query);
        let category = category.map(str::trim).filter(|c| !c.is_empty()).map(str::to_lowercase);
        let query = query.trim();
        self.memory
            .neodb_cache()
            .get_or_fetch(&key, || self.neodb.search(query, category.as_deref()))
            .await
    }

    /// Store hits for `term` priced in `region` (default the first of
    /// [`steam::REGIONS`]), cached per region and term, best match first.
    pub async fn steam_search(&self, term: &str, region: Option<&str>) -> Result<Vec<SteamItem>, AppError> {
        let region = match region {
            Some(r) => steam::REGIONS
                .iter()
                .copied()
                .find(|known| known.eq_ignore_ascii_case(r.trim()))
                .ok_or_else(|| AppError::InvalidInput(format!("unknown region {r}; try /help")))?,
            None => steam::REGIONS[0],
        };
        let term = term.trim();
        let key = steam::query_key(region, term);
        let mut items = self
            .memory
            .steam_cache()
            .get_or_fetch(&key, || self.steam.search(term, region))
            .await?;

        let best = steam::best_match(&items, term).map(|b| b.id);
        if let Some(pos) = best.and_then(|id| items.iter().position(|i| i.id == id)) {
            items[..=pos].rotate_right(1);
        }
        Ok(items)
    }
}

fn post_url(post: &RedditPost) -> &str {
    &post.url
}

/// Resolve `source` through `cache` (fetching on a miss), then draw one item
/// the user has not seen and mark it seen.
pub async fn pick_fresh<T, I, F, Fut>(
    memory: &MemorySystem,
    cache: &TtlCache,
    seen: &SeenSet,
    user_id: &str,
    source: &str,
    id_of: I,
    fetch: F,
) -> Result<T, AppError>
where
    T: Serialize + DeserializeOwned + Clone,
    I: Fn(&T) -> &str,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>, FetchError>>,
{
    let items = cache.get_or_fetch(source, fetch).await?;

    let _guard = memory.user_locks().acquire(user_id).await;
    let picked = seen
        .pick(user_id, &items, &id_of, &mut rand::thread_rng())
        .cloned()
        .ok_or_else(|| AppError::EmptyResult(format!("{}:{source}", cache.source())))?;
    seen.mark_seen(user_id, id_of(&picked));

    info!(user_id, source = %source, candidates = items.len(), "item picked");
    Ok(picked)
}
