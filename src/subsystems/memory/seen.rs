//! Bounded per-user recency set of already-served item identifiers.
//!
//! Each user's identifiers are kept oldest-first in a `VecDeque`; marking a
//! new one past the cap evicts from the front. Re-marking an identifier moves
//! it to the back. Stored as `{ "sent_cache": { user_id: [id, ...] } }`.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use super::store::DictNamespace;

const SEEN_KEY: &str = "sent_cache";

#[derive(Debug)]
pub struct SeenSet {
    max_entries: usize,
    namespace: DictNamespace,
    seen: Mutex<HashMap<String, VecDeque<String>>>,
}

impl SeenSet {
    pub fn open(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        let namespace = DictNamespace::open("sent_cache", path);
        let stored: HashMap<String, Vec<String>> = namespace.get_or(SEEN_KEY, HashMap::new());
        let seen = stored
            .into_iter()
            .map(|(user, ids)| {
                let skip = ids.len().saturating_sub(max_entries);
                (user, ids.into_iter().skip(skip).collect::<VecDeque<_>>())
            })
            .collect();

        Self { max_entries, namespace, seen: Mutex::new(seen) }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Candidates whose identifier the user has not been served yet. When
    /// every candidate has been seen, all candidates are returned instead.
    pub fn filter_unseen<'a, T, F>(&self, user_id: &str, candidates: &'a [T], id_of: F) -> Vec<&'a T>
    where
        F: Fn(&T) -> &str,
    {
        let seen = self.seen.lock().unwrap_or_else(|p| p.into_inner());
        let unseen: Vec<&T> = match seen.get(user_id) {
            Some(ids) => candidates.iter().filter(|c| !ids.iter().any(|s| s == id_of(c))).collect(),
            None => candidates.iter().collect(),
        };

        if unseen.is_empty() {
            debug!(user_id, candidates = candidates.len(), "all candidates seen, allowing repeats");
            return candidates.iter().collect();
        }
        unseen
    }

    /// Uniformly random pick among [`filter_unseen`](Self::filter_unseen).
    /// Does not mark the pick; `None` only for an empty candidate list.
    pub fn pick<'a, T, F, R>(&self, user_id: &str, candidates: &'a [T], id_of: F, rng: &mut R) -> Option<&'a T>
    where
        F: Fn(&T) -> &str,
        R: Rng + ?Sized,
    {
        self.filter_unseen(user_id, candidates, id_of).choose(rng).copied()
    }

    /// Record `identifier` as served to `user_id`, evicting the oldest
    /// entries beyond the cap, then persist.
    pub fn mark_seen(&self, user_id: &str, identifier: &str) {
        let mut seen = self.seen.lock().unwrap_or_else(|p| p.into_inner());
        let ids = seen.entry(user_id.to_string()).or_default();

        ids.retain(|s| s != identifier);
        ids.push_back(identifier.to_string());
        while ids.len() > self.max_entries {
            ids.pop_front();
        }

        self.namespace.set(SEEN_KEY, &*seen);
    }

    /// The user's identifiers, oldest first.
    pub fn seen(&self, user_id: &str) -> Vec<String> {
        let seen = self.seen.lock().unwrap_or_else(|p| p.into_inner());
        seen.get(user_id).map(|ids| ids.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn len(&self, user_id: &str) -> usize {
        let seen = self.seen.lock().unwrap_or_else(|p| p.into_inner());
        seen.get(user_id).map_or(0, VecDeque::len)
    }
}
