//! Cached server state, keyed by [`CacheKey`].
//!
//! Values are kept as the JSON `data` payloads the server sent and decoded
//! into entity types on the way out, so one store can hold every kind of
//! entity.
use chokepoint::ChokePoint;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

pub use chokepoint::Freshness;

use crate::ClientError;
use crate::gateway::GatewayError;

pub const USERS: &str = "users";
pub const USER_INFO: &str = "userInfo";
pub const GROUPS: &str = "groups";
pub const EXPENSES: &str = "expenses";
pub const ITEMS: &str = "items";

/// Hierarchical cache key, e.g. `["groups"]` or `["groups", "g1"]`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(Vec<String>);

impl CacheKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn root(segment: impl Into<String>) -> Self {
        Self(vec![segment.into()])
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// `["groups", "g1"]` starts with `["groups"]` and with itself.
    pub fn starts_with(&self, prefix: &CacheKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn users() -> Self {
        Self::root(USERS)
    }

    pub fn user_info() -> Self {
        Self::root(USER_INFO)
    }

    pub fn groups() -> Self {
        Self::root(GROUPS)
    }

    pub fn group(id: &str) -> Self {
        Self::groups().child(id)
    }

    pub fn expenses() -> Self {
        Self::root(EXPENSES)
    }

    pub fn expense(id: &str) -> Self {
        Self::expenses().child(id)
    }

    pub fn items() -> Self {
        Self::root(ITEMS)
    }

    pub fn item(id: &str) -> Self {
        Self::items().child(id)
    }
}

impl std::fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(&self.0).finish()
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

pub struct EntityCache {
    entries: ChokePoint<CacheKey, serde_json::Value, GatewayError>,
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::new(None)
    }
}

impl EntityCache {
    pub fn new(stale_after: Option<Duration>) -> Self {
        Self {
            entries: ChokePoint::with_stale_after(stale_after),
        }
    }

    /// Returns the fresh entry for `key`, or loads it. Concurrent reads of the
    /// same key share one load.
    pub async fn read<T, F, Fut>(&self, key: CacheKey, loader: F) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<serde_json::Value, GatewayError>> + Send + 'static,
    {
        let value = self.read_raw(key, loader).await?;
        Ok(T::deserialize(&*value)?)
    }

    pub async fn read_raw<F, Fut>(
        &self,
        key: CacheKey,
        loader: F,
    ) -> Result<Arc<serde_json::Value>, GatewayError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<serde_json::Value, GatewayError>> + Send + 'static,
    {
        self.entries.get(key, loader).await
    }

    /// Loads `key` no matter how fresh the current entry is.
    pub async fn write_through<T, F, Fut>(&self, key: CacheKey, loader: F) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<serde_json::Value, GatewayError>> + Send + 'static,
    {
        log::debug!("Refreshing {key}");
        let value = self.entries.refresh(key, loader).await?;
        Ok(T::deserialize(&*value)?)
    }

    /// Marks `pattern` and everything below it `Invalid`. The old values stay
    /// readable through [`EntityCache::peek`] until they are refetched.
    pub fn invalidate(&self, pattern: &CacheKey) -> usize {
        let changed = self
            .entries
            .invalidate_matching(|key| key.starts_with(pattern));
        log::debug!("Invalidated {pattern} ({changed} entries)");
        changed
    }

    /// Like [`EntityCache::invalidate`], but only demotes `Fresh` entries to `Stale`.
    pub fn mark_stale(&self, pattern: &CacheKey) -> usize {
        self.entries
            .mark_stale_matching(|key| key.starts_with(pattern))
    }

    /// Drops everything. Loads that finish afterwards are thrown away.
    pub fn purge_all(&self) {
        let generation = self.entries.purge();
        log::info!("Entity cache purged (generation {generation})");
    }

    pub fn generation(&self) -> u64 {
        self.entries.generation()
    }

    /// Last-known value for `key`, whatever its freshness.
    pub fn peek<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<(T, Freshness)> {
        let (value, freshness) = self.entries.peek(key)?;
        match T::deserialize(&*value) {
            Ok(value) => Some((value, freshness)),
            Err(e) => {
                log::warn!("Cached {key} does not decode as requested: {e}");
                None
            }
        }
    }

    pub fn freshness(&self, key: &CacheKey) -> Option<Freshness> {
        self.entries.freshness(key)
    }

    /// When the value behind `key` was last received, for "updated 5 min ago" labels.
    pub fn fetched_at(&self, key: &CacheKey) -> Option<DateTime<Utc>> {
        self.entries.fetched_at(key)
    }

    pub fn is_loading(&self, key: &CacheKey) -> bool {
        self.entries.is_fetching(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
