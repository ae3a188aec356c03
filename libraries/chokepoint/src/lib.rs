//! A keyed store where every key has at most one fetch in flight.
//!
//! Readers that arrive while a fetch is outstanding attach to it instead of
//! starting their own. Entries carry a [`Freshness`] marker: anything that is
//! not `Fresh` gets refetched on the next read, but the last-known value stays
//! around (see [`ChokePoint::peek`]) so a UI can keep showing it meanwhile.
//!
//! Two counters keep late results from resurrecting old data:
//! 1. Every key has an invalidation epoch. A fetch that started before an
//!    invalidation may still store its value, but only as `Invalid`.
//! 2. The whole store has a generation, bumped by [`ChokePoint::purge`]. A fetch
//!    that completes under an older generation stores nothing at all.
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Freshness {
    /// May be returned without a refetch.
    Fresh,
    /// Explicitly marked or aged out. Refetched on the next read.
    Stale,
    /// Dirtied by a write elsewhere. Refetched on the next read.
    Invalid,
}

type InFlight<V, E> = Shared<BoxFuture<'static, Result<Arc<V>, E>>>;

struct Slot<V, E> {
    value: Option<Arc<V>>,
    freshness: Freshness,
    fetched_at: Option<DateTime<Utc>>,
    /// Bumped on every invalidation.
    epoch: u64,
    /// Epoch at which the fetch that produced `value` started.
    value_epoch: u64,
    in_flight: Option<(u64, InFlight<V, E>)>,
    /// Store generation the slot was created under.
    generation: u64,
}

impl<V, E> Slot<V, E> {
    fn empty(generation: u64) -> Self {
        Self {
            value: None,
            freshness: Freshness::Invalid,
            fetched_at: None,
            epoch: 0,
            value_epoch: 0,
            in_flight: None,
            generation,
        }
    }

    fn is_vacant(&self) -> bool {
        self.value.is_none() && self.in_flight.is_none()
    }

    fn freshness_at(
        &self,
        stale_after: Option<chrono::Duration>,
        now: DateTime<Utc>,
    ) -> Freshness {
        match (self.freshness, self.fetched_at, stale_after) {
            (Freshness::Fresh, Some(fetched_at), Some(stale_after))
                if now - fetched_at >= stale_after =>
            {
                Freshness::Stale
            }
            (freshness, _, _) => freshness,
        }
    }

    fn fresh_value(
        &self,
        stale_after: Option<chrono::Duration>,
        now: DateTime<Utc>,
    ) -> Option<Arc<V>> {
        if self.freshness_at(stale_after, now) == Freshness::Fresh {
            self.value.clone()
        } else {
            None
        }
    }

    /// Returns false when there was nothing to do.
    fn invalidate(&mut self) -> bool {
        if self.freshness == Freshness::Invalid && self.in_flight.is_none() {
            return false;
        }
        self.epoch += 1;
        self.freshness = Freshness::Invalid;
        // the old fetch keeps running, but nobody new attaches to it
        self.in_flight = None;
        true
    }

    fn mark_stale(&mut self) -> bool {
        if self.freshness != Freshness::Fresh {
            return false;
        }
        self.freshness = Freshness::Stale;
        true
    }

    fn release(&mut self, ticket: u64) {
        if self
            .in_flight
            .as_ref()
            .is_some_and(|(in_flight_ticket, _)| *in_flight_ticket == ticket)
        {
            self.in_flight = None;
        }
    }

    fn store(&mut self, value: &Arc<V>, started_epoch: u64) {
        if self.epoch == started_epoch {
            self.freshness = Freshness::Fresh;
        } else if self.value.is_none() || self.value_epoch < started_epoch {
            // invalidated mid-flight: still newer than what we had, but not trustworthy
            self.freshness = Freshness::Invalid;
        } else {
            return;
        }
        self.value = Some(Arc::clone(value));
        self.value_epoch = started_epoch;
        self.fetched_at = Some(Utc::now());
    }
}

pub struct ChokePoint<K, V, E> {
    slots: Arc<DashMap<K, Slot<V, E>>>,
    generation: Arc<AtomicU64>,
    tickets: AtomicU64,
    stale_after: Option<chrono::Duration>,
}

impl<K, V, E> Default for ChokePoint<K, V, E>
where
    K: Clone + Eq + Hash + Send + Sync + Debug + 'static,
    V: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, E> ChokePoint<K, V, E>
where
    K: Clone + Eq + Hash + Send + Sync + Debug + 'static,
    V: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_stale_after(None)
    }

    /// Entries older than `stale_after` report `Stale` and are refetched on read.
    pub fn with_stale_after(stale_after: Option<Duration>) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
            tickets: AtomicU64::new(0),
            stale_after: stale_after.and_then(|d| chrono::Duration::from_std(d).ok()),
        }
    }

    /// Returns the cached value if it is fresh, otherwise joins the outstanding
    /// fetch for `key` or starts one with `fetch`.
    pub async fn get<F, Fut>(&self, key: K, fetch: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let pending = {
            let mut slot = self
                .slots
                .entry(key.clone())
                .or_insert_with(|| Slot::empty(self.generation()));
            if let Some(value) = slot.fresh_value(self.stale_after, Utc::now()) {
                return Ok(value);
            }
            let attached = slot.in_flight.as_ref().map(|(_, pending)| pending.clone());
            match attached {
                Some(pending) => pending,
                None => self.start(&mut slot, key, fetch),
            }
        };
        pending.await
    }

    /// Fetches regardless of freshness. An outstanding fetch for the same key is
    /// joined rather than duplicated.
    pub async fn refresh<F, Fut>(&self, key: K, fetch: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let pending = {
            let mut slot = self
                .slots
                .entry(key.clone())
                .or_insert_with(|| Slot::empty(self.generation()));
            let attached = slot.in_flight.as_ref().map(|(_, pending)| pending.clone());
            match attached {
                Some(pending) => pending,
                None => self.start(&mut slot, key, fetch),
            }
        };
        pending.await
    }

    fn start<F, Fut>(&self, slot: &mut Slot<V, E>, key: K, fetch: F) -> InFlight<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
        let started_epoch = slot.epoch;
        let started_generation = slot.generation;
        let slots = Arc::clone(&self.slots);
        let generation = Arc::clone(&self.generation);

        let pending = async move {
            let result = fetch().await.map(Arc::new);

            if generation.load(Ordering::SeqCst) != started_generation {
                log::debug!("Discarding fetch for {key:?}: store was purged meanwhile");
                return result;
            }

            // a purge may have landed since the check above and a new reader
            // recreated the slot, so only touch the slot this fetch belongs to
            match &result {
                Ok(value) => {
                    if let Some(mut slot) = slots.get_mut(&key)
                        && slot.generation == started_generation
                    {
                        slot.release(ticket);
                        slot.store(value, started_epoch);
                    }
                }
                Err(_) => {
                    // leave whatever was there before untouched
                    if let Some(mut slot) = slots.get_mut(&key)
                        && slot.generation == started_generation
                    {
                        slot.release(ticket);
                    }
                    slots.remove_if(&key, |_, slot| {
                        slot.generation == started_generation && slot.is_vacant()
                    });
                }
            }

            result
        }
        .boxed()
        .shared();

        slot.in_flight = Some((ticket, pending.clone()));
        pending
    }

    /// Marks every entry whose key satisfies `matches` as `Invalid`.
    /// Returns how many entries actually changed.
    pub fn invalidate_matching(&self, matches: impl Fn(&K) -> bool) -> usize {
        let mut changed = 0;
        for mut slot in self.slots.iter_mut() {
            if matches(slot.key()) && slot.value_mut().invalidate() {
                changed += 1;
            }
        }
        changed
    }

    /// Demotes matching `Fresh` entries to `Stale`. In-flight fetches are kept.
    pub fn mark_stale_matching(&self, matches: impl Fn(&K) -> bool) -> usize {
        let mut changed = 0;
        for mut slot in self.slots.iter_mut() {
            if matches(slot.key()) && slot.value_mut().mark_stale() {
                changed += 1;
            }
        }
        changed
    }

    /// Drops every entry and returns the new generation.
    pub fn purge(&self) -> u64 {
        // bump first so that fetches racing with the clear see the new generation
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.slots.clear();
        generation
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Last-known value regardless of freshness.
    pub fn peek(&self, key: &K) -> Option<(Arc<V>, Freshness)> {
        let slot = self.slots.get(key)?;
        let value = slot.value.clone()?;
        Some((value, slot.freshness_at(self.stale_after, Utc::now())))
    }

    pub fn freshness(&self, key: &K) -> Option<Freshness> {
        self.peek(key).map(|(_, freshness)| freshness)
    }

    pub fn fetched_at(&self, key: &K) -> Option<DateTime<Utc>> {
        self.slots.get(key).and_then(|slot| slot.fetched_at)
    }

    pub fn is_fetching(&self, key: &K) -> bool {
        self.slots
            .get(key)
            .is_some_and(|slot| slot.in_flight.is_some())
    }

    /// Number of keys holding a value.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.value.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
