use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::item::{FeedKey, FeedSnapshot, NewsItem};
use crate::transport::Transport;

type InflightFetch = Shared<BoxFuture<'static, Result<FeedSnapshot, FetchError>>>;

const INVALIDATION_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetOptions {
    pub force: bool,
    pub ttl: Duration,
}

impl GetOptions {
    pub fn fresh_within(ttl: Duration) -> Self {
        Self { force: false, ttl }
    }

    pub fn forced(ttl: Duration) -> Self {
        Self { force: true, ttl }
    }
}

#[derive(Debug)]
struct CacheEntry {
    items: Arc<Vec<NewsItem>>,
    generation: u64,
    fetched_at: Instant,
    fetched_at_utc: DateTime<Utc>,
    invalidated: bool,
}

impl CacheEntry {
    fn new(items: Vec<NewsItem>, generation: u64) -> Self {
        Self {
            items: Arc::new(items),
            generation,
            fetched_at: Instant::now(),
            fetched_at_utc: Utc::now(),
            invalidated: false,
        }
    }

    fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        !self.invalidated && now.saturating_duration_since(self.fetched_at) <= ttl
    }

    fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            items: Arc::clone(&self.items),
            generation: self.generation,
            fetched_at: self.fetched_at_utc,
        }
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<FeedKey, CacheEntry>,
    inflight: HashMap<FeedKey, InflightFetch>,
    last_generation: u64,
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Frees a key's in-flight slot if the fetch task ends without doing it,
/// e.g. when the transport panics.
struct InflightSlot {
    state: Arc<Mutex<CacheState>>,
    key: Option<FeedKey>,
}

impl Drop for InflightSlot {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            lock(&self.state).inflight.remove(&key);
        }
    }
}

/// Keyed store of fetched feeds with freshness tracking and at most one
/// outstanding fetch per key.
///
/// Entries are replaced wholesale under the lock, which is never held
/// across an await. Fetches run as spawned tasks: a caller that stops
/// waiting does not abort the fetch, and the result still lands in the
/// cache for the next consumer.
pub struct FeedCache {
    state: Arc<Mutex<CacheState>>,
    transport: Arc<dyn Transport>,
    routes: BTreeMap<FeedKey, String>,
    invalidations: broadcast::Sender<FeedKey>,
    shutdown: CancellationToken,
}

impl FeedCache {
    pub fn new(transport: Arc<dyn Transport>, routes: BTreeMap<FeedKey, String>) -> Self {
        let (invalidations, _) = broadcast::channel(INVALIDATION_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            transport,
            routes,
            invalidations,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_route(mut self, key: impl Into<FeedKey>, endpoint: impl Into<String>) -> Self {
        self.routes.insert(key.into(), endpoint.into());
        self
    }

    /// Endpoint a key is fetched from; unrouted keys are their own endpoint.
    pub fn endpoint_for(&self, key: &FeedKey) -> String {
        self.routes
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    /// Returns the items for `key`, from cache when fresh and not forced,
    /// otherwise from the single in-flight fetch for that key.
    pub async fn get(
        &self,
        key: &FeedKey,
        options: GetOptions,
        cancel: &CancellationToken,
    ) -> Result<FeedSnapshot, FetchError> {
        let fetch = {
            let mut state = lock(&self.state);
            if !options.force {
                if let Some(entry) = state.entries.get(key) {
                    if entry.is_fresh(options.ttl, Instant::now()) {
                        debug!(feed = %key, generation = entry.generation, "cache hit");
                        return Ok(entry.snapshot());
                    }
                }
            }
            match state.inflight.get(key) {
                Some(existing) => {
                    debug!(feed = %key, "joining in-flight fetch");
                    existing.clone()
                }
                None => {
                    let fetch = self.start_fetch(key.clone());
                    state.inflight.insert(key.clone(), fetch.clone());
                    fetch
                }
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(feed = %key, "stopped waiting for feed");
                Err(FetchError::Cancelled)
            }
            result = fetch => result,
        }
    }

    fn start_fetch(&self, key: FeedKey) -> InflightFetch {
        let endpoint = self.endpoint_for(&key);
        let state = Arc::clone(&self.state);
        let transport = Arc::clone(&self.transport);
        let cancel = self.shutdown.child_token();

        let mut slot = InflightSlot {
            state: Arc::clone(&state),
            key: Some(key.clone()),
        };

        let task = tokio::spawn(async move {
            let result = transport.fetch_items(&endpoint, cancel).await;
            let mut state = lock(&state);
            state.inflight.remove(&key);
            slot.key = None;
            match result {
                Ok(items) => {
                    state.last_generation += 1;
                    let entry = CacheEntry::new(items, state.last_generation);
                    let snapshot = entry.snapshot();
                    info!(
                        feed = %key,
                        items = snapshot.len(),
                        generation = snapshot.generation,
                        "feed fetched"
                    );
                    state.entries.insert(key, entry);
                    Ok(snapshot)
                }
                Err(err) => {
                    if err.is_cancelled() {
                        debug!(feed = %key, "feed fetch cancelled");
                    } else {
                        warn!(feed = %key, error = %err, "failed to fetch feed");
                    }
                    Err(err)
                }
            }
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(err) => Err(FetchError::from(err)),
            }
        }
        .boxed()
        .shared()
    }

    /// Marks `key` stale without dropping its items and notifies
    /// subscribers that views showing it should reload.
    pub fn invalidate(&self, key: &FeedKey) {
        let had_entry = {
            let mut state = lock(&self.state);
            match state.entries.get_mut(key) {
                Some(entry) => {
                    entry.invalidated = true;
                    true
                }
                None => false,
            }
        };
        debug!(feed = %key, had_entry, "feed invalidated");
        // No subscribers is fine: the stale mark alone forces the next fetch.
        let _ = self.invalidations.send(key.clone());
    }

    /// Applies a local edit to the cached list. Freshness and generation are
    /// left alone. Returns the edited snapshot, or `None` if nothing is cached.
    pub fn mutate<F>(&self, key: &FeedKey, transform: F) -> Option<FeedSnapshot>
    where
        F: FnOnce(&[NewsItem]) -> Vec<NewsItem>,
    {
        let mut state = lock(&self.state);
        let entry = state.entries.get_mut(key)?;
        entry.items = Arc::new(transform(&entry.items));
        debug!(feed = %key, items = entry.items.len(), "feed mutated locally");
        Some(entry.snapshot())
    }

    /// Cached snapshot regardless of freshness.
    pub fn peek(&self, key: &FeedKey) -> Option<FeedSnapshot> {
        lock(&self.state).entries.get(key).map(CacheEntry::snapshot)
    }

    pub fn is_fresh(&self, key: &FeedKey, ttl: Duration) -> bool {
        lock(&self.state)
            .entries
            .get(key)
            .map(|entry| entry.is_fresh(ttl, Instant::now()))
            .unwrap_or(false)
    }

    pub fn is_fetching(&self, key: &FeedKey) -> bool {
        lock(&self.state).inflight.contains_key(key)
    }

    pub fn subscribe_invalidations(&self) -> broadcast::Receiver<FeedKey> {
        self.invalidations.subscribe()
    }

    /// Cancels every outstanding fetch. Entries already cached stay.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for FeedCache {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
