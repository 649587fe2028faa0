use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::{FeedCache, GetOptions};
use crate::config::AppConfig;
use crate::gateway::ReactionGateway;
use crate::item::{FeedKey, FeedSnapshot, LastReaction, NewsItem, ReactionKind};
use crate::session::ReviewSession;
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub struct ViewOptions {
    pub key: FeedKey,
    pub ttl: Duration,
    pub max_items: usize,
    /// Feeds to invalidate after an accepted reaction.
    pub dependents: Vec<FeedKey>,
}

impl ViewOptions {
    pub fn new(key: impl Into<FeedKey>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            ttl,
            max_items: usize::MAX,
            dependents: Vec::new(),
        }
    }

    pub fn from_config(config: &AppConfig, key: impl Into<FeedKey>) -> Self {
        let key = key.into();
        let ttl = config.ttl_for(&key);
        Self::new(key, ttl).capped(config.review.max_feed_items)
    }

    pub fn capped(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn uncapped(self) -> Self {
        self.capped(usize::MAX)
    }

    pub fn with_dependent(mut self, key: impl Into<FeedKey>) -> Self {
        self.dependents.push(key.into());
        self
    }
}

/// Everything the presentation layer reads for one view.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub items: Arc<Vec<NewsItem>>,
    pub cursor: usize,
    pub is_loading: bool,
    pub is_refreshing: bool,
    pub has_fetched: bool,
    pub error: Option<String>,
    pub reaction_error: Option<String>,
    pub is_submitting: bool,
    pub removing_id: Option<i64>,
    pub last_reaction: Option<LastReaction>,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl ViewState {
    pub fn current(&self) -> Option<&NewsItem> {
        self.items.get(self.cursor)
    }

    pub fn remaining(&self) -> &[NewsItem] {
        &self.items[self.cursor.min(self.items.len())..]
    }

    pub fn is_caught_up(&self) -> bool {
        self.has_fetched && self.remaining().is_empty()
    }
}

#[derive(Debug, Default)]
struct ViewStatus {
    is_loading: bool,
    is_refreshing: bool,
    has_fetched: bool,
    error: Option<String>,
    reaction_error: Option<String>,
    submitting: bool,
    removing_id: Option<i64>,
    fetched_at: Option<DateTime<Utc>>,
}

/// Drives one view: its review session, its reaction gateway, and the
/// cache traffic both of them cause.
pub struct SessionCoordinator {
    cache: Arc<FeedCache>,
    gateway: ReactionGateway,
    session: ReviewSession,
    options: ViewOptions,
    status: ViewStatus,
    active: bool,
    visited: bool,
    reload_pending: bool,
    reloads: broadcast::Receiver<FeedKey>,
    cancel: CancellationToken,
    state_tx: watch::Sender<ViewState>,
}

impl SessionCoordinator {
    pub fn new(cache: Arc<FeedCache>, transport: Arc<dyn Transport>, options: ViewOptions) -> Self {
        let reloads = cache.subscribe_invalidations();
        let mut session = ReviewSession::new(options.max_items);
        let mut status = ViewStatus::default();
        if let Some(snapshot) = cache.peek(&options.key) {
            session.replace(&snapshot);
            status.has_fetched = true;
            status.fetched_at = Some(snapshot.fetched_at);
        }
        let (state_tx, _) = watch::channel(ViewState::default());

        let coordinator = Self {
            cache,
            gateway: ReactionGateway::new(transport),
            session,
            options,
            status,
            active: false,
            visited: false,
            reload_pending: false,
            reloads,
            cancel: CancellationToken::new(),
            state_tx,
        };
        coordinator.publish();
        coordinator
    }

    pub fn key(&self) -> &FeedKey {
        &self.options.key
    }

    pub fn session(&self) -> &ReviewSession {
        &self.session
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn state(&self) -> ViewState {
        ViewState {
            items: Arc::clone(self.session.items()),
            cursor: self.session.cursor(),
            is_loading: self.status.is_loading,
            is_refreshing: self.status.is_refreshing,
            has_fetched: self.status.has_fetched,
            error: self.status.error.clone(),
            reaction_error: self.status.reaction_error.clone(),
            is_submitting: self.status.submitting || self.gateway.is_submitting(),
            removing_id: self.status.removing_id,
            last_reaction: self.session.last_reaction().cloned(),
            fetched_at: self.status.fetched_at,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.state_tx.subscribe()
    }

    /// Token for the view's outstanding work. Cancelling it ends any pending
    /// wait as a silent no-op.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn peek_window(&self, k: usize) -> impl Iterator<Item = &NewsItem> + Clone {
        self.session.peek_window(k)
    }

    fn publish(&self) -> ViewState {
        let state = self.state();
        self.state_tx.send_replace(state.clone());
        state
    }

    fn live_token(&mut self) -> CancellationToken {
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        self.cancel.clone()
    }

    fn drain_reloads(&mut self) {
        loop {
            match self.reloads.try_recv() {
                Ok(key) if key == self.options.key => self.reload_pending = true,
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    debug!(feed = %self.options.key, skipped, "missed invalidations, reloading");
                    self.reload_pending = true;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    fn apply(&mut self, snapshot: &FeedSnapshot) {
        self.session.replace(snapshot);
        self.status.has_fetched = true;
        self.status.fetched_at = Some(snapshot.fetched_at);
    }

    /// The view became visible. Fetches on first visibility or when a reload
    /// signal arrived while hidden; otherwise serves what it already has.
    pub async fn activate(&mut self) -> ViewState {
        self.active = true;
        self.drain_reloads();
        if !self.visited {
            self.visited = true;
            let force = self.reload_pending;
            return self.refresh(force).await;
        }
        if self.reload_pending {
            return self.refresh(true).await;
        }
        self.publish()
    }

    /// The view was hidden or unmounted. Outstanding waits are abandoned;
    /// a fetch already running still fills the cache.
    pub fn deactivate(&mut self) -> ViewState {
        self.active = false;
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.publish()
    }

    /// Picks up reload signals; an active view reloads right away, a hidden
    /// one on its next activation.
    pub async fn sync(&mut self) -> ViewState {
        self.drain_reloads();
        if self.active && self.reload_pending {
            return self.refresh(true).await;
        }
        self.publish()
    }

    pub async fn refresh(&mut self, force: bool) -> ViewState {
        let key = self.options.key.clone();
        let ttl = self.options.ttl;
        let cancel = self.live_token();
        self.reload_pending = false;

        if force || !self.cache.is_fresh(&key, ttl) {
            if self.status.has_fetched {
                self.status.is_refreshing = true;
            } else {
                self.status.is_loading = true;
            }
            self.status.error = None;
            self.publish();
        }

        let options = if force {
            GetOptions::forced(ttl)
        } else {
            GetOptions::fresh_within(ttl)
        };
        match self.cache.get(&key, options, &cancel).await {
            Ok(snapshot) => {
                self.apply(&snapshot);
                self.status.error = None;
            }
            Err(err) if err.is_cancelled() => {
                debug!(feed = %key, "refresh cancelled");
            }
            Err(err) => {
                self.status.error = Some(err.to_string());
            }
        }
        self.status.is_loading = false;
        self.status.is_refreshing = false;
        self.publish()
    }

    /// Reacts to the item under the cursor. The cursor moves only after the
    /// server confirmed the reaction.
    pub async fn rate(&mut self, kind: ReactionKind) -> ViewState {
        let Some(item) = self.session.current().cloned() else {
            return self.publish();
        };
        if self.status.submitting || self.gateway.is_submitting() {
            return self.publish();
        }
        let cancel = self.live_token();
        self.status.reaction_error = None;
        self.status.submitting = true;
        self.publish();

        let result = self.gateway.submit(item.id, kind, &cancel).await;
        self.status.submitting = false;
        match result {
            Ok(()) => {
                self.session.record_reaction(&item, kind);
                self.session.advance();
                if kind == ReactionKind::Accept {
                    for dependent in &self.options.dependents {
                        self.cache.invalidate(dependent);
                    }
                }
            }
            Err(err) if err.is_cancelled() => {}
            Err(err) => self.status.reaction_error = Some(err.to_string()),
        }
        self.publish()
    }

    /// Retracts a reaction and drops the item locally. If the server refuses,
    /// the list is reloaded so it matches what the server holds.
    pub async fn remove(&mut self, item_id: i64) -> ViewState {
        if self.status.removing_id.is_some()
            || self.status.submitting
            || self.gateway.is_submitting()
        {
            return self.publish();
        }
        let cancel = self.live_token();
        self.status.removing_id = Some(item_id);
        self.status.submitting = true;
        self.status.reaction_error = None;
        self.publish();

        let result = self
            .gateway
            .submit(item_id, ReactionKind::Retract, &cancel)
            .await;
        self.status.removing_id = None;
        self.status.submitting = false;
        match result {
            Ok(()) => {
                let edited = self.cache.mutate(&self.options.key, |items| {
                    let mut next = items.to_vec();
                    if let Some(position) = next.iter().position(|item| item.id == item_id) {
                        next.remove(position);
                    }
                    next
                });
                if let Some(snapshot) = edited {
                    self.session.replace(&snapshot);
                }
            }
            Err(err) if err.is_cancelled() => {}
            Err(err) => {
                self.status.reaction_error = Some(err.to_string());
                return self.refresh(true).await;
            }
        }
        self.publish()
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
