#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use news_core::{FetchError, NewsItem, Transport};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

pub fn item(id: i64, title: &str) -> NewsItem {
    NewsItem {
        id,
        title: title.into(),
        link: format!("https://news.example.com/{id}"),
        summary: format!("<p>{title}</p>"),
        source: "Example Wire".into(),
    }
}

pub fn abc() -> Vec<NewsItem> {
    vec![item(1, "A"), item(2, "B"), item(3, "C")]
}

/// In-memory transport with scripted responses. The last scripted response
/// for an endpoint repeats once the queue is down to it.
#[derive(Default)]
pub struct ScriptedTransport {
    feeds: Mutex<HashMap<String, VecDeque<Result<Vec<NewsItem>, FetchError>>>>,
    reactions: Mutex<VecDeque<Result<(), FetchError>>>,
    fetched: Mutex<Vec<String>>,
    posted: Mutex<Vec<(i64, i32)>>,
    fetch_calls: AtomicUsize,
    panic_next_fetch: AtomicBool,
    fetch_delay: Duration,
    fetch_gate: Option<Arc<Semaphore>>,
    post_gate: Option<Arc<Semaphore>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(self, endpoint: &str, items: Vec<NewsItem>) -> Self {
        self.push_feed(endpoint, Ok(items));
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    /// Fetches block until a permit is added to the returned semaphore.
    pub fn gate_fetches(&mut self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.fetch_gate = Some(Arc::clone(&gate));
        gate
    }

    /// Reaction posts block until a permit is added to the returned semaphore.
    pub fn gate_posts(&mut self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.post_gate = Some(Arc::clone(&gate));
        gate
    }

    /// The next fetch panics instead of answering.
    pub fn panic_on_next_fetch(&self) {
        self.panic_next_fetch.store(true, Ordering::SeqCst);
    }

    pub fn push_feed(&self, endpoint: &str, result: Result<Vec<NewsItem>, FetchError>) {
        self.feeds
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(result);
    }

    /// Scripted reaction outcomes are consumed in order; once exhausted,
    /// posts succeed.
    pub fn push_reaction(&self, result: Result<(), FetchError>) {
        self.reactions.lock().unwrap().push_back(result);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self, endpoint: &str) -> usize {
        self.fetched
            .lock()
            .unwrap()
            .iter()
            .filter(|fetched| fetched.as_str() == endpoint)
            .count()
    }

    pub fn posted(&self) -> Vec<(i64, i32)> {
        self.posted.lock().unwrap().clone()
    }

    fn next_feed(&self, endpoint: &str) -> Result<Vec<NewsItem>, FetchError> {
        let mut feeds = self.feeds.lock().unwrap();
        let Some(queue) = feeds.get_mut(endpoint) else {
            return Err(FetchError::Status(404));
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap_or(Err(FetchError::Status(404)))
        }
    }
}

async fn pass(gate: Option<&Arc<Semaphore>>) {
    if let Some(gate) = gate {
        if let Ok(permit) = gate.acquire().await {
            permit.forget();
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch_items(
        &self,
        endpoint: &str,
        cancel: CancellationToken,
    ) -> Result<Vec<NewsItem>, FetchError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(endpoint.to_string());
        if self.panic_next_fetch.swap(false, Ordering::SeqCst) {
            panic!("scripted fetch failure for {endpoint}");
        }
        let wait = async {
            pass(self.fetch_gate.as_ref()).await;
            if !self.fetch_delay.is_zero() {
                tokio::time::sleep(self.fetch_delay).await;
            }
        };
        tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            _ = wait => {}
        }
        self.next_feed(endpoint)
    }

    async fn post_reaction(
        &self,
        item_id: i64,
        value: i32,
        cancel: CancellationToken,
    ) -> Result<(), FetchError> {
        self.posted.lock().unwrap().push((item_id, value));
        tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            _ = pass(self.post_gate.as_ref()) => {}
        }
        self.reactions.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}
