mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use news_core::{FeedCache, FeedKey, FetchError, GetOptions};
use tokio_util::sync::CancellationToken;

use common::{abc, item, ScriptedTransport};

const TTL: Duration = Duration::from_secs(60);

fn cache_over(transport: &Arc<ScriptedTransport>) -> FeedCache {
    FeedCache::new(transport.clone(), BTreeMap::new())
        .with_route("news", "/api/news")
        .with_route("likes", "/api/articles/likes")
}

#[tokio::test(start_paused = true)]
async fn concurrent_gets_share_one_fetch() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_feed("/api/news", abc())
            .with_fetch_delay(Duration::from_millis(50)),
    );
    let cache = cache_over(&transport);
    let key = FeedKey::new("news");
    let cancel = CancellationToken::new();

    let results = join_all((0..5).map(|_| cache.get(&key, GetOptions::fresh_within(TTL), &cancel))).await;

    assert_eq!(transport.fetch_calls(), 1);
    let generations: Vec<u64> = results
        .into_iter()
        .map(|result| result.expect("fetch succeeds").generation)
        .collect();
    assert!(generations.windows(2).all(|pair| pair[0] == pair[1]));
    assert!(!cache.is_fetching(&key));
}

#[tokio::test(start_paused = true)]
async fn forced_get_attaches_to_in_flight_fetch() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_feed("/api/news", abc())
            .with_fetch_delay(Duration::from_millis(50)),
    );
    let cache = cache_over(&transport);
    let key = FeedKey::new("news");
    let cancel = CancellationToken::new();

    let (first, second) = tokio::join!(
        cache.get(&key, GetOptions::fresh_within(TTL), &cancel),
        cache.get(&key, GetOptions::forced(TTL), &cancel),
    );

    assert_eq!(transport.fetch_calls(), 1);
    assert_eq!(first.unwrap().generation, second.unwrap().generation);
}

#[tokio::test(start_paused = true)]
async fn fresh_entry_is_served_without_a_round_trip() {
    let transport = Arc::new(ScriptedTransport::new().with_feed("/api/news", abc()));
    let cache = cache_over(&transport);
    let key = FeedKey::new("news");
    let cancel = CancellationToken::new();

    let first = cache
        .get(&key, GetOptions::fresh_within(TTL), &cancel)
        .await
        .unwrap();
    assert_eq!(first.len(), 3);

    tokio::time::advance(Duration::from_secs(10)).await;
    let second = cache
        .get(&key, GetOptions::fresh_within(TTL), &cancel)
        .await
        .unwrap();
    assert_eq!(transport.fetch_calls(), 1);
    assert_eq!(second.generation, first.generation);
    assert!(Arc::ptr_eq(&first.items, &second.items));

    tokio::time::advance(Duration::from_secs(51)).await;
    let third = cache
        .get(&key, GetOptions::fresh_within(TTL), &cancel)
        .await
        .unwrap();
    assert_eq!(transport.fetch_calls(), 2);
    assert!(third.generation > first.generation);
}

#[tokio::test(start_paused = true)]
async fn forced_get_bypasses_a_fresh_entry() {
    let transport = Arc::new(ScriptedTransport::new().with_feed("/api/news", abc()));
    let cache = cache_over(&transport);
    let key = FeedKey::new("news");
    let cancel = CancellationToken::new();

    cache
        .get(&key, GetOptions::fresh_within(TTL), &cancel)
        .await
        .unwrap();
    cache
        .get(&key, GetOptions::forced(TTL), &cancel)
        .await
        .unwrap();
    assert_eq!(transport.fetch_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn invalidate_keeps_items_visible_until_the_next_fetch() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_feed("/api/articles/likes", Ok(vec![item(1, "A")]));
    transport.push_feed("/api/articles/likes", Ok(vec![item(1, "A"), item(2, "B")]));
    let cache = cache_over(&transport);
    let key = FeedKey::new("likes");
    let cancel = CancellationToken::new();
    let mut signals = cache.subscribe_invalidations();

    cache
        .get(&key, GetOptions::fresh_within(TTL), &cancel)
        .await
        .unwrap();
    cache.invalidate(&key);

    assert_eq!(signals.try_recv().unwrap(), key);
    assert!(!cache.is_fresh(&key, TTL));
    assert_eq!(cache.peek(&key).unwrap().len(), 1);

    let refreshed = cache
        .get(&key, GetOptions::fresh_within(TTL), &cancel)
        .await
        .unwrap();
    assert_eq!(transport.fetch_calls(), 2);
    assert_eq!(refreshed.len(), 2);
    assert!(cache.is_fresh(&key, TTL));
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_leaves_the_entry_untouched() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_feed("/api/news", Ok(abc()));
    transport.push_feed("/api/news", Err(FetchError::Status(500)));
    let cache = cache_over(&transport);
    let key = FeedKey::new("news");
    let cancel = CancellationToken::new();

    let before = cache
        .get(&key, GetOptions::fresh_within(TTL), &cancel)
        .await
        .unwrap();
    let err = cache
        .get(&key, GetOptions::forced(TTL), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err, FetchError::Status(500));
    assert_eq!(err.to_string(), "API error: 500");
    let after = cache.peek(&key).unwrap();
    assert_eq!(after.generation, before.generation);
    assert_eq!(*after.items, abc());
    assert!(!cache.is_fetching(&key));
}

#[tokio::test(start_paused = true)]
async fn panicked_fetch_frees_the_key_for_the_next_get() {
    let transport = Arc::new(ScriptedTransport::new().with_feed("/api/news", abc()));
    transport.panic_on_next_fetch();
    let cache = cache_over(&transport);
    let key = FeedKey::new("news");
    let cancel = CancellationToken::new();

    let err = cache
        .get(&key, GetOptions::forced(TTL), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Task(_)));
    assert!(err.to_string().starts_with("fetch task failed"));
    assert!(!cache.is_fetching(&key));
    assert!(cache.peek(&key).is_none());

    let snapshot = cache
        .get(&key, GetOptions::forced(TTL), &cancel)
        .await
        .unwrap();
    assert_eq!(snapshot.len(), 3);
    assert_eq!(transport.fetch_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn mutate_edits_in_place_without_touching_freshness() {
    let transport = Arc::new(ScriptedTransport::new().with_feed("/api/articles/likes", abc()));
    let cache = cache_over(&transport);
    let key = FeedKey::new("likes");
    let cancel = CancellationToken::new();

    let fetched = cache
        .get(&key, GetOptions::fresh_within(TTL), &cancel)
        .await
        .unwrap();
    let edited = cache
        .mutate(&key, |items| items.iter().filter(|i| i.id != 2).cloned().collect())
        .unwrap();

    assert_eq!(edited.generation, fetched.generation);
    assert_eq!(
        edited.items.iter().map(|i| i.id).collect::<Vec<_>>(),
        vec![1, 3]
    );
    assert!(cache.is_fresh(&key, TTL));
    assert_eq!(transport.fetch_calls(), 1);
    assert!(cache.mutate(&FeedKey::new("news"), |items| items.to_vec()).is_none());
}

#[tokio::test(start_paused = true)]
async fn abandoned_wait_still_populates_the_cache() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_feed("/api/news", abc())
            .with_fetch_delay(Duration::from_millis(50)),
    );
    let cache = cache_over(&transport);
    let key = FeedKey::new("news");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = cache
        .get(&key, GetOptions::fresh_within(TTL), &cancel)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(cache.peek(&key).is_none());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(cache.peek(&key).unwrap().len(), 3);
    assert_eq!(transport.fetch_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_outstanding_fetches() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_feed("/api/news", abc())
            .with_fetch_delay(Duration::from_secs(5)),
    );
    let cache = cache_over(&transport);
    let key = FeedKey::new("news");
    let cancel = CancellationToken::new();

    let (result, ()) = tokio::join!(
        cache.get(&key, GetOptions::fresh_within(TTL), &cancel),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cache.shutdown();
        }
    );

    assert_eq!(result.unwrap_err(), FetchError::Cancelled);
    assert!(cache.peek(&key).is_none());
}

#[tokio::test]
async fn unrouted_keys_are_fetched_from_themselves() {
    let transport = Arc::new(ScriptedTransport::new().with_feed("/api/custom", abc()));
    let cache = cache_over(&transport);
    let key = FeedKey::new("/api/custom");

    assert_eq!(cache.endpoint_for(&key), "/api/custom");
    assert_eq!(cache.endpoint_for(&FeedKey::new("likes")), "/api/articles/likes");
    let snapshot = cache
        .get(&key, GetOptions::fresh_within(TTL), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(snapshot.len(), 3);
    assert_eq!(transport.fetch_count("/api/custom"), 1);
}
