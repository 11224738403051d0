use std::sync::Arc;
use std::time::Duration;

use fetchmgr::{CachedFetcher, FetchConfig};

use crate::{KeyCounter, TestError, setup};

#[tokio::test]
async fn test_refetch_after_ttl() {
    setup();

    let fetcher = Arc::new(KeyCounter::new(Duration::ZERO));
    let cache = CachedFetcher::new(Arc::clone(&fetcher), Duration::from_millis(50));

    assert_eq!(cache.fetch(&"k".to_owned()).await, Ok("k:0".to_owned()));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(cache.fetch(&"k".to_owned()).await, Ok("k:1".to_owned()));

    assert_eq!(fetcher.count("k"), 2);
}

#[tokio::test]
async fn test_memoization_window() {
    setup();

    let fetcher = Arc::new(KeyCounter::new(Duration::ZERO));
    let cache = CachedFetcher::new(Arc::clone(&fetcher), Duration::from_millis(200));

    cache.fetch(&"k".to_owned()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    cache.fetch(&"k".to_owned()).await.unwrap();

    assert_eq!(fetcher.count("k"), 1);
}

#[tokio::test]
async fn test_errors_are_not_memoized() {
    setup();

    let fetcher = Arc::new(KeyCounter::failing(Duration::ZERO));
    let cache = CachedFetcher::new(Arc::clone(&fetcher), Duration::from_secs(60));

    assert_eq!(
        cache.fetch(&"k".to_owned()).await,
        Err(TestError::Failed("k:0".to_owned()))
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(
        cache.fetch(&"k".to_owned()).await,
        Err(TestError::Failed("k:1".to_owned()))
    );

    assert_eq!(fetcher.count("k"), 2);
}

#[tokio::test]
async fn test_slow_poll_interval() {
    setup();

    let fetcher = Arc::new(KeyCounter::new(Duration::ZERO));
    let config = FetchConfig {
        poll_interval: Duration::from_millis(100),
        ..FetchConfig::with_ttl(Duration::ZERO)
    };
    let cache = CachedFetcher::with_config(Arc::clone(&fetcher), config);

    // wait for the first eviction pass, which happens right on startup
    tokio::time::sleep(Duration::from_millis(10)).await;

    // the expired entry lingers until the next eviction pass
    cache.fetch(&"k".to_owned()).await.unwrap();
    cache.fetch(&"k".to_owned()).await.unwrap();
    assert_eq!(fetcher.count("k"), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(cache.is_empty());
    cache.fetch(&"k".to_owned()).await.unwrap();
    assert_eq!(fetcher.count("k"), 2);
}

#[tokio::test]
async fn test_keys_expire_independently() {
    setup();

    let fetcher = Arc::new(KeyCounter::new(Duration::ZERO));
    let cache = CachedFetcher::new(Arc::clone(&fetcher), Duration::from_millis(100));

    cache.fetch(&"a".to_owned()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    cache.fetch(&"b".to_owned()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    // "a" expired, "b" is still in memory
    assert_eq!(cache.len(), 1);
    cache.fetch(&"a".to_owned()).await.unwrap();
    cache.fetch(&"b".to_owned()).await.unwrap();
    assert_eq!(fetcher.count("a"), 2);
    assert_eq!(fetcher.count("b"), 1);
}
