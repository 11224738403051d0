use std::sync::Arc;
use std::time::Duration;

use fetchmgr::{CachedFetcher, Close, Fetcher, SerialFetcher};

use crate::{ExclusiveFetcher, setup};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_serialized_concurrent_callers() {
    setup();

    let serial = Arc::new(SerialFetcher::new(ExclusiveFetcher::default()));

    let tasks: Vec<_> = (0..20)
        .map(|key| {
            let serial = Arc::clone(&serial);
            tokio::spawn(async move { serial.fetch(&key).await })
        })
        .collect();

    for (key, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap(), Ok(key as u64));
    }
    assert_eq!(serial.get_ref().calls(), 20);
    assert_eq!(serial.get_ref().overlaps(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cached_serial_source() {
    setup();

    let source = Arc::new(SerialFetcher::new(ExclusiveFetcher::default()));
    let cache = Arc::new(CachedFetcher::new(
        Arc::clone(&source),
        Duration::from_secs(1),
    ));

    // 5 distinct keys, requested 4 times each
    let tasks: Vec<_> = (0..20u64)
        .map(|i| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.fetch(&(i % 5)).await })
        })
        .collect();

    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap(), Ok(i as u64 % 5));
    }
    assert_eq!(source.get_ref().calls(), 5);
    assert_eq!(source.get_ref().overlaps(), 0);
}

#[tokio::test]
async fn test_close_delegates() {
    setup();

    let serial = SerialFetcher::new(ExclusiveFetcher::default());
    serial.fetch(&1).await.unwrap();

    assert!(serial.close().is_ok());
    assert!(serial.into_inner().is_closed());
}
