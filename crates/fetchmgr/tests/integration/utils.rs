use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use fetchmgr::{Close, Fetcher};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::Barrier;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `fetchmgr` crate and mutes all
///    other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("fetchmgr=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TestError {
    #[error("lookup of {0} failed")]
    Failed(String),
    #[error("fetches overlapped")]
    Overlap,
}

/// A fetcher that counts its invocations per key.
///
/// Every call sleeps for the configured latency and then returns `"{key}:{n}"`, where `n` is the
/// number of previous calls for that key.
#[derive(Default)]
pub struct KeyCounter {
    counts: Mutex<HashMap<String, usize>>,
    latency: Duration,
    fail: bool,
    barrier: Option<Arc<Barrier>>,
}

impl KeyCounter {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }

    /// Every call fails with [`TestError::Failed`].
    pub fn failing(latency: Duration) -> Self {
        Self {
            latency,
            fail: true,
            ..Default::default()
        }
    }

    /// Every call waits on `barrier` before it resolves.
    pub fn with_barrier(barrier: Arc<Barrier>) -> Self {
        Self {
            barrier: Some(barrier),
            ..Default::default()
        }
    }

    /// The number of calls for `key` so far.
    pub fn count(&self, key: &str) -> usize {
        self.counts.lock().get(key).copied().unwrap_or_default()
    }
}

impl Fetcher for KeyCounter {
    type Key = String;
    type Value = String;
    type Error = TestError;

    fn fetch<'a>(&'a self, key: &'a String) -> BoxFuture<'a, Result<String, TestError>> {
        Box::pin(async move {
            let n = {
                let mut counts = self.counts.lock();
                let count = counts.entry(key.clone()).or_default();
                *count += 1;
                *count - 1
            };

            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }
            tokio::time::sleep(self.latency).await;

            let value = format!("{key}:{n}");
            if self.fail {
                Err(TestError::Failed(value))
            } else {
                Ok(value)
            }
        })
    }
}

/// A fetcher that fails whenever two of its fetches overlap.
#[derive(Default)]
pub struct ExclusiveFetcher {
    busy: AtomicBool,
    calls: AtomicUsize,
    overlaps: AtomicUsize,
    closed: AtomicBool,
}

impl ExclusiveFetcher {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Fetcher for ExclusiveFetcher {
    type Key = u64;
    type Value = u64;
    type Error = TestError;

    fn fetch<'a>(&'a self, key: &'a u64) -> BoxFuture<'a, Result<u64, TestError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.busy.swap(true, Ordering::SeqCst) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
                return Err(TestError::Overlap);
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.busy.store(false, Ordering::SeqCst);
            Ok(*key)
        })
    }
}

impl Close for ExclusiveFetcher {
    type Error = TestError;

    fn close(&self) -> Result<(), TestError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
