use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, ensure};
use fetchmgr::{CachedFetcher, FetchConfig, Fetcher, SerialFetcher};
use futures::future::BoxFuture;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct WorkloadsConfig {
    pub workloads: Vec<Workload>,
}

#[derive(Debug, Deserialize)]
pub struct Workload {
    pub concurrency: usize,
    /// Number of distinct keys that are requested.
    pub keys: u64,
    /// Time the simulated source takes for a single fetch.
    #[serde(default, with = "humantime_serde")]
    pub latency: Duration,
    /// Probability of a simulated fetch to fail, between `0` and `1`.
    #[serde(default)]
    pub failure_rate: f64,
    /// Puts a [`SerialFetcher`] between the cache and the simulated source.
    #[serde(default)]
    pub serial: bool,
    #[serde(flatten)]
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("simulated failure fetching key {0}")]
pub struct SimulatedError(pub u64);

/// A slow and unreliable source, counting how often it was hit.
#[derive(Debug)]
pub struct SimulatedFetcher {
    calls: AtomicUsize,
    latency: Duration,
    failure_rate: f64,
}

impl SimulatedFetcher {
    pub fn new(latency: Duration, failure_rate: f64) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            latency,
            failure_rate,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Fetcher for SimulatedFetcher {
    type Key = u64;
    type Value = Arc<str>;
    type Error = SimulatedError;

    fn fetch<'a>(&'a self, key: &'a u64) -> BoxFuture<'a, Result<Arc<str>, SimulatedError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(self.latency).await;

            if rand::random_bool(self.failure_rate) {
                return Err(SimulatedError(*key));
            }
            Ok(format!("value of {key}").into())
        })
    }
}

type DynFetcher = Arc<dyn Fetcher<Key = u64, Value = Arc<str>, Error = SimulatedError>>;

pub struct PreparedWorkload {
    pub concurrency: usize,
    keys: u64,
    cache: CachedFetcher<DynFetcher>,
    source: Arc<SimulatedFetcher>,
}

impl PreparedWorkload {
    /// The number of fetches that actually reached the simulated source.
    pub fn source_calls(&self) -> usize {
        self.source.calls()
    }

    pub fn name(&self) -> &str {
        self.cache.name()
    }
}

/// Validates the workload and sets up its cache.
///
/// Needs to run within a tokio runtime.
pub fn prepare_workload(workload: Workload) -> Result<PreparedWorkload> {
    ensure!(workload.concurrency > 0, "concurrency must be positive");
    ensure!(workload.keys > 0, "the key space must not be empty");
    ensure!(
        (0.0..=1.0).contains(&workload.failure_rate),
        "failure_rate must be between 0 and 1, got {}",
        workload.failure_rate
    );

    let source = Arc::new(SimulatedFetcher::new(
        workload.latency,
        workload.failure_rate,
    ));
    let fetcher: DynFetcher = if workload.serial {
        Arc::new(SerialFetcher::new(Arc::clone(&source)))
    } else {
        Arc::clone(&source) as DynFetcher
    };

    Ok(PreparedWorkload {
        concurrency: workload.concurrency,
        keys: workload.keys,
        cache: CachedFetcher::with_config(fetcher, workload.fetch),
        source,
    })
}

/// Fetches a random key, returning whether the fetch succeeded.
pub async fn process_workload(workload: &PreparedWorkload) -> bool {
    let key = rand::random_range(0..workload.keys);
    match workload.cache.fetch(&key).await {
        Ok(_) => true,
        Err(error) => {
            tracing::trace!(%error, "Fetch failed");
            false
        }
    }
}
