use std::time::Duration;

use serde::Deserialize;

/// The eviction task never polls more often than this.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration of a [`CachedFetcher`](crate::CachedFetcher).
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    /// Name used to tag metrics and log messages.
    pub name: String,

    /// How long a successfully fetched value is reused.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// How long a failed fetch is kept around.
    ///
    /// Defaults to zero, which evicts errors with the next eviction pass. Concurrent callers
    /// that were waiting on the failed fetch still all get the error.
    #[serde(with = "humantime_serde")]
    pub error_ttl: Duration,

    /// How long the eviction task sleeps between two passes over the deletion queue.
    ///
    /// Values below one millisecond are raised to one millisecond.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            name: "default".into(),
            ttl: Duration::from_secs(3600),
            error_ttl: Duration::ZERO,
            poll_interval: MIN_POLL_INTERVAL,
        }
    }
}

impl FetchConfig {
    /// Creates a default configuration with the given success `ttl`.
    pub fn with_ttl(ttl: Duration) -> Self {
        FetchConfig {
            ttl,
            ..Default::default()
        }
    }

    /// The effective interval between two eviction passes.
    pub(crate) fn poll_interval(&self) -> Duration {
        self.poll_interval.max(MIN_POLL_INTERVAL)
    }
}
