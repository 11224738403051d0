//! # Memoizing fetch layer
//!
//! `fetchmgr` puts a short-lived, request-coalescing memory in front of any asynchronous
//! key-to-value retrieval. The retrieval itself is supplied by the caller through the
//! [`Fetcher`] trait; everything else lives here.
//!
//! ## Layers
//!
//! - [`CachedFetcher`] deduplicates concurrent requests for the same key into a single
//!   retrieval, and keeps the result around for [`FetchConfig::ttl`]. Failed retrievals are
//!   handed to every caller that was waiting on them, and are evicted right away
//!   (or after [`FetchConfig::error_ttl`], if configured).
//! - [`SerialFetcher`] is the opposite building block: it serializes all calls to the wrapped
//!   fetcher behind a single lock, and does no caching at all. It is useful to put a
//!   [`CachedFetcher`] in front of a resource that must never see concurrent access.
//!
//! A request goes through the following steps:
//! - The in-memory map is consulted under its lock. A present entry is returned as is, even if
//!   its retrieval is still running.
//! - On miss, a new pending entry is registered, the lock is released, and the retrieval is
//!   spawned as its own task.
//! - When the retrieval finishes, its outcome is broadcast to all waiters, and a deletion is
//!   scheduled on the deletion queue.
//! - A background task polls the deletion queue and removes expired entries from the map.
//!
//! ## Eviction
//!
//! Every fetch cycle enqueues exactly one deletion, tagged with the entry it belongs to. Since
//! the queue is not deduplicated by key, a deletion can outlive its entry: if the key was
//! evicted and fetched again in the meantime, the deletion no longer matches the entry in the
//! map and is skipped. The eviction task is owned by the [`CachedFetcher`] and stops when it
//! is dropped.
//!
//! Expiry is only as precise as [`FetchConfig::poll_interval`], which defaults to one
//! millisecond.
//!
//! ### Metrics
//!
//! All metrics are tagged with a `fetcher` field that corresponds to [`FetchConfig::name`]:
//!
//! - `fetches.access`: All calls to [`CachedFetcher::fetch`].
//! - `fetches.memory.hit`: Calls that joined an existing (pending or resolved) entry.
//! - `fetches.computation`: Actual retrievals being run.
//! - `fetches.computation.error`: Retrievals that failed.
//! - `fetches.computation.duration`: Time spent in the underlying retrieval.
//! - `fetches.evicted`: Entries removed by the eviction task.
//! - `fetches.eviction.stale`: Deletions that were skipped because their entry was replaced.
//! - `fetches.entries`: Number of entries left in the map after an eviction pass.
//!
//! Metrics are only sent once [`metrics::configure_statsd`] was called.

#[macro_use]
pub mod metrics;

pub mod config;
pub mod logging;
pub mod utils;

mod cached;
mod eviction;
mod fetcher;
mod queue;
mod serial;


pub use cached::CachedFetcher;
pub use config::FetchConfig;
pub use fetcher::{Close, FetchCloser, Fetcher};
pub use serial::SerialFetcher;
