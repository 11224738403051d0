use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use sentry::{Hub, SentryFutureExt};
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::FetchConfig;
use crate::eviction;
use crate::fetcher::Fetcher;
use crate::queue::{DeletionItem, DeletionQueue, EntryId};
use crate::utils::defer;

type FetchResult<F> = Result<<F as Fetcher>::Value, <F as Fetcher>::Error>;
type EntryChannel<F> = Shared<oneshot::Receiver<FetchResult<F>>>;

/// The outcome of one fetch cycle for a key, pending or resolved.
pub(crate) struct Entry<F: Fetcher> {
    pub id: EntryId,
    channel: EntryChannel<F>,
}

/// State shared between the [`CachedFetcher`], its running fetches and its eviction task.
pub(crate) struct Inner<F: Fetcher> {
    fetcher: F,
    pub config: FetchConfig,

    /// The memoized entries, including the ones that are still being fetched.
    pub entries: Mutex<HashMap<F::Key, Entry<F>>>,

    /// Pending deletions of `entries`.
    ///
    /// This is never locked while `entries` is locked, and vice versa.
    pub queue: Mutex<DeletionQueue<F::Key>>,

    next_id: AtomicU64,
}

/// Memoizes the results of a [`Fetcher`].
///
/// Concurrent requests for the same key are coalesced into a single call to the underlying
/// fetcher, and every caller gets that call's result. A successful result is then reused for
/// [`FetchConfig::ttl`]. A failed result is not reused beyond the next eviction pass (or
/// [`FetchConfig::error_ttl`]), so calling again after a failure retries the fetch.
///
/// Expired entries are removed by a background task that is spawned on construction and stopped
/// when the `CachedFetcher` is dropped. Fetches that are still running at that point complete
/// on their own.
///
/// `CachedFetcher` is itself a [`Fetcher`], so it can be layered like any other fetcher. To
/// share one between tasks, put it in an [`Arc`].
pub struct CachedFetcher<F: Fetcher> {
    pub(crate) inner: Arc<Inner<F>>,

    /// Stops the eviction task when dropped.
    _eviction: DropGuard,
}

impl<F: Fetcher> CachedFetcher<F> {
    /// Creates a `CachedFetcher` that reuses successful results for `ttl`.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn new(fetcher: F, ttl: Duration) -> Self {
        Self::with_config(fetcher, FetchConfig::with_ttl(ttl))
    }

    /// Creates a `CachedFetcher` with the given configuration.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn with_config(fetcher: F, config: FetchConfig) -> Self {
        tracing::debug!(
            fetcher = %config.name,
            ttl = ?config.ttl,
            error_ttl = ?config.error_ttl,
            "Starting cached fetcher",
        );

        let inner = Arc::new(Inner {
            fetcher,
            config,
            entries: Default::default(),
            queue: Default::default(),
            next_id: AtomicU64::new(0),
        });

        let shutdown = CancellationToken::new();
        tokio::spawn(
            eviction::run(Arc::clone(&inner), shutdown.clone())
                .bind_hub(Hub::new_from_top(Hub::current())),
        );

        CachedFetcher {
            inner,
            _eviction: shutdown.drop_guard(),
        }
    }

    /// Fetches the value for `key`, or joins an earlier fetch of it.
    ///
    /// The fetch is registered and spawned right away, so it runs even if the returned future
    /// is dropped without being polled. The future resolves to exactly what the underlying
    /// fetcher returned for this fetch cycle.
    ///
    /// This has the same signature as [`Fetcher::fetch`], so a `CachedFetcher` behind an
    /// [`Arc`] behaves the same through either method.
    ///
    /// # Panics
    ///
    /// The future panics if the underlying fetch panicked, in every caller that was waiting on
    /// it.
    pub fn fetch<'a>(&'a self, key: &F::Key) -> BoxFuture<'a, Result<F::Value, F::Error>> {
        let channel = self.pick_entry(key.clone());

        Box::pin(async move {
            match channel.await {
                Ok(result) => result,
                Err(oneshot::Canceled) => {
                    panic!("{} fetch was aborted before producing a result", self.name())
                }
            }
        })
    }

    /// The configured name of this fetcher.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// The number of entries in memory, including fetches that are still running.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Returns `true` if there are no entries in memory.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }

    /// Returns the entry for `key`, registering a new one and spawning its fetch on miss.
    ///
    /// NOTE: This function itself is *not* `async`, because it should eagerly spawn the fetch,
    /// even if the returned channel is never awaited. [`fetch`](Self::fetch) calls it before
    /// creating its future for the same reason.
    fn pick_entry(&self, key: F::Key) -> EntryChannel<F> {
        let name = self.name();
        metric!(counter("fetches.access") += 1, "fetcher" => name);

        let mut entries = self.inner.entries.lock();
        if let Some(entry) = entries.get(&key) {
            // A pending or resolved fetch was reused.
            metric!(counter("fetches.memory.hit") += 1, "fetcher" => name);
            return entry.channel.clone();
        }

        let id = self.inner.next_entry_id();
        let (sender, receiver) = oneshot::channel();
        let channel = receiver.shared();
        let evicted = entries.insert(
            key.clone(),
            Entry {
                id,
                channel: channel.clone(),
            },
        );
        debug_assert!(evicted.is_none());
        drop(entries);

        tracing::trace!(fetcher = name, entry = id.0, "Spawning fetch");
        let fetch = Arc::clone(&self.inner)
            .fetch_and_schedule(key, id, sender)
            .bind_hub(Hub::new_from_top(Hub::current()));
        tokio::spawn(fetch);

        channel
    }
}

impl<F: Fetcher> Inner<F> {
    fn next_entry_id(&self) -> EntryId {
        EntryId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Runs the underlying fetch, hands the result to all waiters and schedules the deletion of
    /// the entry.
    async fn fetch_and_schedule(
        self: Arc<Self>,
        key: F::Key,
        id: EntryId,
        sender: oneshot::Sender<FetchResult<F>>,
    ) {
        let name = self.config.name.as_str();
        metric!(counter("fetches.computation") += 1, "fetcher" => name);

        // A fetch that panics or whose task is dropped never reaches `sender.send`, which fails
        // all waiters. The entry must not stay in the map after that.
        let evict_on_unwind = defer(|| {
            tracing::error!(fetcher = name, entry = id.0, "Fetch aborted without a result");
            self.schedule_deletion(key.clone(), id, Duration::ZERO);
        });

        let start = Instant::now();
        let result = self.fetcher.fetch(&key).await;
        evict_on_unwind.cancel();
        metric!(timer("fetches.computation.duration") = start.elapsed(), "fetcher" => name);

        let ttl = match &result {
            Ok(_) => self.config.ttl,
            Err(_) => {
                metric!(counter("fetches.computation.error") += 1, "fetcher" => name);
                self.config.error_ttl
            }
        };

        // Nobody may be waiting anymore, which is fine.
        sender.send(result).ok();

        self.schedule_deletion(key, id, ttl);
    }

    /// Enqueues the deletion of entry `id` of `key` after `ttl`.
    pub fn schedule_deletion(&self, key: F::Key, id: EntryId, ttl: Duration) {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + Duration::from_secs(86400 * 365 * 30));

        self.queue.lock().push(DeletionItem {
            key,
            entry: id,
            expires_at,
        });
    }
}

impl<F: Fetcher> Fetcher for CachedFetcher<F> {
    type Key = F::Key;
    type Value = F::Value;
    type Error = F::Error;

    fn fetch<'a>(&'a self, key: &'a Self::Key) -> BoxFuture<'a, Result<F::Value, F::Error>> {
        CachedFetcher::fetch(self, key)
    }
}

impl<F: Fetcher> fmt::Debug for CachedFetcher<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self
            .inner
            .entries
            .try_lock()
            .map(|e| e.len())
            .unwrap_or_default();
        let pending_deletions = self
            .inner
            .queue
            .try_lock()
            .map(|q| q.len())
            .unwrap_or_default();
        f.debug_struct("CachedFetcher")
            .field("config", &self.inner.config)
            .field("entries", &entries)
            .field("pending deletions", &pending_deletions)
            .finish()
    }
}
