use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cached::Inner;
use crate::fetcher::Fetcher;

/// Periodically removes expired entries until `shutdown` is cancelled.
pub(crate) async fn run<F: Fetcher>(inner: Arc<Inner<F>>, shutdown: CancellationToken) {
    let poll_interval = inner.config.poll_interval();

    loop {
        inner.evict_expired(Instant::now());

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    tracing::debug!(fetcher = %inner.config.name, "Stopped eviction task");
}

impl<F: Fetcher> Inner<F> {
    /// Removes all entries whose deletion expired at `now`.
    ///
    /// A deletion only removes the entry it was scheduled for. If the key was evicted and
    /// fetched again in the meantime, the deletion is stale and skipped.
    ///
    /// Returns the number of removed entries.
    pub(crate) fn evict_expired(&self, now: Instant) -> usize {
        let expired = self.queue.lock().pop_expired(now);
        if expired.is_empty() {
            return 0;
        }

        let mut evicted = 0u64;
        let mut stale = 0u64;
        let mut entries = self.entries.lock();
        for item in expired {
            let is_current = entries
                .get(&item.key)
                .is_some_and(|entry| entry.id == item.entry);
            if is_current {
                entries.remove(&item.key);
                evicted += 1;
            } else {
                stale += 1;
            }
        }
        let remaining = entries.len();
        drop(entries);

        let name = self.config.name.as_str();
        metric!(counter("fetches.evicted") += evicted, "fetcher" => name);
        if stale > 0 {
            metric!(counter("fetches.eviction.stale") += stale, "fetcher" => name);
        }
        metric!(gauge("fetches.entries") = remaining as u64, "fetcher" => name);
        tracing::trace!(fetcher = name, evicted, stale, remaining, "Evicted expired entries");

        evicted as usize
    }
}
