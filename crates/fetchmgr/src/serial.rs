use futures::future::BoxFuture;
use tokio::sync::Mutex;

use crate::fetcher::{Close, Fetcher};

/// Serializes all calls to the wrapped [`Fetcher`].
///
/// At most one fetch of the inner fetcher is in flight at any time, regardless of the key.
/// Callers queue up on a fair lock, which is released once the inner fetch resolves, fails,
/// panics, or is dropped. There is no caching; put a [`CachedFetcher`](crate::CachedFetcher)
/// in front to deduplicate requests.
///
/// If the inner fetcher is [`Close`], so is the wrapper. Closing does not wait for the lock.
#[derive(Debug)]
pub struct SerialFetcher<F> {
    lock: Mutex<()>,
    fetcher: F,
}

impl<F> SerialFetcher<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            lock: Mutex::new(()),
            fetcher,
        }
    }

    /// The wrapped fetcher.
    ///
    /// Calls made through this reference bypass the lock.
    pub fn get_ref(&self) -> &F {
        &self.fetcher
    }

    pub fn into_inner(self) -> F {
        self.fetcher
    }
}

impl<F: Fetcher> Fetcher for SerialFetcher<F> {
    type Key = F::Key;
    type Value = F::Value;
    type Error = F::Error;

    fn fetch<'a>(&'a self, key: &'a Self::Key) -> BoxFuture<'a, Result<F::Value, F::Error>> {
        Box::pin(async move {
            let _guard = self.lock.lock().await;
            self.fetcher.fetch(key).await
        })
    }
}

impl<F: Close> Close for SerialFetcher<F> {
    type Error = F::Error;

    fn close(&self) -> Result<(), Self::Error> {
        self.fetcher.close()
    }
}
