use std::hash::Hash;
use std::sync::Arc;

use futures::future::BoxFuture;

/// Retrieves a value for a key.
///
/// This is the capability that the [`CachedFetcher`](crate::CachedFetcher) and
/// [`SerialFetcher`](crate::SerialFetcher) are layered on. Implementations make no promises
/// about latency or idempotence; the same key may be fetched again once a previous result was
/// evicted.
///
/// Both the value and the error are handed out to every caller that waited on the same fetch,
/// which is why they have to be [`Clone`]. Wrap them in an [`Arc`] if cloning is expensive.
pub trait Fetcher: Send + Sync + 'static {
    /// The key identifying a value.
    type Key: Eq + Hash + Clone + Send + Sync + 'static;
    /// The fetched value.
    type Value: Clone + Send + Sync + 'static;
    /// The error of a failed fetch.
    type Error: Clone + Send + Sync + 'static;

    /// Fetches the value for `key`.
    fn fetch<'a>(&'a self, key: &'a Self::Key) -> BoxFuture<'a, Result<Self::Value, Self::Error>>;
}

impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    type Key = F::Key;
    type Value = F::Value;
    type Error = F::Error;

    fn fetch<'a>(&'a self, key: &'a Self::Key) -> BoxFuture<'a, Result<Self::Value, Self::Error>> {
        (**self).fetch(key)
    }
}

/// A resource that can be closed.
pub trait Close {
    /// The error of a failed close.
    type Error;

    /// Releases the underlying resource.
    fn close(&self) -> Result<(), Self::Error>;
}

impl<C: Close + ?Sized> Close for Arc<C> {
    type Error = C::Error;

    fn close(&self) -> Result<(), Self::Error> {
        (**self).close()
    }
}

/// A [`Fetcher`] that is also [`Close`].
pub trait FetchCloser: Fetcher + Close {}

impl<T: Fetcher + Close + ?Sized> FetchCloser for T {}
