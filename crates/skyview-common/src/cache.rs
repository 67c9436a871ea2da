//! Memoization of entity lookups, shared between every concurrent caller.
//!
//! An entry holds the shared future for a fetch, so a second caller that
//! arrives while the first request is still in flight waits on the same
//! request instead of issuing its own. Successful results stay cached for
//! the life of the cache. Failures are dropped as soon as they resolve so a
//! later attempt goes back to the network.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use smol_str::SmolStr;
use tracing::trace;

use crate::error::FetchError;

pub type SharedFetch<V> = Shared<BoxFuture<'static, Result<Arc<V>, FetchError>>>;

/// Structural key for a single record fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub service: SmolStr,
    pub repo: SmolStr,
    pub collection: SmolStr,
    pub rkey: SmolStr,
    pub cid: Option<SmolStr>,
}

/// Structural key for a repository description.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoKey {
    pub service: SmolStr,
    pub repo: SmolStr,
}

pub struct ResolutionCache<K, V> {
    entries: Arc<DashMap<K, SharedFetch<V>>>,
}

impl<K, V> Clone for ResolutionCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<K, V> Default for ResolutionCache<K, V>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }
}

impl<K, V> ResolutionCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + std::fmt::Debug + 'static,
    V: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the shared fetch for `key`, starting it with `make` if no
    /// fetch for that key is cached or in flight.
    ///
    /// The fetch runs on its own task: it completes, and lands in the
    /// cache, even when every caller stops waiting for it.
    pub fn get_or_fetch<F, Fut>(&self, key: K, make: F) -> SharedFetch<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(entry) => {
                trace!(?key, "resolution cache hit");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                trace!(?key, "resolution cache miss");
                let entries = Arc::downgrade(&self.entries);
                let fut = make();
                let task = n0_future::task::spawn(async move {
                    let result = fut.await;
                    if result.is_err() {
                        if let Some(entries) = entries.upgrade() {
                            entries.remove(&key);
                        }
                    }
                    result
                });
                let fetch = async move {
                    match task.await {
                        Ok(result) => result.map(Arc::new),
                        Err(e) => Err(FetchError::Task(e.to_string())),
                    }
                }
                .boxed()
                .shared();
                entry.insert(fetch.clone());
                fetch
            }
        }
    }

    /// Completed or in-flight result for `key`, without starting anything.
    pub fn peek(&self, key: &K) -> Option<SharedFetch<V>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let cache: ResolutionCache<&'static str, String> = ResolutionCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));

        let start = |calls: Arc<AtomicUsize>, gate: Arc<Semaphore>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let _permit = gate.acquire().await.map_err(FetchError::transport)?;
                Ok::<_, FetchError>("done".to_string())
            }
        };

        let first = cache.get_or_fetch("a", start(calls.clone(), gate.clone()));
        let second = cache.get_or_fetch("a", start(calls.clone(), gate.clone()));
        gate.add_permits(1);

        let (first, second) = tokio::join!(first, second);
        assert_eq!(first.unwrap().as_str(), "done");
        assert_eq!(second.unwrap().as_str(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);

        // completed results stay cached
        let third = cache
            .get_or_fetch("a", start(calls.clone(), gate.clone()))
            .await;
        assert!(third.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_memoized() {
        let cache: ResolutionCache<&'static str, u32> = ResolutionCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counted = calls.clone();
        let failed = cache
            .get_or_fetch("k", move || async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::transport("connection reset"))
            })
            .await;
        assert_eq!(failed.unwrap_err(), FetchError::transport("connection reset"));
        assert!(cache.peek(&"k").is_none());

        let counted = calls.clone();
        let retried = cache
            .get_or_fetch("k", move || async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await;
        assert_eq!(*retried.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fetch_finishes_without_waiters() {
        let cache: ResolutionCache<&'static str, u32> = ResolutionCache::new();
        drop(cache.get_or_fetch("k", || async { Ok(1) }));

        tokio::task::yield_now().await;
        let cached = cache.peek(&"k").expect("entry stays while the fetch runs");
        assert_eq!(*cached.await.unwrap(), 1);
    }
}
