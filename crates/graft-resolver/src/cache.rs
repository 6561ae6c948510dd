//! Resolution session cache for avoiding redundant provider lookups.
//!
//! Each [`RangeCacheKey`] maps to a cell that is filled at most once. The
//! first caller for a key runs the lookup; concurrent callers for the same
//! key wait on the same cell instead of calling the provider again. A lookup
//! that fails (provider error, cancellation) leaves the cell empty, so a
//! later caller may try again and no partial result is ever stored.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::cache_key::RangeCacheKey;
use crate::provider::LibraryMatch;

/// The cached answer for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryResolution {
    Resolved(LibraryMatch),
    /// Nothing satisfied the range.
    Unresolved,
}

impl LibraryResolution {
    pub fn as_match(&self) -> Option<&LibraryMatch> {
        match self {
            Self::Resolved(m) => Some(m),
            Self::Unresolved => None,
        }
    }
}

/// Lookup counters, useful for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Calls to [`ResolutionCache::get_or_resolve`].
    pub lookups: u64,
    /// Lookups that ran the resolver (successfully or not).
    pub resolutions: u64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.lookups.saturating_sub(self.resolutions)
    }
}

type Slot = Arc<OnceCell<Arc<LibraryResolution>>>;

#[derive(Debug, Default)]
struct CacheInner {
    entries: DashMap<RangeCacheKey, Slot>,
    lookups: AtomicU64,
    resolutions: AtomicU64,
}

/// Concurrent, append-only map from range keys to resolutions.
///
/// Cloning is cheap and yields a handle to the same cache, so one instance
/// can be shared by sessions for different frameworks.
#[derive(Debug, Clone, Default)]
pub struct ResolutionCache {
    inner: Arc<CacheInner>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the stored resolution for `key`, or run `resolve` and store its
    /// result. At most one `resolve` runs per key at a time.
    pub async fn get_or_resolve<F, Fut>(
        &self,
        key: RangeCacheKey,
        resolve: F,
    ) -> miette::Result<Arc<LibraryResolution>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = miette::Result<LibraryResolution>>,
    {
        self.inner.lookups.fetch_add(1, Ordering::Relaxed);

        let slot: Slot = self.inner.entries.entry(key).or_default().clone();
        if let Some(found) = slot.get() {
            tracing::trace!("cache hit");
            return Ok(found.clone());
        }

        let inner = &self.inner;
        let resolution = slot
            .get_or_try_init(|| async move {
                inner.resolutions.fetch_add(1, Ordering::Relaxed);
                resolve().await.map(Arc::new)
            })
            .await?;
        Ok(resolution.clone())
    }

    /// Peek at a stored resolution without resolving.
    pub fn get(&self, key: &RangeCacheKey) -> Option<Arc<LibraryResolution>> {
        self.inner
            .entries
            .get(key)
            .and_then(|slot| slot.get().cloned())
    }

    /// Number of stored resolutions.
    pub fn len(&self) -> usize {
        self.inner
            .entries
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            lookups: self.inner.lookups.load(Ordering::Relaxed),
            resolutions: self.inner.resolutions.load(Ordering::Relaxed),
        }
    }
}
