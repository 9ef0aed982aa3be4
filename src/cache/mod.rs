//! In-process result cache with single-flight computation
//!
//! Memoizes predictions per `(entity, window, series content hash)` so
//! repeated dashboard requests skip recomputation. At most one computation
//! runs per key: concurrent requests for an in-flight key await the same
//! shared future and receive the same result (or the same failure), they
//! never recompute. Unrelated keys proceed independently; there is no
//! global lock held across a computation.
//!
//! The cache is an explicit object, created empty and injected into the
//! pipeline, never ambient global state. Entries expire after the
//! configured TTL; a changed series content hash retires stale entries for
//! the same entity and window immediately.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::models::{Prediction, Window};

/// Errors surfaced by cached computations.
///
/// Clonable so one failure can propagate to every waiter of the
/// single-flight computation that produced it.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Cached computation for {key} failed: {reason}")]
    ComputationFailed { key: String, reason: String },
}

impl CacheError {
    /// A failed computation poisons only its own key's waiters
    #[must_use]
    pub fn is_entity_scoped(&self) -> bool {
        true
    }
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache key: entity, requested window, and the content hash of the
/// combined series the prediction was derived from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub entity_id: String,
    pub window: Window,
    pub content_hash: String,
}

impl CacheKey {
    /// Create a cache key
    #[must_use]
    pub fn new(
        entity_id: impl Into<String>,
        window: Window,
        content_hash: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            window,
            content_hash: content_hash.into(),
        }
    }

    fn display(&self) -> String {
        let prefix = self.content_hash.len().min(12);
        format!("{}@{}", self.entity_id, &self.content_hash[..prefix])
    }
}

type SharedComputation = Shared<BoxFuture<'static, CacheResult<Arc<Prediction>>>>;

/// One slot in the cache map
#[derive(Debug)]
enum Slot {
    /// A completed, timestamped entry
    Ready {
        prediction: Arc<Prediction>,
        inserted_at: Instant,
    },

    /// A computation in progress; clones of this future join it
    InFlight(SharedComputation),
}

/// Cache hit/miss counters
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    /// Total cache hits (ready entries and joined in-flight computations)
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Total cache misses (computations started)
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Hit rate in [0, 1]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Single-flight prediction cache
#[derive(Debug)]
pub struct ResultCache {
    ttl: Duration,
    // Locked only for map mutation, never across an await
    slots: Arc<Mutex<HashMap<CacheKey, Slot>>>,
    stats: CacheStats,
}

impl ResultCache {
    /// Create an empty cache with the given entry TTL
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Arc::new(Mutex::new(HashMap::new())),
            stats: CacheStats::default(),
        }
    }

    /// Hit/miss counters
    #[must_use]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Number of entries (ready or in flight)
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().expect("cache lock poisoned").len()
    }

    /// Check if the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all ready entries. In-flight computations are left to finish;
    /// their waiters still receive results.
    pub fn clear(&self) {
        let mut slots = self.slots.lock().expect("cache lock poisoned");
        slots.retain(|_, slot| matches!(slot, Slot::InFlight(_)));
    }

    /// Get the cached prediction for a key, or run `compute` exactly once
    /// and share its result with every concurrent caller of the same key.
    ///
    /// A failed computation propagates the same [`CacheError`] to all of
    /// that key's waiters and leaves no entry behind, so a later request
    /// retries fresh. Other keys are unaffected.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: CacheKey,
        compute: F,
    ) -> CacheResult<Arc<Prediction>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Prediction, E>> + Send + 'static,
        E: std::fmt::Display,
    {
        let shared = {
            let mut slots = self.slots.lock().expect("cache lock poisoned");

            // Sweep everything past its TTL while the lock is held anyway,
            // and retire completed entries for the same entity and window
            // whose content hash no longer matches
            slots.retain(|k, slot| match slot {
                Slot::Ready { inserted_at, .. } => {
                    inserted_at.elapsed() < self.ttl
                        && !(k.entity_id == key.entity_id
                            && k.window == key.window
                            && k.content_hash != key.content_hash)
                }
                Slot::InFlight(_) => true,
            });

            if let Some(slot) = slots.get(&key) {
                match slot {
                    Slot::Ready { prediction, .. } => {
                        self.stats.hits.fetch_add(1, Ordering::Relaxed);
                        crate::metrics::cache_hit();
                        tracing::debug!(key = %key.display(), "Cache hit");
                        return Ok(Arc::clone(prediction));
                    }
                    Slot::InFlight(shared) => {
                        self.stats.hits.fetch_add(1, Ordering::Relaxed);
                        crate::metrics::cache_hit();
                        tracing::debug!(key = %key.display(), "Joining in-flight computation");
                        shared.clone()
                    }
                }
            } else {
                // Miss: the InFlight slot must land in the map under the
                // same lock acquisition as the check above, otherwise two
                // first requests racing through the gap would each start
                // their own computation. Building the future is
                // synchronous, so nothing here blocks the lock.
                //
                // The wrapper future installs the completed entry (or
                // removes the slot on failure) itself, so the map stays
                // consistent no matter which waiter drives it to
                // completion.
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                crate::metrics::cache_miss();
                tracing::debug!(key = %key.display(), "Cache miss, computing");

                let slots_handle = Arc::clone(&self.slots);
                let wrapper_key = key.clone();
                let key_label = key.display();
                let future = compute();

                let shared: SharedComputation = async move {
                    let result = future.await;
                    let mut slots = slots_handle.lock().expect("cache lock poisoned");
                    match result {
                        Ok(prediction) => {
                            let prediction = Arc::new(prediction);
                            slots.insert(
                                wrapper_key,
                                Slot::Ready {
                                    prediction: Arc::clone(&prediction),
                                    inserted_at: Instant::now(),
                                },
                            );
                            Ok(prediction)
                        }
                        Err(e) => {
                            slots.remove(&wrapper_key);
                            Err(CacheError::ComputationFailed {
                                key: key_label,
                                reason: e.to_string(),
                            })
                        }
                    }
                }
                .boxed()
                .shared();

                slots.insert(key, Slot::InFlight(shared.clone()));
                shared
            }
        };

        shared.await
    }
}
