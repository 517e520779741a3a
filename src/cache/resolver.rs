use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::fingerprint::{Fingerprint, Projection};
use super::store::CacheStore;
use super::types::{CacheEntry, GenerationError, PendingPolicy, Resolution};

/// The expensive, fallible producer of a derived artifact
#[async_trait]
pub trait Generator<I, V>: Send + Sync {
    /// Produce an artifact for a non-empty collection snapshot
    ///
    /// Failures must be returned as errors, never folded into `V`.
    async fn generate(&self, items: &[I]) -> anyhow::Result<V>;
}

/// How an in-flight generation ended, shared by everyone awaiting it
#[derive(Debug, Clone)]
enum Completion<V> {
    Committed(V),
    Superseded(V),
    Failed(GenerationError),
}

type SharedGeneration<V> = Shared<BoxFuture<'static, Completion<V>>>;

/// Per-key bookkeeping
struct KeyState<V> {
    /// Fingerprint of the most recent non-empty resolve for this key
    latest: Option<Fingerprint>,
    in_flight: HashMap<Fingerprint, SharedGeneration<V>>,
}

impl<V> Default for KeyState<V> {
    fn default() -> Self {
        Self {
            latest: None,
            in_flight: HashMap::new(),
        }
    }
}

struct CoreState<V> {
    keys: HashMap<String, KeyState<V>>,
    stats: CacheStats,
}

/// Store plus the state that in-flight generations must reach on completion
struct Core<V> {
    store: Arc<dyn CacheStore<V>>,
    state: Mutex<CoreState<V>>,
}

impl<V> Core<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Build the shared future for one generation
    ///
    /// The commit happens inside the future, so it runs exactly once. The
    /// caller spawns it, so it finishes whether or not anyone still waits.
    fn generation<I, G>(
        self: &Arc<Self>,
        key: String,
        fingerprint: Fingerprint,
        items: Vec<I>,
        generator: Arc<G>,
    ) -> SharedGeneration<V>
    where
        I: Send + Sync + 'static,
        G: Generator<I, V> + ?Sized + 'static,
    {
        let core = Arc::clone(self);
        async move {
            let outcome = generator
                .generate(&items)
                .await
                .map_err(GenerationError::from);
            core.complete(&key, fingerprint, outcome)
        }
        .boxed()
        .shared()
    }

    /// Record a finished generation, committing it only if it is still wanted
    fn complete(
        &self,
        key: &str,
        fingerprint: Fingerprint,
        outcome: Result<V, GenerationError>,
    ) -> Completion<V> {
        let mut guard = self.state.lock();
        let CoreState { keys, stats } = &mut *guard;
        let state = keys.entry(key.to_string()).or_default();
        state.in_flight.remove(&fingerprint);

        match outcome {
            Err(error) => {
                stats.failures += 1;
                warn!("Generation for '{}' ({}) failed: {}", key, fingerprint, error);
                Completion::Failed(error)
            }
            Ok(value) if state.latest.as_ref() == Some(&fingerprint) => {
                // Still under the state lock: writes for a key are linearized
                self.store
                    .set(&CacheEntry::new(key, fingerprint, value.clone()));
                Completion::Committed(value)
            }
            Ok(value) => {
                stats.superseded += 1;
                debug!(
                    "Discarding result for '{}' ({}): a newer fingerprint was requested",
                    key, fingerprint
                );
                Completion::Superseded(value)
            }
        }
    }
}

/// Memoizes generated artifacts against a fingerprint of their input
///
/// Each cache key can carry its own projection, so only the fields that
/// affect that artifact participate in invalidation. Cloning is cheap and
/// clones share in-flight generations and the store.
pub struct FingerprintCache<I, V> {
    core: Arc<Core<V>>,
    projections: HashMap<String, Arc<dyn Projection<I>>>,
    default_projection: Arc<dyn Projection<I>>,
    pending_policy: PendingPolicy,
}

impl<I, V> Clone for FingerprintCache<I, V> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            projections: self.projections.clone(),
            default_projection: Arc::clone(&self.default_projection),
            pending_policy: self.pending_policy,
        }
    }
}

impl<I, V> FingerprintCache<I, V>
where
    I: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        store: Arc<dyn CacheStore<V>>,
        default_projection: impl Projection<I> + 'static,
    ) -> Self {
        Self {
            core: Arc::new(Core {
                store,
                state: Mutex::new(CoreState {
                    keys: HashMap::new(),
                    stats: CacheStats::default(),
                }),
            }),
            projections: HashMap::new(),
            default_projection: Arc::new(default_projection),
            pending_policy: PendingPolicy::default(),
        }
    }

    /// Use `projection` when fingerprinting collections for `key`
    pub fn with_projection(
        mut self,
        key: impl Into<String>,
        projection: impl Projection<I> + 'static,
    ) -> Self {
        self.projections.insert(key.into(), Arc::new(projection));
        self
    }

    pub fn with_pending_policy(mut self, policy: PendingPolicy) -> Self {
        self.pending_policy = policy;
        self
    }

    /// Fingerprint of `items` as seen by `key`'s projection
    pub fn fingerprint(&self, key: &str, items: &[I]) -> Result<Fingerprint, serde_json::Error> {
        let projection = self
            .projections
            .get(key)
            .unwrap_or(&self.default_projection);
        Fingerprint::compute(items, projection.as_ref())
    }

    /// Resolve the current artifact for `key` using the cache's pending policy
    pub async fn resolve<G>(&self, key: &str, items: &[I], generator: Arc<G>) -> Resolution<V>
    where
        G: Generator<I, V> + ?Sized + 'static,
    {
        self.resolve_with(key, items, generator, self.pending_policy)
            .await
    }

    /// Resolve the current artifact for `key`
    ///
    /// Serves the stored value when its fingerprint matches, joins an
    /// identical in-flight generation, or starts a new one. Never panics or
    /// errors; every outcome is a `Resolution`.
    pub async fn resolve_with<G>(
        &self,
        key: &str,
        items: &[I],
        generator: Arc<G>,
        policy: PendingPolicy,
    ) -> Resolution<V>
    where
        G: Generator<I, V> + ?Sized + 'static,
    {
        if items.is_empty() {
            self.core.state.lock().stats.empty += 1;
            debug!("No items for '{}', skipping generation", key);
            return Resolution::Empty;
        }

        let fingerprint = match self.fingerprint(key, items) {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                warn!("Cannot fingerprint items for '{}' ({}), generating uncached", key, e);
                // Older generations for this key must not commit over it
                if let Some(state) = self.core.state.lock().keys.get_mut(key) {
                    state.latest = None;
                }
                return self.generate_uncached(key, items, generator.as_ref()).await;
            }
        };

        let (generation, stale) = {
            let mut guard = self.core.state.lock();
            let CoreState { keys, stats } = &mut *guard;
            let state = keys.entry(key.to_string()).or_default();
            state.latest = Some(fingerprint.clone());

            let stored = self.core.store.get(key);
            if let Some(entry) = &stored {
                if entry.matches(&fingerprint) {
                    stats.hits += 1;
                    debug!("Cache hit for '{}' ({})", key, fingerprint);
                    return Resolution::Hit {
                        value: entry.value.clone(),
                    };
                }
            }
            let stale = stored.map(|entry| entry.value);

            if let Some(running) = state.in_flight.get(&fingerprint) {
                stats.joined += 1;
                if policy == PendingPolicy::Stale {
                    debug!("Generation for '{}' ({}) pending, serving stale", key, fingerprint);
                    return Resolution::Pending { stale };
                }
                debug!("Joining generation for '{}' ({})", key, fingerprint);
                (running.clone(), stale)
            } else {
                stats.misses += 1;
                debug!("Cache miss for '{}' ({}), generating", key, fingerprint);
                let generation = self.core.generation(
                    key.to_string(),
                    fingerprint.clone(),
                    items.to_vec(),
                    generator,
                );
                state.in_flight.insert(fingerprint, generation.clone());
                // Driven to completion even if every waiting caller goes away
                tokio::spawn(generation.clone());
                (generation, stale)
            }
        };

        match generation.await {
            Completion::Committed(value) => Resolution::MissResolved { value },
            Completion::Superseded(value) => Resolution::Superseded { value },
            Completion::Failed(error) => Resolution::MissFailed { error, stale },
        }
    }

    /// Generate without touching the store or the in-flight table
    async fn generate_uncached<G>(&self, key: &str, items: &[I], generator: &G) -> Resolution<V>
    where
        G: Generator<I, V> + ?Sized,
    {
        self.core.state.lock().stats.uncached += 1;
        match generator.generate(items).await {
            Ok(value) => Resolution::Uncached { value },
            Err(err) => {
                let error = GenerationError::from(err);
                self.core.state.lock().stats.failures += 1;
                warn!("Generation for '{}' failed: {}", key, error);
                Resolution::MissFailed {
                    error,
                    stale: self.core.store.get(key).map(|entry| entry.value),
                }
            }
        }
    }

    /// Stored entry for `key`, without generating anything
    pub fn peek(&self, key: &str) -> Option<CacheEntry<V>> {
        self.core.store.get(key)
    }

    /// Drop the stored entry for `key`
    pub fn invalidate(&self, key: &str) {
        self.core.store.remove(key);
    }

    pub fn stats(&self) -> CacheStats {
        self.core.state.lock().stats.clone()
    }
}

/// Counters for resolve outcomes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    /// Generations started
    pub misses: usize,
    /// Calls that found their generation already in flight
    pub joined: usize,
    pub failures: usize,
    pub superseded: usize,
    pub empty: usize,
    /// Generations whose input could not be fingerprinted
    pub uncached: usize,
}

impl CacheStats {
    /// Percentage of fingerprinted requests served from the store
    pub fn hit_rate(&self) -> f32 {
        let total = self.hits + self.misses + self.joined;
        if total > 0 {
            (self.hits as f32 / total as f32) * 100.0
        } else {
            0.0
        }
    }

    /// Format cache stats for display
    pub fn format(&self) -> String {
        format!(
            "Cache Statistics:\n\
            Hit Rate: {:.1}% ({} hits, {} generations, {} joined)\n\
            Failures: {}\n\
            Superseded: {}\n\
            Empty: {}\n\
            Uncached: {}",
            self.hit_rate(),
            self.hits,
            self.misses,
            self.joined,
            self.failures,
            self.superseded,
            self.empty,
            self.uncached
        )
    }
}
