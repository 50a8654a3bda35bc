use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::instance::{FetchInstance, FetchState};
use crate::matcher::{HashIndex, KeyComparator, KeyIndex, KeyMatching, ScanIndex};
use crate::suspense::{Lookup, Suspension};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

type FetchFn<K, V, E> =
    Arc<dyn Fn(K, CancellationToken) -> BoxFuture<'static, Result<V, E>> + Send + Sync>;

type Slot<V, E> = Arc<FetchInstance<V, E>>;

type Entries<K, V, E> = Box<dyn KeyIndex<K, Slot<V, E>>>;

/// Point-in-time view of a store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub entries: usize,
    pub pending: usize,
    pub resolved: usize,
    pub errored: usize,
    /// Fetch invocations started since the store was created
    pub fetches_started: u64,
    /// `get` calls answered with a resolved value
    pub hits: u64,
    /// `get` calls answered with a stored error
    pub replayed_errors: u64,
    /// `get` calls that had to suspend
    pub suspensions: u64,
    pub evictions: u64,
    pub aborts: u64,
    /// Fetches that panicked instead of settling
    pub panics: u64,
}

#[derive(Default)]
struct StoreCounters {
    fetches_started: AtomicU64,
    hits: AtomicU64,
    replayed_errors: AtomicU64,
    suspensions: AtomicU64,
    evictions: AtomicU64,
    aborts: AtomicU64,
    panics: AtomicU64,
}

struct StoreInner<K, V, E> {
    entries: Mutex<Entries<K, V, E>>,
    fetch: FetchFn<K, V, E>,
    runtime: Handle,
    config: StoreConfig,
    next_id: AtomicU64,
    scan_warned: AtomicBool,
    counters: StoreCounters,
}

/// Async resource store with at most one in-flight fetch per key.
///
/// The first `prefetch` or `get` for a missing key creates an entry and
/// starts the fetch function for it. Later calls share that entry until it
/// is evicted: a resolved value or an error is returned to every caller
/// without refetching. Retrying a failed key is `evict` followed by `get`.
///
/// `FetchStore` is a cheap handle; clones share the same entries. When the
/// last handle is dropped, pending fetches are cancelled (see
/// [`StoreConfig::cancel_on_drop`]).
pub struct FetchStore<K, V, E> {
    inner: Arc<StoreInner<K, V, E>>,
}

impl<K, V, E> Clone for FetchStore<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Builder for [`FetchStore`]
pub struct FetchStoreBuilder<K, V, E> {
    fetch: FetchFn<K, V, E>,
    config: StoreConfig,
    runtime: Option<Handle>,
}

impl<K, V, E> FetchStoreBuilder<K, V, E>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Runtime the fetch operations are spawned on. Defaults to the runtime
    /// current at build time.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build a store that matches keys structurally
    pub fn build(self) -> Result<FetchStore<K, V, E>, StoreError>
    where
        K: Hash + Eq,
    {
        self.finish(Box::new(HashIndex::<K, Slot<V, E>>::new()))
    }

    /// Build a store that matches keys with `comparator`.
    ///
    /// Every lookup scans all cached keys, O(n) in the number of entries.
    pub fn build_with_comparator<C>(self, comparator: C) -> Result<FetchStore<K, V, E>, StoreError>
    where
        C: Fn(&K, &K) -> bool + Send + Sync + 'static,
    {
        let comparator: KeyComparator<K> = Arc::new(comparator);
        self.finish(Box::new(ScanIndex::<K, Slot<V, E>>::new(comparator)))
    }

    fn finish(self, entries: Entries<K, V, E>) -> Result<FetchStore<K, V, E>, StoreError> {
        self.config.validate()?;
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| StoreError::NoRuntime)?,
        };

        tracing::debug!(
            store = %self.config.name,
            matching = ?entries.matching(),
            "Created fetch store"
        );

        Ok(FetchStore {
            inner: Arc::new(StoreInner {
                entries: Mutex::new(entries),
                fetch: self.fetch,
                runtime,
                config: self.config,
                next_id: AtomicU64::new(1),
                scan_warned: AtomicBool::new(false),
                counters: StoreCounters::default(),
            }),
        })
    }
}

impl<K, V, E> FetchStore<K, V, E>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Start building a store around `fetch`.
    ///
    /// `fetch` is invoked at most once per key between evictions. It should
    /// watch the token if it wants to honour [`abort`](Self::abort), and it
    /// must eventually return for waiters to be resumed.
    pub fn builder<F, Fut>(fetch: F) -> FetchStoreBuilder<K, V, E>
    where
        F: Fn(K, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        FetchStoreBuilder {
            fetch: Arc::new(move |key: K, token: CancellationToken| fetch(key, token).boxed()),
            config: StoreConfig::default(),
            runtime: None,
        }
    }

    /// Store with structural key matching on the current runtime
    pub fn new<F, Fut>(fetch: F) -> Result<Self, StoreError>
    where
        K: Hash + Eq,
        F: Fn(K, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        Self::builder(fetch).build()
    }

    /// Store with comparator-based key matching on the current runtime.
    ///
    /// Lookups cost O(n) in the number of cached entries.
    pub fn with_comparator<F, Fut, C>(fetch: F, comparator: C) -> Result<Self, StoreError>
    where
        F: Fn(K, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        C: Fn(&K, &K) -> bool + Send + Sync + 'static,
    {
        Self::builder(fetch).build_with_comparator(comparator)
    }

    /// Start fetching `key` unless an entry already exists for it
    pub fn prefetch(&self, key: K) {
        self.entry_or_start(key);
    }

    /// Look up `key`, starting its fetch if there is no entry yet.
    ///
    /// Never blocks. A pending entry yields [`Lookup::Pending`] with a
    /// suspension that resumes once the entry settles. A failed entry yields
    /// the same error on every call until it is evicted.
    pub fn get(&self, key: K) -> Lookup<V, E> {
        let instance = self.entry_or_start(key);
        let counters = &self.inner.counters;
        match instance.peek() {
            FetchState::Pending => {
                counters.suspensions.fetch_add(1, Ordering::Relaxed);
                Lookup::Pending(Suspension::new(instance))
            }
            FetchState::Resolved(value) => {
                counters.hits.fetch_add(1, Ordering::Relaxed);
                Lookup::Ready(value)
            }
            FetchState::Errored(error) => {
                counters.replayed_errors.fetch_add(1, Ordering::Relaxed);
                Lookup::Failed(error)
            }
        }
    }

    /// `get` followed by waiting for settlement
    pub async fn fetch(&self, key: K) -> Result<V, E> {
        self.get(key).resolve().await
    }

    /// Remove the entry for `key` whatever its state.
    ///
    /// An in-flight fetch keeps running; its result is dropped when it
    /// arrives. Returns whether an entry was removed.
    pub fn evict(&self, key: &K) -> bool {
        let removed = self.inner.entries.lock().remove(key);
        match removed {
            Some(instance) => {
                self.inner.counters.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    store = %self.inner.config.name,
                    instance = instance.id(),
                    pending = instance.peek().is_pending(),
                    "Evicted entry"
                );
                true
            }
            None => false,
        }
    }

    /// Signal the cancellation token of the entry for `key`.
    ///
    /// The entry stays in place. Whether it ends up errored, resolved, or
    /// never settles is up to the fetch function. Returns whether an entry
    /// was found.
    pub fn abort(&self, key: &K) -> bool {
        let instance = self.inner.entries.lock().get(key).cloned();
        match instance {
            Some(instance) => {
                instance.request_cancellation();
                self.inner.counters.aborts.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    store = %self.inner.config.name,
                    instance = instance.id(),
                    "Requested cancellation"
                );
                true
            }
            None => false,
        }
    }

    /// Current state of the entry for `key`, without creating one
    pub fn state(&self, key: &K) -> Option<FetchState<V, E>> {
        self.inner.entries.lock().get(key).map(|instance| instance.peek())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.entries.lock().get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict every entry. In-flight fetches are not cancelled.
    pub fn clear(&self) {
        let drained = self.inner.entries.lock().drain();
        self.inner
            .counters
            .evictions
            .fetch_add(drained.len() as u64, Ordering::Relaxed);
        tracing::debug!(
            store = %self.inner.config.name,
            count = drained.len(),
            "Cleared store"
        );
    }

    pub fn matching(&self) -> KeyMatching {
        self.inner.entries.lock().matching()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> StoreStats {
        let counters = &self.inner.counters;
        let mut stats = StoreStats {
            fetches_started: counters.fetches_started.load(Ordering::Relaxed),
            hits: counters.hits.load(Ordering::Relaxed),
            replayed_errors: counters.replayed_errors.load(Ordering::Relaxed),
            suspensions: counters.suspensions.load(Ordering::Relaxed),
            evictions: counters.evictions.load(Ordering::Relaxed),
            aborts: counters.aborts.load(Ordering::Relaxed),
            panics: counters.panics.load(Ordering::Relaxed),
            ..Default::default()
        };

        let entries = self.inner.entries.lock();
        stats.entries = entries.len();
        for instance in entries.values() {
            match instance.peek() {
                FetchState::Pending => stats.pending += 1,
                FetchState::Resolved(_) => stats.resolved += 1,
                FetchState::Errored(_) => stats.errored += 1,
            }
        }
        stats
    }

    /// Existing entry for `key`, or a new one whose fetch has been started
    fn entry_or_start(&self, key: K) -> Slot<V, E> {
        let instance = {
            let mut entries = self.inner.entries.lock();
            if let Some(existing) = entries.get(&key) {
                return Arc::clone(existing);
            }
            let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
            let instance = Arc::new(FetchInstance::new(id));
            entries.insert(key.clone(), Arc::clone(&instance));
            self.warn_if_scan_is_large(&**entries);
            instance
        };

        self.inner
            .counters
            .fetches_started
            .fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            store = %self.inner.config.name,
            instance = instance.id(),
            "Starting fetch"
        );

        // The fetch function runs outside the lock so it may use the store.
        let token = instance.cancellation_token();
        let fetch = panic::catch_unwind(AssertUnwindSafe(|| {
            (self.inner.fetch)(key.clone(), token)
        }));
        let store = Arc::downgrade(&self.inner);
        match fetch {
            Ok(fetch) => instance.start(&self.inner.runtime, fetch, move |finished| {
                Self::after_finish(&store, &key, finished);
            }),
            Err(_) => {
                instance.abandon();
                Self::after_finish(&store, &key, &instance);
            }
        }
        instance
    }

    fn after_finish(store: &Weak<StoreInner<K, V, E>>, key: &K, finished: &FetchInstance<V, E>) {
        let Some(inner) = store.upgrade() else {
            return;
        };

        if finished.is_abandoned() {
            let removed = {
                let mut entries = inner.entries.lock();
                let live = entries
                    .get(key)
                    .is_some_and(|current| current.id() == finished.id());
                live && entries.remove(key).is_some()
            };
            inner.counters.panics.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                store = %inner.config.name,
                instance = finished.id(),
                removed,
                "Fetch panicked before settling; released its waiters"
            );
            return;
        }

        if !tracing::enabled!(tracing::Level::DEBUG) {
            return;
        }
        let live = inner
            .entries
            .lock()
            .get(key)
            .is_some_and(|current| current.id() == finished.id());
        let outcome = if matches!(finished.peek(), FetchState::Resolved(_)) {
            "resolved"
        } else {
            "errored"
        };

        if live {
            tracing::debug!(
                store = %inner.config.name,
                instance = finished.id(),
                outcome,
                "Entry settled"
            );
        } else {
            tracing::debug!(
                store = %inner.config.name,
                instance = finished.id(),
                outcome,
                "Discarding result for evicted entry"
            );
        }
    }

    fn warn_if_scan_is_large(&self, entries: &dyn KeyIndex<K, Slot<V, E>>) {
        if entries.matching() != KeyMatching::Comparator
            || entries.len() <= self.inner.config.scan_warn_threshold
        {
            return;
        }
        if !self.inner.scan_warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                store = %self.inner.config.name,
                entries = entries.len(),
                threshold = self.inner.config.scan_warn_threshold,
                "Comparator-backed store is large; every lookup scans all entries"
            );
        }
    }
}

impl<K, V, E> Drop for StoreInner<K, V, E> {
    fn drop(&mut self) {
        if !self.config.cancel_on_drop {
            return;
        }
        let entries = self.entries.get_mut();
        let mut cancelled = 0usize;
        for instance in entries.values() {
            if instance.request_cancellation() {
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            tracing::debug!(
                store = %self.config.name,
                cancelled,
                "Cancelled pending fetches on teardown"
            );
        }
    }
}
