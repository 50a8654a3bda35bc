// Shared helpers for integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::future::{ready, Future, Ready};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use suspense_store::CancellationToken;
use tokio::sync::oneshot;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

pub type Outcome = Result<u32, String>;

pub type OutcomeFuture = Pin<Box<dyn Future<Output = Outcome> + Send>>;

/// Fetch function whose invocations stay pending until the test releases
/// them, one gate per invocation in start order.
#[derive(Clone, Default)]
pub struct GatedFetch {
    calls: Arc<AtomicUsize>,
    gates: Arc<Mutex<Vec<oneshot::Sender<Outcome>>>>,
    tokens: Arc<Mutex<Vec<CancellationToken>>>,
}

impl GatedFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Closure to hand to a store keyed by strings
    pub fn fetcher(
        &self,
    ) -> impl Fn(String, CancellationToken) -> OutcomeFuture + Send + Sync + 'static {
        self.fetcher_for::<String>()
    }

    /// Closure to hand to a store with any key type
    pub fn fetcher_for<K: Send + 'static>(
        &self,
    ) -> impl Fn(K, CancellationToken) -> OutcomeFuture + Send + Sync + 'static {
        let gated = self.clone();
        move |_key: K, token: CancellationToken| -> OutcomeFuture {
            gated.calls.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = oneshot::channel();
            gated.gates.lock().unwrap().push(tx);
            gated.tokens.lock().unwrap().push(token);
            Box::pin(async move {
                rx.await
                    .unwrap_or_else(|_| Err("gate dropped".to_string()))
            })
        }
    }

    /// Settle the `index`-th invocation (0-based, in start order)
    pub fn release(&self, index: usize, outcome: Outcome) {
        let mut gates = self.gates.lock().unwrap();
        let (tx, _) = oneshot::channel();
        let gate = std::mem::replace(&mut gates[index], tx);
        let _ = gate.send(outcome);
    }

    pub fn token(&self, index: usize) -> CancellationToken {
        self.tokens.lock().unwrap()[index].clone()
    }
}

/// Fetch function that resolves immediately and counts invocations per key
#[derive(Clone, Default)]
pub struct CountingFetch {
    per_key: Arc<Mutex<HashMap<String, usize>>>,
}

impl CountingFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls_for(&self, key: &str) -> usize {
        self.per_key.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn fetcher(
        &self,
    ) -> impl Fn(String, CancellationToken) -> Ready<Result<usize, String>> + Send + Sync + 'static {
        let counting = self.clone();
        move |key: String, _token: CancellationToken| {
            let mut per_key = counting.per_key.lock().unwrap();
            *per_key.entry(key.clone()).or_default() += 1;
            ready(Ok(key.len()))
        }
    }
}

/// Counts `WARN` events seen by the thread-local subscriber
#[derive(Clone, Default)]
pub struct WarnCounter {
    warnings: Arc<AtomicUsize>,
}

impl WarnCounter {
    /// Install as the default subscriber for the current thread
    pub fn install() -> (Self, DefaultGuard) {
        let counter = Self::default();
        let subscriber = tracing_subscriber::registry().with(counter.clone());
        (counter, tracing::subscriber::set_default(subscriber))
    }

    pub fn warnings(&self) -> usize {
        self.warnings.load(Ordering::SeqCst)
    }
}

impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::WARN {
            self.warnings.fetch_add(1, Ordering::SeqCst);
        }
    }
}
