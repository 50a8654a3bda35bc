use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Settlement state of one fetch operation
///
/// Only ever moves from `Pending` to one of the two terminal states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState<V, E> {
    Pending,
    Resolved(V),
    Errored(E),
}

impl<V, E> FetchState<V, E> {
    pub fn is_pending(&self) -> bool {
        matches!(self, FetchState::Pending)
    }

    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }
}

impl<V: Clone, E: Clone> FetchState<V, E> {
    /// Terminal outcome, or `None` while pending
    pub fn outcome(&self) -> Option<Result<V, E>> {
        match self {
            FetchState::Pending => None,
            FetchState::Resolved(value) => Some(Ok(value.clone())),
            FetchState::Errored(error) => Some(Err(error.clone())),
        }
    }
}

/// Tracks a single invocation of the fetch function for one key.
///
/// The state lives in a watch channel so that reads are atomic with respect
/// to the settlement write and every subscriber is woken when it happens.
/// The sender is dropped without a write if the fetch panics, which closes
/// the channel and releases subscribers.
pub(crate) struct FetchInstance<V, E> {
    id: u64,
    sender: Mutex<Option<watch::Sender<FetchState<V, E>>>>,
    state: watch::Receiver<FetchState<V, E>>,
    cancel: CancellationToken,
}

impl<V, E> FetchInstance<V, E> {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Signal the cancellation token. Idempotent, and a no-op once settled.
    /// Returns whether the instance was still pending.
    pub(crate) fn request_cancellation(&self) -> bool {
        let pending = self.state.borrow().is_pending();
        if pending {
            self.cancel.cancel();
        }
        pending
    }

    /// Close the channel without settling. Subscribers observe the closure
    /// and the state stays `Pending` for good.
    pub(crate) fn abandon(&self) {
        self.sender.lock().take();
    }

    /// Whether the fetch ended without ever settling
    pub(crate) fn is_abandoned(&self) -> bool {
        self.sender.lock().is_none() && self.state.borrow().is_pending()
    }
}

impl<V, E> FetchInstance<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(id: u64) -> Self {
        let (sender, state) = watch::channel(FetchState::Pending);
        Self {
            id,
            sender: Mutex::new(Some(sender)),
            state,
            cancel: CancellationToken::new(),
        }
    }

    /// Run `fetch` to completion on `runtime` and settle with its output.
    ///
    /// A panic while polling `fetch` abandons the instance instead.
    /// `on_finished` runs on the same task once the instance has settled or
    /// been abandoned.
    pub(crate) fn start<Fut, S>(self: &Arc<Self>, runtime: &Handle, fetch: Fut, on_finished: S)
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        S: FnOnce(&Self) + Send + 'static,
    {
        let instance = Arc::clone(self);
        runtime.spawn(async move {
            match AssertUnwindSafe(fetch).catch_unwind().await {
                Ok(outcome) => instance.settle(outcome),
                Err(_) => instance.abandon(),
            }
            on_finished(&instance);
        });
    }

    pub(crate) fn peek(&self) -> FetchState<V, E> {
        self.state.borrow().clone()
    }

    /// # Panics
    ///
    /// Panics if the instance has already settled. Retrying goes through
    /// eviction and a fresh instance, never through a second write.
    pub(crate) fn settle(&self, outcome: Result<V, E>) {
        let sender = self.sender.lock();
        let written = sender.as_ref().is_some_and(|sender| {
            sender.send_if_modified(|state| {
                if !state.is_pending() {
                    return false;
                }
                *state = match outcome {
                    Ok(value) => FetchState::Resolved(value),
                    Err(error) => FetchState::Errored(error),
                };
                true
            })
        });
        assert!(written, "fetch instance {} settled twice", self.id);
    }

    pub(crate) fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<FetchState<V, E>> {
        self.state.clone()
    }
}
