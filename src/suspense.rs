//! Consumption side of the store.
//!
//! [`FetchStore::get`](crate::FetchStore::get) never blocks. It hands back a
//! [`Lookup`], and a pending lookup carries a [`Suspension`] the caller can
//! await (async contexts) or block on (plain threads). Every suspension of
//! one entry resolves to the same outcome.

use crate::error::StoreError;
use crate::instance::{FetchInstance, FetchState};
use futures::future::BoxFuture;
use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::sync::watch;

/// Result of a non-blocking lookup
pub enum Lookup<V, E> {
    /// Fetch still running; wait on the suspension to be resumed
    Pending(Suspension<V, E>),
    Ready(V),
    Failed(E),
}

impl<V, E> Lookup<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn is_pending(&self) -> bool {
        matches!(self, Lookup::Pending(_))
    }

    /// The value if it was already available
    pub fn ready(self) -> Option<V> {
        match self {
            Lookup::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_suspension(self) -> Option<Suspension<V, E>> {
        match self {
            Lookup::Pending(suspension) => Some(suspension),
            _ => None,
        }
    }

    /// Wait for settlement if needed and return the outcome.
    ///
    /// # Panics
    ///
    /// Panics if the fetch panicked, see [`Suspension::settled`].
    pub async fn resolve(self) -> Result<V, E> {
        match self {
            Lookup::Pending(suspension) => suspension.settled().await,
            Lookup::Ready(value) => Ok(value),
            Lookup::Failed(error) => Err(error),
        }
    }
}

impl<V: fmt::Debug, E: fmt::Debug> fmt::Debug for Lookup<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Pending(_) => f.write_str("Pending"),
            Lookup::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Lookup::Failed(error) => f.debug_tuple("Failed").field(error).finish(),
        }
    }
}

/// Handle on a pending entry, resumed once that entry settles.
///
/// Holds the instance alive, so a suspension taken before an eviction still
/// observes the evicted instance's outcome.
pub struct Suspension<V, E> {
    instance: Arc<FetchInstance<V, E>>,
    receiver: watch::Receiver<FetchState<V, E>>,
}

impl<V, E> Suspension<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(instance: Arc<FetchInstance<V, E>>) -> Self {
        let receiver = instance.subscribe();
        Self { instance, receiver }
    }

    pub fn is_settled(&self) -> bool {
        self.receiver.borrow().is_settled()
    }

    /// Wait without busy-polling until the entry settles.
    ///
    /// Never completes if the fetch operation never settles.
    ///
    /// # Panics
    ///
    /// Panics if the fetch panicked instead of settling, carrying the panic
    /// over to the waiter. Use [`try_settled`](Self::try_settled) to get an
    /// error instead.
    pub async fn settled(self) -> Result<V, E> {
        match self.try_settled().await {
            Ok(outcome) => outcome,
            Err(error) => panic!("{}", error),
        }
    }

    /// Like [`settled`](Self::settled), but reports a panicked fetch as
    /// [`StoreError::FetchPanicked`].
    pub async fn try_settled(mut self) -> Result<Result<V, E>, StoreError> {
        loop {
            let current = self.receiver.borrow_and_update().outcome();
            if let Some(outcome) = current {
                return Ok(outcome);
            }
            if self.receiver.changed().await.is_err() {
                // Closed without a write: the fetch was abandoned
                return self
                    .receiver
                    .borrow()
                    .outcome()
                    .ok_or(StoreError::FetchPanicked {
                        instance: self.instance.id(),
                    });
            }
        }
    }

    /// Block the current thread until the entry settles.
    ///
    /// For callers outside an async context. Do not call from a runtime
    /// worker thread: the fetch may need that thread to make progress.
    /// Panics like [`settled`](Self::settled) if the fetch panicked.
    pub fn wait_blocking(self) -> Result<V, E> {
        futures::executor::block_on(self.settled())
    }

    /// Identifier of the fetch instance this suspension is waiting on
    pub fn instance_id(&self) -> u64 {
        self.instance.id()
    }
}

impl<V, E> IntoFuture for Suspension<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    type Output = Result<V, E>;
    type IntoFuture = BoxFuture<'static, Result<V, E>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.settled())
    }
}

impl<V, E> fmt::Debug for Suspension<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suspension")
            .field("instance", &self.instance.id())
            .finish()
    }
}
