//! # suspense-store
//!
//! **Async fetch store with request coalescing, suspension and cooperative cancellation**
//!
//! Sits between a rendering layer and the data providers that serve HDF5
//! entities and values. Every on-demand fetch goes through a [`FetchStore`],
//! which guarantees:
//!
//! - 🔁 **One fetch per key**: concurrent requests for a key share a single
//!   invocation of the fetch function until the entry is evicted
//! - ⏸️ **Suspension instead of blocking**: `get` answers immediately with
//!   [`Lookup::Ready`], [`Lookup::Failed`], or [`Lookup::Pending`] carrying a
//!   [`Suspension`] that resumes the caller once the entry settles
//! - ♻️ **Faithful error replay**: a failed fetch is reported to every caller
//!   until it is evicted; retrying is `evict` + `get`
//! - 🛑 **Cooperative cancellation**: `abort` signals the entry's
//!   [`CancellationToken`](tokio_util::sync::CancellationToken), and the
//!   fetch function decides what to do with it
//! - 🔑 **Pluggable key equivalence**: structural `Hash + Eq` matching by
//!   default, or an opt-in comparator for keys such as slice selections
//!   (lookups then scan every entry, O(n))
//!
//! ## 🚀 Quick Start
//!
//! ```rust
//! use suspense_store::{FetchStore, Lookup};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = FetchStore::new(|key: String, _cancel| async move {
//!     Ok::<usize, String>(key.len())
//! })?;
//!
//! store.prefetch("dataset".to_string());
//!
//! let value = match store.get("dataset".to_string()) {
//!     Lookup::Ready(value) => value,
//!     Lookup::Pending(suspension) => suspension.await?,
//!     Lookup::Failed(error) => return Err(error.into()),
//! };
//! assert_eq!(value, 7);
//!
//! // Settled entries are served without refetching
//! assert_eq!(store.fetch("dataset".to_string()).await?, 7);
//! assert_eq!(store.stats().fetches_started, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## 🔑 Custom Key Equivalence
//!
//! ```rust
//! use suspense_store::{FetchStore, ValueRequest};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = FetchStore::with_comparator(
//!     |request: ValueRequest, _cancel| async move { Ok::<_, String>(request.path) },
//!     ValueRequest::same_slice,
//! )?;
//!
//! store.prefetch(ValueRequest::with_selection("/entry/data", "0,:"));
//! let path = store
//!     .fetch(ValueRequest::with_selection("/entry/data", "0, :"))
//!     .await?;
//! assert_eq!(path, "/entry/data");
//! assert_eq!(store.stats().fetches_started, 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
mod instance;
pub mod matcher;
pub mod provider;
pub mod store;
pub mod suspense;

// Re-export commonly used types
pub use config::StoreConfig;
pub use error::StoreError;
pub use instance::FetchState;
pub use matcher::{KeyComparator, KeyMatching};
pub use provider::{
    DataProvider, DatasetValue, Entity, EntityKind, Metadata, ProviderError, ProviderStores,
    SliceIndex, ValueRequest,
};
pub use store::{FetchStore, FetchStoreBuilder, StoreStats};
pub use suspense::{Lookup, Suspension};
pub use tokio_util::sync::CancellationToken;
