//! Seam between the stores and the backends that serve HDF5 data.
//!
//! A [`DataProvider`] knows how to fetch file metadata, entities and dataset
//! values; [`ProviderStores`] wraps one provider in a store per kind so that
//! every request goes through request coalescing.

use tokio_util::sync::CancellationToken;

pub mod models;
pub mod stores;

pub use models::{
    parse_selection, DatasetValue, Entity, EntityKind, Metadata, ProviderError, SliceIndex,
    ValueRequest,
};
pub use stores::ProviderStores;

/// Backend serving HDF5 entities and values
#[async_trait::async_trait]
pub trait DataProvider: Send + Sync + 'static {
    /// Identifier of the file or domain being served
    fn domain(&self) -> &str;

    /// Fetch the file-level metadata
    async fn get_metadata(&self, cancel: CancellationToken) -> Result<Metadata, ProviderError>;

    /// Fetch the entity at `path`
    async fn get_entity(
        &self,
        path: &str,
        cancel: CancellationToken,
    ) -> Result<Entity, ProviderError>;

    /// Fetch the value of a dataset, or a slice of it
    async fn get_value(
        &self,
        request: &ValueRequest,
        cancel: CancellationToken,
    ) -> Result<DatasetValue, ProviderError>;
}
