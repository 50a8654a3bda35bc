use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::provider::{DataProvider, DatasetValue, Entity, Metadata, ProviderError, ValueRequest};
use crate::store::FetchStore;
use std::sync::Arc;

pub type MetadataStore = FetchStore<(), Metadata, ProviderError>;
pub type EntityStore = FetchStore<String, Entity, ProviderError>;
pub type ValueStore = FetchStore<ValueRequest, DatasetValue, ProviderError>;

/// Metadata, entities and values stores backed by one provider
pub struct ProviderStores<P: DataProvider> {
    provider: Arc<P>,
    metadata: MetadataStore,
    entities: EntityStore,
    values: ValueStore,
}

impl<P: DataProvider> ProviderStores<P> {
    pub fn new(provider: Arc<P>) -> Result<Self, StoreError> {
        Self::with_config(provider, StoreConfig::named("provider"))
    }

    /// Build the stores, naming them `<name>.metadata`, `<name>.entities`
    /// and `<name>.values`
    pub fn with_config(provider: Arc<P>, config: StoreConfig) -> Result<Self, StoreError> {
        let metadata_provider = Arc::clone(&provider);
        let metadata = FetchStore::builder(move |_: (), cancel| {
            let provider = Arc::clone(&metadata_provider);
            async move { provider.get_metadata(cancel).await }
        })
        .config(StoreConfig {
            name: format!("{}.metadata", config.name),
            ..config.clone()
        })
        .build()?;

        let entity_provider = Arc::clone(&provider);
        let entities = FetchStore::builder(move |path: String, cancel| {
            let provider = Arc::clone(&entity_provider);
            async move { provider.get_entity(&path, cancel).await }
        })
        .config(StoreConfig {
            name: format!("{}.entities", config.name),
            ..config.clone()
        })
        .build()?;

        // Values are keyed by path and selection; equivalent selections with
        // different spelling must share an entry, hence the comparator.
        let value_provider = Arc::clone(&provider);
        let values = FetchStore::builder(move |request: ValueRequest, cancel| {
            let provider = Arc::clone(&value_provider);
            async move { provider.get_value(&request, cancel).await }
        })
        .config(StoreConfig {
            name: format!("{}.values", config.name),
            ..config
        })
        .build_with_comparator(ValueRequest::same_slice)?;

        Ok(Self {
            provider,
            metadata,
            entities,
            values,
        })
    }

    pub fn domain(&self) -> &str {
        self.provider.domain()
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    pub fn metadata_store(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    pub fn values(&self) -> &ValueStore {
        &self.values
    }

    /// Fetch the file metadata, waiting if it is still loading
    pub async fn metadata(&self) -> Result<Metadata, ProviderError> {
        self.metadata.fetch(()).await
    }

    /// Fetch the entity at `path`, waiting if it is still loading
    pub async fn entity(&self, path: impl Into<String>) -> Result<Entity, ProviderError> {
        self.entities.fetch(path.into()).await
    }

    /// Fetch a dataset value, waiting if it is still loading
    pub async fn value(&self, request: ValueRequest) -> Result<DatasetValue, ProviderError> {
        self.values.fetch(request).await
    }
}
