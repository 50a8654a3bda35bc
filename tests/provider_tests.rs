use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use suspense_store::provider::parse_selection;
use suspense_store::{
    CancellationToken, DataProvider, DatasetValue, Entity, EntityKind, KeyMatching, Lookup,
    Metadata, ProviderError, ProviderStores, SliceIndex, StoreConfig, ValueRequest,
};

/// In-memory provider over a tiny file with one group and one 2x3 dataset
struct TestProvider {
    entities: HashMap<String, Entity>,
    metadata_calls: AtomicUsize,
    entity_calls: AtomicUsize,
    value_calls: AtomicUsize,
    slow_path: Option<String>,
}

impl TestProvider {
    fn new() -> Self {
        let mut entities = HashMap::new();
        entities.insert(
            "/".to_string(),
            Entity {
                name: "".to_string(),
                path: "/".to_string(),
                kind: EntityKind::Group {
                    children: vec!["matrix".to_string()],
                },
            },
        );
        entities.insert(
            "/matrix".to_string(),
            Entity {
                name: "matrix".to_string(),
                path: "/matrix".to_string(),
                kind: EntityKind::Dataset {
                    shape: vec![2, 3],
                    dtype: "<i4".to_string(),
                },
            },
        );

        Self {
            entities,
            metadata_calls: AtomicUsize::new(0),
            entity_calls: AtomicUsize::new(0),
            value_calls: AtomicUsize::new(0),
            slow_path: None,
        }
    }

    fn slow_on(mut self, path: &str) -> Self {
        self.slow_path = Some(path.to_string());
        self
    }

    fn matrix() -> serde_json::Value {
        json!([[0, 1, 2], [3, 4, 5]])
    }
}

#[async_trait::async_trait]
impl DataProvider for TestProvider {
    fn domain(&self) -> &str {
        "test.h5"
    }

    async fn get_metadata(&self, _cancel: CancellationToken) -> Result<Metadata, ProviderError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let root = self
            .entities
            .get("/")
            .cloned()
            .ok_or_else(|| ProviderError::NotFound {
                path: "/".to_string(),
            })?;
        Ok(Metadata {
            domain: self.domain().to_string(),
            root,
        })
    }

    async fn get_entity(
        &self,
        path: &str,
        _cancel: CancellationToken,
    ) -> Result<Entity, ProviderError> {
        self.entity_calls.fetch_add(1, Ordering::SeqCst);
        self.entities
            .get(path)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound {
                path: path.to_string(),
            })
    }

    async fn get_value(
        &self,
        request: &ValueRequest,
        cancel: CancellationToken,
    ) -> Result<DatasetValue, ProviderError> {
        self.value_calls.fetch_add(1, Ordering::SeqCst);

        if self.slow_path.as_deref() == Some(request.path.as_str()) {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                _ = tokio::time::sleep(Duration::from_secs(30)) => {}
            }
        }

        let entity = self
            .entities
            .get(&request.path)
            .ok_or_else(|| ProviderError::NotFound {
                path: request.path.clone(),
            })?;
        if !entity.is_dataset() {
            return Err(ProviderError::NotADataset {
                path: request.path.clone(),
            });
        }

        let matrix = Self::matrix();
        let value = match request.slice()?.as_deref() {
            None => matrix,
            Some([SliceIndex::Index(row), SliceIndex::All]) => matrix[*row].clone(),
            Some(_) => {
                return Err(ProviderError::InvalidSelection(
                    request.selection.clone().unwrap_or_default(),
                ))
            }
        };
        Ok(Arc::new(value))
    }
}

#[tokio::test]
async fn test_entities_are_fetched_once() {
    let provider = Arc::new(TestProvider::new());
    let stores = ProviderStores::new(Arc::clone(&provider)).unwrap();
    assert_eq!(stores.domain(), "test.h5");

    let root = stores.entity("/").await.unwrap();
    assert!(matches!(root.kind, EntityKind::Group { .. }));
    let again = stores.entity("/").await.unwrap();
    assert_eq!(root, again);

    assert_eq!(provider.entity_calls.load(Ordering::SeqCst), 1);
    assert_eq!(stores.entities().matching(), KeyMatching::Structural);
}

#[tokio::test]
async fn test_metadata_is_fetched_once() {
    let provider = Arc::new(TestProvider::new());
    let stores = ProviderStores::new(Arc::clone(&provider)).unwrap();

    let (first, second) = tokio::join!(stores.metadata(), stores.metadata());
    let metadata = first.unwrap();
    assert_eq!(second.unwrap(), metadata);
    assert_eq!(metadata.domain, "test.h5");
    assert_eq!(
        metadata.root.kind,
        EntityKind::Group {
            children: vec!["matrix".to_string()]
        }
    );

    assert_eq!(stores.metadata().await.unwrap(), metadata);
    assert_eq!(provider.metadata_calls.load(Ordering::SeqCst), 1);
    assert_eq!(stores.metadata_store().len(), 1);
}

#[tokio::test]
async fn test_missing_entity_error_is_replayed() {
    let provider = Arc::new(TestProvider::new());
    let stores = ProviderStores::new(Arc::clone(&provider)).unwrap();

    let expected = ProviderError::NotFound {
        path: "/nope".to_string(),
    };
    assert_eq!(stores.entity("/nope").await, Err(expected.clone()));
    match stores.entities().get("/nope".to_string()) {
        Lookup::Failed(error) => assert_eq!(error, expected),
        other => panic!("expected replayed error, got {:?}", other),
    }
    assert_eq!(provider.entity_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_equivalent_selections_share_a_value_fetch() {
    let provider = Arc::new(TestProvider::new());
    let stores = ProviderStores::new(Arc::clone(&provider)).unwrap();
    assert_eq!(stores.values().matching(), KeyMatching::Comparator);

    stores
        .values()
        .prefetch(ValueRequest::with_selection("/matrix", "0,:"));
    let row = stores
        .value(ValueRequest::with_selection("/matrix", "0, :"))
        .await
        .unwrap();
    assert_eq!(*row, json!([0, 1, 2]));
    assert_eq!(provider.value_calls.load(Ordering::SeqCst), 1);

    let other_row = stores
        .value(ValueRequest::with_selection("/matrix", "1,:"))
        .await
        .unwrap();
    assert_eq!(*other_row, json!([3, 4, 5]));

    let full = stores.value(ValueRequest::new("/matrix")).await.unwrap();
    assert_eq!(*full, TestProvider::matrix());
    assert_eq!(provider.value_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_value_errors() {
    let provider = Arc::new(TestProvider::new());
    let stores = ProviderStores::new(provider).unwrap();

    assert_eq!(
        stores.value(ValueRequest::new("/")).await,
        Err(ProviderError::NotADataset {
            path: "/".to_string()
        })
    );
    assert!(matches!(
        stores
            .value(ValueRequest::with_selection("/matrix", "x"))
            .await,
        Err(ProviderError::InvalidSelection(_))
    ));
}

#[tokio::test]
async fn test_abort_cancels_slow_value_and_evict_retries() {
    let provider = Arc::new(TestProvider::new().slow_on("/matrix"));
    let stores = ProviderStores::new(Arc::clone(&provider)).unwrap();
    let request = ValueRequest::new("/matrix");

    let pending = stores.values().get(request.clone());
    assert!(pending.is_pending());
    assert!(stores.values().abort(&request));
    assert_eq!(pending.resolve().await, Err(ProviderError::Cancelled));

    // Still cached as cancelled until evicted
    assert!(matches!(
        stores.values().get(request.clone()),
        Lookup::Failed(ProviderError::Cancelled)
    ));
    assert!(stores.values().evict(&request));
    assert!(stores.values().get(request).is_pending());
    assert_eq!(stores.values().stats().fetches_started, 2);
}

#[tokio::test]
async fn test_store_names_follow_config() {
    let stores =
        ProviderStores::with_config(Arc::new(TestProvider::new()), StoreConfig::named("demo"))
            .unwrap();
    assert_eq!(stores.metadata_store().config().name, "demo.metadata");
    assert_eq!(stores.entities().config().name, "demo.entities");
    assert_eq!(stores.values().config().name, "demo.values");
}

#[test]
fn test_parse_selection_reexport() {
    assert_eq!(
        parse_selection("3,:").unwrap(),
        vec![SliceIndex::Index(3), SliceIndex::All]
    );
}
