use crate::error::StoreError;
use serde::{Deserialize, Serialize};

/// Configuration for a [`FetchStore`](crate::FetchStore)
///
/// # Default Values
/// - `name`: `"fetch-store"`
/// - `scan_warn_threshold`: 1024 entries
/// - `cancel_on_drop`: true
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Label attached to every log event emitted by the store
    pub name: String,

    /// Entry count above which a comparator-backed store logs a warning.
    /// Lookups in such a store scan every key, so this is where that cost
    /// starts to show.
    pub scan_warn_threshold: usize,

    /// Signal the cancellation token of every pending entry when the last
    /// store handle is dropped
    pub cancel_on_drop: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "fetch-store".to_string(),
            scan_warn_threshold: 1024,
            cancel_on_drop: true,
        }
    }
}

impl StoreConfig {
    /// Config with a custom name and default values otherwise
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.name.trim().is_empty() {
            return Err(StoreError::InvalidConfig(
                "name must not be empty".to_string(),
            ));
        }
        if self.scan_warn_threshold == 0 {
            return Err(StoreError::InvalidConfig(
                "scan_warn_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
