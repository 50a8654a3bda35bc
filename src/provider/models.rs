use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Dataset payload as returned by a provider
pub type DatasetValue = Arc<serde_json::Value>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Entity not found: {path}")]
    NotFound { path: String },

    #[error("Entity is not a dataset: {path}")]
    NotADataset { path: String },

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("Request was cancelled")]
    Cancelled,

    #[error("Backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub path: String,
    pub kind: EntityKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityKind {
    Group { children: Vec<String> },
    Dataset { shape: Vec<usize>, dtype: String },
    Datatype,
    ExternalLink { file: String, path: String },
    SoftLink { target: String },
}

impl Entity {
    pub fn is_dataset(&self) -> bool {
        matches!(self.kind, EntityKind::Dataset { .. })
    }
}

/// File-level description returned once per provider: the domain and the
/// root group every entity path is resolved from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub domain: String,
    pub root: Entity,
}

/// One dimension of a slice selection such as `"0,:"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SliceIndex {
    Index(usize),
    All,
}

/// Parse a comma-separated selection, e.g. `"0,:"` or `"2, :, 5"`
pub fn parse_selection(selection: &str) -> Result<Vec<SliceIndex>, ProviderError> {
    if selection.trim().is_empty() {
        return Err(ProviderError::InvalidSelection(selection.to_string()));
    }

    selection
        .split(',')
        .map(|part| match part.trim() {
            ":" => Ok(SliceIndex::All),
            index => index
                .parse::<usize>()
                .map(SliceIndex::Index)
                .map_err(|_| ProviderError::InvalidSelection(selection.to_string())),
        })
        .collect()
}

/// Request for a dataset value, optionally restricted to a slice
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueRequest {
    pub path: String,
    pub selection: Option<String>,
}

impl ValueRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            selection: None,
        }
    }

    pub fn with_selection(path: impl Into<String>, selection: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            selection: Some(selection.into()),
        }
    }

    /// Parsed selection, `None` for a whole-dataset request
    pub fn slice(&self) -> Result<Option<Vec<SliceIndex>>, ProviderError> {
        self.selection.as_deref().map(parse_selection).transpose()
    }

    /// Whether two requests address the same data.
    ///
    /// Selections are compared after parsing, so `"0,:"` and `"0, :"` match.
    /// Selections that fail to parse are compared as text.
    pub fn same_slice(a: &ValueRequest, b: &ValueRequest) -> bool {
        if a.path != b.path {
            return false;
        }
        match (&a.selection, &b.selection) {
            (None, None) => true,
            (Some(left), Some(right)) => match (parse_selection(left), parse_selection(right)) {
                (Ok(left), Ok(right)) => left == right,
                _ => left == right,
            },
            _ => false,
        }
    }
}
