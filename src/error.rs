use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("No tokio runtime available to run fetch operations")]
    NoRuntime,

    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),

    #[error("Fetch instance {instance} panicked before settling")]
    FetchPanicked { instance: u64 },
}
