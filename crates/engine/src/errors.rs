//! Error types for the experiment engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid experiment configuration: {0}")]
    InvalidConfig(String),

    #[error("Experiment not found: {0}")]
    ExperimentNotFound(String),

    #[error("Variant not found: {0}")]
    VariantNotFound(String),

    #[error("Metric not found: {0}")]
    MetricNotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Statistical error: {0}")]
    Statistical(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
