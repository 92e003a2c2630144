use std::fmt;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Collection failed: {0}")]
    Collection(#[from] CollectionError),

    #[error("Processing failed: {0}")]
    Processing(#[from] ProcessingError),

    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// The four OS readings a snapshot is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Cpu,
    Memory,
    Disk,
    Bandwidth,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Cpu => "cpu",
            Metric::Memory => "memory",
            Metric::Disk => "disk",
            Metric::Bandwidth => "bandwidth",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum CollectionError {
    #[error("{metric} metric unavailable: {reason}")]
    MetricUnavailable { metric: Metric, reason: String },

    #[error("Sampling aborted: {0}")]
    Aborted(String),
}

impl CollectionError {
    pub fn unavailable(metric: Metric, reason: impl Into<String>) -> Self {
        CollectionError::MetricUnavailable {
            metric,
            reason: reason.into(),
        }
    }

    /// The metric that failed, if the failure is tied to one.
    pub fn metric(&self) -> Option<Metric> {
        match self {
            CollectionError::MetricUnavailable { metric, .. } => Some(*metric),
            CollectionError::Aborted(_) => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode snapshot: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Data validation failed: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Collector rejected snapshot with status {0}")]
    Rejected(reqwest::StatusCode),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}
