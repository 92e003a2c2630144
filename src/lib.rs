pub mod features;
pub mod shared;

// Re-export commonly used items from features
pub use features::agent::{AgentLoop, AgentState, CycleOutcome, CycleStats};
pub use features::reporter::HttpReporter;
pub use features::sampler::{Sampler, SystemMetricSource};
pub use features::snapshot::{Bandwidth, Snapshot, SnapshotBuilder};

// Re-export shared functionality
pub use shared::config::AgentConfig;
pub use shared::error::{
    AgentError,
    CollectionError,
    ConfigError,
    DeliveryError,
    Metric,
    ProcessingError,
};
pub use shared::traits::{DataCollector, MetricSource, Reporter, Validatable};
