use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use crate::features::snapshot::Bandwidth;
use crate::shared::error::{CollectionError, DeliveryError};

pub trait DataCollector<T> {
    fn collect(&mut self) -> Result<T, CollectionError>;
    fn validate(&self) -> Result<(), CollectionError>;
    fn health_check(&self) -> bool;
}

/// Blocking access to the host's counters. Each call is one independent read.
pub trait MetricSource {
    /// Aggregate busy percentage over all logical processors, measured across `window`.
    fn cpu_utilization(&mut self, window: Duration) -> Result<f64, CollectionError>;
    fn memory_utilization(&mut self) -> Result<f64, CollectionError>;
    fn disk_usage(&mut self, mount: &Path) -> Result<f64, CollectionError>;
    /// Cumulative counters summed over every interface.
    fn bandwidth(&mut self) -> Result<Bandwidth, CollectionError>;
}

#[async_trait]
pub trait Reporter {
    async fn report(&self, payload: Vec<u8>) -> Result<(), DeliveryError>;
}

pub trait Validatable {
    fn validate(&self) -> Result<(), String>;
    fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}
