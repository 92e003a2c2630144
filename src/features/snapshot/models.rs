use serde::{Deserialize, Serialize};
use crate::shared::error::ProcessingError;
use crate::shared::traits::Validatable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bandwidth {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

/// One cycle's worth of host metrics. Field order is the wire order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub cpu_utilization: f64,
    pub memory_utilization: f64,
    pub disk_usage: f64,
    pub bandwidth_usage: Bandwidth,
}

pub(crate) fn is_percentage(value: f64) -> bool {
    value.is_finite() && (0.0..=100.0).contains(&value)
}

impl Snapshot {
    /// Compact JSON body as sent to the collector.
    pub fn encode(&self) -> Result<Vec<u8>, ProcessingError> {
        serde_json::to_vec(self).map_err(ProcessingError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProcessingError> {
        let snapshot: Snapshot = serde_json::from_slice(bytes).map_err(ProcessingError::Decode)?;
        snapshot.validate().map_err(ProcessingError::Validation)?;
        Ok(snapshot)
    }
}

impl Validatable for Snapshot {
    fn validate(&self) -> Result<(), String> {
        let fields = [
            ("cpu_utilization", self.cpu_utilization),
            ("memory_utilization", self.memory_utilization),
            ("disk_usage", self.disk_usage),
        ];
        for (name, value) in fields {
            if !is_percentage(value) {
                return Err(format!("{} must be between 0 and 100, got {}", name, value));
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct SnapshotBuilder {
    cpu_utilization: Option<f64>,
    memory_utilization: Option<f64>,
    disk_usage: Option<f64>,
    bandwidth_usage: Option<Bandwidth>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cpu_utilization(mut self, cpu_utilization: f64) -> Self {
        self.cpu_utilization = Some(cpu_utilization);
        self
    }

    pub fn memory_utilization(mut self, memory_utilization: f64) -> Self {
        self.memory_utilization = Some(memory_utilization);
        self
    }

    pub fn disk_usage(mut self, disk_usage: f64) -> Self {
        self.disk_usage = Some(disk_usage);
        self
    }

    pub fn bandwidth_usage(mut self, bandwidth_usage: Bandwidth) -> Self {
        self.bandwidth_usage = Some(bandwidth_usage);
        self
    }

    pub fn build(self) -> Result<Snapshot, String> {
        let snapshot = Snapshot {
            cpu_utilization: self.cpu_utilization.ok_or("cpu_utilization is required")?,
            memory_utilization: self.memory_utilization.ok_or("memory_utilization is required")?,
            disk_usage: self.disk_usage.ok_or("disk_usage is required")?,
            bandwidth_usage: self.bandwidth_usage.ok_or("bandwidth_usage is required")?,
        };

        snapshot.validate()?;
        Ok(snapshot)
    }
}
