mod collector;

#[cfg(test)]
pub(crate) use collector::tests::StubSource;
pub use collector::{Sampler, SystemMetricSource};
