pub mod agent;
pub mod reporter;
pub mod sampler;
pub mod snapshot;
