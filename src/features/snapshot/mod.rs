pub mod models;

pub use models::{Bandwidth, Snapshot, SnapshotBuilder};
