// src/health/mod.rs
mod registry;
mod snapshot;
mod status;

pub use registry::{HealthRegistry, RegistryError, Transition};
pub use snapshot::{Snapshot, TargetState};
pub use status::HealthStatus;
