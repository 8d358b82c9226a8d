// src/lib.rs
pub mod broadcast;
pub mod config;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod probe;
pub mod query;
pub mod scheduler;
pub mod server;
pub mod shutdown;
