// src/probe/mod.rs
mod client;

pub use client::{ProbeClient, ProbeError, ProbeResult, Prober};
