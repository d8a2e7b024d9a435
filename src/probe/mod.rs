// src/probe/mod.rs
mod prober;

pub use prober::{HealthProber, Probe, ProbeResult, ProbeStatus};
