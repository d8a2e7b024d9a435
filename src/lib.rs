// src/lib.rs
pub mod config;
pub mod metrics;
pub mod poller;
pub mod probe;
pub mod registry;
pub mod resolve;
pub mod sweep;
