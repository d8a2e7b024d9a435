// src/sweep/mod.rs
mod aggregator;

pub use aggregator::{AggregateReport, HealthAggregator, SweepFilter, SweepOptions};
