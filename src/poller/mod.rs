// src/poller/mod.rs
mod poller;

pub use poller::{PollerState, StatusPoller, SweepError};
