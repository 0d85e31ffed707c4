pub mod classifier;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod executor;
pub mod filter;
pub mod metrics;
pub mod report;
pub mod services;
pub mod sweep;

#[cfg(test)]
mod test_support;

pub use controller::Controller;
pub use error::SweepError;
pub use sweep::{SweepResult, Sweeper};
