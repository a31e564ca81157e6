//! # mb-optimizer
//!
//! Model-based optimization loop for black-box experiments.
//!
//! The optimizer itself runs as a separate HTTP service. This crate builds the
//! requests it expects, runs the experiments it proposes through an
//! [`ExperimentRunner`], reports the measurements back, and selects the best
//! observed configuration.

mod client;
mod config;
mod driver;
mod experiment;
mod protocol;
mod selection;
mod status;

#[cfg(test)]
mod testing;

pub use client::{HttpOptimizerClient, OptimizerService};
pub use config::{OptimizerServiceConfig, HOST_ENV, PORT_ENV, TIMEOUT_ENV};
pub use driver::{DriverConfig, OptimizationLoopDriver};
pub use experiment::ExperimentRunner;
pub use protocol::{
    is_truthy, InitialDesignUpdate, InitiateRequest, InitiateSettings, ModelUpdate, RunRequest,
};
pub use selection::{rank_observations, select_best};
pub use status::{DriverEvent, RunState, RunStatus};

pub use mb_types::{Endpoint, MboError, MboResult};
