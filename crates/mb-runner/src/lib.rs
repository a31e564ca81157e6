//! Experiment runners for the `mbo-run` binary.

pub mod command;

pub use command::CommandExperiment;
