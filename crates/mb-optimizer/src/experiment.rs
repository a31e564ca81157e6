//! Collaborator that turns knob values into measurements.

use async_trait::async_trait;
use mb_types::{ExperimentError, ExperimentTuple, ProposedPoint, Workflow};

/// Runs single experiments on behalf of the driver.
///
/// Lower measurements are better. Objectives that should be maximized must be
/// negated or otherwise transformed by the implementor.
#[async_trait]
pub trait ExperimentRunner: Send {
    /// Apply `knobs` to the system under test before it is measured.
    async fn setup_stage(
        &mut self,
        workflow: &Workflow,
        knobs: &ProposedPoint,
    ) -> Result<(), ExperimentError>;

    /// Run one experiment and return its measured value.
    async fn run_experiment(
        &mut self,
        workflow: &Workflow,
        experiment: &ExperimentTuple,
    ) -> Result<f64, ExperimentError>;

    /// Called once before the optimization starts.
    async fn apply_init_knobs(&mut self, _workflow: &Workflow) -> Result<(), ExperimentError> {
        Ok(())
    }

    /// Called once after the optimization ends, whatever its outcome.
    async fn apply_default_knobs(&mut self, _workflow: &Workflow) -> Result<(), ExperimentError> {
        Ok(())
    }
}
