//! Optimization loop driver that ties an [`OptimizerService`] and an
//! [`ExperimentRunner`] together for one run.
//!
//! A run goes through these phases, each a remote call followed by local
//! experiments:
//!
//! 1. initiate: send the knob ranges, measure every proposed initial point,
//!    report the values back;
//! 2. create the optimizer's model artifacts;
//! 3. refine: fetch a point, measure it, update the model, repeated
//!    `optimizer_iterations` times;
//! 4. finalize remotely and select the best observation locally.
//!
//! Any failure before refinement aborts the run. During refinement a rejected
//! model update only stops the iteration: the run is still finalized and the
//! best of the observations collected so far is returned. Connection failures
//! abort at every phase.

use mb_types::{
    Endpoint, ExperimentError, ExperimentTuple, MboError, MboResult, Observation, Phase,
    ProposedPoint, Workflow,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::OptimizerService;
use crate::experiment::ExperimentRunner;
use crate::protocol::{self, InitialDesignUpdate, InitiateRequest, ModelUpdate};
use crate::selection::{rank_observations, select_best};
use crate::status::{DriverEvent, RunStatus};

/// Configuration for the optimization loop driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Rank initial-design measurements together with refinement ones when
    /// selecting the best point. Off by default, so only refinement counts.
    pub include_initial_design: bool,
}

enum ModelUpdateOutcome {
    Accepted,
    Rejected(String),
}

/// Drives one optimization run at a time. Generic over the optimizer
/// transport and the experiment runner so tests can plug in doubles.
pub struct OptimizationLoopDriver<S: OptimizerService, R: ExperimentRunner> {
    service: S,
    runner: R,
    config: DriverConfig,
    status: RunStatus,
    events: Vec<DriverEvent>,
}

impl<S: OptimizerService, R: ExperimentRunner> OptimizationLoopDriver<S, R> {
    pub fn new(service: S, runner: R, config: DriverConfig) -> Self {
        Self {
            service,
            runner,
            config,
            status: RunStatus::new(Uuid::nil()),
            events: Vec::new(),
        }
    }

    /// Run the whole optimization for `workflow` and return the best
    /// observation.
    ///
    /// The runner's init hook is applied first and its default hook last,
    /// whatever the outcome. `workflow.total_experiments` is set to the
    /// planned number of experiments.
    pub async fn run(&mut self, workflow: &mut Workflow) -> MboResult<Observation> {
        self.status = RunStatus::new(workflow.id);
        self.status.mark_running();
        self.events.clear();

        if let Err(e) = self.runner.apply_init_knobs(workflow).await {
            warn!(run_id = %workflow.id, error = %e, "failed to apply initial knobs");
        }

        info!(
            run_id = %workflow.id,
            acquisition = %workflow.execution_strategy.acquisition_method,
            in_design = workflow.execution_strategy.optimizer_iterations_in_design,
            iterations = workflow.execution_strategy.optimizer_iterations,
            "starting model-based optimization"
        );

        let outcome = self.execute(workflow).await;

        match &outcome {
            Ok(best) => {
                info!(
                    run_id = %workflow.id,
                    knobs = %best.knobs,
                    value = best.value,
                    experiments = self.status.experiments_run,
                    "optimization finished"
                );
                self.status.mark_completed(best.clone());
            }
            Err(e) => {
                error!(
                    run_id = %workflow.id,
                    endpoint = ?e.endpoint(),
                    error = %e.to_log_object(),
                    "optimization failed"
                );
                self.status.mark_failed(e.to_string());
                self.emit(DriverEvent::Failed {
                    error: e.to_string(),
                });
            }
        }

        if let Err(e) = self.runner.apply_default_knobs(workflow).await {
            warn!(run_id = %workflow.id, error = %e, "failed to restore default knobs");
        }

        outcome
    }

    async fn execute(&mut self, workflow: &mut Workflow) -> MboResult<Observation> {
        workflow.total_experiments = workflow.execution_strategy.planned_experiments();
        let workflow: &Workflow = workflow;

        let request = InitiateRequest::from_workflow(workflow)?;
        debug!(run_id = %workflow.id, knobs = ?request.wf.knobs, "normalized knob ranges");

        let points = self.initiate(&request).await?;
        for point in points {
            self.measure(workflow, point, Phase::InitialDesign).await?;
        }
        self.report_initial_design(workflow).await?;
        self.create_artifacts(workflow).await?;
        self.refine(workflow).await?;
        self.finalize(workflow).await?;
        self.select()
    }

    async fn initiate(&mut self, request: &InitiateRequest) -> MboResult<Vec<ProposedPoint>> {
        let response = self.service.initiate(request).await?;
        let points = protocol::initial_design_points(&response)?;

        let requested = request.wf.optimizer_iterations_in_design;
        if points.len() != requested {
            warn!(
                run_id = %request.id,
                requested,
                received = points.len(),
                "initial design size differs from the requested size"
            );
        }
        info!(run_id = %request.id, points = points.len(), "initial design proposed");

        self.emit(DriverEvent::Initiated {
            id: request.id,
            initial_points: points.len(),
        });
        Ok(points)
    }

    /// Report initial-design values in the order their points were proposed.
    async fn report_initial_design(&mut self, workflow: &Workflow) -> MboResult<()> {
        let update = InitialDesignUpdate {
            id: workflow.id,
            initial_design_values: self
                .status
                .observations_in(Phase::InitialDesign)
                .map(|o| o.value)
                .collect(),
        };

        let response = self.service.update_initial_design(&update).await?;
        protocol::expect_result_true(
            Endpoint::UpdateInitialDesign,
            &response,
            "cannot update initial design values, make sure the optimizer service is up and running",
        )?;

        self.emit(DriverEvent::InitialDesignReported {
            values: update.initial_design_values.len(),
        });
        Ok(())
    }

    async fn create_artifacts(&mut self, workflow: &Workflow) -> MboResult<()> {
        let response = self.service.create_artifacts(workflow.id).await?;
        protocol::expect_result_true(
            Endpoint::CreateArtifacts,
            &response,
            "cannot create artifacts, make sure the optimizer service is up and running",
        )?;

        info!(run_id = %workflow.id, "optimizer artifacts created");
        self.emit(DriverEvent::ArtifactsCreated);
        Ok(())
    }

    async fn refine(&mut self, workflow: &Workflow) -> MboResult<()> {
        let iterations = workflow.execution_strategy.optimizer_iterations;
        info!(run_id = %workflow.id, iterations, "starting refinement");

        for iteration in 0..iterations {
            let response = self.service.get_proposed_point(workflow.id).await?;
            let point = protocol::proposed_point(&response)?;

            let value = self
                .measure(workflow, point.clone(), Phase::Refinement)
                .await?;

            match self.update_model(workflow, point, value).await? {
                ModelUpdateOutcome::Accepted => {
                    self.emit(DriverEvent::ModelUpdated { iteration });
                }
                ModelUpdateOutcome::Rejected(reason) => {
                    warn!(
                        run_id = %workflow.id,
                        iteration,
                        error = %serde_json::json!({ "error": &reason }),
                        "model update failed, stopping refinement early"
                    );
                    self.status.halted_early = true;
                    self.emit(DriverEvent::ModelUpdateRejected { iteration, reason });
                    break;
                }
            }
        }

        Ok(())
    }

    async fn update_model(
        &mut self,
        workflow: &Workflow,
        knobs: ProposedPoint,
        value: f64,
    ) -> MboResult<ModelUpdateOutcome> {
        let update = ModelUpdate {
            id: workflow.id,
            knobs,
            value,
        };

        match self.service.update_model(&update).await {
            Ok(response) if protocol::model_update_accepted(&response) => {
                Ok(ModelUpdateOutcome::Accepted)
            }
            Ok(response) => Ok(ModelUpdateOutcome::Rejected(format!(
                "an error occurred in updating the optimizer model, please restart the optimization: {response}"
            ))),
            Err(e) if e.is_connection() => Err(e),
            Err(e) => Ok(ModelUpdateOutcome::Rejected(e.to_string())),
        }
    }

    /// Finalize the run remotely. Only a connection failure is fatal here.
    async fn finalize(&mut self, workflow: &Workflow) -> MboResult<()> {
        let outcome = match self.service.finalize(workflow.id).await {
            Ok(response) => protocol::expect_result_true(
                Endpoint::Finalize,
                &response,
                "an error occurred in finalizing the optimization",
            ),
            Err(e) if e.is_connection() => return Err(e),
            Err(e) => Err(e),
        };

        let clean = match outcome {
            Ok(()) => {
                info!(run_id = %workflow.id, "optimizer finalized the run");
                true
            }
            Err(e) => {
                warn!(
                    run_id = %workflow.id,
                    error = %e.to_log_object(),
                    "optimizer did not finalize the run cleanly"
                );
                false
            }
        };

        self.emit(DriverEvent::Finalized { clean });
        Ok(())
    }

    fn select(&mut self) -> MboResult<Observation> {
        let include_initial = self.config.include_initial_design;
        let candidates = self
            .status
            .observations
            .iter()
            .filter(|o| include_initial || o.phase == Phase::Refinement);

        let ranked: Vec<(usize, f64)> = rank_observations(candidates.clone())
            .into_iter()
            .map(|o| (o.sequence, o.value))
            .collect();
        debug!(ranking = ?ranked, "ranked observations (sequence, value)");

        let best = select_best(candidates)
            .cloned()
            .ok_or(MboError::NoObservations)?;

        self.emit(DriverEvent::BestSelected {
            knobs: best.knobs.clone(),
            value: best.value,
        });
        Ok(best)
    }

    /// Set up and run one experiment, then record its observation.
    async fn measure(
        &mut self,
        workflow: &Workflow,
        knobs: ProposedPoint,
        phase: Phase,
    ) -> MboResult<f64> {
        let experiment = ExperimentTuple::for_point(workflow, knobs);

        self.runner.setup_stage(workflow, &experiment.knobs).await?;
        let value = self.runner.run_experiment(workflow, &experiment).await?;
        // The wire format has no representation for NaN or infinities.
        if !value.is_finite() {
            return Err(ExperimentError::InvalidMeasurement {
                output: value.to_string(),
            }
            .into());
        }

        let observation = self.status.record(phase, experiment.knobs, value);
        info!(
            run_id = %workflow.id,
            phase = ?phase,
            sequence = observation.sequence,
            knobs = %observation.knobs,
            value,
            "experiment completed"
        );

        let event = DriverEvent::ExperimentCompleted {
            sequence: observation.sequence,
            phase,
            knobs: observation.knobs.clone(),
            value,
        };
        self.emit(event);
        Ok(value)
    }

    // -- accessors ----------------------------------------------------------

    /// Status of the current (or last) run.
    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    /// Drain all emitted events (consuming them).
    pub fn drain_events(&mut self) -> Vec<DriverEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn runner_mut(&mut self) -> &mut R {
        &mut self.runner
    }

    fn emit(&mut self, event: DriverEvent) {
        self.events.push(event);
    }
}
