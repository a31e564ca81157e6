//! Run status tracking and driver events.

use chrono::{DateTime, Utc};
use mb_types::{Observation, Phase, ProposedPoint, WorkflowId};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Aggregate status of one optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub id: WorkflowId,
    pub state: RunState,
    pub experiments_run: usize,
    /// Every measurement taken, in the order it was taken.
    pub observations: Vec<Observation>,
    pub best: Option<Observation>,
    /// Refinement stopped before its planned iteration count.
    pub halted_early: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl RunStatus {
    pub fn new(id: WorkflowId) -> Self {
        Self {
            id,
            state: RunState::Pending,
            experiments_run: 0,
            observations: Vec::new(),
            best: None,
            halted_early: false,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = RunState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, best: Observation) {
        self.state = RunState::Completed;
        self.finished_at = Some(Utc::now());
        self.best = Some(best);
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = RunState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Append a measurement and return a reference to the stored observation.
    pub(crate) fn record(&mut self, phase: Phase, knobs: ProposedPoint, value: f64) -> &Observation {
        let sequence = self.observations.len();
        self.observations
            .push(Observation::new(sequence, phase, knobs, value));
        self.experiments_run += 1;
        &self.observations[sequence]
    }

    pub fn observations_in(&self, phase: Phase) -> impl Iterator<Item = &Observation> {
        self.observations.iter().filter(move |o| o.phase == phase)
    }
}

/// Events emitted by the driver for external consumption (logging, UI).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DriverEvent {
    Initiated {
        id: WorkflowId,
        initial_points: usize,
    },
    ExperimentCompleted {
        sequence: usize,
        phase: Phase,
        knobs: ProposedPoint,
        value: f64,
    },
    InitialDesignReported {
        values: usize,
    },
    ArtifactsCreated,
    ModelUpdated {
        iteration: usize,
    },
    ModelUpdateRejected {
        iteration: usize,
        reason: String,
    },
    Finalized {
        clean: bool,
    },
    BestSelected {
        knobs: ProposedPoint,
        value: f64,
    },
    Failed {
        error: String,
    },
}
