//! Workflow definition consumed by the optimization loop.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{MboError, MboResult};

/// Identifier of an optimization run, shared with the optimizer service.
pub type WorkflowId = Uuid;

/// One raw bound of a knob range as written by the user.
///
/// Bounds may be JSON numbers or numeric strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KnobBound {
    Number(f64),
    Text(String),
}

impl KnobBound {
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl From<f64> for KnobBound {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// A knob's search interval, normalized so that `min <= max`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnobRange {
    pub name: String,
    pub min: f64,
    pub max: f64,
}

impl KnobRange {
    /// Build a range from two bounds given in any order.
    pub fn new(name: impl Into<String>, a: f64, b: f64) -> Self {
        let (min, max) = if b < a { (b, a) } else { (a, b) };
        Self {
            name: name.into(),
            min,
            max,
        }
    }

    /// Build a range from the user's raw `[a, b]` bounds.
    pub fn from_raw(name: &str, bounds: &[KnobBound]) -> MboResult<Self> {
        let [a, b] = bounds else {
            return Err(MboError::InvalidKnob {
                name: name.to_string(),
                message: format!("expected exactly two bounds, got {}", bounds.len()),
            });
        };

        let parse = |bound: &KnobBound| {
            bound
                .to_f64()
                .filter(|value| value.is_finite())
                .ok_or_else(|| MboError::InvalidKnob {
                    name: name.to_string(),
                    message: format!("bound {bound:?} is not a finite number"),
                })
        };

        Ok(Self::new(name, parse(a)?, parse(b)?))
    }
}

/// Settings of the model-based execution strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStrategy {
    /// Number of refinement iterations after the initial design.
    pub optimizer_iterations: usize,

    /// Number of points in the initial design.
    pub optimizer_iterations_in_design: usize,

    /// Acquisition criterion passed through to the optimizer (e.g. "ei", "cb").
    pub acquisition_method: String,

    /// Knob name to raw `[a, b]` range, in declaration order.
    pub knobs: IndexMap<String, Vec<KnobBound>>,

    /// Samples collected per experiment.
    pub sample_size: u64,
}

impl ExecutionStrategy {
    pub fn new(acquisition_method: &str) -> Self {
        Self {
            optimizer_iterations: 10,
            optimizer_iterations_in_design: 4,
            acquisition_method: acquisition_method.to_string(),
            knobs: IndexMap::new(),
            sample_size: 100,
        }
    }

    pub fn with_iterations(mut self, in_design: usize, refinement: usize) -> Self {
        self.optimizer_iterations_in_design = in_design;
        self.optimizer_iterations = refinement;
        self
    }

    pub fn with_sample_size(mut self, n: u64) -> Self {
        self.sample_size = n;
        self
    }

    pub fn add_knob(mut self, name: impl Into<String>, a: f64, b: f64) -> Self {
        self.knobs.insert(name.into(), vec![a.into(), b.into()]);
        self
    }

    /// Normalized knob ranges in declaration order.
    pub fn knob_ranges(&self) -> MboResult<Vec<KnobRange>> {
        self.knobs
            .iter()
            .map(|(name, bounds)| KnobRange::from_raw(name, bounds))
            .collect()
    }

    /// Experiments a complete run performs.
    pub fn planned_experiments(&self) -> usize {
        self.optimizer_iterations + self.optimizer_iterations_in_design
    }
}

/// Settings of the data provider that feeds measurements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimaryDataProvider {
    /// Leading samples to discard per experiment (warm-up).
    #[serde(default)]
    pub ignore_first_n_samples: u64,
}

/// A single optimization workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,

    #[serde(default)]
    pub name: String,

    pub execution_strategy: ExecutionStrategy,

    #[serde(default)]
    pub primary_data_provider: PrimaryDataProvider,

    /// Experiments planned for the current run; set when a run starts.
    #[serde(default)]
    pub total_experiments: usize,
}

impl Workflow {
    pub fn new(name: String, execution_strategy: ExecutionStrategy) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            execution_strategy,
            primary_data_provider: PrimaryDataProvider::default(),
            total_experiments: 0,
        }
    }

    pub fn with_id(mut self, id: WorkflowId) -> Self {
        self.id = id;
        self
    }

    pub fn with_ignore_first_n_samples(mut self, n: u64) -> Self {
        self.primary_data_provider.ignore_first_n_samples = n;
        self
    }
}
