//! Proposed points, experiment inputs and collected observations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::workflow::Workflow;

/// Concrete knob values proposed by the optimizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposedPoint(BTreeMap<String, f64>);

impl ProposedPoint {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) -> Option<f64> {
        self.0.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, f64)> for ProposedPoint {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ProposedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        f.write_str("}")
    }
}

/// Input handed to the experiment runner for one measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentTuple {
    pub ignore_first_n_samples: u64,
    pub sample_size: u64,
    pub knobs: ProposedPoint,
}

impl ExperimentTuple {
    pub fn for_point(workflow: &Workflow, knobs: ProposedPoint) -> Self {
        Self {
            ignore_first_n_samples: workflow.primary_data_provider.ignore_first_n_samples,
            sample_size: workflow.execution_strategy.sample_size,
            knobs,
        }
    }
}

/// Which phase of the run produced an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    InitialDesign,
    Refinement,
}

/// A measured (point, value) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Position in the run's observation sequence (0-indexed).
    pub sequence: usize,
    pub phase: Phase,
    pub knobs: ProposedPoint,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
}

impl Observation {
    pub fn new(sequence: usize, phase: Phase, knobs: ProposedPoint, value: f64) -> Self {
        Self {
            sequence,
            phase,
            knobs,
            value,
            recorded_at: Utc::now(),
        }
    }

    /// Strictly better under lower-is-better ranking. NaN is never better,
    /// and any number beats NaN.
    pub fn improves_on(&self, other: &Observation) -> bool {
        !self.value.is_nan() && (other.value.is_nan() || self.value < other.value)
    }
}
