//! Test doubles for the optimizer service and experiment runner.

use async_trait::async_trait;
use mb_types::{
    protocol_error, Endpoint, ExperimentError, ExperimentTuple, MboError, MboResult,
    ProposedPoint, Workflow,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::client::OptimizerService;
use crate::experiment::ExperimentRunner;

#[derive(Debug, Clone)]
enum Reply {
    Json(Value),
    Refuse,
    Malformed,
}

/// In-memory optimizer replaying scripted responses per endpoint.
///
/// Replies for an endpoint are consumed in order; the last one repeats.
#[derive(Debug, Default)]
pub(crate) struct ScriptedOptimizer {
    replies: Mutex<HashMap<Endpoint, VecDeque<Reply>>>,
    calls: Mutex<Vec<(Endpoint, Value)>>,
}

impl ScriptedOptimizer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A well-behaved optimizer over a single knob `x`.
    pub(crate) fn happy_path(design: &[f64], proposals: &[f64]) -> Self {
        let design: Vec<Value> = design.iter().map(|x| json!({ "x": x })).collect();
        let mut optimizer = Self::new()
            .reply(Endpoint::Initiate, json!([true, design]))
            .reply(Endpoint::UpdateInitialDesign, json!({"result": true}))
            .reply(Endpoint::CreateArtifacts, json!({"result": true}))
            .reply(Endpoint::UpdateModel, json!({"result": true}))
            .reply(Endpoint::Finalize, json!({"result": true}));
        for x in proposals {
            optimizer = optimizer.reply(Endpoint::GetProposedPoint, json!([{ "x": x }]));
        }
        optimizer
    }

    fn push(self, endpoint: Endpoint, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(endpoint)
            .or_default()
            .push_back(reply);
        self
    }

    pub(crate) fn reply(self, endpoint: Endpoint, body: Value) -> Self {
        self.push(endpoint, Reply::Json(body))
    }

    /// Replace every scripted reply of `endpoint` with `body`.
    pub(crate) fn override_reply(self, endpoint: Endpoint, body: Value) -> Self {
        self.replies.lock().unwrap().remove(&endpoint);
        self.reply(endpoint, body)
    }

    pub(crate) fn refuse(self, endpoint: Endpoint) -> Self {
        self.replies.lock().unwrap().remove(&endpoint);
        self.push(endpoint, Reply::Refuse)
    }

    pub(crate) fn malformed(self, endpoint: Endpoint) -> Self {
        self.replies.lock().unwrap().remove(&endpoint);
        self.push(endpoint, Reply::Malformed)
    }

    pub(crate) fn calls(&self) -> Vec<(Endpoint, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn endpoints_called(&self) -> Vec<Endpoint> {
        self.calls().into_iter().map(|(endpoint, _)| endpoint).collect()
    }

    pub(crate) fn count(&self, endpoint: Endpoint) -> usize {
        self.endpoints_called()
            .into_iter()
            .filter(|e| *e == endpoint)
            .count()
    }

    pub(crate) fn bodies(&self, endpoint: Endpoint) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|(e, _)| *e == endpoint)
            .map(|(_, body)| body)
            .collect()
    }
}

#[async_trait]
impl OptimizerService for ScriptedOptimizer {
    async fn post(&self, endpoint: Endpoint, body: &Value) -> MboResult<Value> {
        self.calls.lock().unwrap().push((endpoint, body.clone()));

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(&endpoint) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Json(value)) => Ok(value),
            Some(Reply::Refuse) => Err(MboError::Connection {
                endpoint,
                message: "connection refused".to_string(),
            }),
            Some(Reply::Malformed) => Err(protocol_error!(endpoint, "response is not valid JSON")),
            None => Err(protocol_error!(endpoint, "no scripted reply")),
        }
    }
}

/// Experiment runner that records every call and measures with a plain
/// function of the knobs.
pub(crate) struct RecordingExperiment {
    measure: fn(&ProposedPoint) -> f64,
    fail_at: Option<usize>,
    pub(crate) experiments: Vec<ExperimentTuple>,
    pub(crate) setups: Vec<ProposedPoint>,
    pub(crate) init_calls: usize,
    pub(crate) default_calls: usize,
}

impl RecordingExperiment {
    pub(crate) fn new(measure: fn(&ProposedPoint) -> f64) -> Self {
        Self {
            measure,
            fail_at: None,
            experiments: Vec::new(),
            setups: Vec::new(),
            init_calls: 0,
            default_calls: 0,
        }
    }

    /// Measures each point as the value of its `x` knob.
    pub(crate) fn identity() -> Self {
        Self::new(|p| p.get("x").unwrap_or(f64::NAN))
    }

    /// Fail the `n`-th experiment (0-indexed).
    pub(crate) fn failing_at(mut self, n: usize) -> Self {
        self.fail_at = Some(n);
        self
    }

    pub(crate) fn measured_xs(&self) -> Vec<f64> {
        self.experiments
            .iter()
            .filter_map(|e| e.knobs.get("x"))
            .collect()
    }
}

#[async_trait]
impl ExperimentRunner for RecordingExperiment {
    async fn setup_stage(
        &mut self,
        _workflow: &Workflow,
        knobs: &ProposedPoint,
    ) -> Result<(), ExperimentError> {
        self.setups.push(knobs.clone());
        Ok(())
    }

    async fn run_experiment(
        &mut self,
        _workflow: &Workflow,
        experiment: &ExperimentTuple,
    ) -> Result<f64, ExperimentError> {
        let index = self.experiments.len();
        self.experiments.push(experiment.clone());
        if self.fail_at == Some(index) {
            return Err(ExperimentError::ExecutionFailed {
                message: format!("experiment {index} crashed"),
            });
        }
        Ok((self.measure)(&experiment.knobs))
    }

    async fn apply_init_knobs(&mut self, _workflow: &Workflow) -> Result<(), ExperimentError> {
        self.init_calls += 1;
        Ok(())
    }

    async fn apply_default_knobs(&mut self, _workflow: &Workflow) -> Result<(), ExperimentError> {
        self.default_calls += 1;
        Ok(())
    }
}
