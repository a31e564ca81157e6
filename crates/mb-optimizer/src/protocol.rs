//! Request bodies and response interpretation for the optimizer service.
//!
//! The service answers with loosely shaped JSON, so responses are kept as
//! [`serde_json::Value`] and checked here against what each endpoint promises.

use mb_types::{
    protocol_error, Endpoint, KnobRange, MboError, MboResult, ProposedPoint, Workflow, WorkflowId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `/mlrMBO/initiate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitiateRequest {
    pub id: WorkflowId,
    pub wf: InitiateSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitiateSettings {
    pub acquisition_method: String,
    pub optimizer_iterations: usize,
    pub optimizer_iterations_in_design: usize,
    pub knobs: Vec<KnobRange>,
}

impl InitiateRequest {
    /// Build the request from a workflow, normalizing its knob ranges.
    pub fn from_workflow(workflow: &Workflow) -> MboResult<Self> {
        let strategy = &workflow.execution_strategy;
        Ok(Self {
            id: workflow.id,
            wf: InitiateSettings {
                acquisition_method: strategy.acquisition_method.clone(),
                optimizer_iterations: strategy.optimizer_iterations,
                optimizer_iterations_in_design: strategy.optimizer_iterations_in_design,
                knobs: strategy.knob_ranges()?,
            },
        })
    }
}

/// Body of `/mlrMBO/initialDesign/update`. Values are positional: the i-th
/// value belongs to the i-th proposed initial point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialDesignUpdate {
    pub id: WorkflowId,
    pub initial_design_values: Vec<f64>,
}

/// Body of endpoints that only carry the run id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub id: WorkflowId,
}

/// Body of `/mlrMBO/model/update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelUpdate {
    pub id: WorkflowId,
    pub knobs: ProposedPoint,
    pub value: f64,
}

/// JSON truthiness: `null`, `false`, `0`, `""`, `[]` and `{}` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a `{name: number}` object into a point.
pub(crate) fn parse_point(endpoint: Endpoint, value: &Value) -> MboResult<ProposedPoint> {
    let object = value
        .as_object()
        .ok_or_else(|| protocol_error!(endpoint, "proposed point is not an object: {value}"))?;

    object
        .iter()
        .map(|(name, v)| {
            v.as_f64()
                .map(|x| (name.clone(), x))
                .ok_or_else(|| protocol_error!(endpoint, "knob '{name}' has non-numeric value {v}"))
        })
        .collect()
}

/// Points of the initial design from an initiate response
/// `[validity_flag_or_id, [point, ...]]`.
pub(crate) fn initial_design_points(response: &Value) -> MboResult<Vec<ProposedPoint>> {
    let endpoint = Endpoint::Initiate;
    let unavailable = || {
        protocol_error!(
            endpoint,
            "cannot fetch initial design proposal, make sure the optimizer service is up and running"
        )
    };

    let items = response.as_array().ok_or_else(unavailable)?;
    let (flag, points) = match items.as_slice() {
        [flag, points, ..] => (flag, points),
        _ => return Err(unavailable()),
    };
    if !is_truthy(flag) || !is_truthy(points) {
        return Err(unavailable());
    }

    points
        .as_array()
        .ok_or_else(|| protocol_error!(endpoint, "initial design is not a list: {points}"))?
        .iter()
        .map(|p| parse_point(endpoint, p))
        .collect()
}

/// Require `{"result": true}`. A present but different `result` is a
/// rejection carrying that value as its message; an absent one is a protocol
/// failure described by `missing`.
pub(crate) fn expect_result_true(endpoint: Endpoint, response: &Value, missing: &str) -> MboResult<()> {
    match response.get("result") {
        Some(Value::Bool(true)) => Ok(()),
        Some(other) => Err(MboError::Rejected {
            endpoint,
            message: describe(other),
        }),
        None => Err(protocol_error!(endpoint, "{missing}")),
    }
}

/// The point from a `[point]` response.
pub(crate) fn proposed_point(response: &Value) -> MboResult<ProposedPoint> {
    let endpoint = Endpoint::GetProposedPoint;

    if is_truthy(response) {
        if let Some(first) = response.as_array().and_then(|items| items.first()) {
            if !is_truthy(first) {
                return Err(protocol_error!(
                    endpoint,
                    "proposed point has no knobs: {response}"
                ));
            }
            return parse_point(endpoint, first);
        }
    }

    match response.get("result") {
        Some(result) => Err(MboError::Rejected {
            endpoint,
            message: describe(result),
        }),
        None => Err(protocol_error!(
            endpoint,
            "unexpected error occurred while getting proposed points: {response}"
        )),
    }
}

/// A model update counts as accepted when the response carries a `result`
/// key, whatever its value.
pub(crate) fn model_update_accepted(response: &Value) -> bool {
    response.get("result").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mb_types::ExecutionStrategy;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn truthiness_matches_json_conventions() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
            assert!(!is_truthy(&falsy), "{falsy} should be falsy");
        }
        for truthy in [json!(true), json!(1), json!("52d32e11"), json!([false]), json!({"a": 0})] {
            assert!(is_truthy(&truthy), "{truthy} should be truthy");
        }
    }

    #[test]
    fn initiate_request_wire_shape() {
        let id = Uuid::new_v4();
        let strategy = ExecutionStrategy::new("cb")
            .with_iterations(3, 7)
            .add_knob("x", 1.0, 0.0);
        let wf = Workflow::new("wire".into(), strategy).with_id(id);

        let body = serde_json::to_value(InitiateRequest::from_workflow(&wf).unwrap()).unwrap();
        assert_eq!(
            body,
            json!({
                "id": id.to_string(),
                "wf": {
                    "acquisition_method": "cb",
                    "optimizer_iterations": 7,
                    "optimizer_iterations_in_design": 3,
                    "knobs": [{"name": "x", "min": 0.0, "max": 1.0}]
                }
            })
        );
    }

    #[test]
    fn initial_design_points_accepts_well_formed_response() {
        let response = json!([
            ["52d32e11-d409-4d19-a55a-8e3889a0ade4"],
            [
                {"route_random_sigma": 0.0052, "exploration_percentage": 1.1535},
                {"route_random_sigma": 0.183, "exploration_percentage": 1.532}
            ]
        ]);

        let points = initial_design_points(&response).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].get("route_random_sigma"), Some(0.183));
    }

    #[test]
    fn initial_design_points_rejects_falsy_parts() {
        for response in [
            json!([false, [{"x": 0.5}]]),
            json!([true, []]),
            json!([true]),
            json!({"result": "R error"}),
            json!(null),
        ] {
            assert!(
                matches!(initial_design_points(&response), Err(MboError::Protocol { .. })),
                "{response} should be rejected"
            );
        }
    }

    #[test]
    fn initial_design_points_rejects_non_numeric_knob() {
        let response = json!([true, [{"x": "high"}]]);
        assert!(matches!(
            initial_design_points(&response),
            Err(MboError::Protocol { .. })
        ));
    }

    #[test]
    fn expect_result_true_distinguishes_failures() {
        let endpoint = Endpoint::CreateArtifacts;
        assert!(expect_result_true(endpoint, &json!({"result": true}), "missing").is_ok());

        match expect_result_true(endpoint, &json!({"result": "model not found"}), "missing") {
            Err(MboError::Rejected { message, .. }) => assert_eq!(message, "model not found"),
            other => panic!("expected rejection, got {other:?}"),
        }

        assert!(matches!(
            expect_result_true(endpoint, &json!({"result": 1}), "missing"),
            Err(MboError::Rejected { .. })
        ));

        match expect_result_true(endpoint, &json!({"status": "ok"}), "cannot create artifacts") {
            Err(MboError::Protocol { message, .. }) => assert_eq!(message, "cannot create artifacts"),
            other => panic!("expected protocol failure, got {other:?}"),
        }
    }

    #[test]
    fn proposed_point_takes_first_element() {
        let point = proposed_point(&json!([{"x": 0.2}, {"x": 0.9}])).unwrap();
        assert_eq!(point, ProposedPoint::new().with("x", 0.2));
    }

    #[test]
    fn proposed_point_failures() {
        assert!(matches!(proposed_point(&json!([])), Err(MboError::Protocol { .. })));
        assert!(matches!(proposed_point(&json!([{}])), Err(MboError::Protocol { .. })));
        assert!(matches!(proposed_point(&json!(null)), Err(MboError::Protocol { .. })));
        assert!(matches!(
            proposed_point(&json!({"result": "no model for id"})),
            Err(MboError::Rejected { .. })
        ));
    }

    #[test]
    fn model_update_only_needs_result_key() {
        assert!(model_update_accepted(&json!({"result": true})));
        assert!(model_update_accepted(&json!({"result": "updated"})));
        assert!(!model_update_accepted(&json!({"error": "stale"})));
        assert!(!model_update_accepted(&json!(["result"])));
    }
}
