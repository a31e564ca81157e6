use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Remote endpoints exposed by the optimizer service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    Initiate,
    UpdateInitialDesign,
    CreateArtifacts,
    GetProposedPoint,
    UpdateModel,
    Finalize,
}

impl Endpoint {
    /// URL path of the endpoint, relative to the service base URL.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Initiate => "/mlrMBO/initiate",
            Self::UpdateInitialDesign => "/mlrMBO/initialDesign/update",
            Self::CreateArtifacts => "/mlrMBO/createArtifacts",
            Self::GetProposedPoint => "/mlrMBO/model/getProposedPoint",
            Self::UpdateModel => "/mlrMBO/model/update",
            Self::Finalize => "/mlrMBO/finalize",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Main error type for an optimization run
#[derive(Error, Debug)]
pub enum MboError {
    /// Transport-level failure talking to the optimizer. The display text is
    /// fixed; the underlying cause is kept in `message`.
    #[error("Connection with optimizer service failed")]
    Connection { endpoint: Endpoint, message: String },

    #[error("Unexpected response from {endpoint}: {message}")]
    Protocol { endpoint: Endpoint, message: String },

    #[error("Optimizer rejected {endpoint}: {message}")]
    Rejected { endpoint: Endpoint, message: String },

    #[error("Invalid knob '{name}': {message}")]
    InvalidKnob { name: String, message: String },

    #[error("Experiment error: {0}")]
    Experiment(#[from] ExperimentError),

    #[error("No observations were collected, nothing to select")]
    NoObservations,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MboError {
    /// Whether this error came from the transport rather than the payload.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Endpoint involved in the failure, if any.
    pub fn endpoint(&self) -> Option<Endpoint> {
        match self {
            Self::Connection { endpoint, .. }
            | Self::Protocol { endpoint, .. }
            | Self::Rejected { endpoint, .. } => Some(*endpoint),
            _ => None,
        }
    }

    /// The `{"error": message}` object every failure is logged as.
    ///
    /// Rejections carry the optimizer's own message verbatim.
    pub fn to_log_object(&self) -> serde_json::Value {
        let message = match self {
            Self::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        };
        serde_json::json!({ "error": message })
    }
}

/// Errors raised by experiment collaborators
#[derive(Error, Debug)]
pub enum ExperimentError {
    #[error("Stage setup failed: {message}")]
    SetupFailed { message: String },

    #[error("Experiment execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("Experiment produced an unusable measurement: {output:?}")]
    InvalidMeasurement { output: String },

    #[error("Knob hook failed: {message}")]
    HookFailed { message: String },
}

/// Result type alias for optimization runs
pub type MboResult<T> = Result<T, MboError>;

/// Macro for creating protocol errors
#[macro_export]
macro_rules! protocol_error {
    ($endpoint:expr, $($arg:tt)*) => {
        $crate::MboError::Protocol {
            endpoint: $endpoint,
            message: format!($($arg)*),
        }
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::MboError::Config(format!($($arg)*))
    };
}
