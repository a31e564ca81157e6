//! Experiments executed as external shell commands.

use async_trait::async_trait;
use mb_optimizer::ExperimentRunner;
use mb_types::{ExperimentError, ExperimentTuple, ProposedPoint, Workflow};
use tokio::process::Command;
use tracing::{debug, info};

/// Runs each experiment as `sh -c <command>`.
///
/// Knob values are exported as `MBO_KNOB_<NAME>` environment variables, along
/// with `MBO_SAMPLE_SIZE`, `MBO_IGNORE_FIRST_N_SAMPLES` and `MBO_WORKFLOW_ID`.
/// The last non-empty line the command prints on stdout is the measurement.
#[derive(Debug, Clone)]
pub struct CommandExperiment {
    command: String,
    shell: String,
}

impl CommandExperiment {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            shell: "sh".to_string(),
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Environment variable name for a knob, e.g. `route-sigma` ->
    /// `MBO_KNOB_ROUTE_SIGMA`.
    pub fn knob_env_var(name: &str) -> String {
        let suffix: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("MBO_KNOB_{suffix}")
    }

    /// Parse the measurement out of the command's stdout.
    pub fn parse_measurement(stdout: &str) -> Result<f64, ExperimentError> {
        let line = stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .unwrap_or_default();

        line.parse::<f64>()
            .map_err(|_| ExperimentError::InvalidMeasurement {
                output: line.to_string(),
            })
    }

    fn build(&self, workflow: &Workflow, experiment: &ExperimentTuple) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(&self.command)
            .env("MBO_WORKFLOW_ID", workflow.id.to_string())
            .env("MBO_SAMPLE_SIZE", experiment.sample_size.to_string())
            .env(
                "MBO_IGNORE_FIRST_N_SAMPLES",
                experiment.ignore_first_n_samples.to_string(),
            );
        for (name, value) in experiment.knobs.iter() {
            cmd.env(Self::knob_env_var(name), value.to_string());
        }
        cmd
    }
}

#[async_trait]
impl ExperimentRunner for CommandExperiment {
    async fn setup_stage(
        &mut self,
        workflow: &Workflow,
        knobs: &ProposedPoint,
    ) -> Result<(), ExperimentError> {
        // Knobs travel with the command's environment; nothing to stage.
        debug!(run_id = %workflow.id, knobs = %knobs, "staging knobs");
        Ok(())
    }

    async fn run_experiment(
        &mut self,
        workflow: &Workflow,
        experiment: &ExperimentTuple,
    ) -> Result<f64, ExperimentError> {
        let output = self
            .build(workflow, experiment)
            .output()
            .await
            .map_err(|e| ExperimentError::ExecutionFailed {
                message: format!("failed to spawn `{}`: {e}", self.command),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExperimentError::ExecutionFailed {
                message: format!("`{}` exited with {}: {}", self.command, output.status, stderr.trim()),
            });
        }

        let value = Self::parse_measurement(&String::from_utf8_lossy(&output.stdout))?;
        debug!(run_id = %workflow.id, value, "command measured");
        Ok(value)
    }

    async fn apply_init_knobs(&mut self, workflow: &Workflow) -> Result<(), ExperimentError> {
        info!(run_id = %workflow.id, command = %self.command, "experiments run as shell commands");
        Ok(())
    }
}
