//! Validation step loading and execution.
//!
//! Labs and questions each carry a JSON file mapping step keys to shell
//! commands. Files are re-read on every request so content edits take
//! effect immediately. Question steps get the session namespace substituted
//! into `${NAMESPACE}` placeholders before running; the value is trusted
//! operator input and is spliced in verbatim, without quoting.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::command::{CommandError, CommandOutput, CommandRunner, RunOptions};

/// Output reported when a step's command finishes silently.
const EMPTY_OUTPUT_FALLBACK: &str = "Command executed successfully";

/// Where a validation step comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationSource {
    Lab(String),
    Question(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Lab '{0}' not found")]
    LabNotFound(String),
    #[error("Question '{0}' validation not found")]
    QuestionNotFound(String),
    #[error("Step {step} not found for lab '{lab}'")]
    LabStepNotFound { lab: String, step: String },
    #[error("Step {step} not found for question '{question_id}'")]
    QuestionStepNotFound { question_id: String, step: String },
    #[error("Invalid validation file format")]
    InvalidFormat(#[source] serde_json::Error),
    #[error("Error executing command: {0}")]
    Exec(#[source] std::io::Error),
    #[error(transparent)]
    Io(std::io::Error),
}

/// Outcome of one validation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub passed: bool,
    pub output: String,
}

pub struct ValidationEngine {
    labs_dir: PathBuf,
    questions_dir: PathBuf,
    runner: Arc<CommandRunner>,
    timeout: Duration,
}

impl ValidationEngine {
    pub fn new(
        labs_dir: impl Into<PathBuf>,
        questions_dir: impl Into<PathBuf>,
        runner: Arc<CommandRunner>,
        timeout: Duration,
    ) -> Self {
        Self {
            labs_dir: labs_dir.into(),
            questions_dir: questions_dir.into(),
            runner,
            timeout,
        }
    }

    /// Load the step, prepare its command, run it, and map the result.
    ///
    /// A timed-out command is an ordinary failed outcome, not an error;
    /// only unreadable files, missing steps, and spawn failures surface as
    /// [`ValidationError`].
    pub async fn validate(
        &self,
        source: &ValidationSource,
        step: &str,
        namespace: Option<&str>,
    ) -> Result<ValidationOutcome, ValidationError> {
        let command = self.load_step_command(source, step).await?;
        let command = match source {
            ValidationSource::Question(_) => substitute_namespace(&command, namespace),
            ValidationSource::Lab(_) => command,
        };

        debug!(step, command = %command, "running validation step");
        match self
            .runner
            .run(&command, &RunOptions::with_timeout(self.timeout))
            .await
        {
            Ok(output) => Ok(outcome_from_output(&output)),
            Err(err @ CommandError::TimedOut(_)) => Ok(ValidationOutcome {
                passed: false,
                output: err.to_string(),
            }),
            Err(CommandError::Io(err)) => Err(ValidationError::Exec(err)),
        }
    }

    async fn load_step_command(
        &self,
        source: &ValidationSource,
        step: &str,
    ) -> Result<String, ValidationError> {
        let (path, missing) = match source {
            ValidationSource::Lab(lab) => (
                safe_join(&self.labs_dir, lab).map(|dir| dir.join("validate.json")),
                ValidationError::LabNotFound(lab.clone()),
            ),
            ValidationSource::Question(id) => (
                safe_join(&self.questions_dir, id).map(|dir| dir.join("validation.json")),
                ValidationError::QuestionNotFound(id.clone()),
            ),
        };
        let Some(path) = path else {
            return Err(missing);
        };

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Err(missing),
            Err(err) => return Err(ValidationError::Io(err)),
        };

        let mut steps: HashMap<String, String> =
            serde_json::from_str(&raw).map_err(ValidationError::InvalidFormat)?;
        // An empty command counts as unregistered, same as an absent key.
        match steps.remove(step) {
            Some(command) if !command.is_empty() => Ok(command),
            _ => Err(match source {
                ValidationSource::Lab(lab) => ValidationError::LabStepNotFound {
                    lab: lab.clone(),
                    step: step.to_string(),
                },
                ValidationSource::Question(id) => ValidationError::QuestionStepNotFound {
                    question_id: id.clone(),
                    step: step.to_string(),
                },
            }),
        }
    }
}

/// Join a client-supplied name onto a content root, refusing anything that
/// could step outside it. Rejected names read as missing content.
fn safe_join(root: &std::path::Path, name: &str) -> Option<PathBuf> {
    let valid = !name.is_empty()
        && name != "."
        && !name.contains("..")
        && !name.contains(['/', '\\']);
    valid.then(|| root.join(name))
}

/// Replace every literal `${NAMESPACE}` with the namespace, when one is
/// known and non-empty.
fn substitute_namespace(command: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => command.replace("${NAMESPACE}", ns),
        _ => command.to_string(),
    }
}

fn outcome_from_output(output: &CommandOutput) -> ValidationOutcome {
    let passed = output.success();
    let chosen = if passed {
        output.stdout.trim()
    } else {
        output.stderr.trim()
    };
    let text = if chosen.is_empty() {
        EMPTY_OUTPUT_FALLBACK.to_string()
    } else {
        chosen.to_string()
    };
    ValidationOutcome {
        passed,
        output: text,
    }
}
