use std::time::Duration;
use thiserror::Error;

use crate::report::ProvisionReport;

/// Errors resolving paths and persisting run records.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A template referenced placeholders that the variable mapping lacks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("template '{template}' references undefined variable(s): {}", missing.join(", "))]
pub struct TemplateError {
    pub template: String,
    pub missing: Vec<String>,
}

/// Failure of a single step handler.
///
/// The executor never inspects the variant to decide whether to halt; that is
/// decided by the step's `best_effort` flag alone.
#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("`{program}` exited with status {status}: {stderr}")]
    Command {
        program: String,
        status: i32,
        stderr: String,
    },

    #[error("`{program}` did not finish within {}s", timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("proxy configuration rejected, previous site kept: {0}")]
    ProxyValidation(String),

    #[error("nothing to remove: {0}")]
    Absent(String),

    #[error("invalid step parameter: {0}")]
    InvalidParameter(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StepError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        StepError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

/// A non-best-effort step failed; the run stopped at `step_index`.
#[derive(Error, Debug)]
#[error("step {} ({kind} `{key}`) failed: {cause}", step_index + 1)]
pub struct ProvisionError {
    pub step_index: usize,
    pub kind: &'static str,
    pub key: String,
    #[source]
    pub cause: StepError,
    /// Report of every step attempted up to and including the failure.
    pub report: ProvisionReport,
}
