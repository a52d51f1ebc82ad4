use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Kind label carried by verification outcomes.
pub const VERIFICATION_KIND: &str = "verification_check";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Handler ran and changed state.
    Ok,
    /// Handler ran and found the effect already in place.
    Unchanged,
    /// Dry run: listed, not executed.
    Planned,
    /// Best-effort step failed; the run continued.
    BestEffortFailed,
    /// Fatal failure; the run stopped here.
    Failed,
    /// A verification probe reported a problem.
    VerificationFailed,
}

impl StepStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, StepStatus::Ok | StepStatus::Unchanged | StepStatus::Planned)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub index: usize,
    pub kind: String,
    pub key: String,
    pub description: String,
    pub status: StepStatus,
    pub message: String,
}

impl StepOutcome {
    pub fn ok(&self) -> bool {
        self.status.is_ok()
    }
}

/// Record of one provisioning run, saved as JSON next to the system logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub outcomes: Vec<StepOutcome>,
}

impl ProvisionReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            outcomes: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    /// Only best-effort failures are tolerated.
    pub fn succeeded(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| o.ok() || o.status == StepStatus::BestEffortFailed)
    }

    pub fn verification_outcomes(&self) -> impl Iterator<Item = &StepOutcome> {
        self.outcomes.iter().filter(|o| o.kind == VERIFICATION_KIND)
    }

    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }

    pub fn save(&self, path: &Path) -> Result<PathBuf, AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(path.to_path_buf())
    }

    /// <project>/logs/system/provision-<run id>.json
    pub fn default_path(&self, project_dir: &Path) -> PathBuf {
        crate::config::system_log_dir(project_dir).join(format!("provision-{}.json", self.run_id))
    }
}
