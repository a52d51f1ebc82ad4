use crate::handlers::{self, Effect, Host};
use crate::runner::CommandRunner;
use crate::step::Step;
use tgvm_core::config::ProvisionContext;
use tgvm_core::error::ProvisionError;
use tgvm_core::report::{ProvisionReport, StepOutcome, StepStatus};

/// Which steps a run touches.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// List the plan without executing anything.
    pub dry_run: bool,
    /// Step keys or 1-based indices; empty selects every step.
    pub only: Vec<String>,
    /// 1-based index to resume from.
    pub from: Option<usize>,
}

impl RunOptions {
    pub fn selects(&self, index: usize, step: &Step) -> bool {
        if let Some(from) = self.from {
            if index + 1 < from {
                return false;
            }
        }
        self.only.is_empty()
            || self
                .only
                .iter()
                .any(|s| s == &step.key || s.parse::<usize>().ok() == Some(index + 1))
    }

    /// Selectors that match no step of `steps`.
    pub fn unknown_selectors<'s>(&'s self, steps: &[Step]) -> Vec<&'s str> {
        self.only
            .iter()
            .filter(|s| {
                !steps.iter().enumerate().any(|(i, step)| {
                    *s == &step.key || s.parse::<usize>().ok() == Some(i + 1)
                })
            })
            .map(String::as_str)
            .collect()
    }
}

/// Runs a plan front to back: a failing step halts the run unless it is
/// best-effort, and verification checks never halt it.
pub struct Provisioner<'a> {
    ctx: &'a ProvisionContext,
    runner: &'a dyn CommandRunner,
    progress: bool,
}

impl<'a> Provisioner<'a> {
    pub fn new(ctx: &'a ProvisionContext, runner: &'a dyn CommandRunner) -> Self {
        Self {
            ctx,
            runner,
            progress: false,
        }
    }

    /// Show a step header and spinner per step on the terminal.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run(&self, steps: &[Step], opts: &RunOptions) -> Result<ProvisionReport, ProvisionError> {
        let mut report = ProvisionReport::new(opts.dry_run);
        let host = Host::new(self.ctx, self.runner);
        let total = steps.len();

        tracing::info!(run_id = %report.run_id, steps = total, dry_run = opts.dry_run, "provisioning started");

        for (index, step) in steps.iter().enumerate() {
            if !opts.selects(index, step) {
                continue;
            }
            let kind = step.kind.name();
            let mut outcome = StepOutcome {
                index,
                kind: kind.to_string(),
                key: step.key.clone(),
                description: step.description.clone(),
                status: StepStatus::Planned,
                message: String::new(),
            };

            if opts.dry_run {
                outcome.message = step.kind.summary();
                report.outcomes.push(outcome);
                continue;
            }

            let header = tgvm_ui::step_header(index, total, &step.description);
            let pb = self.progress.then(|| tgvm_ui::spinner(&header));
            tracing::info!(step = index + 1, kind, key = %step.key, "step started");

            let result = handlers::apply(&host, &step.kind).await;

            match result {
                Ok(Effect::Changed(msg)) => {
                    outcome.status = StepStatus::Ok;
                    outcome.message = msg;
                }
                Ok(Effect::Unchanged(msg)) => {
                    outcome.status = StepStatus::Unchanged;
                    outcome.message = msg;
                }
                Ok(Effect::Checked { ok, message }) => {
                    outcome.status = if ok {
                        StepStatus::Ok
                    } else {
                        StepStatus::VerificationFailed
                    };
                    outcome.message = message;
                }
                Err(e) if step.best_effort => {
                    tracing::warn!(step = index + 1, key = %step.key, error = %e, "best-effort step failed, continuing");
                    outcome.status = StepStatus::BestEffortFailed;
                    outcome.message = e.to_string();
                }
                Err(e) => {
                    tracing::error!(step = index + 1, key = %step.key, error = %e, "step failed, halting");
                    if let Some(pb) = pb {
                        pb.finish_with_message(format!("{header} ... failed"));
                    }
                    outcome.status = StepStatus::Failed;
                    outcome.message = e.to_string();
                    report.outcomes.push(outcome);
                    report.finish();
                    return Err(ProvisionError {
                        step_index: index,
                        kind,
                        key: step.key.clone(),
                        cause: e,
                        report,
                    });
                }
            }

            tracing::info!(step = index + 1, key = %step.key, status = ?outcome.status, "{}", outcome.message);
            if let Some(pb) = pb {
                let label = if outcome.ok() { "done" } else { "failed" };
                pb.finish_with_message(format!("{header} ... {label}"));
            }
            report.outcomes.push(outcome);
        }

        report.finish();
        tracing::info!(
            run_id = %report.run_id,
            passed = report.passed(),
            failed = report.failed(),
            "provisioning finished"
        );
        Ok(report)
    }
}
