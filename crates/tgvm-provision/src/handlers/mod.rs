//! One handler per step kind. Handlers own every side effect of a run.

pub mod cron;
pub mod directories;
pub mod files;
pub mod firewall;
pub mod packages;
pub mod proxy;
pub mod python_env;
pub mod units;
pub mod verify;

use crate::runner::{self, CommandOutput, CommandRunner, CommandSpec};
use crate::step::StepKind;
use tgvm_core::config::ProvisionContext;
use tgvm_core::error::StepError;

/// What a handler did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Changed(String),
    Unchanged(String),
    /// Verification result; never a mutation.
    Checked { ok: bool, message: String },
}

/// Context and command runner handed to every handler.
pub struct Host<'a> {
    pub ctx: &'a ProvisionContext,
    pub runner: &'a dyn CommandRunner,
}

impl<'a> Host<'a> {
    pub fn new(ctx: &'a ProvisionContext, runner: &'a dyn CommandRunner) -> Self {
        Self { ctx, runner }
    }

    pub async fn output(&self, cmd: CommandSpec) -> Result<CommandOutput, StepError> {
        tracing::debug!(command = %cmd.display(), "exec");
        self.runner.output(&cmd, self.ctx.command_timeout).await
    }

    pub async fn run_checked(&self, cmd: CommandSpec) -> Result<String, StepError> {
        tracing::debug!(command = %cmd.display(), "exec");
        runner::run_checked(self.runner, &cmd, self.ctx.command_timeout).await
    }

    /// `chown -R owner:owner path`
    pub async fn chown(&self, owner: &str, path: &std::path::Path) -> Result<(), StepError> {
        self.run_checked(
            CommandSpec::new("chown")
                .arg("-R")
                .arg(format!("{owner}:{owner}"))
                .arg(path.display().to_string()),
        )
        .await?;
        Ok(())
    }
}

pub async fn apply(host: &Host<'_>, kind: &StepKind) -> Result<Effect, StepError> {
    match kind {
        StepKind::PackageInstall { packages } => packages::install(host, packages).await,
        StepKind::DirectoryEnsure { paths, mode, owner } => {
            directories::ensure(host, paths, *mode, owner.as_deref()).await
        }
        StepKind::PythonEnvEnsure { venv, packages } => {
            python_env::ensure(host, venv, packages).await
        }
        StepKind::FileRender(spec) => files::render(host, spec).await,
        StepKind::ServiceUnitInstall(unit) => units::install(host, unit).await,
        StepKind::ReverseProxyConfigure(site) => proxy::configure(host, site).await,
        StepKind::FirewallRule { rules } => firewall::ensure(host, rules).await,
        StepKind::ScheduledJobInstall(job) => cron::install(host, job).await,
        StepKind::VerificationCheck(probe) => Ok(verify::check(host, probe).await),
    }
}
