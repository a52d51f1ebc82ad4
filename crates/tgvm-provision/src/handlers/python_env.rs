use super::{Effect, Host};
use crate::runner::CommandSpec;
use std::path::Path;
use tgvm_core::error::StepError;

/// Create the venv when absent, then hand the requirement list to pip.
pub async fn ensure(host: &Host<'_>, venv: &Path, packages: &[String]) -> Result<Effect, StepError> {
    let python = venv.join("bin").join("python");
    let created = if python.exists() {
        false
    } else {
        host.run_checked(
            CommandSpec::new("python3")
                .args(["-m", "venv"])
                .arg(venv.display().to_string()),
        )
        .await?;
        true
    };

    if !packages.is_empty() {
        let pip = venv.join("bin").join("pip");
        host.run_checked(
            CommandSpec::new(pip.display().to_string())
                .args(["install", "-q", "--disable-pip-version-check"])
                .args(packages.iter().cloned()),
        )
        .await?;
    }

    if !host.ctx.user.is_empty() {
        host.chown(&host.ctx.user, venv).await?;
    }

    if created {
        Ok(Effect::Changed(format!(
            "created {} with {} packages",
            venv.display(),
            packages.len()
        )))
    } else {
        Ok(Effect::Unchanged(format!(
            "{} present, requirements satisfied",
            venv.display()
        )))
    }
}
