use super::{Effect, Host};
use crate::runner::CommandSpec;
use tgvm_core::error::StepError;

/// Install whatever apt reports as missing. Resolution is apt's business.
pub async fn install(host: &Host<'_>, packages: &[String]) -> Result<Effect, StepError> {
    if packages.is_empty() {
        return Err(StepError::InvalidParameter("empty package list".into()));
    }
    let mut wanted: Vec<&str> = packages.iter().map(String::as_str).collect();
    wanted.sort_unstable();
    wanted.dedup();

    let mut missing = Vec::new();
    for pkg in &wanted {
        let out = host
            .output(CommandSpec::new("dpkg-query").args(["-W", "-f=${Status}", pkg]))
            .await?;
        if !(out.success() && out.stdout.contains("install ok installed")) {
            missing.push(*pkg);
        }
    }

    if missing.is_empty() {
        return Ok(Effect::Unchanged(format!("{} packages present", wanted.len())));
    }

    host.run_checked(
        CommandSpec::new("apt-get")
            .args(["update", "-q"])
            .env("DEBIAN_FRONTEND", "noninteractive"),
    )
    .await?;
    host.run_checked(
        CommandSpec::new("apt-get")
            .args(["install", "-y", "-q"])
            .args(missing.iter().copied())
            .env("DEBIAN_FRONTEND", "noninteractive"),
    )
    .await?;

    Ok(Effect::Changed(format!("installed {}", missing.join(" "))))
}
