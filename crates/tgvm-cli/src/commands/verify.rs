use anyhow::Result;
use tgvm_core::config::ProvisionContext;
use tgvm_provision::{verification_steps, Provisioner, RunOptions, SystemRunner};

/// Run the verification checks alone. Exit code 1 when any check fails.
pub async fn run(ctx: &ProvisionContext) -> Result<u8> {
    let steps = verification_steps(ctx);
    let report = Provisioner::new(ctx, &SystemRunner)
        .with_progress(true)
        .run(&steps, &RunOptions::default())
        .await?;
    tgvm_ui::print_report(&report);
    Ok(report.exit_code() as u8)
}
