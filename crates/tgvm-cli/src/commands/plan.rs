use anyhow::Result;
use tgvm_core::config::ProvisionContext;
use tgvm_provision::{default_plan, Provisioner, RunOptions, SystemRunner};

/// Print the ordered plan; nothing is executed.
pub async fn run(ctx: &ProvisionContext) -> Result<()> {
    let plan = default_plan(ctx);
    let opts = RunOptions {
        dry_run: true,
        ..Default::default()
    };
    let report = Provisioner::new(ctx, &SystemRunner)
        .run(&plan, &opts)
        .await?;
    println!("Provisioning plan for {}:\n", ctx.project_dir.display());
    tgvm_ui::print_plan(&report);
    Ok(())
}
