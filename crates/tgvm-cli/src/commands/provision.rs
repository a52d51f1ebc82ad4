use anyhow::{bail, Result};
use console::style;
use std::path::PathBuf;
use tgvm_core::config::ProvisionContext;
use tgvm_provision::{default_plan, Provisioner, RunOptions, SystemRunner};

pub struct ProvisionParams {
    pub ctx: ProvisionContext,
    pub dry_run: bool,
    pub steps: Vec<String>,
    pub from: Option<usize>,
    pub yes: bool,
    pub report_path: Option<PathBuf>,
}

#[cfg(unix)]
fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
fn is_root() -> bool {
    false
}

/// Run the default plan. Returns the process exit code: 0 when every step
/// and check passed, 1 otherwise.
pub async fn run(params: ProvisionParams) -> Result<u8> {
    let ctx = &params.ctx;
    let plan = default_plan(ctx);
    let opts = RunOptions {
        dry_run: params.dry_run,
        only: params.steps,
        from: params.from,
    };

    let unknown = opts.unknown_selectors(&plan);
    if !unknown.is_empty() {
        bail!(
            "unknown step(s): {} (see `tgvm plan`)",
            unknown.join(", ")
        );
    }
    if let Some(from) = opts.from {
        if from == 0 || from > plan.len() {
            bail!("--from must be between 1 and {}", plan.len());
        }
    }

    println!(
        "\n{} {} for user {} ({})",
        style("tgvm").cyan().bold(),
        if opts.dry_run { "dry run" } else { "provisioning" },
        ctx.user,
        ctx.project_dir.display()
    );

    if opts.dry_run {
        let report = Provisioner::new(ctx, &SystemRunner).run(&plan, &opts).await?;
        tgvm_ui::print_plan(&report);
        return Ok(0);
    }

    if !is_root() {
        println!(
            "  {} not running as root; package, service and firewall steps will likely fail",
            style("Warning:").yellow()
        );
    }
    if !params.yes && !tgvm_ui::confirm("Apply the plan to this host?")? {
        println!("Aborted.");
        return Ok(0);
    }

    let (report, failure) = match Provisioner::new(ctx, &SystemRunner)
        .with_progress(true)
        .run(&plan, &opts)
        .await
    {
        Ok(report) => (report, None),
        Err(e) => {
            let msg = e.to_string();
            (e.report, Some(msg))
        }
    };

    tgvm_ui::print_report(&report);
    if let Some(msg) = &failure {
        eprintln!("\n{} {msg}", style("Error:").red().bold());
    }

    let path = params
        .report_path
        .unwrap_or_else(|| report.default_path(&ctx.project_dir));
    match report.save(&path) {
        Ok(saved) => println!("Run record saved: {}", saved.display()),
        Err(e) => tracing::warn!("could not save run record to {}: {e}", path.display()),
    }

    if failure.is_none() && report.succeeded() {
        tgvm_ui::print_next_steps(ctx);
    }
    Ok(report.exit_code() as u8)
}
