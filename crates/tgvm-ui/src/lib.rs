use console::style;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tgvm_core::config::{self, ProvisionContext};
use tgvm_core::report::{ProvisionReport, StepOutcome, StepStatus};

/// Create a spinner with a message.
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.cyan} {msg}")
            .expect("valid template"),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub fn step_header(index: usize, total: usize, description: &str) -> String {
    format!("[Step {}/{}] {}", index + 1, total, description)
}

/// Ask before touching the host.
pub fn confirm(prompt: &str) -> Result<bool, anyhow::Error> {
    let confirmed = Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?;
    Ok(confirmed)
}

fn status_label(status: StepStatus) -> String {
    match status {
        StepStatus::Ok => style("ok").green().to_string(),
        StepStatus::Unchanged => style("unchanged").green().dim().to_string(),
        StepStatus::Planned => style("planned").cyan().to_string(),
        StepStatus::BestEffortFailed => style("skipped").yellow().to_string(),
        StepStatus::Failed => style("FAILED").red().bold().to_string(),
        StepStatus::VerificationFailed => style("FAILED").red().to_string(),
    }
}

fn outcome_line(o: &StepOutcome) -> String {
    let mut line = format!(
        "  {:>3}  {:<24}  {:<34}  {}",
        o.index + 1,
        o.kind,
        o.key,
        status_label(o.status)
    );
    if !o.message.is_empty() && !o.ok() {
        line.push_str(&format!("\n         {}", style(&o.message).dim()));
    }
    line
}

/// Print the ordered step list of a dry run.
pub fn print_plan(report: &ProvisionReport) {
    println!("  {:>3}  {:<24}  {:<34}  {}", "#", "Kind", "Key", "Description");
    println!("  {}", "-".repeat(90));
    for o in &report.outcomes {
        println!(
            "  {:>3}  {:<24}  {:<34}  {}",
            o.index + 1,
            o.kind,
            o.key,
            o.description
        );
    }
    println!("\n  Total: {} step(s)", report.outcomes.len());
}

/// Print every step outcome followed by the overall banner.
pub fn print_report(report: &ProvisionReport) {
    let divider = "=".repeat(60);
    println!("\n{divider}");
    println!("  Provisioning Report ({})", report.run_id);
    println!("{divider}");
    for o in &report.outcomes {
        println!("{}", outcome_line(o));
    }
    println!("{divider}");
    println!(
        "  Passed: {}   Failed: {}",
        report.passed(),
        report.failed()
    );

    let verifications: Vec<&StepOutcome> = report.verification_outcomes().collect();
    if !verifications.is_empty() {
        println!("\n  Installation Verification:");
        for v in verifications {
            let mark = if v.ok() {
                style("✔").green()
            } else {
                style("✘").red()
            };
            println!("    {mark} {}  {}", v.description, style(&v.message).dim());
        }
    }

    if report.succeeded() {
        println!("\n  {}", style("PROVISIONING SUCCEEDED").green().bold());
    } else {
        println!("\n  {}", style("PROVISIONING FAILED").red().bold());
    }
    println!("{divider}");
}

/// Manual follow-up the operator still owns after a successful run.
pub fn print_next_steps(ctx: &ProvisionContext) {
    let divider = "=".repeat(60);
    let project = ctx.project_dir.display();
    let config_dir = ctx.config_dir();
    let env_file = config_dir.join("config.env");
    println!("  Next steps:");
    println!("    1. Fill in credentials: {}", env_file.display());
    println!("       (Telegram API id/hash, bot token, Google Drive/Sheets, Airtable)");
    println!(
        "    2. Copy {} and {} into {project}/scripts",
        config::AUTOMATION_SCRIPT,
        config::MONITORING_SCRIPT
    );
    println!(
        "    3. sudo systemctl start {} {}",
        config::AUTOMATION_UNIT,
        config::MONITORING_UNIT
    );
    println!("    4. curl http://localhost:{}/health", ctx.dashboard_port);
    println!(
        "    5. journalctl -u {} -f",
        config::AUTOMATION_UNIT
    );
    println!("{divider}\n");
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
