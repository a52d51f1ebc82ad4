use anyhow::Result;
use console::style;
use std::path::Path;
use std::time::Duration;
use tgvm_probes::health::{self, HttpLiveness, SystemMetrics};

/// One health-check pass. Warnings do not change the exit status.
pub async fn run(project_dir: &Path, url: &str, timeout: Duration) -> Result<()> {
    let liveness = HttpLiveness::new(url, timeout)?;
    let report = health::run(project_dir, &SystemMetrics::default(), &liveness).await?;

    println!(
        "CPU {:.1}%  memory {:.1}%  disk {:.1}%  dashboard {}",
        report.usage.cpu_percent,
        report.usage.memory_percent,
        report.usage.disk_percent,
        if report.liveness_ok { "up" } else { "down" }
    );
    if report.is_healthy() {
        println!("{}", style("Healthy").green());
    } else {
        for w in &report.warnings {
            println!("{} {w}", style("warning:").yellow());
        }
    }
    Ok(())
}
