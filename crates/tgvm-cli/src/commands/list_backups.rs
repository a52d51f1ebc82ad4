use anyhow::Result;
use std::path::Path;
use tgvm_core::config;
use tgvm_ui::format_bytes;

/// List backup bundles in <project>/backups with sizes and dates.
pub fn run(project_dir: &Path) -> Result<()> {
    let backups_dir = config::backups_dir(project_dir);
    let entries = tgvm_probes::list_backups(project_dir)?;

    if entries.is_empty() {
        println!("No backup archives found in {}", backups_dir.display());
        return Ok(());
    }

    println!("Backups in {}:\n", backups_dir.display());
    println!("  {:<50}  {:>10}  {}", "Name", "Size", "Date");
    println!("  {}", "-".repeat(80));
    for e in &entries {
        println!(
            "  {:<50}  {:>10}  {}",
            e.name,
            format_bytes(e.size),
            e.modified.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    println!("\n  Total: {} backup(s)", entries.len());

    Ok(())
}
