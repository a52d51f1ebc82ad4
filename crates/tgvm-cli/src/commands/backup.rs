use anyhow::Result;
use std::path::Path;
use tgvm_probes::backup;
use tgvm_ui::format_bytes;

/// Create a bundle of the project's non-secret state and prune old ones.
pub fn run(project_dir: &Path, keep: usize) -> Result<()> {
    let sp = tgvm_ui::spinner("Creating backup archive...");
    let outcome = backup::create_backup(project_dir, keep);
    sp.finish_and_clear();
    let outcome = outcome?;

    println!("Backup created: {}", outcome.path.display());
    println!("Size: {}", format_bytes(outcome.size));
    println!("Files: {}", outcome.members);
    if outcome.members == 0 {
        println!("  (empty archive; no files found to back up)");
    }
    for old in &outcome.removed {
        println!("Removed old backup: {}", old.display());
    }
    Ok(())
}
