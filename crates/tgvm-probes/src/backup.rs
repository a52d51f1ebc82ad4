use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tgvm_core::config;

/// File names that must never leave the host.
pub fn is_secret(name: &str) -> bool {
    name.ends_with(".session")
        || name.ends_with(".session-journal")
        || name == "config.env"
        || name == ".env"
        || (name.contains("credentials") && name.ends_with(".json"))
        || (name.starts_with("token") && name.ends_with(".json"))
        || name.ends_with(".pem")
        || name.ends_with(".key")
}

fn is_bundle(name: &str) -> bool {
    name.starts_with(config::BACKUP_PREFIX) && name.ends_with(".tar.gz")
}

#[derive(Debug, Clone)]
pub struct BackupOutcome {
    pub path: PathBuf,
    pub size: u64,
    pub members: usize,
    pub removed: Vec<PathBuf>,
}

type Archive = tar::Builder<GzEncoder<File>>;

/// Append `reader` as a regular file member of exactly `meta.len()` bytes.
/// Logs keep growing while the cron backup runs; anything past the size
/// taken at open time is left out so the member matches its header.
fn append_bounded<W: Write, R: Read>(
    tar: &mut tar::Builder<W>,
    name: &Path,
    meta: &std::fs::Metadata,
    reader: R,
) -> std::io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_metadata(meta);
    tar.append_data(&mut header, name, reader.take(meta.len()))
}

fn append_file(tar: &mut Archive, path: &Path, name: &Path) -> Result<()> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let meta = file.metadata()?;
    append_bounded(tar, name, &meta, file)
        .with_context(|| format!("Failed to add {} to archive", path.display()))
}

/// Adds `dir` under `name`, skipping secrets, symlinks and the backups
/// directory. Returns the number of files added.
fn append_tree(tar: &mut Archive, dir: &Path, name: &Path, backups: &Path) -> Result<usize> {
    if dir == backups {
        return Ok(0);
    }
    tar.append_dir(name, dir)
        .with_context(|| format!("Failed to add {} to archive", dir.display()))?;

    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    let mut count = 0;
    for entry in entries {
        let path = entry.path();
        let file_name = entry.file_name();
        let file_name_str = file_name.to_string_lossy();
        let meta = std::fs::symlink_metadata(&path)?;
        if meta.file_type().is_symlink() {
            tracing::debug!("skipping symlink {}", path.display());
        } else if meta.is_dir() {
            count += append_tree(tar, &path, &name.join(&file_name), backups)?;
        } else if is_secret(&file_name_str) {
            tracing::info!("Excluded secret {}", path.display());
        } else {
            append_file(tar, &path, &name.join(&file_name))?;
            count += 1;
        }
    }
    Ok(count)
}

fn write_bundle(project_dir: &Path, archive_path: &Path) -> Result<usize> {
    let backups = config::backups_dir(project_dir);
    let file = File::create(archive_path)
        .with_context(|| format!("Failed to create {}", archive_path.display()))?;
    let enc = GzEncoder::new(file, Compression::default());
    let mut tar = tar::Builder::new(enc);
    let mut members = 0;

    for dir in ["scripts", "logs", "data"] {
        let src = project_dir.join(dir);
        if src.is_dir() {
            members += append_tree(&mut tar, &src, Path::new(dir), &backups)?;
        } else {
            tracing::warn!("{} does not exist, skipping", src.display());
        }
    }

    let template = Path::new("config").join("config.env.template");
    let src = project_dir.join(&template);
    if src.is_file() {
        append_file(&mut tar, &src, &template)?;
        members += 1;
    } else {
        tracing::warn!("{} does not exist, skipping", src.display());
    }

    let enc = tar.into_inner()?;
    enc.finish()?;
    Ok(members)
}

/// Archive the project's non-secret state, then prune to `keep` bundles.
pub fn create_backup(project_dir: &Path, keep: usize) -> Result<BackupOutcome> {
    anyhow::ensure!(keep >= 1, "retention must keep at least one bundle");
    let backups = config::backups_dir(project_dir);
    std::fs::create_dir_all(&backups)
        .with_context(|| format!("Failed to create {}", backups.display()))?;

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let archive_path = backups.join(format!("{}{timestamp}.tar.gz", config::BACKUP_PREFIX));

    let members = match write_bundle(project_dir, &archive_path) {
        Ok(n) => n,
        Err(e) => {
            // A half-written bundle would sort as the newest one.
            let _ = std::fs::remove_file(&archive_path);
            return Err(e);
        }
    };
    let size = std::fs::metadata(&archive_path)?.len();
    tracing::info!("Backup created successfully: {}", archive_path.display());

    let removed = prune(&backups, keep)?;
    Ok(BackupOutcome {
        path: archive_path,
        size,
        members,
        removed,
    })
}

/// Delete all but the `keep` greatest bundle names. Timestamps sort
/// lexicographically, so these are the newest.
pub fn prune(backups_dir: &Path, keep: usize) -> Result<Vec<PathBuf>> {
    let mut names: Vec<String> = std::fs::read_dir(backups_dir)
        .with_context(|| format!("Failed to read {}", backups_dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| is_bundle(n))
        .collect();
    names.sort();

    let excess = names.len().saturating_sub(keep);
    let mut removed = Vec::new();
    for name in &names[..excess] {
        let path = backups_dir.join(name);
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to remove {}", path.display()))?;
        tracing::info!("Removed old backup: {}", path.display());
        removed.push(path);
    }
    Ok(removed)
}

#[derive(Debug, Clone)]
pub struct BackupEntry {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Bundles in `<project>/backups`, newest first. A missing directory lists
/// as empty.
pub fn list_backups(project_dir: &Path) -> Result<Vec<BackupEntry>> {
    let backups = config::backups_dir(project_dir);
    if !backups.exists() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in std::fs::read_dir(&backups)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_bundle(&name) {
            continue;
        }
        let meta = entry.metadata()?;
        entries.push(BackupEntry {
            name,
            size: meta.len(),
            modified: meta.modified()?.into(),
        });
    }
    entries.sort_by(|a, b| b.name.cmp(&a.name));
    Ok(entries)
}

/// Member paths of a bundle.
pub fn bundle_members(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path)?;
    let dec = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(dec);
    let mut names = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        names.push(entry.path()?.display().to_string());
    }
    Ok(names)
}
