use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tgvm_core::config;
use tracing_subscriber::EnvFilter;

pub enum LogTarget {
    Stderr,
    /// Append to a file without ANSI colors.
    File(PathBuf),
}

impl LogTarget {
    /// `<project>/logs/system/<name>`, or stderr when no project can be resolved.
    pub fn system_log(project_dir: Option<PathBuf>, name: &str) -> Self {
        let project = match project_dir {
            Some(p) => p,
            None => match config::default_project_dir() {
                Ok(p) => p,
                Err(_) => return LogTarget::Stderr,
            },
        };
        LogTarget::File(config::system_log_dir(&project).join(name))
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
pub fn init(target: LogTarget) {
    if let LogTarget::File(path) = &target {
        match open_append(path) {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter())
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .init();
                return;
            }
            Err(e) => eprintln!("cannot open {} ({e}); logging to stderr", path.display()),
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .init();
}
