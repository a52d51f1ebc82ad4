use super::files::set_mode;
use super::{Effect, Host};
use std::path::PathBuf;
use tgvm_core::error::StepError;

pub async fn ensure(
    host: &Host<'_>,
    paths: &[PathBuf],
    mode: u32,
    owner: Option<&str>,
) -> Result<Effect, StepError> {
    if paths.is_empty() {
        return Err(StepError::InvalidParameter("no directories given".into()));
    }

    let mut created = Vec::new();
    for path in paths {
        if !path.is_dir() {
            std::fs::create_dir_all(path).map_err(|e| StepError::io(path, e))?;
            created.push(path.display().to_string());
        }
        set_mode(path, mode)?;
        if let Some(owner) = owner {
            host.chown(owner, path).await?;
        }
    }

    if created.is_empty() {
        Ok(Effect::Unchanged(format!("{} directories present", paths.len())))
    } else {
        Ok(Effect::Changed(format!("created {}", created.join(", "))))
    }
}
