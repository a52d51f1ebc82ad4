use super::{Effect, Host};
use crate::step::FileRender;
use std::io::Write;
use std::path::Path;
use tgvm_core::error::StepError;

/// Render a template to its destination.
///
/// Placeholders are resolved before the filesystem is touched, so a missing
/// variable leaves no file behind.
pub async fn render(host: &Host<'_>, spec: &FileRender) -> Result<Effect, StepError> {
    let dest = &spec.destination;
    if !spec.overwrite && dest.exists() {
        return Ok(Effect::Unchanged(format!(
            "{} exists, left untouched",
            dest.display()
        )));
    }

    let rendered = spec.template.render(&spec.vars)?;
    let changed = write_if_changed(dest, rendered.as_bytes(), spec.mode)?;

    if let Some(owner) = &spec.owner {
        host.chown(owner, dest).await?;
    }

    if changed {
        Ok(Effect::Changed(format!("wrote {}", dest.display())))
    } else {
        Ok(Effect::Unchanged(format!("{} up to date", dest.display())))
    }
}

/// Write `contents` atomically unless the file already holds them; the mode is
/// enforced either way. Returns whether the contents changed.
pub fn write_if_changed(path: &Path, contents: &[u8], mode: u32) -> Result<bool, StepError> {
    let same = std::fs::read(path).map(|c| c == contents).unwrap_or(false);
    if !same {
        write_atomic(path, contents)?;
    }
    set_mode(path, mode)?;
    Ok(!same)
}

/// Write through a temp file in the same directory, then rename over `path`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StepError> {
    let dir = path
        .parent()
        .ok_or_else(|| StepError::InvalidParameter(format!("{} has no parent", path.display())))?;
    std::fs::create_dir_all(dir).map_err(|e| StepError::io(dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StepError::io(dir, e))?;
    tmp.write_all(contents).map_err(|e| StepError::io(path, e))?;
    tmp.as_file().sync_all().map_err(|e| StepError::io(path, e))?;
    tmp.persist(path).map_err(|e| StepError::io(path, e.error))?;
    Ok(())
}

pub fn set_mode(path: &Path, mode: u32) -> Result<(), StepError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .map_err(|e| StepError::io(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = (path, mode);
    Ok(())
}
