use super::files::write_if_changed;
use super::{Effect, Host};
use crate::runner::CommandSpec;
use crate::step::ProxySite;
use std::path::{Path, PathBuf};
use tgvm_core::error::StepError;

const DEFAULT_SITE: &str = "default";

/// On-disk proxy state before this step touched it.
struct SiteSnapshot {
    available: PathBuf,
    available_contents: Option<Vec<u8>>,
    enabled: PathBuf,
    enabled_target: Option<PathBuf>,
    default_link: PathBuf,
    default_target: Option<PathBuf>,
}

impl SiteSnapshot {
    fn capture(available: &Path, enabled: &Path, default_link: &Path) -> Self {
        Self {
            available: available.to_path_buf(),
            available_contents: std::fs::read(available).ok(),
            enabled: enabled.to_path_buf(),
            enabled_target: std::fs::read_link(enabled).ok(),
            default_link: default_link.to_path_buf(),
            default_target: std::fs::read_link(default_link).ok(),
        }
    }

    fn restore(&self) -> Result<(), StepError> {
        match &self.available_contents {
            Some(contents) => super::files::write_atomic(&self.available, contents)?,
            None => remove_if_present(&self.available)?,
        }
        restore_link(&self.enabled, self.enabled_target.as_deref())?;
        restore_link(&self.default_link, self.default_target.as_deref())?;
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> Result<(), StepError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StepError::io(path, e)),
    }
}

fn restore_link(link: &Path, target: Option<&Path>) -> Result<(), StepError> {
    remove_if_present(link)?;
    if let Some(target) = target {
        symlink(target, link)?;
    }
    Ok(())
}

fn symlink(target: &Path, link: &Path) -> Result<(), StepError> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link).map_err(|e| StepError::io(link, e))
    }
    #[cfg(not(unix))]
    {
        std::fs::copy(target, link)
            .map(|_| ())
            .map_err(|e| StepError::io(link, e))
    }
}

/// Point `link` at `target`; true when the link had to change.
fn ensure_link(target: &Path, link: &Path) -> Result<bool, StepError> {
    if std::fs::read_link(link).ok().as_deref() == Some(target) {
        return Ok(false);
    }
    if let Some(dir) = link.parent() {
        std::fs::create_dir_all(dir).map_err(|e| StepError::io(dir, e))?;
    }
    remove_if_present(link)?;
    symlink(target, link)?;
    Ok(true)
}

/// Install the site, drop the distribution default, validate, then reload.
///
/// A rejected configuration is rolled back on disk and nginx is not reloaded,
/// so the running configuration stays the previous one. A valid configuration
/// is always reloaded, even when the files on disk were already current: a
/// previous run may have written them and stopped before nginx picked them up.
pub async fn configure(host: &Host<'_>, site: &ProxySite) -> Result<Effect, StepError> {
    let rendered = site.template.render(&site.vars())?;

    let sys = &host.ctx.system;
    let available = sys.nginx_sites_available.join(&site.site_name);
    let enabled = sys.nginx_sites_enabled.join(&site.site_name);
    let default_link = sys.nginx_sites_enabled.join(DEFAULT_SITE);

    let snapshot = SiteSnapshot::capture(&available, &enabled, &default_link);

    let staged = stage(&available, &enabled, &default_link, rendered.as_bytes());
    let changed = match staged {
        Ok(changed) => changed,
        Err(e) => {
            snapshot.restore()?;
            return Err(e);
        }
    };

    let check = host.output(CommandSpec::new("nginx").arg("-t")).await;
    match check {
        Ok(out) if out.success() => {}
        Ok(out) => {
            snapshot.restore()?;
            return Err(StepError::ProxyValidation(out.stderr.trim().to_string()));
        }
        Err(e) => {
            snapshot.restore()?;
            return Err(e);
        }
    }

    // reload-or-restart also brings up an nginx that is stopped.
    host.run_checked(CommandSpec::new("systemctl").args(["reload-or-restart", "nginx"]))
        .await?;

    if !changed {
        return Ok(Effect::Unchanged(format!("site {} up to date", site.site_name)));
    }
    Ok(Effect::Changed(format!(
        "site {} -> http://{} active",
        site.site_name, site.upstream
    )))
}

fn stage(available: &Path, enabled: &Path, default_link: &Path, contents: &[u8]) -> Result<bool, StepError> {
    let wrote = write_if_changed(available, contents, 0o644)?;
    let linked = ensure_link(available, enabled)?;
    let had_default = std::fs::symlink_metadata(default_link).is_ok();
    if had_default {
        remove_if_present(default_link)?;
    }
    Ok(wrote || linked || had_default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{self, FakeRunner};
    use crate::templates;
    use tgvm_core::template::Template;

    fn site(template: Template) -> ProxySite {
        ProxySite {
            site_name: "telegram-automation".into(),
            server_name: "_".into(),
            upstream: "localhost:8080".into(),
            static_path: PathBuf::from("/home/scraper/telegram-music-automation/static"),
            template,
        }
    }

    #[tokio::test]
    async fn installs_site_and_disables_default() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = fake::context(dir.path());
        let runner = FakeRunner::new(dir.path());
        let host = Host::new(&ctx, &runner);
        let sys = &ctx.system;
        std::fs::create_dir_all(&sys.nginx_sites_enabled).unwrap();
        std::fs::create_dir_all(&sys.nginx_sites_available).unwrap();
        std::fs::write(sys.nginx_sites_available.join("default"), "server {\n    listen 80;\n}\n").unwrap();
        symlink(
            &sys.nginx_sites_available.join("default"),
            &sys.nginx_sites_enabled.join("default"),
        )
        .unwrap();

        let effect = configure(&host, &site(templates::nginx_site())).await.unwrap();
        assert!(matches!(effect, Effect::Changed(_)));

        let text =
            std::fs::read_to_string(sys.nginx_sites_available.join("telegram-automation")).unwrap();
        assert!(text.contains("proxy_pass http://localhost:8080;"));
        assert!(text.contains("proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;"));
        assert!(text.contains("alias /home/scraper/telegram-music-automation/static;"));
        assert!(std::fs::read_link(sys.nginx_sites_enabled.join("telegram-automation")).is_ok());
        assert!(std::fs::symlink_metadata(sys.nginx_sites_enabled.join("default")).is_err());
        assert_eq!(runner.reloads(), 1);

        let again = configure(&host, &site(templates::nginx_site())).await.unwrap();
        assert!(matches!(again, Effect::Unchanged(_)));
        assert_eq!(runner.reloads(), 2);
    }

    #[tokio::test]
    async fn rerun_reloads_site_written_by_interrupted_run() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = fake::context(dir.path());
        let runner = FakeRunner::new(dir.path());
        let host = Host::new(&ctx, &runner);
        runner.fail_once("systemctl");

        let err = configure(&host, &site(templates::nginx_site())).await.unwrap_err();
        assert!(matches!(err, StepError::Command { .. }));
        assert!(ctx.system.nginx_sites_available.join("telegram-automation").exists());
        assert_eq!(runner.reloads(), 0);

        let effect = configure(&host, &site(templates::nginx_site())).await.unwrap();
        assert!(matches!(effect, Effect::Unchanged(_)));
        assert_eq!(runner.reloads(), 1);
    }

    #[tokio::test]
    async fn invalid_config_keeps_previous_site_and_skips_reload() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = fake::context(dir.path());
        let runner = FakeRunner::new(dir.path());
        let host = Host::new(&ctx, &runner);
        let sys = &ctx.system;

        configure(&host, &site(templates::nginx_site())).await.unwrap();
        let good =
            std::fs::read_to_string(sys.nginx_sites_available.join("telegram-automation")).unwrap();
        assert_eq!(runner.reloads(), 1);

        let broken = Template::new("broken", "server {\n    listen 80\n    location / {\n");
        let err = configure(&host, &site(broken)).await.unwrap_err();
        assert!(matches!(err, StepError::ProxyValidation(_)));

        let after =
            std::fs::read_to_string(sys.nginx_sites_available.join("telegram-automation")).unwrap();
        assert_eq!(after, good);
        assert!(std::fs::read_link(sys.nginx_sites_enabled.join("telegram-automation")).is_ok());
        assert_eq!(runner.reloads(), 1);
    }

    #[tokio::test]
    async fn invalid_first_install_leaves_nothing_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = fake::context(dir.path());
        let runner = FakeRunner::new(dir.path());
        let host = Host::new(&ctx, &runner);

        let broken = Template::new("broken", "server {\n");
        assert!(configure(&host, &site(broken)).await.is_err());
        assert!(!ctx.system.nginx_sites_available.join("telegram-automation").exists());
        assert!(std::fs::symlink_metadata(ctx.system.nginx_sites_enabled.join("telegram-automation")).is_err());
        assert_eq!(runner.reloads(), 0);
    }
}
