use crate::error::AppError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const PROJECT_DIR_NAME: &str = "telegram-music-automation";
pub const DEFAULT_DASHBOARD_PORT: u16 = 8080;
pub const DEFAULT_SERVER_NAME: &str = "_";
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 600;
pub const SITE_NAME: &str = "telegram-automation";

pub const AUTOMATION_UNIT: &str = "telegram-automation";
pub const MONITORING_UNIT: &str = "telegram-monitoring";
pub const AUTOMATION_SCRIPT: &str = "complete_automation_system.py";
pub const MONITORING_SCRIPT: &str = "monitoring_dashboard.py";
pub const RESTART_DELAY_SECS: u32 = 10;

pub const BACKUP_PREFIX: &str = "telegram_automation_backup_";
pub const BACKUP_RETENTION: usize = 7;

pub const RESOURCE_WARN_PERCENT: f64 = 90.0;
pub const LOG_STALE_HOURS: u64 = 24;
pub const LIVENESS_TIMEOUT_SECS: u64 = 10;
pub const TRACKED_LOGS: [&str; 4] = ["scraping", "forwarding", "upload", "database"];
pub const LOG_CATEGORIES: [&str; 5] = ["scraping", "forwarding", "upload", "database", "system"];

pub const CRON_TAG_BACKUP: &str = "tgvm-backup";
pub const CRON_TAG_LOGROTATE: &str = "tgvm-logrotate";
pub const CRON_TAG_HEALTH: &str = "tgvm-health";
pub const LEGACY_N8N_PORT: u16 = 5678;

/// Where the host keeps service, supervisor and proxy configuration.
///
/// Overridable so a whole run can be pointed at a scratch tree.
#[derive(Debug, Clone)]
pub struct SystemPaths {
    pub systemd_unit_dir: PathBuf,
    pub supervisor_conf_dir: PathBuf,
    pub nginx_sites_available: PathBuf,
    pub nginx_sites_enabled: PathBuf,
}

impl Default for SystemPaths {
    fn default() -> Self {
        Self {
            systemd_unit_dir: PathBuf::from("/etc/systemd/system"),
            supervisor_conf_dir: PathBuf::from("/etc/supervisor/conf.d"),
            nginx_sites_available: PathBuf::from("/etc/nginx/sites-available"),
            nginx_sites_enabled: PathBuf::from("/etc/nginx/sites-enabled"),
        }
    }
}

impl SystemPaths {
    /// Every system directory re-rooted under `root`.
    pub fn under(root: &Path) -> Self {
        let d = Self::default();
        let rebase = |p: PathBuf| root.join(p.strip_prefix("/").unwrap_or(&p));
        Self {
            systemd_unit_dir: rebase(d.systemd_unit_dir),
            supervisor_conf_dir: rebase(d.supervisor_conf_dir),
            nginx_sites_available: rebase(d.nginx_sites_available),
            nginx_sites_enabled: rebase(d.nginx_sites_enabled),
        }
    }
}

/// Immutable facts about the target host, resolved once at startup and handed
/// to every handler.
#[derive(Debug, Clone)]
pub struct ProvisionContext {
    pub user: String,
    pub home: PathBuf,
    pub project_dir: PathBuf,
    pub dashboard_port: u16,
    pub server_name: String,
    pub site_name: String,
    /// Binary invoked by the scheduled backup and health-check jobs.
    pub self_exe: PathBuf,
    pub system: SystemPaths,
    pub command_timeout: Duration,
}

impl ProvisionContext {
    pub fn new(user: impl Into<String>, home: impl Into<PathBuf>, self_exe: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            user: user.into(),
            project_dir: home.join(PROJECT_DIR_NAME),
            home,
            dashboard_port: DEFAULT_DASHBOARD_PORT,
            server_name: DEFAULT_SERVER_NAME.to_string(),
            site_name: SITE_NAME.to_string(),
            self_exe: self_exe.into(),
            system: SystemPaths::default(),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
        }
    }

    pub fn venv_dir(&self) -> PathBuf {
        self.project_dir.join("venv")
    }

    pub fn venv_bin(&self) -> PathBuf {
        self.venv_dir().join("bin")
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.project_dir.join("scripts")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.project_dir.join("config")
    }

    pub fn static_dir(&self) -> PathBuf {
        self.project_dir.join("static")
    }

    pub fn upstream(&self) -> String {
        format!("localhost:{}", self.dashboard_port)
    }

    /// Placeholder values available to every template.
    pub fn template_vars(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        let mut put = |k: &str, v: String| {
            vars.insert(k.to_string(), v);
        };
        put("user", self.user.clone());
        put("home", self.home.display().to_string());
        put("project_dir", self.project_dir.display().to_string());
        put("venv_dir", self.venv_dir().display().to_string());
        put("venv_bin", self.venv_bin().display().to_string());
        put("logs_dir", logs_dir(&self.project_dir).display().to_string());
        put("downloads_dir", self.project_dir.join("downloads").display().to_string());
        put("config_dir", self.config_dir().display().to_string());
        put("static_dir", self.static_dir().display().to_string());
        put("dashboard_port", self.dashboard_port.to_string());
        put("server_name", self.server_name.clone());
        vars
    }
}

/// Default home for `user`: the caller's own home when it matches, else `/home/<user>`.
pub fn home_for(user: &str) -> Result<PathBuf, AppError> {
    let current = std::env::var("USER").unwrap_or_default();
    if current == user {
        dirs::home_dir().ok_or(AppError::HomeDirNotFound)
    } else if user == "root" {
        Ok(PathBuf::from("/root"))
    } else {
        Ok(PathBuf::from("/home").join(user))
    }
}

/// <project>/logs/
pub fn logs_dir(project_dir: &Path) -> PathBuf {
    project_dir.join("logs")
}

/// <project>/logs/system/
pub fn system_log_dir(project_dir: &Path) -> PathBuf {
    logs_dir(project_dir).join("system")
}

/// <project>/backups/
pub fn backups_dir(project_dir: &Path) -> PathBuf {
    project_dir.join("backups")
}

/// Default project directory for the invoking user, used by the probes.
pub fn default_project_dir() -> Result<PathBuf, AppError> {
    let home = dirs::home_dir().ok_or(AppError::HomeDirNotFound)?;
    Ok(home.join(PROJECT_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_layout_derives_from_home() {
        let ctx = ProvisionContext::new("scraper", "/home/scraper", "/usr/local/bin/tgvm");
        assert_eq!(
            ctx.project_dir,
            PathBuf::from("/home/scraper/telegram-music-automation")
        );
        assert_eq!(
            ctx.venv_bin(),
            PathBuf::from("/home/scraper/telegram-music-automation/venv/bin")
        );
        assert_eq!(ctx.upstream(), "localhost:8080");
    }

    #[test]
    fn system_paths_rebase_under_root() {
        let paths = SystemPaths::under(Path::new("/tmp/target"));
        assert_eq!(
            paths.systemd_unit_dir,
            PathBuf::from("/tmp/target/etc/systemd/system")
        );
        assert_eq!(
            paths.nginx_sites_enabled,
            PathBuf::from("/tmp/target/etc/nginx/sites-enabled")
        );
    }

    #[test]
    fn template_vars_cover_paths_and_port() {
        let mut ctx = ProvisionContext::new("scraper", "/home/scraper", "/bin/tgvm");
        ctx.dashboard_port = 9090;
        let vars = ctx.template_vars();
        assert_eq!(vars["dashboard_port"], "9090");
        assert_eq!(vars["user"], "scraper");
        assert!(vars["logs_dir"].ends_with("telegram-music-automation/logs"));
    }
}
