//! Declarative step model. A plan is an ordered `Vec<Step>`; nothing here
//! touches the host.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tgvm_core::template::Template;

#[derive(Debug, Clone)]
pub struct Step {
    pub kind: StepKind,
    pub description: String,
    /// Names the effect this step produces; unique within a plan.
    pub key: String,
    pub best_effort: bool,
}

impl Step {
    pub fn new(key: impl Into<String>, description: impl Into<String>, kind: StepKind) -> Self {
        Self {
            kind,
            description: description.into(),
            key: key.into(),
            best_effort: false,
        }
    }

    pub fn best_effort(mut self) -> Self {
        self.best_effort = true;
        self
    }
}

#[derive(Debug, Clone)]
pub enum StepKind {
    PackageInstall { packages: Vec<String> },
    DirectoryEnsure {
        paths: Vec<PathBuf>,
        mode: u32,
        owner: Option<String>,
    },
    PythonEnvEnsure { venv: PathBuf, packages: Vec<String> },
    FileRender(FileRender),
    ServiceUnitInstall(ServiceUnit),
    ReverseProxyConfigure(ProxySite),
    FirewallRule { rules: Vec<FirewallRule> },
    ScheduledJobInstall(ScheduledJob),
    VerificationCheck(Probe),
}

impl StepKind {
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::PackageInstall { .. } => "package_install",
            StepKind::DirectoryEnsure { .. } => "directory_ensure",
            StepKind::PythonEnvEnsure { .. } => "python_env_ensure",
            StepKind::FileRender(_) => "file_render",
            StepKind::ServiceUnitInstall(_) => "service_unit_install",
            StepKind::ReverseProxyConfigure(_) => "reverse_proxy_configure",
            StepKind::FirewallRule { .. } => "firewall_rule",
            StepKind::ScheduledJobInstall(_) => "scheduled_job_install",
            StepKind::VerificationCheck(_) => tgvm_core::report::VERIFICATION_KIND,
        }
    }

    /// One-line preview of what the step would do.
    pub fn summary(&self) -> String {
        match self {
            StepKind::PackageInstall { packages } => {
                format!("apt-get install -y {}", packages.join(" "))
            }
            StepKind::DirectoryEnsure { paths, mode, .. } => {
                format!("mkdir -p ({} dirs, mode {mode:o})", paths.len())
            }
            StepKind::PythonEnvEnsure { venv, packages } => format!(
                "python3 -m venv {} + pip install ({} packages)",
                venv.display(),
                packages.len()
            ),
            StepKind::FileRender(f) => format!(
                "render {} -> {} ({:o}{})",
                f.template.name,
                f.destination.display(),
                f.mode,
                if f.overwrite { "" } else { ", keep existing" }
            ),
            StepKind::ServiceUnitInstall(u) => format!("{} unit {} (enable, no start)", u.flavor, u.name),
            StepKind::ReverseProxyConfigure(s) => {
                format!("nginx site {} -> http://{}", s.site_name, s.upstream)
            }
            StepKind::FirewallRule { rules } => {
                let rules: Vec<String> = rules.iter().map(|r| r.to_string()).collect();
                format!("ufw {}", rules.join(", "))
            }
            StepKind::ScheduledJobInstall(j) => j.line(),
            StepKind::VerificationCheck(p) => p.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileRender {
    pub template: Template,
    pub vars: BTreeMap<String, String>,
    pub destination: PathBuf,
    pub mode: u32,
    pub overwrite: bool,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitFlavor {
    Systemd,
    Supervisor,
}

impl fmt::Display for UnitFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitFlavor::Systemd => f.write_str("systemd"),
            UnitFlavor::Supervisor => f.write_str("supervisor"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceUnit {
    pub name: String,
    pub description: String,
    pub exec_command: String,
    pub working_directory: PathBuf,
    pub user: String,
    /// PATH exported to the process; points at the project's venv first.
    pub path_env: String,
    pub restart_policy: String,
    pub restart_delay_secs: u32,
    pub flavor: UnitFlavor,
}

impl ServiceUnit {
    pub fn vars(&self) -> BTreeMap<String, String> {
        let wd = self.working_directory.display().to_string();
        BTreeMap::from([
            ("name".to_string(), self.name.clone()),
            ("description".to_string(), self.description.clone()),
            ("exec_command".to_string(), self.exec_command.clone()),
            ("working_directory".to_string(), wd.clone()),
            ("user".to_string(), self.user.clone()),
            ("path_env".to_string(), self.path_env.clone()),
            ("restart_policy".to_string(), self.restart_policy.clone()),
            ("restart_delay".to_string(), self.restart_delay_secs.to_string()),
            (
                "stdout_log".to_string(),
                format!("{wd}/logs/system/{}.out.log", self.name),
            ),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct ProxySite {
    pub site_name: String,
    pub server_name: String,
    /// host:port of the dashboard.
    pub upstream: String,
    pub static_path: PathBuf,
    pub template: Template,
}

impl ProxySite {
    pub fn vars(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("site_name".to_string(), self.site_name.clone()),
            ("server_name".to_string(), self.server_name.clone()),
            ("upstream".to_string(), self.upstream.clone()),
            ("static_path".to_string(), self.static_path.display().to_string()),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirewallAction {
    Allow,
    Delete,
}

/// A ufw rule, either `<port>/<proto>` or a named service such as `ssh`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallRule {
    pub action: FirewallAction,
    pub target: String,
}

impl FirewallRule {
    pub fn allow_port(port: u16, proto: Protocol) -> Self {
        Self {
            action: FirewallAction::Allow,
            target: format!("{port}/{proto}"),
        }
    }

    pub fn allow_named(name: &str) -> Self {
        Self {
            action: FirewallAction::Allow,
            target: name.to_string(),
        }
    }

    pub fn delete_port(port: u16, proto: Protocol) -> Self {
        Self {
            action: FirewallAction::Delete,
            target: format!("{port}/{proto}"),
        }
    }

    /// The rule as `ufw show added` lists it, minus the leading `ufw`.
    /// ufw stores well-known services by port.
    pub fn allow_form(&self) -> String {
        let target = match self.target.as_str() {
            "ssh" => "22/tcp",
            "http" => "80/tcp",
            "https" => "443/tcp",
            other => other,
        };
        format!("allow {target}")
    }
}

impl fmt::Display for FirewallRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.action {
            FirewallAction::Allow => write!(f, "allow {}", self.target),
            FirewallAction::Delete => write!(f, "delete allow {}", self.target),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledJob {
    /// Any schedule line containing this substring belongs to the job.
    pub tag: String,
    pub cron_expression: String,
    pub command: String,
}

impl ScheduledJob {
    /// The schedule line; the trailing shell comment carries the tag.
    pub fn line(&self) -> String {
        format!("{} {} # {}", self.cron_expression, self.command, self.tag)
    }
}

/// Read-only probes for the verification phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    FileExists(PathBuf),
    UnitRegistered { name: String },
    ProxyConfigValid,
    PythonImport { venv: PathBuf, module: String },
    ScheduledJobPresent { tag: String },
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Probe::FileExists(p) => write!(f, "file exists: {}", p.display()),
            Probe::UnitRegistered { name } => write!(f, "unit registered: {name}"),
            Probe::ProxyConfigValid => f.write_str("nginx -t"),
            Probe::PythonImport { module, .. } => write!(f, "python import {module}"),
            Probe::ScheduledJobPresent { tag } => write!(f, "cron job present: {tag}"),
        }
    }
}
