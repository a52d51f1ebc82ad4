//! The step list that provisions a fresh VM for the channel archiving pipeline.

use crate::runner::shell_escape;
use crate::step::{
    FileRender, FirewallRule, Probe, Protocol, ProxySite, ScheduledJob, ServiceUnit, Step,
    StepKind, UnitFlavor,
};
use crate::templates;
use tgvm_core::config::{self, ProvisionContext};

pub const SYSTEM_PACKAGES: &[&str] = &[
    "python3",
    "python3-pip",
    "python3-venv",
    "git",
    "curl",
    "ffmpeg",
    "sqlite3",
    "nginx",
    "supervisor",
    "ufw",
    "cron",
];

pub const PYTHON_REQUIREMENTS: &[&str] = &[
    "telethon",
    "python-dotenv",
    "aiohttp",
    "aiofiles",
    "pandas",
    "psutil",
    "requests",
    "flask",
    "google-api-python-client",
    "google-auth",
    "gspread",
    "airtable-python-wrapper",
    "mutagen",
];

/// Import names checked after install.
const VERIFIED_MODULES: &[&str] = &["telethon", "dotenv", "aiohttp", "flask", "psutil"];

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn service(ctx: &ProvisionContext, name: &str, description: &str, script: &str, flavor: UnitFlavor) -> ServiceUnit {
    let python = ctx.venv_bin().join("python");
    let script = ctx.scripts_dir().join(script);
    ServiceUnit {
        name: name.to_string(),
        description: description.to_string(),
        exec_command: format!("{} {}", python.display(), script.display()),
        working_directory: ctx.project_dir.clone(),
        user: ctx.user.clone(),
        path_env: ctx.venv_bin().display().to_string(),
        restart_policy: "always".to_string(),
        restart_delay_secs: config::RESTART_DELAY_SECS,
        flavor,
    }
}

fn scheduled_jobs(ctx: &ProvisionContext) -> Vec<ScheduledJob> {
    let exe = shell_escape(&ctx.self_exe.display().to_string());
    let project = shell_escape(&ctx.project_dir.display().to_string());
    let logs = shell_escape(&config::logs_dir(&ctx.project_dir).display().to_string());
    vec![
        ScheduledJob {
            tag: config::CRON_TAG_BACKUP.to_string(),
            cron_expression: "0 2 * * *".to_string(),
            command: format!("{exe} backup --project-dir {project}"),
        },
        ScheduledJob {
            tag: config::CRON_TAG_LOGROTATE.to_string(),
            cron_expression: "0 3 * * 0".to_string(),
            command: format!("find {logs} -name '*.log' -mtime +7 -exec gzip {{}} \\;"),
        },
        ScheduledJob {
            tag: config::CRON_TAG_HEALTH.to_string(),
            cron_expression: "*/15 * * * *".to_string(),
            command: format!("{exe} health-check --project-dir {project}"),
        },
    ]
}

/// Verification checks only; also used by `tgvm verify`.
pub fn verification_steps(ctx: &ProvisionContext) -> Vec<Step> {
    let template_path = ctx.config_dir().join("config.env.template");
    let mut steps = vec![
        Step::new(
            "verify-config-template",
            "Verify configuration template",
            StepKind::VerificationCheck(Probe::FileExists(template_path)),
        ),
        Step::new(
            "verify-venv",
            "Verify Python environment",
            StepKind::VerificationCheck(Probe::FileExists(ctx.venv_bin().join("python"))),
        ),
    ];
    for unit in [config::AUTOMATION_UNIT, config::MONITORING_UNIT] {
        steps.push(Step::new(
            format!("verify-unit-{unit}"),
            format!("Verify {unit} is registered"),
            StepKind::VerificationCheck(Probe::UnitRegistered {
                name: unit.to_string(),
            }),
        ));
    }
    steps.push(Step::new(
        "verify-proxy",
        "Verify nginx configuration",
        StepKind::VerificationCheck(Probe::ProxyConfigValid),
    ));
    for module in VERIFIED_MODULES {
        steps.push(Step::new(
            format!("verify-import-{module}"),
            format!("Verify Python module {module}"),
            StepKind::VerificationCheck(Probe::PythonImport {
                venv: ctx.venv_dir(),
                module: module.to_string(),
            }),
        ));
    }
    for tag in [config::CRON_TAG_BACKUP, config::CRON_TAG_LOGROTATE, config::CRON_TAG_HEALTH] {
        steps.push(Step::new(
            format!("verify-cron-{tag}"),
            format!("Verify scheduled job {tag}"),
            StepKind::VerificationCheck(Probe::ScheduledJobPresent {
                tag: tag.to_string(),
            }),
        ));
    }
    steps
}

/// Full plan, in execution order.
pub fn default_plan(ctx: &ProvisionContext) -> Vec<Step> {
    let project = &ctx.project_dir;
    let owner = Some(ctx.user.clone());

    // The services write under the project root and logs/ at runtime, so
    // those are owned by the target user too, not only the leaves.
    let mut tree = vec![
        project.clone(),
        config::logs_dir(project),
        ctx.scripts_dir(),
        ctx.config_dir(),
        ctx.static_dir(),
        project.join("data"),
        project.join("downloads"),
        config::backups_dir(project),
    ];
    tree.extend(
        config::LOG_CATEGORIES
            .iter()
            .map(|c| config::logs_dir(project).join(c)),
    );

    let vars = ctx.template_vars();
    let mut steps = vec![
        Step::new(
            "system-packages",
            "Installing system packages",
            StepKind::PackageInstall {
                packages: owned(SYSTEM_PACKAGES),
            },
        ),
        Step::new(
            "project-tree",
            "Creating project directories",
            StepKind::DirectoryEnsure {
                paths: tree,
                mode: 0o755,
                owner: owner.clone(),
            },
        ),
        Step::new(
            "session-dir",
            "Creating private session directory",
            StepKind::DirectoryEnsure {
                paths: vec![project.join("sessions")],
                mode: 0o700,
                owner: owner.clone(),
            },
        ),
        Step::new(
            "python-venv",
            "Creating Python environment",
            StepKind::PythonEnvEnsure {
                venv: ctx.venv_dir(),
                packages: owned(PYTHON_REQUIREMENTS),
            },
        ),
        Step::new(
            "config-template",
            "Writing configuration template",
            StepKind::FileRender(FileRender {
                template: templates::config_env(),
                vars: vars.clone(),
                destination: ctx.config_dir().join("config.env.template"),
                mode: 0o644,
                overwrite: true,
                owner: owner.clone(),
            }),
        ),
        Step::new(
            "config-env",
            "Creating operator configuration file",
            StepKind::FileRender(FileRender {
                template: templates::config_env(),
                vars,
                destination: ctx.config_dir().join("config.env"),
                mode: 0o600,
                overwrite: false,
                owner: owner.clone(),
            }),
        ),
        Step::new(
            "unit-automation",
            "Installing automation service",
            StepKind::ServiceUnitInstall(service(
                ctx,
                config::AUTOMATION_UNIT,
                "Telegram channel archiving pipeline",
                config::AUTOMATION_SCRIPT,
                UnitFlavor::Systemd,
            )),
        ),
        Step::new(
            "unit-monitoring",
            "Installing monitoring dashboard service",
            StepKind::ServiceUnitInstall(service(
                ctx,
                config::MONITORING_UNIT,
                "Telegram pipeline monitoring dashboard",
                config::MONITORING_SCRIPT,
                UnitFlavor::Systemd,
            )),
        ),
        Step::new(
            "supervisor-automation",
            "Registering automation with supervisor",
            StepKind::ServiceUnitInstall(service(
                ctx,
                config::AUTOMATION_UNIT,
                "Telegram channel archiving pipeline",
                config::AUTOMATION_SCRIPT,
                UnitFlavor::Supervisor,
            )),
        )
        .best_effort(),
        Step::new(
            "proxy-site",
            "Configuring nginx reverse proxy",
            StepKind::ReverseProxyConfigure(ProxySite {
                site_name: ctx.site_name.clone(),
                server_name: ctx.server_name.clone(),
                upstream: ctx.upstream(),
                static_path: ctx.static_dir(),
                template: templates::nginx_site(),
            }),
        ),
        Step::new(
            "firewall-allow",
            "Configuring firewall",
            StepKind::FirewallRule {
                rules: vec![
                    FirewallRule::allow_named("ssh"),
                    FirewallRule::allow_port(80, Protocol::Tcp),
                    FirewallRule::allow_port(443, Protocol::Tcp),
                    FirewallRule::allow_port(ctx.dashboard_port, Protocol::Tcp),
                ],
            },
        ),
        Step::new(
            "firewall-drop-n8n",
            "Closing legacy n8n port",
            StepKind::FirewallRule {
                rules: vec![FirewallRule::delete_port(config::LEGACY_N8N_PORT, Protocol::Tcp)],
            },
        )
        .best_effort(),
    ];

    for job in scheduled_jobs(ctx) {
        steps.push(Step::new(
            format!("cron-{}", job.tag),
            format!("Scheduling {}", job.tag),
            StepKind::ScheduledJobInstall(job),
        ));
    }

    steps.extend(verification_steps(ctx));
    steps
}
