mod commands;
mod logging;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tgvm_core::config::{self, ProvisionContext, SystemPaths};

#[derive(Parser)]
#[command(
    name = "tgvm",
    version,
    about = "Provision a VM for the Telegram channel archiving pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Settings describing the target host.
#[derive(Args, Clone, Debug)]
struct HostArgs {
    /// Account that owns the project and runs the services (defaults to $USER)
    #[arg(long, env = "TGVM_USER")]
    user: Option<String>,

    /// Home directory of that account (defaults to /home/<user>)
    #[arg(long)]
    home: Option<PathBuf>,

    /// Port of the monitoring dashboard behind the proxy
    #[arg(long, env = "MONITORING_PORT", default_value_t = config::DEFAULT_DASHBOARD_PORT)]
    port: u16,

    /// nginx server_name for the site
    #[arg(long, default_value = config::DEFAULT_SERVER_NAME)]
    server_name: String,

    /// Prefix for /etc paths (systemd, supervisor, nginx); for staging trees
    #[arg(long, env = "TGVM_SYSTEM_ROOT")]
    system_root: Option<PathBuf>,

    /// Seconds before an external command is killed
    #[arg(long, default_value_t = config::DEFAULT_COMMAND_TIMEOUT_SECS)]
    command_timeout: u64,
}

impl HostArgs {
    fn context(&self) -> Result<ProvisionContext> {
        let user = match &self.user {
            Some(u) => u.clone(),
            None => std::env::var("USER").context("no --user given and $USER is not set")?,
        };
        anyhow::ensure!(!user.trim().is_empty(), "target user must not be empty");
        let home = match &self.home {
            Some(h) => h.clone(),
            None => config::home_for(&user)?,
        };
        let exe = std::env::current_exe().context("resolving the tgvm executable path")?;

        let mut ctx = ProvisionContext::new(user, home, exe);
        ctx.dashboard_port = self.port;
        ctx.server_name = self.server_name.clone();
        ctx.command_timeout = Duration::from_secs(self.command_timeout);
        if let Some(root) = &self.system_root {
            ctx.system = SystemPaths::under(root);
        }
        Ok(ctx)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the provisioning plan against this host
    Provision {
        #[command(flatten)]
        host: HostArgs,

        /// Print the plan without executing anything
        #[arg(long)]
        dry_run: bool,

        /// Run only these steps (key or 1-based index); repeatable
        #[arg(long = "step", value_name = "KEY|INDEX")]
        steps: Vec<String>,

        /// Skip steps before this 1-based index
        #[arg(long, value_name = "INDEX")]
        from: Option<usize>,

        /// Do not ask for confirmation
        #[arg(long, short = 'y')]
        yes: bool,

        /// Where to write the JSON run record
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List the ordered steps with index, kind and key
    Plan {
        #[command(flatten)]
        host: HostArgs,
    },

    /// Run only the installation verification checks
    Verify {
        #[command(flatten)]
        host: HostArgs,
    },

    /// Sample resources, dashboard liveness and log freshness once
    HealthCheck {
        /// Project directory (defaults to ~/telegram-music-automation)
        #[arg(long)]
        project_dir: Option<PathBuf>,

        /// Liveness endpoint (defaults to http://localhost:<port>/health)
        #[arg(long)]
        url: Option<String>,

        /// Dashboard port used for the default URL
        #[arg(long, env = "MONITORING_PORT", default_value_t = config::DEFAULT_DASHBOARD_PORT)]
        port: u16,

        /// Liveness request timeout
        #[arg(long, default_value_t = config::LIVENESS_TIMEOUT_SECS)]
        timeout_secs: u64,
    },

    /// Archive scripts, config template, logs and data into a timestamped .tar.gz
    Backup {
        /// Project directory (defaults to ~/telegram-music-automation)
        #[arg(long)]
        project_dir: Option<PathBuf>,

        /// Number of bundles to keep (at least 1)
        #[arg(
            long,
            default_value_t = config::BACKUP_RETENTION,
            value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
        )]
        keep: usize,
    },

    /// Show backup bundles with sizes and dates
    ListBackups {
        /// Project directory (defaults to ~/telegram-music-automation)
        #[arg(long)]
        project_dir: Option<PathBuf>,
    },
}

fn project_dir(arg: Option<PathBuf>) -> Result<PathBuf> {
    match arg {
        Some(p) => Ok(p),
        None => Ok(config::default_project_dir()?),
    }
}

async fn dispatch(command: Commands) -> Result<u8> {
    match command {
        Commands::Provision {
            host,
            dry_run,
            steps,
            from,
            yes,
            report,
        } => {
            let params = commands::provision::ProvisionParams {
                ctx: host.context()?,
                dry_run,
                steps,
                from,
                yes,
                report_path: report,
            };
            commands::provision::run(params).await
        }
        Commands::Plan { host } => {
            commands::plan::run(&host.context()?).await?;
            Ok(0)
        }
        Commands::Verify { host } => commands::verify::run(&host.context()?).await,
        Commands::HealthCheck {
            project_dir: dir,
            url,
            port,
            timeout_secs,
        } => {
            let dir = project_dir(dir)?;
            let url = url.unwrap_or_else(|| tgvm_probes::HttpLiveness::default_url(port));
            commands::health::run(&dir, &url, Duration::from_secs(timeout_secs)).await?;
            Ok(0)
        }
        Commands::Backup {
            project_dir: dir,
            keep,
        } => {
            commands::backup::run(&project_dir(dir)?, keep)?;
            Ok(0)
        }
        Commands::ListBackups { project_dir: dir } => {
            commands::list_backups::run(&project_dir(dir)?)?;
            Ok(0)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Settings may live in a .env next to the binary.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let target = match &cli.command {
        Commands::HealthCheck { project_dir: dir, .. } => {
            logging::LogTarget::system_log(dir.clone(), "health_check.log")
        }
        Commands::Backup { project_dir: dir, .. } => {
            logging::LogTarget::system_log(dir.clone(), "backup.log")
        }
        _ => logging::LogTarget::Stderr,
    };
    logging::init(target);

    match dispatch(cli.command).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("{} {e:#}", console::style("Error:").red().bold());
            ExitCode::FAILURE
        }
    }
}
