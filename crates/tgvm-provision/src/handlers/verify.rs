use super::{cron, Effect, Host};
use crate::runner::CommandSpec;
use crate::step::Probe;

/// Evaluate a probe. Read-only; errors become a failed check.
pub async fn check(host: &Host<'_>, probe: &Probe) -> Effect {
    let (ok, message) = match probe {
        Probe::FileExists(path) => {
            if path.exists() {
                (true, format!("{} present", path.display()))
            } else {
                (false, format!("{} missing", path.display()))
            }
        }
        Probe::UnitRegistered { name } => {
            let unit_file = host
                .ctx
                .system
                .systemd_unit_dir
                .join(format!("{name}.service"));
            if !unit_file.exists() {
                (false, format!("{} missing", unit_file.display()))
            } else {
                command_ok(
                    host,
                    CommandSpec::new("systemctl").args(["is-enabled", name.as_str()]),
                    &format!("{name} enabled"),
                )
                .await
            }
        }
        Probe::ProxyConfigValid => {
            command_ok(host, CommandSpec::new("nginx").arg("-t"), "nginx configuration valid").await
        }
        Probe::PythonImport { venv, module } => {
            let python = venv.join("bin").join("python");
            command_ok(
                host,
                CommandSpec::new(python.display().to_string())
                    .arg("-c")
                    .arg(format!("import {module}")),
                &format!("{module} importable"),
            )
            .await
        }
        Probe::ScheduledJobPresent { tag } => match cron::read_schedule(host).await {
            Ok(schedule) => {
                let n = schedule.lines().filter(|l| l.contains(tag.as_str())).count();
                (n == 1, format!("{n} schedule line(s) tagged {tag}"))
            }
            Err(e) => (false, e.to_string()),
        },
    };
    Effect::Checked { ok, message }
}

async fn command_ok(host: &Host<'_>, cmd: CommandSpec, success: &str) -> (bool, String) {
    match host.output(cmd).await {
        Ok(out) if out.success() => (true, success.to_string()),
        Ok(out) => {
            let detail = if out.stderr.trim().is_empty() {
                out.stdout.trim().to_string()
            } else {
                out.stderr.trim().to_string()
            };
            (false, format!("exit {}: {detail}", out.status))
        }
        Err(e) => (false, e.to_string()),
    }
}
