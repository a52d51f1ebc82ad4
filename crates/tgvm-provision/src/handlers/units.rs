use super::files::write_if_changed;
use super::{Effect, Host};
use crate::runner::CommandSpec;
use crate::step::{ServiceUnit, UnitFlavor};
use crate::templates;
use tgvm_core::error::StepError;

/// Write the unit definition and register it with its manager. Units are
/// enabled for boot but never started; the operator does that.
pub async fn install(host: &Host<'_>, unit: &ServiceUnit) -> Result<Effect, StepError> {
    if unit.name.is_empty() || unit.name.contains('/') {
        return Err(StepError::InvalidParameter(format!(
            "bad unit name '{}'",
            unit.name
        )));
    }
    let vars = unit.vars();

    let (path, changed) = match unit.flavor {
        UnitFlavor::Systemd => {
            let text = templates::systemd_unit().render(&vars)?;
            let path = host
                .ctx
                .system
                .systemd_unit_dir
                .join(format!("{}.service", unit.name));
            let changed = write_if_changed(&path, text.as_bytes(), 0o644)?;
            host.run_checked(CommandSpec::new("systemctl").arg("daemon-reload"))
                .await?;
            host.run_checked(CommandSpec::new("systemctl").args(["enable", unit.name.as_str()]))
                .await?;
            (path, changed)
        }
        UnitFlavor::Supervisor => {
            let text = templates::supervisor_program().render(&vars)?;
            let path = host
                .ctx
                .system
                .supervisor_conf_dir
                .join(format!("{}.conf", unit.name));
            let changed = write_if_changed(&path, text.as_bytes(), 0o644)?;
            host.run_checked(CommandSpec::new("supervisorctl").arg("reread"))
                .await?;
            host.run_checked(CommandSpec::new("supervisorctl").arg("update"))
                .await?;
            (path, changed)
        }
    };

    if changed {
        Ok(Effect::Changed(format!(
            "wrote {} and enabled {}",
            path.display(),
            unit.name
        )))
    } else {
        Ok(Effect::Unchanged(format!("{} already registered", unit.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{self, FakeRunner};
    use std::path::PathBuf;

    fn unit(exec: &str, flavor: UnitFlavor) -> ServiceUnit {
        ServiceUnit {
            name: "telegram-monitoring".into(),
            description: "Telegram pipeline monitoring dashboard".into(),
            exec_command: exec.into(),
            working_directory: PathBuf::from("/home/scraper/telegram-music-automation"),
            user: "scraper".into(),
            path_env: "/home/scraper/telegram-music-automation/venv/bin".into(),
            restart_policy: "always".into(),
            restart_delay_secs: 10,
            flavor,
        }
    }

    #[tokio::test]
    async fn systemd_unit_is_written_and_enabled_not_started() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = fake::context(dir.path());
        let runner = FakeRunner::new(dir.path());
        let host = Host::new(&ctx, &runner);

        let effect = install(&host, &unit("/venv/bin/python dash.py", UnitFlavor::Systemd))
            .await
            .unwrap();
        assert!(matches!(effect, Effect::Changed(_)));

        let text = std::fs::read_to_string(
            ctx.system.systemd_unit_dir.join("telegram-monitoring.service"),
        )
        .unwrap();
        assert!(text.contains("ExecStart=/venv/bin/python dash.py\n"));
        assert!(text.contains("Restart=always\n"));
        assert!(text.contains("RestartSec=10\n"));
        assert!(text.contains("User=scraper\n"));
        assert!(runner.is_enabled("telegram-monitoring"));
        assert!(!runner
            .commands()
            .iter()
            .any(|c| c.program == "systemctl" && c.args.first().map(String::as_str) == Some("start")));
    }

    #[tokio::test]
    async fn changed_exec_command_overwrites_definition() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = fake::context(dir.path());
        let runner = FakeRunner::new(dir.path());
        let host = Host::new(&ctx, &runner);

        install(&host, &unit("/old", UnitFlavor::Systemd)).await.unwrap();
        let same = install(&host, &unit("/old", UnitFlavor::Systemd)).await.unwrap();
        assert!(matches!(same, Effect::Unchanged(_)));

        install(&host, &unit("/new", UnitFlavor::Systemd)).await.unwrap();
        let text = std::fs::read_to_string(
            ctx.system.systemd_unit_dir.join("telegram-monitoring.service"),
        )
        .unwrap();
        assert!(text.contains("ExecStart=/new\n"));
        assert!(!text.contains("/old"));
    }

    #[tokio::test]
    async fn supervisor_program_registers_without_autostart() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = fake::context(dir.path());
        let runner = FakeRunner::new(dir.path());
        let host = Host::new(&ctx, &runner);

        install(&host, &unit("/venv/bin/python a.py", UnitFlavor::Supervisor))
            .await
            .unwrap();
        let text = std::fs::read_to_string(
            ctx.system.supervisor_conf_dir.join("telegram-monitoring.conf"),
        )
        .unwrap();
        assert!(text.starts_with("[program:telegram-monitoring]\n"));
        assert!(text.contains("autostart=false"));
        assert_eq!(runner.count("supervisorctl"), 2);
    }
}
