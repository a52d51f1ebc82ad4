//! In-memory stand-in for the host's package manager, init system, firewall,
//! scheduler and proxy, used by handler and executor tests.

use crate::runner::{CommandOutput, CommandRunner, CommandSpec};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tgvm_core::config::{ProvisionContext, SystemPaths};
use tgvm_core::error::StepError;

/// Context whose home and system directories all live under `root`.
pub fn context(root: &Path) -> ProvisionContext {
    let mut ctx = ProvisionContext::new("scraper", root.join("home/scraper"), root.join("bin/tgvm"));
    ctx.system = SystemPaths::under(root);
    ctx
}

#[derive(Default)]
struct State {
    commands: Vec<CommandSpec>,
    installed: BTreeSet<String>,
    failing: BTreeSet<String>,
    failing_once: BTreeSet<String>,
    missing_modules: BTreeSet<String>,
    enabled: BTreeSet<String>,
    reloads: usize,
    ufw_active: bool,
    ufw_rules: Vec<String>,
    crontabs: BTreeMap<String, String>,
}

pub struct FakeRunner {
    sites_enabled: PathBuf,
    state: Mutex<State>,
}

fn ok(stdout: impl Into<String>) -> CommandOutput {
    CommandOutput {
        status: 0,
        stdout: stdout.into(),
        stderr: String::new(),
    }
}

fn fail(stderr: impl Into<String>) -> CommandOutput {
    CommandOutput {
        status: 1,
        stdout: String::new(),
        stderr: stderr.into(),
    }
}

fn program_name(program: &str) -> &str {
    Path::new(program)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(program)
}

/// ufw records `ssh` as its port.
fn ufw_port_form(target: &str) -> &str {
    match target {
        "ssh" => "22/tcp",
        other => other,
    }
}

/// Crude `nginx -t`: balanced braces, statements end in `;`.
fn nginx_file_ok(text: &str) -> bool {
    let mut depth: i64 = 0;
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        depth += line.matches('{').count() as i64;
        depth -= line.matches('}').count() as i64;
        if depth < 0 || !(line.ends_with(';') || line.ends_with('{') || line.ends_with('}')) {
            return false;
        }
    }
    depth == 0
}

impl FakeRunner {
    pub fn new(root: &Path) -> Self {
        Self {
            sites_enabled: SystemPaths::under(root).nginx_sites_enabled,
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn preinstall(&self, package: &str) {
        self.state().installed.insert(package.to_string());
    }

    /// Every invocation of `program` exits 1.
    pub fn fail_program(&self, program: &str) {
        self.state().failing.insert(program.to_string());
    }

    /// The next invocation of `program` exits 1; later ones behave normally.
    pub fn fail_once(&self, program: &str) {
        self.state().failing_once.insert(program.to_string());
    }

    pub fn missing_module(&self, module: &str) {
        self.state().missing_modules.insert(module.to_string());
    }

    pub fn set_crontab(&self, user: &str, schedule: &str) {
        self.state()
            .crontabs
            .insert(user.to_string(), schedule.to_string());
    }

    pub fn crontab(&self, user: &str) -> Option<String> {
        self.state().crontabs.get(user).cloned()
    }

    pub fn commands(&self) -> Vec<CommandSpec> {
        self.state().commands.clone()
    }

    /// Invocations whose program file name is `program`.
    pub fn count(&self, program: &str) -> usize {
        self.state()
            .commands
            .iter()
            .filter(|c| program_name(&c.program) == program)
            .count()
    }

    pub fn is_enabled(&self, unit: &str) -> bool {
        self.state().enabled.contains(unit)
    }

    pub fn reloads(&self) -> usize {
        self.state().reloads
    }

    pub fn ufw_active(&self) -> bool {
        self.state().ufw_active
    }

    pub fn ufw_rules(&self) -> Vec<String> {
        self.state().ufw_rules.clone()
    }

    fn nginx_test(&self) -> CommandOutput {
        let entries = match std::fs::read_dir(&self.sites_enabled) {
            Ok(entries) => entries,
            Err(_) => return ok(""),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let text = std::fs::read_to_string(&path).unwrap_or_default();
            if !nginx_file_ok(&text) {
                return fail(format!(
                    "nginx: [emerg] unexpected end of file in {}",
                    path.display()
                ));
            }
        }
        CommandOutput {
            status: 0,
            stdout: String::new(),
            stderr: "nginx: configuration file /etc/nginx/nginx.conf test is successful".into(),
        }
    }

    fn simulate(&self, cmd: &CommandSpec) -> CommandOutput {
        let name = program_name(&cmd.program).to_string();
        let args: Vec<&str> = cmd.args.iter().map(String::as_str).collect();
        let mut st = self.state();
        st.commands.push(cmd.clone());
        if st.failing.contains(&name) || st.failing_once.remove(&name) {
            return fail(format!("{name}: simulated failure"));
        }

        match (name.as_str(), args.as_slice()) {
            ("dpkg-query", [.., pkg]) => {
                if st.installed.contains(*pkg) {
                    ok("install ok installed")
                } else {
                    fail(format!("dpkg-query: no packages found matching {pkg}"))
                }
            }
            ("apt-get", ["install", rest @ ..]) => {
                for pkg in rest.iter().filter(|a| !a.starts_with('-')) {
                    st.installed.insert(pkg.to_string());
                }
                ok("")
            }
            ("python3", ["-m", "venv", venv]) => {
                let bin = Path::new(venv).join("bin");
                let made = std::fs::create_dir_all(&bin)
                    .and_then(|_| std::fs::write(bin.join("python"), ""))
                    .and_then(|_| std::fs::write(bin.join("pip"), ""));
                match made {
                    Ok(()) => ok(""),
                    Err(e) => fail(e.to_string()),
                }
            }
            ("python", ["-c", stmt]) => {
                let module = stmt.trim_start_matches("import ").trim();
                if st.missing_modules.contains(module) {
                    fail(format!("ModuleNotFoundError: No module named '{module}'"))
                } else {
                    ok("")
                }
            }
            ("systemctl", ["enable", unit]) => {
                st.enabled.insert(unit.to_string());
                ok("")
            }
            ("systemctl", ["is-enabled", unit]) => {
                if st.enabled.contains(*unit) {
                    ok("enabled\n")
                } else {
                    CommandOutput {
                        status: 1,
                        stdout: "disabled\n".into(),
                        stderr: String::new(),
                    }
                }
            }
            ("systemctl", ["reload-or-restart", "nginx"]) => {
                st.reloads += 1;
                ok("")
            }
            ("ufw", ["status"]) => {
                if st.ufw_active {
                    ok("Status: active\n")
                } else {
                    ok("Status: inactive\n")
                }
            }
            ("ufw", ["--force", "enable"]) => {
                st.ufw_active = true;
                ok("Firewall is active and enabled on system startup\n")
            }
            ("ufw", ["allow", target]) => {
                let rule = format!("allow {}", ufw_port_form(target));
                if !st.ufw_rules.contains(&rule) {
                    st.ufw_rules.push(rule);
                }
                ok("Rule added\n")
            }
            ("ufw", ["delete", "allow", target]) => {
                let rule = format!("allow {}", ufw_port_form(target));
                st.ufw_rules.retain(|r| r != &rule);
                ok("Rule deleted\n")
            }
            ("ufw", ["show", "added"]) => {
                let mut out =
                    String::from("Added user rules (see 'ufw status' for running firewall):\n");
                if st.ufw_rules.is_empty() {
                    out.push_str("(None)\n");
                }
                for rule in &st.ufw_rules {
                    out.push_str(&format!("ufw {rule}\n"));
                }
                ok(out)
            }
            ("crontab", ["-u", user, "-l"]) => match st.crontabs.get(*user) {
                Some(schedule) => ok(schedule.clone()),
                None => fail(format!("no crontab for {user}")),
            },
            ("crontab", ["-u", user, "-"]) => {
                let schedule = cmd.stdin.clone().unwrap_or_default();
                st.crontabs.insert(user.to_string(), schedule);
                ok("")
            }
            ("nginx", ["-t"]) => {
                drop(st);
                self.nginx_test()
            }
            _ => ok(""),
        }
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn output(&self, cmd: &CommandSpec, _timeout: Duration) -> Result<CommandOutput, StepError> {
        Ok(self.simulate(cmd))
    }
}
