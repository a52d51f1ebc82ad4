//! Whole-plan runs against a scratch tree and the fake host.

use crate::executor::{Provisioner, RunOptions};
use crate::fake::{self, FakeRunner};
use crate::plan::default_plan;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tgvm_core::report::StepStatus;

/// Every file and symlink under `root` with its contents or link target.
fn snapshot(root: &Path) -> BTreeMap<PathBuf, String> {
    let mut out = BTreeMap::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            let meta = std::fs::symlink_metadata(&path).unwrap();
            let rel = path.strip_prefix(root).unwrap().to_path_buf();
            if meta.file_type().is_symlink() {
                let target = std::fs::read_link(&path).unwrap();
                out.insert(rel, format!("-> {}", target.display()));
            } else if meta.is_dir() {
                out.insert(rel, "<dir>".into());
                stack.push(path);
            } else {
                out.insert(rel, std::fs::read_to_string(&path).unwrap_or_default());
            }
        }
    }
    out
}

#[tokio::test]
async fn full_plan_twice_converges_and_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = fake::context(dir.path());
    let runner = FakeRunner::new(dir.path());
    let plan = default_plan(&ctx);
    let provisioner = Provisioner::new(&ctx, &runner);

    let first = provisioner.run(&plan, &RunOptions::default()).await.unwrap();
    assert_eq!(first.outcomes.len(), plan.len());
    assert_eq!(first.exit_code(), 0);
    assert!(first.verification_outcomes().count() > 0);
    assert!(first.verification_outcomes().all(|o| o.status == StepStatus::Ok));

    let tree = snapshot(dir.path());
    let crontab = runner.crontab(&ctx.user);
    let rules = runner.ufw_rules();

    let second = provisioner.run(&plan, &RunOptions::default()).await.unwrap();
    assert_eq!(second.exit_code(), 0);
    assert_eq!(snapshot(dir.path()), tree);
    assert_eq!(runner.crontab(&ctx.user), crontab);
    assert_eq!(runner.ufw_rules(), rules);
    // Every run validates and reloads the proxy.
    assert_eq!(runner.reloads(), 2);

    for (step, outcome) in plan.iter().zip(&second.outcomes) {
        if step.key == "firewall-drop-n8n" {
            assert_eq!(outcome.status, StepStatus::BestEffortFailed);
        } else if outcome.kind != tgvm_core::report::VERIFICATION_KIND {
            assert_eq!(outcome.status, StepStatus::Unchanged, "{}", outcome.key);
        }
    }

    let schedule = crontab.unwrap();
    assert_eq!(schedule.lines().count(), 3);
    assert!(ctx.system.systemd_unit_dir.join("telegram-automation.service").exists());
    assert!(ctx.project_dir.join("logs/scraping").is_dir());
}

#[tokio::test]
async fn fatal_failure_halts_remaining_steps() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = fake::context(dir.path());
    let runner = FakeRunner::new(dir.path());
    runner.fail_program("apt-get");
    let plan = default_plan(&ctx);

    let err = Provisioner::new(&ctx, &runner)
        .run(&plan, &RunOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.step_index, 0);
    assert_eq!(err.kind, "package_install");
    assert_eq!(err.key, "system-packages");
    assert_eq!(err.report.outcomes.len(), 1);
    assert_eq!(err.report.outcomes[0].status, StepStatus::Failed);
    assert_eq!(err.report.exit_code(), 1);
    assert!(!ctx.project_dir.exists());
    assert_eq!(runner.count("systemctl"), 0);
}

#[tokio::test]
async fn best_effort_failure_is_recorded_and_run_continues() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = fake::context(dir.path());
    let runner = FakeRunner::new(dir.path());
    runner.fail_program("supervisorctl");
    let plan = default_plan(&ctx);

    let report = Provisioner::new(&ctx, &runner)
        .run(&plan, &RunOptions::default())
        .await
        .unwrap();

    let supervisor = report
        .outcomes
        .iter()
        .find(|o| o.key == "supervisor-automation")
        .unwrap();
    assert_eq!(supervisor.status, StepStatus::BestEffortFailed);
    assert_eq!(report.outcomes.len(), plan.len());
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn failed_verification_completes_run_with_failure_exit() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = fake::context(dir.path());
    let runner = FakeRunner::new(dir.path());
    runner.missing_module("telethon");
    let plan = default_plan(&ctx);

    let report = Provisioner::new(&ctx, &runner)
        .run(&plan, &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), plan.len());
    let failed: Vec<_> = report
        .outcomes
        .iter()
        .filter(|o| o.status == StepStatus::VerificationFailed)
        .map(|o| o.key.as_str())
        .collect();
    assert_eq!(failed, vec!["verify-import-telethon"]);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn dry_run_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = fake::context(dir.path());
    let runner = FakeRunner::new(dir.path());
    let plan = default_plan(&ctx);

    let opts = RunOptions {
        dry_run: true,
        ..Default::default()
    };
    let report = Provisioner::new(&ctx, &runner).run(&plan, &opts).await.unwrap();

    assert!(report.dry_run);
    assert_eq!(report.outcomes.len(), plan.len());
    assert!(report.outcomes.iter().all(|o| o.status == StepStatus::Planned));
    assert!(runner.commands().is_empty());
    assert!(snapshot(dir.path()).is_empty());
}

#[tokio::test]
async fn selected_steps_run_alone() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = fake::context(dir.path());
    let runner = FakeRunner::new(dir.path());
    let plan = default_plan(&ctx);

    let opts = RunOptions {
        only: vec!["cron-tgvm-health".into()],
        ..Default::default()
    };
    let report = Provisioner::new(&ctx, &runner).run(&plan, &opts).await.unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].key, "cron-tgvm-health");
    assert_eq!(runner.count("apt-get"), 0);
    let schedule = runner.crontab(&ctx.user).unwrap();
    assert_eq!(schedule.lines().count(), 1);
    assert!(schedule.ends_with("# tgvm-health\n"));
}

#[tokio::test]
async fn project_root_and_logs_belong_to_target_user() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = fake::context(dir.path());
    let runner = FakeRunner::new(dir.path());
    let plan = default_plan(&ctx);

    Provisioner::new(&ctx, &runner)
        .run(&plan, &RunOptions::default())
        .await
        .unwrap();

    let owned: Vec<(String, String)> = runner
        .commands()
        .into_iter()
        .filter(|c| c.program == "chown")
        .map(|c| (c.args[1].clone(), c.args[2].clone()))
        .collect();
    let owner = format!("{0}:{0}", ctx.user);
    for path in [ctx.project_dir.clone(), ctx.project_dir.join("logs")] {
        let path = path.display().to_string();
        assert!(
            owned.iter().any(|(o, p)| *o == owner && *p == path),
            "{path} not chowned: {owned:?}"
        );
    }
}
