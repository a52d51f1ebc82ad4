use super::{Effect, Host};
use crate::runner::CommandSpec;
use crate::step::ScheduledJob;
use tgvm_core::error::StepError;

/// Current schedule of the context user; no crontab reads as empty.
pub async fn read_schedule(host: &Host<'_>) -> Result<String, StepError> {
    let out = host
        .output(CommandSpec::new("crontab").args(["-u", host.ctx.user.as_str(), "-l"]))
        .await?;
    if out.success() {
        Ok(out.stdout)
    } else if out.stderr.contains("no crontab") {
        Ok(String::new())
    } else {
        Err(StepError::Command {
            program: "crontab".into(),
            status: out.status,
            stderr: out.stderr.trim().to_string(),
        })
    }
}

/// Drop every line mentioning the tag, then append the job's line.
///
/// Any line containing the tag substring counts as the job's, even if an
/// unrelated entry happens to contain it.
pub fn merge(schedule: &str, job: &ScheduledJob) -> String {
    let line = job.line();
    let mut lines: Vec<&str> = schedule
        .lines()
        .filter(|l| !l.contains(job.tag.as_str()))
        .collect();
    lines.push(&line);
    let mut merged = lines.join("\n");
    merged.push('\n');
    merged
}

fn validate(job: &ScheduledJob) -> Result<(), StepError> {
    if job.tag.trim().is_empty() {
        return Err(StepError::InvalidParameter("scheduled job without a tag".into()));
    }
    if job.cron_expression.split_whitespace().count() != 5 {
        return Err(StepError::InvalidParameter(format!(
            "cron expression '{}' needs five fields",
            job.cron_expression
        )));
    }
    if job.command.contains('\n') || job.cron_expression.contains('\n') {
        return Err(StepError::InvalidParameter("scheduled job spans lines".into()));
    }
    Ok(())
}

/// Remove-then-add against the user's crontab. Assumes a single writer.
pub async fn install(host: &Host<'_>, job: &ScheduledJob) -> Result<Effect, StepError> {
    validate(job)?;
    let current = read_schedule(host).await?;

    let line = job.line();
    let tagged: Vec<&str> = current.lines().filter(|l| l.contains(job.tag.as_str())).collect();
    if tagged == [line.as_str()] {
        return Ok(Effect::Unchanged(format!("{} scheduled", job.tag)));
    }

    let merged = merge(&current, job);
    host.run_checked(
        CommandSpec::new("crontab")
            .args(["-u", host.ctx.user.as_str(), "-"])
            .stdin(merged),
    )
    .await?;
    Ok(Effect::Changed(format!("scheduled {}: {}", job.tag, job.cron_expression)))
}
