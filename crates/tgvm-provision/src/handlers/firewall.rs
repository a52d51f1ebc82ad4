use super::{Effect, Host};
use crate::runner::CommandSpec;
use crate::step::{FirewallAction, FirewallRule};
use tgvm_core::error::StepError;

/// Rules as `ufw show added` reports them, without the leading `ufw `.
fn added_rules(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|l| l.trim().strip_prefix("ufw "))
        .map(|r| r.trim().to_string())
        .collect()
}

/// Enable UFW (deny incoming, allow outgoing) if it is off, converge each rule,
/// then reload so pending rules apply together.
pub async fn ensure(host: &Host<'_>, rules: &[FirewallRule]) -> Result<Effect, StepError> {
    if rules.is_empty() {
        return Err(StepError::InvalidParameter("no firewall rules given".into()));
    }
    let mut changes = Vec::new();

    // --- Enabled state ---
    let status = host.run_checked(CommandSpec::new("ufw").arg("status")).await?;
    if !status.contains("Status: active") {
        host.run_checked(CommandSpec::new("ufw").args(["default", "deny", "incoming"]))
            .await?;
        host.run_checked(CommandSpec::new("ufw").args(["default", "allow", "outgoing"]))
            .await?;
        // Keep SSH reachable before the firewall comes up.
        host.run_checked(CommandSpec::new("ufw").args(["allow", "ssh"]))
            .await?;
        host.run_checked(CommandSpec::new("ufw").args(["--force", "enable"]))
            .await?;
        changes.push("enabled ufw".to_string());
    }

    // --- Rules ---
    let present = added_rules(&host.run_checked(CommandSpec::new("ufw").args(["show", "added"])).await?);
    for rule in rules {
        let listed = present.contains(&rule.allow_form());
        match rule.action {
            FirewallAction::Allow if listed => {}
            FirewallAction::Allow => {
                host.run_checked(CommandSpec::new("ufw").args(["allow", rule.target.as_str()]))
                    .await?;
                changes.push(rule.to_string());
            }
            FirewallAction::Delete if !listed => {
                return Err(StepError::Absent(format!("ufw rule '{}'", rule.allow_form())));
            }
            FirewallAction::Delete => {
                host.run_checked(
                    CommandSpec::new("ufw").args(["delete", "allow", rule.target.as_str()]),
                )
                .await?;
                changes.push(rule.to_string());
            }
        }
    }

    host.run_checked(CommandSpec::new("ufw").arg("reload")).await?;

    if changes.is_empty() {
        Ok(Effect::Unchanged(format!("{} rule(s) in place", rules.len())))
    } else {
        Ok(Effect::Changed(changes.join(", ")))
    }
}
