//! Standalone probes run by cron on the provisioned host.

pub mod backup;
pub mod health;

pub use backup::{create_backup, list_backups, BackupEntry, BackupOutcome};
pub use health::{HealthReport, HttpLiveness, LivenessProbe, MetricsSource, SystemMetrics};
