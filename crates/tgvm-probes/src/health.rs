use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tgvm_core::config;

/// Utilization percentages, 0 to 100.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceUsage {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
}

#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn sample(&self) -> Result<ResourceUsage>;
}

#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// HTTP status of the liveness endpoint.
    async fn check(&self) -> Result<u16>;
}

/// Reads `/proc` for CPU and memory and `statvfs` for the disk.
pub struct SystemMetrics {
    pub disk_path: PathBuf,
    /// Gap between the two CPU counter reads.
    pub interval: Duration,
}

impl Default for SystemMetrics {
    fn default() -> Self {
        Self {
            disk_path: PathBuf::from("/"),
            interval: Duration::from_secs(1),
        }
    }
}

/// (busy, total) jiffies from the aggregate `cpu` line of /proc/stat.
fn cpu_times(stat: &str) -> Option<(u64, u64)> {
    let line = stat.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|f| f.parse().ok())
        .collect();
    if fields.len() < 4 {
        return None;
    }
    let total: u64 = fields.iter().sum();
    // idle + iowait
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Some((total - idle, total))
}

fn meminfo_kb(meminfo: &str, key: &str) -> Option<u64> {
    meminfo
        .lines()
        .find(|l| l.starts_with(key))?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()
}

fn memory_percent(meminfo: &str) -> Option<f64> {
    let total = meminfo_kb(meminfo, "MemTotal:")? as f64;
    let available = meminfo_kb(meminfo, "MemAvailable:")? as f64;
    if total <= 0.0 {
        return None;
    }
    Some((total - available) / total * 100.0)
}

#[cfg(unix)]
fn disk_percent(path: &Path) -> Result<f64> {
    let st = nix::sys::statvfs::statvfs(path)
        .with_context(|| format!("statvfs {}", path.display()))?;
    let frsize = st.fragment_size() as f64;
    let used = (st.blocks() as f64 - st.blocks_free() as f64) * frsize;
    let available = st.blocks_available() as f64 * frsize;
    if used + available <= 0.0 {
        return Ok(0.0);
    }
    // Same basis as `df`: space reserved for root is excluded.
    Ok(used / (used + available) * 100.0)
}

#[cfg(not(unix))]
fn disk_percent(_path: &Path) -> Result<f64> {
    anyhow::bail!("disk usage is only sampled on unix hosts")
}

#[async_trait]
impl MetricsSource for SystemMetrics {
    async fn sample(&self) -> Result<ResourceUsage> {
        let read_stat = || std::fs::read_to_string("/proc/stat").context("reading /proc/stat");
        let (busy0, total0) = cpu_times(&read_stat()?).context("parsing /proc/stat")?;
        tokio::time::sleep(self.interval).await;
        let (busy1, total1) = cpu_times(&read_stat()?).context("parsing /proc/stat")?;
        let cpu_percent = if total1 > total0 {
            (busy1.saturating_sub(busy0)) as f64 / (total1 - total0) as f64 * 100.0
        } else {
            0.0
        };

        let meminfo = std::fs::read_to_string("/proc/meminfo").context("reading /proc/meminfo")?;
        let memory_percent = memory_percent(&meminfo).context("parsing /proc/meminfo")?;

        Ok(ResourceUsage {
            cpu_percent,
            memory_percent,
            disk_percent: disk_percent(&self.disk_path)?,
        })
    }
}

/// GET against the dashboard's health endpoint.
pub struct HttpLiveness {
    client: reqwest::Client,
    url: String,
}

impl HttpLiveness {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// `http://localhost:<port>/health`
    pub fn default_url(port: u16) -> String {
        format!("http://localhost:{port}/health")
    }
}

#[async_trait]
impl LivenessProbe for HttpLiveness {
    async fn check(&self) -> Result<u16> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("GET {}", self.url))?;
        Ok(resp.status().as_u16())
    }
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub usage: ResourceUsage,
    pub liveness_ok: bool,
    pub warnings: Vec<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.warnings.is_empty()
    }
}

fn resource_warnings(usage: &ResourceUsage) -> Vec<String> {
    let limit = config::RESOURCE_WARN_PERCENT;
    [
        ("CPU", usage.cpu_percent),
        ("memory", usage.memory_percent),
        ("disk", usage.disk_percent),
    ]
    .into_iter()
    .filter(|(_, pct)| *pct > limit)
    .map(|(what, pct)| format!("High {what} usage: {pct:.1}%"))
    .collect()
}

/// Tracked logs not modified within the staleness window, as of `now`.
/// Logs that do not exist yet are not reported.
pub fn stale_logs(project_dir: &Path, now: SystemTime) -> Vec<String> {
    let logs = config::logs_dir(project_dir);
    let limit = Duration::from_secs(config::LOG_STALE_HOURS * 3600);
    let mut warnings = Vec::new();
    for kind in config::TRACKED_LOGS {
        let path = logs.join(kind).join(format!("{kind}.log"));
        let Ok(modified) = std::fs::metadata(&path).and_then(|m| m.modified()) else {
            continue;
        };
        let age = now.duration_since(modified).unwrap_or_default();
        let hours = age.as_secs_f64() / 3600.0;
        if age > limit {
            warnings.push(format!(
                "Log file {} not updated in {hours:.1} hours",
                path.display()
            ));
        } else {
            tracing::info!("Log file {} is current (updated {hours:.1} hours ago)", path.display());
        }
    }
    warnings
}

/// One health-check pass. Warnings are logged and returned; only failures to
/// sample the host are errors.
pub async fn run(
    project_dir: &Path,
    metrics: &dyn MetricsSource,
    liveness: &dyn LivenessProbe,
) -> Result<HealthReport> {
    tracing::info!("Starting health check");

    let usage = metrics.sample().await.context("sampling system resources")?;
    tracing::info!("CPU Usage: {:.1}%", usage.cpu_percent);
    tracing::info!("Memory Usage: {:.1}%", usage.memory_percent);
    tracing::info!("Disk Usage: {:.1}%", usage.disk_percent);
    let mut warnings = resource_warnings(&usage);

    let liveness_ok = match liveness.check().await {
        Ok(status) if (200..300).contains(&status) => {
            tracing::info!("Monitoring dashboard is healthy");
            true
        }
        Ok(status) => {
            warnings.push(format!("Monitoring dashboard unhealthy: HTTP {status}"));
            false
        }
        Err(e) => {
            warnings.push(format!("Failed to check monitoring dashboard: {e:#}"));
            false
        }
    };

    warnings.extend(stale_logs(project_dir, SystemTime::now()));

    for w in &warnings {
        tracing::warn!("{w}");
    }
    tracing::info!(warnings = warnings.len(), "Health check completed");

    Ok(HealthReport {
        usage,
        liveness_ok,
        warnings,
    })
}
