use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use crmetrics_core::error::{CrMetricsError, Result};
use crmetrics_core::ResourceIdentity;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    pub version: u32,

    #[serde(default)]
    pub metrics: MetricsSection,

    #[serde(default)]
    pub controller: ControllerSection,

    /// Resources seeded into the in-memory cluster at start-up.
    #[serde(default)]
    pub resources: Vec<SeedResource>,
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(CrMetricsError::Config(format!(
                "unsupported config version: {}",
                self.version
            )));
        }

        self.metrics.validate()?;
        self.controller.validate()?;

        let mut seen = HashSet::new();
        for r in &self.resources {
            if r.namespace.is_empty() || r.name.is_empty() {
                return Err(CrMetricsError::Config(
                    "resources[].namespace and resources[].name must not be empty".into(),
                ));
            }
            if !seen.insert(r.identity()) {
                return Err(CrMetricsError::Config(format!(
                    "duplicate resource: {}",
                    r.identity()
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl MetricsSection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr().map(|_| ())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|e| {
            CrMetricsError::Config(format!("metrics.listen must be a valid SocketAddr: {e}"))
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerSection {
    #[serde(default = "default_max_concurrent_reconciles")]
    pub max_concurrent_reconciles: usize,

    #[serde(default = "default_reconcile_timeout_ms")]
    pub reconcile_timeout_ms: u64,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// 0 disables periodic resync.
    #[serde(default)]
    pub resync_interval_ms: u64,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: default_max_concurrent_reconciles(),
            reconcile_timeout_ms: default_reconcile_timeout_ms(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            resync_interval_ms: 0,
        }
    }
}

impl ControllerSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=64).contains(&self.max_concurrent_reconciles) {
            return Err(CrMetricsError::Config(
                "controller.max_concurrent_reconciles must be between 1 and 64".into(),
            ));
        }
        if !(100..=300_000).contains(&self.reconcile_timeout_ms) {
            return Err(CrMetricsError::Config(
                "controller.reconcile_timeout_ms must be between 100 and 300000".into(),
            ));
        }
        if self.retry_base_delay_ms == 0 {
            return Err(CrMetricsError::Config(
                "controller.retry_base_delay_ms must be at least 1".into(),
            ));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(CrMetricsError::Config(
                "controller.retry_max_delay_ms must not be less than retry_base_delay_ms".into(),
            ));
        }
        if self.resync_interval_ms != 0 && self.resync_interval_ms < 1000 {
            return Err(CrMetricsError::Config(
                "controller.resync_interval_ms must be 0 (off) or at least 1000".into(),
            ));
        }
        Ok(())
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_millis(self.reconcile_timeout_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_ms > 0).then(|| Duration::from_millis(self.resync_interval_ms))
    }
}

fn default_listen() -> String {
    "0.0.0.0:8686".into()
}
fn default_max_concurrent_reconciles() -> usize {
    1
}
fn default_reconcile_timeout_ms() -> u64 {
    10_000
}
fn default_retry_base_delay_ms() -> u64 {
    5
}
fn default_retry_max_delay_ms() -> u64 {
    60_000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedResource {
    pub namespace: String,
    pub name: String,
    #[serde(default = "default_size")]
    pub size: u32,
}

impl SeedResource {
    pub fn identity(&self) -> ResourceIdentity {
        ResourceIdentity::new(&self.namespace, &self.name)
    }
}

fn default_size() -> u32 {
    1
}
