//! Controller config loader (strict parsing).

pub mod schema;

use std::fs;

use crmetrics_core::error::{CrMetricsError, Result};

pub use schema::{ControllerConfig, ControllerSection, MetricsSection, SeedResource};

pub fn load_from_file(path: &str) -> Result<ControllerConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| CrMetricsError::Config(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ControllerConfig> {
    let cfg: ControllerConfig = serde_yaml::from_str(s)
        .map_err(|e| CrMetricsError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
