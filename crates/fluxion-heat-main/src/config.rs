// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use anyhow::{Context, Result};
use fluxion_heat_types::HeatConfig;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "FLUXION_HEAT_CONFIG";

/// Configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

fn read_toml(path: &Path) -> Result<HeatConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load and validate the configuration
///
/// Lookup order: explicit path, `FLUXION_HEAT_CONFIG`, `./config.toml`,
/// built-in defaults. An explicit path or env var that cannot be read is an
/// error; a missing `config.toml` is not.
pub fn load_config(explicit: Option<&Path>) -> Result<HeatConfig> {
    let env_path = std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from);
    let config = if let Some(path) = explicit.map(Path::to_path_buf).or(env_path) {
        let config = read_toml(&path)?;
        info!("Loaded configuration from {}", path.display());
        config
    } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
        let config = read_toml(Path::new(DEFAULT_CONFIG_FILE))?;
        info!("Loaded configuration from {DEFAULT_CONFIG_FILE}");
        config
    } else {
        warn!("No configuration file found, using defaults");
        HeatConfig::default()
    };

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
device_id = "garage_pump"

[price]
cheap_threshold = 0.3

[zones.tank]
min_c = 40.0
max_c = 55.0
preferred_c = 47.0
hard_min_c = 38.0
step_c = 1.0
min_change_c = 1.0
min_change_interval_minutes = 60
preheat_delta_c = 6.0
coast_delta_c = 5.0
min_headroom_c = 2.0
coast_margin_c = 2.0
away_setback_c = 0.0
efficiency_boost_c = 0.5
"#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.device_id, "garage_pump");
        assert_eq!(config.price.cheap_threshold, 0.3);
        assert_eq!(config.price.expensive_threshold, 0.75);
        assert!(config.zones.tank.is_some());
        assert_eq!(config.zones.primary.preferred_c, 20.5);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[price]\ncheap_threshold = 0.9\nexpensive_threshold = 0.5"
        )
        .unwrap();

        let err = load_config(Some(file.path())).unwrap_err();
        assert!(format!("{err:#}").contains("cheap_threshold"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/heat.toml"))).is_err());
    }
}
