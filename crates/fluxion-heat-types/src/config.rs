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

use anyhow::Result;
use chrono::Weekday;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::thermal::{COOLING_RATE_BOUNDS, HEATING_RATE_BOUNDS};
use crate::zone::Zone;

/// Largest efficiency boost a zone may apply (°C)
pub const MAX_EFFICIENCY_BOOST_C: f64 = 0.5;

// ============= Heating Optimizer Configuration =============

/// Central configuration for one heat pump
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatConfig {
    /// Identifier used to namespace persisted settings
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// IANA timezone used for schedule computation (e.g. "Europe/Prague")
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default)]
    pub price: PriceConfig,
    #[serde(default)]
    pub zones: ZonesConfig,
    #[serde(default)]
    pub cop: CopGuardConfig,
    #[serde(default)]
    pub thermal: ThermalConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub manual_override: ManualOverrideConfig,
}

fn default_device_id() -> String {
    "heat_pump".to_owned()
}

fn default_timezone() -> String {
    "Europe/Prague".to_owned()
}

impl Default for HeatConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            timezone: default_timezone(),
            price: PriceConfig::default(),
            zones: ZonesConfig::default(),
            cop: CopGuardConfig::default(),
            thermal: ThermalConfig::default(),
            breaker: BreakerConfig::default(),
            schedule: ScheduleConfig::default(),
            manual_override: ManualOverrideConfig::default(),
        }
    }
}

/// Price classification settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceConfig {
    /// Percentile at or below which an interval counts as cheap
    pub cheap_threshold: f64,
    /// Percentile at or above which an interval counts as expensive
    pub expensive_threshold: f64,
    /// Current price sample older than this is treated as a price outage
    pub max_age_minutes: u32,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            cheap_threshold: 0.5,
            expensive_threshold: 0.75,
            max_age_minutes: 120,
        }
    }
}

/// Comfort and actuation settings for one zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Lower edge of the comfort band (°C)
    pub min_c: f64,
    /// Upper edge of the comfort band (°C)
    pub max_c: f64,
    /// Temperature held when price gives no reason to deviate (°C)
    pub preferred_c: f64,
    /// Absolute floor, also when nobody is home (°C)
    pub hard_min_c: f64,
    /// Setpoint resolution of the device (°C)
    pub step_c: f64,
    /// Deadband: smallest change worth sending (°C)
    pub min_change_c: f64,
    /// Debounce: minimum minutes between two applied changes
    pub min_change_interval_minutes: u32,
    /// Largest preheat bias above the preferred temperature (°C)
    pub preheat_delta_c: f64,
    /// Largest coast bias below the preferred temperature (°C)
    pub coast_delta_c: f64,
    /// Comfort headroom below max_c required before preheating (°C)
    pub min_headroom_c: f64,
    /// Margin above min_c required before coasting (°C)
    pub coast_margin_c: f64,
    /// Comfort band shift while the home is unoccupied (°C)
    pub away_setback_c: f64,
    /// Extra bias applied when the projected COP is in its top quartile (°C)
    pub efficiency_boost_c: f64,
    /// Per-zone override of the cheap percentile threshold
    #[serde(default)]
    pub cheap_threshold: Option<f64>,
    /// Per-zone override of the expensive percentile threshold
    #[serde(default)]
    pub expensive_threshold: Option<f64>,
}

impl ZoneConfig {
    /// Defaults for a room heating circuit
    pub fn room() -> Self {
        Self {
            min_c: 18.0,
            max_c: 23.0,
            preferred_c: 20.5,
            hard_min_c: 16.0,
            step_c: 0.5,
            min_change_c: 0.5,
            min_change_interval_minutes: 30,
            preheat_delta_c: 2.0,
            coast_delta_c: 2.0,
            min_headroom_c: 0.5,
            coast_margin_c: 0.5,
            away_setback_c: 2.0,
            efficiency_boost_c: 0.3,
            cheap_threshold: None,
            expensive_threshold: None,
        }
    }

    /// Defaults for a domestic hot water tank
    pub fn tank() -> Self {
        Self {
            min_c: 40.0,
            max_c: 55.0,
            preferred_c: 47.0,
            hard_min_c: 38.0,
            step_c: 1.0,
            min_change_c: 1.0,
            min_change_interval_minutes: 60,
            preheat_delta_c: 6.0,
            coast_delta_c: 5.0,
            min_headroom_c: 2.0,
            coast_margin_c: 2.0,
            away_setback_c: 0.0,
            efficiency_boost_c: MAX_EFFICIENCY_BOOST_C,
            cheap_threshold: None,
            expensive_threshold: None,
        }
    }

    /// Effective thresholds for this zone
    pub fn thresholds(&self, price: &PriceConfig) -> (f64, f64) {
        (
            self.cheap_threshold.unwrap_or(price.cheap_threshold),
            self.expensive_threshold.unwrap_or(price.expensive_threshold),
        )
    }

    /// Comfort band adjusted for occupancy
    pub fn comfort_band(&self, occupied: bool) -> (f64, f64) {
        if occupied {
            (self.min_c, self.max_c)
        } else {
            (
                (self.min_c - self.away_setback_c).max(self.hard_min_c),
                (self.max_c - self.away_setback_c).max(self.hard_min_c),
            )
        }
    }

    fn validate(&self, name: &str, price: &PriceConfig) -> Result<()> {
        let values = [
            self.min_c,
            self.max_c,
            self.preferred_c,
            self.hard_min_c,
            self.step_c,
            self.min_change_c,
            self.preheat_delta_c,
            self.coast_delta_c,
            self.min_headroom_c,
            self.coast_margin_c,
            self.away_setback_c,
            self.efficiency_boost_c,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            anyhow::bail!("zones.{name}: all temperatures must be finite numbers");
        }
        if self.max_c <= self.min_c {
            anyhow::bail!(
                "zones.{name}: max_c ({}) must be greater than min_c ({})",
                self.max_c,
                self.min_c
            );
        }
        if self.preferred_c < self.min_c || self.preferred_c > self.max_c {
            anyhow::bail!(
                "zones.{name}: preferred_c ({}) must lie within [{}, {}]",
                self.preferred_c,
                self.min_c,
                self.max_c
            );
        }
        if self.hard_min_c > self.min_c {
            anyhow::bail!("zones.{name}: hard_min_c must not exceed min_c");
        }
        if self.step_c <= 0.0 {
            anyhow::bail!("zones.{name}: step_c must be positive");
        }
        if self.min_change_c < 0.0
            || self.preheat_delta_c < 0.0
            || self.coast_delta_c < 0.0
            || self.min_headroom_c < 0.0
            || self.coast_margin_c < 0.0
            || self.away_setback_c < 0.0
        {
            anyhow::bail!("zones.{name}: deltas, margins and setback must be non-negative");
        }
        if !(0.0..=MAX_EFFICIENCY_BOOST_C).contains(&self.efficiency_boost_c) {
            anyhow::bail!(
                "zones.{name}: efficiency_boost_c must be between 0 and {MAX_EFFICIENCY_BOOST_C}"
            );
        }
        let (cheap, expensive) = self.thresholds(price);
        validate_thresholds(&format!("zones.{name}"), cheap, expensive)
    }
}

fn validate_thresholds(section: &str, cheap: f64, expensive: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&cheap) || !(0.0..=1.0).contains(&expensive) {
        anyhow::bail!("{section}: price thresholds must be between 0.0 and 1.0");
    }
    if cheap >= expensive {
        anyhow::bail!(
            "{section}: cheap_threshold ({cheap}) must be less than expensive_threshold ({expensive})"
        );
    }
    Ok(())
}

/// Zones controlled on this device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZonesConfig {
    #[serde(default = "ZoneConfig::room")]
    pub primary: ZoneConfig,
    #[serde(default)]
    pub secondary: Option<ZoneConfig>,
    #[serde(default)]
    pub tank: Option<ZoneConfig>,
}

impl ZonesConfig {
    /// Configuration for a zone, `None` when the zone is not controlled
    pub fn get(&self, zone: Zone) -> Option<&ZoneConfig> {
        match zone {
            Zone::Primary => Some(&self.primary),
            Zone::Secondary => self.secondary.as_ref(),
            Zone::HotWaterTank => self.tank.as_ref(),
        }
    }
}

impl Default for ZonesConfig {
    fn default() -> Self {
        Self {
            primary: ZoneConfig::room(),
            secondary: None,
            tank: None,
        }
    }
}

/// Plausibility guard for COP samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopGuardConfig {
    /// Samples below this are rejected as implausible
    pub min_valid_cop: f64,
    /// Samples above this are rejected as implausible
    pub max_valid_cop: f64,
    /// Lower percentile used as the observed minimum
    pub low_percentile: f64,
    /// Upper percentile used as the observed maximum
    pub high_percentile: f64,
}

impl Default for CopGuardConfig {
    fn default() -> Self {
        Self {
            min_valid_cop: 0.5,
            max_valid_cop: 6.0,
            low_percentile: 0.05,
            high_percentile: 0.95,
        }
    }
}

/// Starting values and horizons for the thermal model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalConfig {
    /// Heating rate used until calibration (°C/h)
    pub initial_heating_rate: f64,
    /// Cooling constant used until calibration (1/h)
    pub initial_cooling_rate: f64,
    /// Horizon over which coasting must keep the comfort minimum (minutes)
    pub coast_horizon_minutes: u32,
    /// Preheat is only worthwhile if the target is reachable within this window (minutes)
    pub preheat_window_minutes: u32,
    /// Number of hourly samples kept for weekly calibration
    pub sample_window: usize,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            initial_heating_rate: 0.8,
            initial_cooling_rate: 0.05,
            coast_horizon_minutes: 60,
            preheat_window_minutes: 180,
            sample_window: 336,
        }
    }
}

/// Circuit breaker settings shared by all external dependencies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
    pub half_open_success_threshold: u32,
    pub call_timeout_secs: u64,
    /// Attempts per logical call, including the first one
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout_secs: 300,
            half_open_success_threshold: 1,
            call_timeout_secs: 30,
            max_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

/// When cycles and calibrations run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Minute past every hour at which the optimization cycle runs
    pub cycle_minute: u32,
    /// Day of the weekly thermal calibration
    pub calibration_weekday: Weekday,
    /// Local hour of the weekly thermal calibration
    pub calibration_hour: u32,
    /// Manual runs allowed to wait on the device at the same time
    pub max_concurrent_manual_jobs: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cycle_minute: 5,
            calibration_weekday: Weekday::Sun,
            calibration_hour: 2,
            max_concurrent_manual_jobs: 1,
        }
    }
}

/// Manual setpoint change handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualOverrideConfig {
    /// Divergence from the last applied target that counts as a manual change (°C)
    pub epsilon: f64,
    /// How long automatic adjustment stays suppressed after a manual change
    pub hold_minutes: u32,
}

impl Default for ManualOverrideConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.1,
            hold_minutes: 240,
        }
    }
}

impl HeatConfig {
    /// Parsed timezone
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Unknown timezone '{}': {e}", self.timezone))
    }

    /// Validate configuration, failing on the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.device_id.trim().is_empty() {
            anyhow::bail!("device_id cannot be empty");
        }
        self.tz()?;

        validate_thresholds(
            "price",
            self.price.cheap_threshold,
            self.price.expensive_threshold,
        )?;
        if self.price.max_age_minutes == 0 {
            anyhow::bail!("price.max_age_minutes must be positive");
        }

        self.zones.primary.validate("primary", &self.price)?;
        if let Some(secondary) = &self.zones.secondary {
            secondary.validate("secondary", &self.price)?;
        }
        if let Some(tank) = &self.zones.tank {
            tank.validate("tank", &self.price)?;
        }

        let cop = &self.cop;
        if !(cop.min_valid_cop > 0.0 && cop.min_valid_cop < cop.max_valid_cop) {
            anyhow::bail!("cop: min_valid_cop must be positive and below max_valid_cop");
        }
        if !(0.0 <= cop.low_percentile
            && cop.low_percentile < cop.high_percentile
            && cop.high_percentile <= 1.0)
        {
            anyhow::bail!("cop: percentile window must satisfy 0 <= low < high <= 1");
        }

        let thermal = &self.thermal;
        if !(HEATING_RATE_BOUNDS.0..=HEATING_RATE_BOUNDS.1).contains(&thermal.initial_heating_rate)
        {
            anyhow::bail!(
                "thermal.initial_heating_rate must be between {} and {} °C/h",
                HEATING_RATE_BOUNDS.0,
                HEATING_RATE_BOUNDS.1
            );
        }
        if !(COOLING_RATE_BOUNDS.0..=COOLING_RATE_BOUNDS.1).contains(&thermal.initial_cooling_rate)
        {
            anyhow::bail!(
                "thermal.initial_cooling_rate must be between {} and {} per hour",
                COOLING_RATE_BOUNDS.0,
                COOLING_RATE_BOUNDS.1
            );
        }
        if thermal.sample_window < 24 {
            anyhow::bail!("thermal.sample_window must hold at least 24 samples");
        }

        let breaker = &self.breaker;
        if breaker.failure_threshold == 0 || breaker.half_open_success_threshold == 0 {
            anyhow::bail!("breaker thresholds must be at least 1");
        }
        if breaker.reset_timeout_secs == 0 || breaker.call_timeout_secs == 0 {
            anyhow::bail!("breaker timeouts must be positive");
        }
        if breaker.max_attempts == 0 {
            anyhow::bail!("breaker.max_attempts must be at least 1");
        }

        if self.schedule.cycle_minute > 59 {
            anyhow::bail!("schedule.cycle_minute must be between 0 and 59");
        }
        if self.schedule.calibration_hour > 23 {
            anyhow::bail!("schedule.calibration_hour must be between 0 and 23");
        }
        if self.schedule.max_concurrent_manual_jobs == 0 {
            anyhow::bail!("schedule.max_concurrent_manual_jobs must be at least 1");
        }

        if !(self.manual_override.epsilon > 0.0) {
            anyhow::bail!("manual_override.epsilon must be positive");
        }

        Ok(())
    }
}
