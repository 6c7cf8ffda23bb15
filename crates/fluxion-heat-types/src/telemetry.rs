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

use serde::{Deserialize, Serialize};

use crate::zone::Zone;

/// Current physical readings of a heat pump (vendor-agnostic)
///
/// The primary zone is always present. Optional capabilities are reported
/// through `extra_zones`, one variant per capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Measured room temperature of the primary zone (°C)
    pub indoor_temperature_c: f64,

    /// Setpoint currently configured on the device for the primary zone (°C)
    pub current_target_temperature_c: f64,

    /// Coefficient of performance reported by the device, if any
    #[serde(default)]
    pub observed_cop: Option<f64>,

    /// Whether the compressor is currently heating
    #[serde(default)]
    pub heating_active: bool,

    /// Optional zones (second circuit, hot water tank)
    #[serde(default)]
    pub extra_zones: Vec<ZoneReading>,
}

impl Telemetry {
    pub fn new(indoor_temperature_c: f64, current_target_temperature_c: f64) -> Self {
        Self {
            indoor_temperature_c,
            current_target_temperature_c,
            observed_cop: None,
            heating_active: false,
            extra_zones: Vec::new(),
        }
    }

    /// All zone readings including the primary zone, in evaluation order
    pub fn zone_readings(&self) -> Vec<ZoneReading> {
        let mut readings = Vec::with_capacity(1 + self.extra_zones.len());
        readings.push(ZoneReading::Primary {
            indoor_temperature_c: self.indoor_temperature_c,
            current_target_temperature_c: self.current_target_temperature_c,
        });
        readings.extend(self.extra_zones.iter().copied());
        readings
    }

    /// Reading for one zone, if the device exposes it
    pub fn reading(&self, zone: Zone) -> Option<ZoneReading> {
        self.zone_readings().into_iter().find(|r| r.zone() == zone)
    }
}

/// Reading of a single heating zone
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ZoneReading {
    Primary {
        indoor_temperature_c: f64,
        current_target_temperature_c: f64,
    },
    Secondary {
        indoor_temperature_c: f64,
        current_target_temperature_c: f64,
    },
    HotWaterTank {
        tank_temperature_c: f64,
        current_target_temperature_c: f64,
    },
}

impl ZoneReading {
    pub fn zone(&self) -> Zone {
        match self {
            Self::Primary { .. } => Zone::Primary,
            Self::Secondary { .. } => Zone::Secondary,
            Self::HotWaterTank { .. } => Zone::HotWaterTank,
        }
    }

    /// Measured temperature of the controlled medium (room air or tank water)
    pub fn measured_temperature_c(&self) -> f64 {
        match *self {
            Self::Primary {
                indoor_temperature_c,
                ..
            }
            | Self::Secondary {
                indoor_temperature_c,
                ..
            } => indoor_temperature_c,
            Self::HotWaterTank {
                tank_temperature_c, ..
            } => tank_temperature_c,
        }
    }

    pub fn current_target_c(&self) -> f64 {
        match *self {
            Self::Primary {
                current_target_temperature_c,
                ..
            }
            | Self::Secondary {
                current_target_temperature_c,
                ..
            }
            | Self::HotWaterTank {
                current_target_temperature_c,
                ..
            } => current_target_temperature_c,
        }
    }
}

/// Optional weather enrichment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherSample {
    pub outdoor_temperature_c: f64,
    #[serde(default)]
    pub wind_speed_ms: Option<f64>,
    #[serde(default)]
    pub humidity_percent: Option<f64>,
    #[serde(default)]
    pub cloud_cover_percent: Option<f64>,
}

impl WeatherSample {
    pub fn new(outdoor_temperature_c: f64) -> Self {
        Self {
            outdoor_temperature_c,
            wind_speed_ms: None,
            humidity_percent: None,
            cloud_cover_percent: None,
        }
    }

    /// Wind speed, treating missing or invalid readings as calm
    pub fn wind_or_calm(&self) -> f64 {
        self.wind_speed_ms
            .filter(|w| w.is_finite() && *w >= 0.0)
            .unwrap_or(0.0)
    }
}
