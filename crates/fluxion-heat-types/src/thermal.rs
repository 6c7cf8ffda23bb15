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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::telemetry::WeatherSample;

/// Physically plausible heating rate range (°C per hour at full output)
pub const HEATING_RATE_BOUNDS: (f64, f64) = (0.05, 5.0);

/// Physically plausible passive cooling constant range (per hour)
pub const COOLING_RATE_BOUNDS: (f64, f64) = (0.001, 0.5);

/// Learned thermal behaviour of the building
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThermalCharacteristics {
    /// Indoor temperature gain while heating (°C/h) in mild weather
    pub heating_rate: f64,

    /// Newton cooling constant toward outdoor temperature (1/h)
    pub cooling_rate: f64,

    /// Fractional slowdown of heating per °C of indoor-outdoor difference
    pub outdoor_temp_impact: f64,

    /// Fractional increase of cooling per m/s of wind
    pub wind_impact: f64,

    /// Resistance to temperature change, 0 = none, 1 = very heavy building
    pub thermal_mass: f64,

    /// Confidence in the learned values (0.0 - 1.0)
    pub model_confidence: f64,

    /// Timestamp of the newest data point used for calibration
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl ThermalCharacteristics {
    /// Thermal mass implied by a passive cooling constant
    pub fn thermal_mass_for(cooling_rate: f64) -> f64 {
        (1.0 - cooling_rate / COOLING_RATE_BOUNDS.1).clamp(0.0, 1.0)
    }

    /// Create uncalibrated characteristics from configured starting rates
    pub fn with_rates(heating_rate: f64, cooling_rate: f64) -> Self {
        Self {
            heating_rate,
            cooling_rate,
            thermal_mass: Self::thermal_mass_for(cooling_rate),
            ..Self::default()
        }
    }
}

impl Default for ThermalCharacteristics {
    fn default() -> Self {
        Self {
            heating_rate: 0.8,
            cooling_rate: 0.05,
            outdoor_temp_impact: 0.01,
            wind_impact: 0.02,
            thermal_mass: Self::thermal_mass_for(0.05),
            model_confidence: 0.0,
            last_updated: None,
        }
    }
}

/// One observation used to calibrate the thermal model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThermalDataPoint {
    pub timestamp: DateTime<Utc>,
    pub indoor_temperature_c: f64,
    pub outdoor_temperature_c: f64,
    pub target_temperature_c: f64,
    pub heating_active: bool,
    #[serde(default)]
    pub weather: Option<WeatherSample>,
}

/// Result of a time-to-target estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeToTarget {
    /// Minutes until the target is reached, `f64::INFINITY` when unreachable
    pub time_to_target_minutes: f64,
    /// Confidence of the estimate (0.0 - 1.0)
    pub confidence: f64,
    /// Temperature expected at the end of the estimate
    pub predicted_temperature: f64,
}

impl TimeToTarget {
    pub fn is_reachable(&self) -> bool {
        self.time_to_target_minutes.is_finite()
    }
}
