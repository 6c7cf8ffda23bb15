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

//! Recorded inputs for offline replay and the collaborators that serve them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fluxion_heat_core::{DeviceApi, PriceProvider, RequestContext, WeatherProvider, WriteOutcome};
use fluxion_heat_types::{
    PriceData, PriceSample, SetpointRequest, Telemetry, WeatherSample, Zone, ZoneReading,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// One recorded cycle: what the device, price feed and weather reported
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Decision time, defaults to the current price sample's time
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
    pub telemetry: Telemetry,
    pub prices: PriceData,
    #[serde(default)]
    pub weather: Option<WeatherSample>,
    #[serde(default)]
    pub occupied: Option<bool>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse scenario {}", path.display()))
    }

    pub fn decision_time(&self) -> DateTime<Utc> {
        self.now.unwrap_or(self.prices.current.time)
    }
}

// ============= Replay collaborators =============

/// Device that serves recorded telemetry and applies writes to it
#[derive(Debug)]
pub struct RecordingDevice {
    telemetry: Mutex<Telemetry>,
    writes: Mutex<Vec<SetpointRequest>>,
}

impl RecordingDevice {
    pub fn new(telemetry: Telemetry) -> Self {
        Self {
            telemetry: Mutex::new(telemetry),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn telemetry(&self) -> Telemetry {
        self.telemetry.lock().clone()
    }

    /// Move the measured temperature of a zone
    pub fn set_measured(&self, zone: Zone, temperature_c: f64) {
        let mut telemetry = self.telemetry.lock();
        if zone == Zone::Primary {
            telemetry.indoor_temperature_c = temperature_c;
            return;
        }
        for reading in &mut telemetry.extra_zones {
            if reading.zone() != zone {
                continue;
            }
            match reading {
                ZoneReading::Primary {
                    indoor_temperature_c,
                    ..
                }
                | ZoneReading::Secondary {
                    indoor_temperature_c,
                    ..
                } => *indoor_temperature_c = temperature_c,
                ZoneReading::HotWaterTank {
                    tank_temperature_c, ..
                } => *tank_temperature_c = temperature_c,
            }
        }
    }

    pub fn set_heating_active(&self, active: bool) {
        self.telemetry.lock().heating_active = active;
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }
}

fn apply_target(telemetry: &mut Telemetry, zone: Zone, target_c: f64) {
    if zone == Zone::Primary {
        telemetry.current_target_temperature_c = target_c;
        return;
    }
    for reading in &mut telemetry.extra_zones {
        if reading.zone() != zone {
            continue;
        }
        match reading {
            ZoneReading::Primary {
                current_target_temperature_c,
                ..
            }
            | ZoneReading::Secondary {
                current_target_temperature_c,
                ..
            }
            | ZoneReading::HotWaterTank {
                current_target_temperature_c,
                ..
            } => *current_target_temperature_c = target_c,
        }
    }
}

#[async_trait]
impl DeviceApi for RecordingDevice {
    async fn get_device_state(&self) -> Result<Telemetry> {
        Ok(self.telemetry())
    }

    async fn set_temperature(
        &self,
        request: &SetpointRequest,
        context: &RequestContext,
    ) -> Result<WriteOutcome> {
        debug!(token = %context.token, attempt = context.attempt, "Replay write");
        let mut telemetry = self.telemetry.lock();
        for change in &request.changes {
            apply_target(&mut telemetry, change.zone, change.target_c);
        }
        self.writes.lock().push(request.clone());
        Ok(WriteOutcome::Applied)
    }

    fn name(&self) -> &str {
        "replay"
    }
}

/// Price feed over a recorded series whose current sample can be advanced
#[derive(Debug)]
pub struct RecordedPrices {
    data: Mutex<PriceData>,
}

impl RecordedPrices {
    pub fn new(data: PriceData) -> Self {
        Self {
            data: Mutex::new(data),
        }
    }

    /// Make `sample` the price in force
    pub fn set_current(&self, sample: PriceSample) {
        self.data.lock().current = sample;
    }
}

#[async_trait]
impl PriceProvider for RecordedPrices {
    async fn fetch_prices(&self) -> Result<PriceData> {
        Ok(self.data.lock().clone())
    }

    fn name(&self) -> &str {
        "recorded"
    }
}

#[derive(Debug)]
pub struct RecordedWeather(pub WeatherSample);

#[async_trait]
impl WeatherProvider for RecordedWeather {
    async fn current_weather(&self) -> Result<WeatherSample> {
        Ok(self.0)
    }

    fn name(&self) -> &str {
        "recorded"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fluxion_heat_types::SetpointChange;
    use uuid::Uuid;

    #[test]
    fn test_scenario_parses_minimal_json() {
        let json = r#"{
            "telemetry": {"indoor_temperature_c": 21.0, "current_target_temperature_c": 20.0},
            "prices": {
                "current": {"time": "2025-01-15T10:00:00Z", "price": 0.6},
                "prices": [{"time": "2025-01-15T10:00:00Z", "price": 0.6}]
            }
        }"#;
        let scenario: Scenario = serde_json::from_str(json).unwrap();
        assert!(scenario.weather.is_none());
        assert_eq!(scenario.decision_time(), scenario.prices.current.time);
    }

    #[tokio::test]
    async fn test_recording_device_applies_writes() {
        let mut telemetry = Telemetry::new(21.0, 20.0);
        telemetry.extra_zones.push(ZoneReading::HotWaterTank {
            tank_temperature_c: 46.0,
            current_target_temperature_c: 45.0,
        });
        let device = RecordingDevice::new(telemetry);
        let request = SetpointRequest {
            changes: vec![
                SetpointChange {
                    zone: Zone::Primary,
                    target_c: 21.5,
                },
                SetpointChange {
                    zone: Zone::HotWaterTank,
                    target_c: 50.0,
                },
            ],
        };

        device
            .set_temperature(&request, &RequestContext::new(Uuid::new_v4(), 1))
            .await
            .unwrap();

        let telemetry = device.telemetry();
        assert_eq!(telemetry.current_target_temperature_c, 21.5);
        assert_eq!(
            telemetry.reading(Zone::HotWaterTank).unwrap().current_target_c(),
            50.0
        );
        assert_eq!(device.write_count(), 1);
    }
}
