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

//! Lightweight thermal model of the building.
//!
//! Heating is modelled as a linear approach toward the setpoint whose rate
//! shrinks with the indoor/outdoor difference and wind. Passive periods follow
//! Newton's law of cooling toward the outdoor temperature. Both coefficients
//! are re-estimated weekly from the rolling window of hourly samples.

use chrono::{DateTime, Utc};
use fluxion_heat_types::{
    ThermalCharacteristics, ThermalConfig, ThermalDataPoint, TimeToTarget, WeatherSample,
    thermal::{COOLING_RATE_BOUNDS, HEATING_RATE_BOUNDS},
};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::settings::{SettingsKeys, SettingsStore, load_json, save_json};

/// Data points required before a calibration pass changes anything
pub const MIN_CALIBRATION_POINTS: usize = 24;

/// Data points at which a calibration pass earns full confidence weight
const FULL_CONFIDENCE_POINTS: f64 = 168.0;

const OUTDOOR_IMPACT_BOUNDS: (f64, f64) = (0.0, 0.1);
const WIND_IMPACT_BOUNDS: (f64, f64) = (0.0, 0.2);
const WEATHER_FACTOR_BOUNDS: (f64, f64) = (0.1, 1.5);

/// Pairs further apart than this are a gap in the data, not an observation
const MAX_PAIR_GAP_HOURS: f64 = 6.0;

/// Minimum pairs for a regression to count
const MIN_PAIRS: usize = 3;

#[derive(Debug, Clone, Copy)]
struct LinearFit {
    intercept: f64,
    slope: f64,
    /// Goodness of fit in [0, 1]
    r_squared: f64,
}

/// Ordinary least squares of `y = intercept + slope * x`
fn linear_fit(xs: &[f64], ys: &[f64]) -> Option<LinearFit> {
    if xs.len() != ys.len() || xs.len() < MIN_PAIRS {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        sxx += (x - mean_x).powi(2);
        sxy += (x - mean_x) * (y - mean_y);
        syy += (y - mean_y).powi(2);
    }

    // No spread in x: the best we can do is the mean, scored by its consistency
    if sxx < 1e-9 {
        let spread = if mean_y.abs() > f64::EPSILON {
            (syy / n).sqrt() / mean_y.abs()
        } else {
            1.0
        };
        return Some(LinearFit {
            intercept: mean_y,
            slope: 0.0,
            r_squared: (1.0 - spread).clamp(0.0, 1.0),
        });
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let r_squared = if syy < 1e-12 {
        1.0
    } else {
        (sxy * sxy / (sxx * syy)).clamp(0.0, 1.0)
    };

    Some(LinearFit {
        intercept,
        slope,
        r_squared,
    })
}

fn hours_between(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    (b - a).num_seconds() as f64 / 3600.0
}

fn wind_of(weather: Option<&WeatherSample>) -> f64 {
    weather.map_or(0.0, WeatherSample::wind_or_calm)
}

/// Thermal model with its calibration window
#[derive(Debug)]
pub struct ThermalModel {
    characteristics: ThermalCharacteristics,
    samples: VecDeque<ThermalDataPoint>,
    sample_window: usize,
    store: Arc<dyn SettingsStore>,
    characteristics_key: String,
    samples_key: String,
}

impl ThermalModel {
    /// Create the model, restoring persisted characteristics and samples
    pub fn new(config: &ThermalConfig, store: Arc<dyn SettingsStore>, keys: &SettingsKeys) -> Self {
        let characteristics_key = keys.thermal_characteristics();
        let samples_key = keys.thermal_samples();

        let initial = ThermalCharacteristics::with_rates(
            config.initial_heating_rate,
            config.initial_cooling_rate,
        );
        let characteristics =
            match load_json::<ThermalCharacteristics>(store.as_ref(), &characteristics_key) {
                Some(restored) if Self::is_plausible(&restored) => {
                    info!(
                        heating_rate = restored.heating_rate,
                        cooling_rate = restored.cooling_rate,
                        confidence = restored.model_confidence,
                        "Restored thermal characteristics"
                    );
                    restored
                }
                Some(_) => {
                    warn!("Stored thermal characteristics out of bounds, starting uncalibrated");
                    initial
                }
                None => initial,
            };

        let mut samples: VecDeque<ThermalDataPoint> =
            load_json(store.as_ref(), &samples_key).unwrap_or_default();
        while samples.len() > config.sample_window {
            samples.pop_front();
        }
        if !samples.is_empty() {
            debug!(count = samples.len(), "Restored thermal samples");
        }

        Self {
            characteristics,
            samples,
            sample_window: config.sample_window,
            store,
            characteristics_key,
            samples_key,
        }
    }

    fn is_plausible(c: &ThermalCharacteristics) -> bool {
        let within = |v: f64, (lo, hi): (f64, f64)| v.is_finite() && v >= lo && v <= hi;
        within(c.heating_rate, HEATING_RATE_BOUNDS)
            && within(c.cooling_rate, COOLING_RATE_BOUNDS)
            && within(c.outdoor_temp_impact, OUTDOOR_IMPACT_BOUNDS)
            && within(c.wind_impact, WIND_IMPACT_BOUNDS)
            && within(c.model_confidence, (0.0, 1.0))
    }

    pub fn characteristics(&self) -> &ThermalCharacteristics {
        &self.characteristics
    }

    pub fn samples(&self) -> &VecDeque<ThermalDataPoint> {
        &self.samples
    }

    /// Append one observation to the rolling calibration window
    pub fn record_sample(&mut self, point: ThermalDataPoint) {
        if !point.indoor_temperature_c.is_finite() || !point.outdoor_temperature_c.is_finite() {
            warn!("Skipping thermal sample with non-finite temperature");
            return;
        }
        self.samples.push_back(point);
        while self.samples.len() > self.sample_window {
            self.samples.pop_front();
        }
        if let Err(e) = save_json(self.store.as_ref(), &self.samples_key, &self.samples) {
            warn!("Failed to persist thermal samples: {e}");
        }
    }

    /// Recalibrate from the rolling sample window
    pub fn calibrate(&mut self) -> ThermalCharacteristics {
        let points: Vec<ThermalDataPoint> = self.samples.iter().copied().collect();
        self.update_model(&points)
    }

    /// Re-estimate the characteristics from a series of observations
    pub fn update_model(&mut self, points: &[ThermalDataPoint]) -> ThermalCharacteristics {
        if points.len() < MIN_CALIBRATION_POINTS {
            info!(
                points = points.len(),
                required = MIN_CALIBRATION_POINTS,
                "Thermal calibration skipped, not enough data points"
            );
            return self.characteristics;
        }

        let mut sorted = points.to_vec();
        sorted.sort_by_key(|p| p.timestamp);

        let mut heat_x = Vec::new();
        let mut heat_y = Vec::new();
        let mut cool_x = Vec::new();
        let mut cool_y = Vec::new();

        for pair in sorted.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let dt = hours_between(a.timestamp, b.timestamp);
            if dt <= 0.0 || dt > MAX_PAIR_GAP_HOURS {
                continue;
            }

            if a.heating_active && a.indoor_temperature_c < a.target_temperature_c {
                let rate = (b.indoor_temperature_c - a.indoor_temperature_c) / dt;
                if rate.is_finite() {
                    heat_x.push(a.indoor_temperature_c - a.outdoor_temperature_c);
                    heat_y.push(rate);
                }
            } else if !a.heating_active {
                let start = a.indoor_temperature_c - a.outdoor_temperature_c;
                let end = b.indoor_temperature_c - a.outdoor_temperature_c;
                if start > 0.5 && end > 0.0 {
                    let k = -(end / start).ln() / dt;
                    if k.is_finite() && k >= 0.0 {
                        cool_x.push(wind_of(a.weather.as_ref()));
                        cool_y.push(k);
                    }
                }
            }
        }

        let old = self.characteristics;
        let blend = 1.0 - 0.5 * old.model_confidence;
        let mix = |prior: f64, estimate: f64| blend * estimate + (1.0 - blend) * prior;
        let mut updated = old;
        let mut fits = Vec::with_capacity(2);

        if let Some(fit) = linear_fit(&heat_x, &heat_y)
            && fit.intercept > 0.0
        {
            let rate = fit.intercept.clamp(HEATING_RATE_BOUNDS.0, HEATING_RATE_BOUNDS.1);
            let impact = (-fit.slope / fit.intercept)
                .clamp(OUTDOOR_IMPACT_BOUNDS.0, OUTDOOR_IMPACT_BOUNDS.1);
            updated.heating_rate = mix(old.heating_rate, rate);
            updated.outdoor_temp_impact = mix(old.outdoor_temp_impact, impact);
            fits.push(fit.r_squared);
            debug!(
                pairs = heat_x.len(),
                rate,
                impact,
                r2 = fit.r_squared,
                "Heating regression"
            );
        }

        if let Some(fit) = linear_fit(&cool_x, &cool_y)
            && fit.intercept > 0.0
        {
            let rate = fit.intercept.clamp(COOLING_RATE_BOUNDS.0, COOLING_RATE_BOUNDS.1);
            let wind = (fit.slope / fit.intercept).clamp(WIND_IMPACT_BOUNDS.0, WIND_IMPACT_BOUNDS.1);
            updated.cooling_rate = mix(old.cooling_rate, rate);
            updated.wind_impact = mix(old.wind_impact, wind);
            fits.push(fit.r_squared);
            debug!(
                pairs = cool_x.len(),
                rate,
                wind,
                r2 = fit.r_squared,
                "Cooling regression"
            );
        }

        updated.thermal_mass = ThermalCharacteristics::thermal_mass_for(updated.cooling_rate);

        if !fits.is_empty() {
            let fit = (fits.iter().sum::<f64>() / fits.len() as f64).clamp(0.0, 1.0);
            let coverage = (sorted.len() as f64 / FULL_CONFIDENCE_POINTS).min(1.0);
            updated.model_confidence = (old.model_confidence
                + (1.0 - old.model_confidence) * coverage * fit)
                .clamp(0.0, 1.0);
        }
        updated.last_updated = sorted.last().map(|p| p.timestamp);

        info!(
            points = sorted.len(),
            heating_rate = updated.heating_rate,
            cooling_rate = updated.cooling_rate,
            thermal_mass = updated.thermal_mass,
            confidence = updated.model_confidence,
            "Thermal model calibrated"
        );

        self.characteristics = updated;
        if let Err(e) = save_json(
            self.store.as_ref(),
            &self.characteristics_key,
            &self.characteristics,
        ) {
            warn!("Failed to persist thermal characteristics: {e}");
        }
        self.characteristics
    }

    /// Heating rate adjusted for outdoor difference and wind (°C/h)
    fn effective_heating_rate(&self, current: f64, outdoor: f64, wind: f64) -> f64 {
        let c = &self.characteristics;
        let factor = (1.0
            - c.outdoor_temp_impact * (current - outdoor).max(0.0)
            - c.wind_impact * wind)
            .clamp(WEATHER_FACTOR_BOUNDS.0, WEATHER_FACTOR_BOUNDS.1);
        c.heating_rate * factor
    }

    /// Passive decay constant (1/h)
    fn effective_cooling_rate(&self, wind: f64) -> f64 {
        let c = &self.characteristics;
        c.cooling_rate * (1.0 + c.wind_impact * wind)
    }

    /// Temperature expected after `minutes`
    pub fn predict_temperature(
        &self,
        current: f64,
        target: f64,
        outdoor: f64,
        heating_active: bool,
        weather: Option<&WeatherSample>,
        minutes: f64,
    ) -> f64 {
        if minutes <= 0.0 || !minutes.is_finite() {
            return current;
        }
        let hours = minutes / 60.0;
        let wind = wind_of(weather);

        if heating_active && target > current {
            let rate = self.effective_heating_rate(current, outdoor, wind);
            return (current + rate * hours).min(target);
        }

        let k = self.effective_cooling_rate(wind);
        let passive = outdoor + (current - outdoor) * (-k * hours).exp();
        if heating_active {
            // Heat pump keeps the room from dropping below its setpoint
            passive.max(target.min(current))
        } else {
            passive
        }
    }

    /// Time needed to reach `target` from `current`
    pub fn calculate_time_to_target(
        &self,
        current: f64,
        target: f64,
        outdoor: f64,
        weather: Option<&WeatherSample>,
    ) -> TimeToTarget {
        if (target - current).abs() < 1e-9 {
            return TimeToTarget {
                time_to_target_minutes: 0.0,
                confidence: 1.0,
                predicted_temperature: current,
            };
        }

        let wind = wind_of(weather);
        let confidence = (0.3 + 0.7 * self.characteristics.model_confidence).clamp(0.0, 1.0);

        if target > current {
            let rate = self.effective_heating_rate(current, outdoor, wind);
            return TimeToTarget {
                time_to_target_minutes: (target - current) / rate * 60.0,
                confidence,
                predicted_temperature: target,
            };
        }

        // Cooling only happens passively and never goes below outdoor
        if target <= outdoor {
            return TimeToTarget {
                time_to_target_minutes: f64::INFINITY,
                confidence,
                predicted_temperature: outdoor.min(current),
            };
        }

        let k = self.effective_cooling_rate(wind);
        let hours = ((current - outdoor) / (target - outdoor)).ln() / k;
        TimeToTarget {
            time_to_target_minutes: hours * 60.0,
            confidence,
            predicted_temperature: target,
        }
    }
}
