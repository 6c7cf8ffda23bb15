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

//! Price-aware heating decision engine.
//!
//! One cycle reads telemetry, prices and weather through circuit breakers,
//! turns them into one [`Decision`] per controlled zone and writes all
//! setpoint changes to the device in a single call. Learned state (COP range,
//! thermal model, last applied targets) is owned here and persisted through
//! the settings port.

use chrono::{DateTime, Duration, Utc};
use fluxion_heat_types::{
    Decision, DecisionAction, HeatConfig, PriceData, SetpointRequest, Telemetry,
    ThermalCharacteristics, ThermalDataPoint, ThermalStrategy, WeatherSample, Zone, ZoneConfig,
    ZoneReading,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::cop_range::{CopRange, CopRangeLearner};
use crate::error::{HeatError, Result};
use crate::manual_change::{ManualChangeDetector, ManualOverrideTracker, OverrideStatus};
use crate::pricing;
use crate::settings::{SettingsKeys, SettingsStore, load_json, save_json};
use crate::strategy::{self, EFFICIENCY_BOOST_REASON, StrategyContext, ThermalMassStrategy};
use crate::thermal_model::ThermalModel;
use crate::traits::{DeviceApi, PriceProvider, RequestContext, WeatherProvider, WriteOutcome};

pub const REASON_PRICE_OUTAGE: &str = "price outage";
pub const REASON_NO_PRICE_DATA: &str = "no price data";
pub const REASON_FLAT_PRICES: &str = "Flat prices";
pub const REASON_MANUAL_CHANGE: &str = "manual change detected";
pub const REASON_WRITE_FAILED: &str = "device write failed";
pub const REASON_DEVICE_UNAVAILABLE: &str = "device unavailable";
pub const REASON_INVALID_TELEMETRY: &str = "invalid telemetry";

/// External ports the engine talks to
#[derive(Debug, Clone)]
pub struct EngineCollaborators {
    pub device: Arc<dyn DeviceApi>,
    pub prices: Arc<dyn PriceProvider>,
    pub weather: Option<Arc<dyn WeatherProvider>>,
    pub settings: Arc<dyn SettingsStore>,
}

/// Everything one decision pass looks at
#[derive(Debug, Clone)]
pub struct DecisionContext {
    pub telemetry: Telemetry,
    /// `None` when the price fetch failed or its circuit is open
    pub prices: Option<PriceData>,
    pub weather: Option<WeatherSample>,
    pub occupied: bool,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleStatus {
    Completed,
    Failed { reason: String },
}

/// Outcome of one optimization cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub decisions: Vec<Decision>,
    pub status: CycleStatus,
    /// Token of the device write, if one was attempted
    pub write_token: Option<Uuid>,
}

impl CycleReport {
    fn completed(decisions: Vec<Decision>, write_token: Option<Uuid>) -> Self {
        Self {
            decisions,
            status: CycleStatus::Completed,
            write_token,
        }
    }

    fn failed(decisions: Vec<Decision>, reason: String, write_token: Option<Uuid>) -> Self {
        Self {
            decisions,
            status: CycleStatus::Failed { reason },
            write_token,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, CycleStatus::Failed { .. })
    }
}

/// What the engine remembers about a zone between cycles
#[derive(Debug, Clone, Copy, Default)]
struct ZoneMemory {
    last_applied: Option<f64>,
    last_change: Option<DateTime<Utc>>,
}

/// Round to the zone's step while staying inside the band
fn quantize(value: f64, step: f64, min: f64, max: f64) -> f64 {
    let clamped = value.clamp(min, max);
    let mut rounded = (clamped / step).round() * step;
    if rounded > max + 1e-9 {
        rounded -= step;
    }
    if rounded < min - 1e-9 {
        rounded += step;
    }
    rounded.clamp(min, max)
}

#[derive(Debug)]
pub struct DecisionEngine {
    config: HeatConfig,
    keys: SettingsKeys,
    collaborators: EngineCollaborators,
    cop: CopRangeLearner,
    thermal: ThermalModel,
    strategy: ThermalMassStrategy,
    detector: ManualChangeDetector,
    overrides: HashMap<Zone, ManualOverrideTracker>,
    device_breaker: CircuitBreaker,
    price_breaker: CircuitBreaker,
    weather_breaker: CircuitBreaker,
    occupied: bool,
}

impl DecisionEngine {
    /// Validate the configuration and restore persisted state
    pub fn new(config: HeatConfig, collaborators: EngineCollaborators) -> Result<Self> {
        config
            .validate()
            .map_err(|e| HeatError::Validation(format!("{e:#}")))?;

        let keys = SettingsKeys::new(&config.device_id);
        let store = Arc::clone(&collaborators.settings);
        let cop = CopRangeLearner::new(config.cop.clone(), Arc::clone(&store), keys.cop_range());
        let thermal = ThermalModel::new(&config.thermal, Arc::clone(&store), &keys);
        let occupied = load_json::<bool>(store.as_ref(), &keys.occupied()).unwrap_or(true);

        let overrides = Zone::all()
            .iter()
            .map(|zone| (*zone, ManualOverrideTracker::new(&config.manual_override)))
            .collect();

        info!(
            device_id = %config.device_id,
            device = collaborators.device.name(),
            prices = collaborators.prices.name(),
            weather = collaborators.weather.as_ref().map_or("none", |w| w.name()),
            occupied,
            "Decision engine initialized"
        );

        Ok(Self {
            strategy: ThermalMassStrategy::new(config.thermal.clone()),
            detector: ManualChangeDetector::new(config.manual_override.epsilon),
            device_breaker: CircuitBreaker::new("device", &config.breaker),
            price_breaker: CircuitBreaker::new("price", &config.breaker),
            weather_breaker: CircuitBreaker::new("weather", &config.breaker),
            config,
            keys,
            collaborators,
            cop,
            thermal,
            overrides,
            occupied,
        })
    }

    pub fn config(&self) -> &HeatConfig {
        &self.config
    }

    pub fn cop_range(&self) -> &CopRange {
        self.cop.range()
    }

    pub fn thermal_model(&self) -> &ThermalModel {
        &self.thermal
    }

    pub fn is_occupied(&self) -> bool {
        self.occupied
    }

    pub fn breaker_states(&self) -> [(&str, CircuitState); 3] {
        [
            (self.device_breaker.name(), self.device_breaker.state()),
            (self.price_breaker.name(), self.price_breaker.state()),
            (self.weather_breaker.name(), self.weather_breaker.state()),
        ]
    }

    /// Switch between comfort band and away setback
    pub fn set_occupancy(&mut self, occupied: bool) -> Result<()> {
        save_json(self.store(), &self.keys.occupied(), &occupied)?;
        if self.occupied != occupied {
            info!(occupied, "Occupancy changed");
        }
        self.occupied = occupied;
        Ok(())
    }

    /// Weekly thermal calibration over the stored sample window
    pub fn calibrate(&mut self) -> ThermalCharacteristics {
        self.thermal.calibrate()
    }

    /// Cancel breaker timers
    pub fn shutdown(&self) {
        self.device_breaker.shutdown();
        self.price_breaker.shutdown();
        self.weather_breaker.shutdown();
        info!("Decision engine shut down");
    }

    fn store(&self) -> &dyn SettingsStore {
        self.collaborators.settings.as_ref()
    }

    fn zone_memory(&self, zone: Zone) -> ZoneMemory {
        let last_applied = load_json::<f64>(self.store(), &self.keys.last_applied_target(zone))
            .filter(|t| t.is_finite());
        let last_change =
            load_json::<i64>(self.store(), &self.keys.last_setpoint_change_ms(zone))
                .and_then(DateTime::from_timestamp_millis);
        ZoneMemory {
            last_applied,
            last_change,
        }
    }

    fn remember_applied(&self, zone: Zone, target_c: f64) {
        if let Err(e) = save_json(self.store(), &self.keys.last_applied_target(zone), &target_c) {
            warn!(zone = %zone, "Failed to persist last applied target: {e}");
        }
    }

    /// Decide every controlled zone from one context
    ///
    /// The observed COP in the context is fed to the COP learner, so a context
    /// should be decided once.
    pub fn decide(&mut self, ctx: &DecisionContext) -> Vec<Decision> {
        let accepted_cop = ctx
            .telemetry
            .observed_cop
            .filter(|cop| self.cop.update(*cop));

        let outage = match &ctx.prices {
            None => true,
            Some(data) => pricing::is_stale(data, ctx.now, self.config.price.max_age_minutes),
        };
        if outage {
            warn!("Price data missing or stale, holding all zones");
        }

        let mut decisions = Vec::new();
        for &zone in Zone::all() {
            let Some(zone_config) = self.config.zones.get(zone).cloned() else {
                continue;
            };
            let Some(reading) = ctx.telemetry.reading(zone) else {
                debug!(zone = %zone, "Zone configured but not reported by device");
                continue;
            };
            let decision = self.decide_zone(zone, &zone_config, &reading, ctx, outage, accepted_cop);
            info!(
                zone = %zone,
                action = ?decision.action,
                target = ?decision.to_temperature_c,
                reason = %decision.reason,
                "Zone decision"
            );
            decisions.push(decision);
        }
        decisions
    }

    fn decide_zone(
        &mut self,
        zone: Zone,
        zone_config: &ZoneConfig,
        reading: &ZoneReading,
        ctx: &DecisionContext,
        outage: bool,
        accepted_cop: Option<f64>,
    ) -> Decision {
        let current = reading.current_target_c();
        let measured = reading.measured_temperature_c();
        let memory = self.zone_memory(zone);

        if !current.is_finite() || !measured.is_finite() {
            let err = HeatError::DataQuality(format!(
                "non-finite reading (target {current}, measured {measured})"
            ));
            warn!(zone = %zone, "Ignoring zone reading: {err}");
            return Decision::hold(zone, memory.last_applied, REASON_INVALID_TELEMETRY);
        }

        if outage {
            return Decision::hold(
                zone,
                Some(memory.last_applied.unwrap_or(current)),
                REASON_PRICE_OUTAGE,
            );
        }

        let (cheap, expensive) = zone_config.thresholds(&self.config.price);
        let Some(analysis) = ctx
            .prices
            .as_ref()
            .and_then(|data| pricing::analyze(data, cheap, expensive))
        else {
            return Decision::hold(zone, Some(current), REASON_NO_PRICE_DATA);
        };

        let outdoor = ctx.weather.map(|w| w.outdoor_temperature_c);
        let evaluation = self.strategy.evaluate(&StrategyContext {
            zone,
            zone_config,
            analysis: &analysis,
            cheap_threshold: cheap,
            expensive_threshold: expensive,
            measured_c: measured,
            current_target_c: current,
            outdoor_c: outdoor,
            weather: ctx.weather.as_ref(),
            occupied: ctx.occupied,
            projected_cop: strategy::projected_cop(accepted_cop, outdoor, zone),
            thermal_model: &self.thermal,
            cop_learner: &self.cop,
        });

        let label = if analysis.is_flat {
            REASON_FLAT_PRICES
        } else {
            analysis.level.reason_label()
        };
        let mut reason = format!("{label}, {}", evaluation.detail);
        if evaluation.efficiency_boost {
            reason.push_str(", ");
            reason.push_str(EFFICIENCY_BOOST_REASON);
        }

        let (comfort_min, comfort_max) = zone_config.comfort_band(ctx.occupied);
        let target = quantize(evaluation.target_c, zone_config.step_c, comfort_min, comfort_max);

        let detected = self.detector.detect(memory.last_applied, current, Some(target));
        let status = self
            .overrides
            .get_mut(&zone)
            .map_or(OverrideStatus::Inactive, |tracker| {
                tracker.observe(detected, current, ctx.now)
            });
        match status {
            OverrideStatus::Active { setpoint_c, .. } => {
                return Decision::hold(zone, Some(setpoint_c), REASON_MANUAL_CHANGE).with_analysis(
                    evaluation.strategy,
                    analysis.level,
                    analysis.percentile,
                );
            }
            OverrideStatus::Expired { setpoint_c } => self.remember_applied(zone, setpoint_c),
            OverrideStatus::Inactive => {
                if self.detector.reached_choice(memory.last_applied, current, target) {
                    debug!(zone = %zone, setpoint = current, "Setpoint already at engine choice, adopting it");
                    self.remember_applied(zone, current);
                }
            }
        }

        let against_strategy = match evaluation.strategy {
            ThermalStrategy::Preheat => target <= current,
            ThermalStrategy::Coast => target >= current,
            ThermalStrategy::Maintain => false,
        };
        let debounce = Duration::minutes(i64::from(zone_config.min_change_interval_minutes));
        let decision = if against_strategy
            || (target - current).abs() < zone_config.min_change_c.max(1e-9)
        {
            Decision::hold(zone, Some(current), format!("{reason} (within deadband)"))
        } else if let Some(last_change) = memory.last_change
            && ctx.now - last_change < debounce
        {
            Decision::hold(zone, Some(current), format!("{reason} (debounce)"))
        } else {
            Decision::set_target(zone, target, reason)
        };
        decision.with_analysis(evaluation.strategy, analysis.level, analysis.percentile)
    }

    /// Hold every configured zone at its last known target
    fn hold_all(&self, reason: &str) -> Vec<Decision> {
        Zone::all()
            .iter()
            .filter(|zone| self.config.zones.get(**zone).is_some())
            .map(|zone| Decision::hold(*zone, self.zone_memory(*zone).last_applied, reason))
            .collect()
    }

    /// Run one full optimization cycle
    ///
    /// Never returns an error: failures end up as `Hold` decisions and a
    /// failed status.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        debug!(%now, "Starting heating cycle");

        let telemetry = match self
            .device_breaker
            .call_with_retry(|_| self.collaborators.device.get_device_state())
            .await
        {
            Ok(telemetry) => telemetry,
            Err(e) => {
                let err = HeatError::from(e);
                error!("Cannot read device state: {err}");
                return CycleReport::failed(
                    self.hold_all(REASON_DEVICE_UNAVAILABLE),
                    err.to_string(),
                    None,
                );
            }
        };

        let prices = match self
            .price_breaker
            .call_with_retry(|_| self.collaborators.prices.fetch_prices())
            .await
        {
            Ok(prices) => Some(prices),
            Err(e) => {
                warn!("Price data unavailable: {}", HeatError::from(e));
                None
            }
        };

        let weather = match &self.collaborators.weather {
            Some(provider) => match self
                .weather_breaker
                .call_with_retry(|_| provider.current_weather())
                .await
            {
                Ok(sample) => Some(sample),
                Err(e) => {
                    warn!("Weather unavailable, continuing without: {}", HeatError::from(e));
                    None
                }
            },
            None => None,
        };

        if let Some(sample) = weather {
            self.thermal.record_sample(ThermalDataPoint {
                timestamp: now,
                indoor_temperature_c: telemetry.indoor_temperature_c,
                outdoor_temperature_c: sample.outdoor_temperature_c,
                target_temperature_c: telemetry.current_target_temperature_c,
                heating_active: telemetry.heating_active,
                weather: Some(sample),
            });
        }

        let ctx = DecisionContext {
            telemetry,
            prices,
            weather,
            occupied: self.occupied,
            now,
        };
        let decisions = self.decide(&ctx);

        let request = SetpointRequest::from_decisions(&decisions);
        if request.is_empty() {
            return CycleReport::completed(decisions, None);
        }

        let token = Uuid::new_v4();
        let device = Arc::clone(&self.collaborators.device);
        let result = self
            .device_breaker
            .call_with_retry(|attempt| {
                let device = Arc::clone(&device);
                let request = request.clone();
                let context = RequestContext::new(token, attempt);
                async move { device.set_temperature(&request, &context).await }
            })
            .await;

        match result {
            Ok(outcome) => {
                if outcome == WriteOutcome::AlreadyApplied {
                    info!(%token, "Device had already applied this write");
                }
                for change in &request.changes {
                    self.remember_applied(change.zone, change.target_c);
                    if let Err(e) = save_json(
                        self.store(),
                        &self.keys.last_setpoint_change_ms(change.zone),
                        &now.timestamp_millis(),
                    ) {
                        warn!(zone = %change.zone, "Failed to persist change timestamp: {e}");
                    }
                }
                info!(
                    %token,
                    ?outcome,
                    changes = request.changes.len(),
                    "Setpoints written"
                );
                CycleReport::completed(decisions, Some(token))
            }
            Err(e) => {
                let err = HeatError::from(e);
                error!(%token, "Setpoint write failed: {err}");
                let reason = format!("{REASON_WRITE_FAILED}: {err}");
                let held = decisions
                    .into_iter()
                    .map(|decision| {
                        if decision.action != DecisionAction::SetTarget {
                            return decision;
                        }
                        let current = ctx
                            .telemetry
                            .reading(decision.zone)
                            .map(|r| r.current_target_c());
                        let mut held = Decision::hold(decision.zone, current, reason.clone());
                        held.strategy = decision.strategy;
                        held.price_level = decision.price_level;
                        held.percentile = decision.percentile;
                        held
                    })
                    .collect();
                CycleReport::failed(held, err.to_string(), Some(token))
            }
        }
    }
}
