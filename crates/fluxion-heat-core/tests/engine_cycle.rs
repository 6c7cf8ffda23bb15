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

//! Full optimization cycles against in-memory collaborators.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use fluxion_heat_core::{
    CopRange, CycleRunner, DecisionEngine, DeviceApi, EngineCollaborators, HeatError,
    MemorySettingsStore, PriceProvider, RequestContext, SettingsKeys, SettingsStore,
    WeatherProvider, WriteOutcome, load_json, save_json,
};
use fluxion_heat_types::{
    DecisionAction, HeatConfig, PriceData, PriceLevel, PriceSample, SetpointRequest, Telemetry,
    ThermalStrategy, WeatherSample, Zone, ZoneConfig, ZoneReading,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

const PRICES: [f64; 8] = [0.60, 0.50, 1.20, 0.80, 2.50, 0.40, 1.50, 0.70];

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 10, 5, 0).unwrap()
}

fn price_data(current: f64, series: &[f64]) -> PriceData {
    price_data_at(Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap(), current, series)
}

fn price_data_at(start: DateTime<Utc>, current: f64, series: &[f64]) -> PriceData {
    let prices = series
        .iter()
        .enumerate()
        .map(|(i, p)| PriceSample::new(start + Duration::hours(i as i64), *p))
        .collect();
    PriceData::new(PriceSample::new(start, current), prices)
}

// ============= Mock collaborators =============

#[derive(Debug)]
struct MockDevice {
    telemetry: Mutex<Telemetry>,
    fail_writes: Mutex<bool>,
    /// Apply the next write but report a failure, as if the reply got lost
    lose_next_reply: Mutex<bool>,
    applied_tokens: Mutex<Vec<Uuid>>,
    writes: Mutex<Vec<(SetpointRequest, RequestContext)>>,
    /// When set, state reads signal `entered` and wait for `gate`
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl MockDevice {
    fn new(telemetry: Telemetry) -> Self {
        Self {
            telemetry: Mutex::new(telemetry),
            fail_writes: Mutex::new(false),
            lose_next_reply: Mutex::new(false),
            applied_tokens: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    fn failing(telemetry: Telemetry) -> Self {
        Self {
            fail_writes: Mutex::new(true),
            ..Self::new(telemetry)
        }
    }

    fn set_telemetry(&self, telemetry: Telemetry) {
        *self.telemetry.lock() = telemetry;
    }

    fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }

    fn writes(&self) -> Vec<(SetpointRequest, RequestContext)> {
        self.writes.lock().clone()
    }

    fn applied_count(&self) -> usize {
        self.applied_tokens.lock().len()
    }
}

#[async_trait]
impl DeviceApi for MockDevice {
    async fn get_device_state(&self) -> Result<Telemetry> {
        if let Some((entered, gate)) = &self.gate {
            entered.notify_one();
            gate.notified().await;
        }
        Ok(self.telemetry.lock().clone())
    }

    async fn set_temperature(
        &self,
        request: &SetpointRequest,
        context: &RequestContext,
    ) -> Result<WriteOutcome> {
        self.writes.lock().push((request.clone(), *context));
        if *self.fail_writes.lock() {
            anyhow::bail!("connection reset by peer");
        }
        {
            let mut applied = self.applied_tokens.lock();
            if applied.contains(&context.token) {
                return Ok(WriteOutcome::AlreadyApplied);
            }
            applied.push(context.token);
        }
        if std::mem::take(&mut *self.lose_next_reply.lock()) {
            anyhow::bail!("response timed out");
        }
        Ok(WriteOutcome::Applied)
    }

    fn name(&self) -> &str {
        "mock-device"
    }
}

#[derive(Debug)]
struct MockPrices {
    data: Mutex<Option<PriceData>>,
}

impl MockPrices {
    fn new(data: PriceData) -> Self {
        Self {
            data: Mutex::new(Some(data)),
        }
    }

    fn unavailable() -> Self {
        Self {
            data: Mutex::new(None),
        }
    }

    fn set(&self, data: PriceData) {
        *self.data.lock() = Some(data);
    }
}

#[async_trait]
impl PriceProvider for MockPrices {
    async fn fetch_prices(&self) -> Result<PriceData> {
        self.data
            .lock()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("price feed returned 503"))
    }

    fn name(&self) -> &str {
        "mock-prices"
    }
}

#[derive(Debug)]
struct MockWeather(WeatherSample);

#[async_trait]
impl WeatherProvider for MockWeather {
    async fn current_weather(&self) -> Result<WeatherSample> {
        Ok(self.0)
    }

    fn name(&self) -> &str {
        "mock-weather"
    }
}

struct Harness {
    engine: DecisionEngine,
    device: Arc<MockDevice>,
    prices: Arc<MockPrices>,
    store: Arc<MemorySettingsStore>,
    keys: SettingsKeys,
}

fn harness_with(config: HeatConfig, device: MockDevice, prices: MockPrices) -> Harness {
    harness_on(Arc::new(MemorySettingsStore::new()), config, device, prices)
}

fn harness_on(
    store: Arc<MemorySettingsStore>,
    config: HeatConfig,
    device: MockDevice,
    prices: MockPrices,
) -> Harness {
    let device = Arc::new(device);
    let prices = Arc::new(prices);
    let keys = SettingsKeys::new(&config.device_id);
    let collaborators = EngineCollaborators {
        device: Arc::clone(&device) as Arc<dyn DeviceApi>,
        prices: Arc::clone(&prices) as Arc<dyn PriceProvider>,
        weather: None,
        settings: Arc::clone(&store) as Arc<dyn SettingsStore>,
    };
    let engine = DecisionEngine::new(config, collaborators).unwrap();
    Harness {
        engine,
        device,
        prices,
        store,
        keys,
    }
}

fn harness(telemetry: Telemetry, prices: PriceData) -> Harness {
    harness_with(
        HeatConfig::default(),
        MockDevice::new(telemetry),
        MockPrices::new(prices),
    )
}

// ============= Price-driven decisions =============

#[tokio::test]
async fn test_cheap_hour_raises_target() {
    let mut h = harness(Telemetry::new(21.0, 20.0), price_data(0.60, &PRICES));

    let report = h.engine.run_cycle(now()).await;

    assert!(!report.is_failed());
    assert_eq!(report.decisions.len(), 1);
    let decision = &report.decisions[0];
    assert_eq!(decision.zone, Zone::Primary);
    assert_eq!(decision.action, DecisionAction::SetTarget);
    assert!(decision.to_temperature_c.unwrap() > 20.0);
    assert!(decision.to_temperature_c.unwrap() <= 23.0);
    assert_eq!(decision.percentile, Some(0.375));
    assert_eq!(decision.price_level, Some(PriceLevel::Cheap));
    assert_eq!(decision.strategy, Some(ThermalStrategy::Preheat));
    assert!(decision.reason.starts_with("Cheaper hour"));
}

#[tokio::test]
async fn test_expensive_hour_lowers_target_within_band() {
    let mut h = harness(Telemetry::new(21.0, 21.0), price_data(2.20, &PRICES));

    let report = h.engine.run_cycle(now()).await;

    let decision = &report.decisions[0];
    assert_eq!(decision.percentile, Some(0.875));
    assert_eq!(decision.price_level, Some(PriceLevel::Expensive));
    assert_eq!(decision.action, DecisionAction::SetTarget);
    let target = decision.to_temperature_c.unwrap();
    assert!(target < 21.0);
    assert!(target >= 18.0);
    assert!(decision.reason.starts_with("Expensive hour"));
}

#[tokio::test]
async fn test_most_expensive_hour_is_top_percentile() {
    let series = [0.60, 0.50, 1.20, 0.80, 2.20, 0.40, 1.50, 0.70];
    let mut h = harness(Telemetry::new(21.0, 21.0), price_data(2.20, &series));

    let report = h.engine.run_cycle(now()).await;

    let decision = &report.decisions[0];
    assert_eq!(decision.percentile, Some(1.0));
    assert_eq!(decision.strategy, Some(ThermalStrategy::Coast));
    assert!(decision.to_temperature_c.unwrap() < 21.0);
}

#[tokio::test]
async fn test_cheap_hour_never_lowers_a_high_setpoint() {
    let mut h = harness(Telemetry::new(21.0, 22.0), price_data(0.60, &PRICES));

    let report = h.engine.run_cycle(now()).await;

    let decision = &report.decisions[0];
    assert_eq!(decision.price_level, Some(PriceLevel::Cheap));
    assert_eq!(decision.action, DecisionAction::Hold);
    assert_eq!(decision.to_temperature_c, Some(22.0));
    assert!(decision.reason.starts_with("Cheaper hour"));
    assert!(h.device.writes().is_empty());
}

#[tokio::test]
async fn test_cheap_hour_raises_a_low_setpoint_past_deadband() {
    let mut h = harness(Telemetry::new(21.0, 19.0), price_data(0.60, &PRICES));

    let report = h.engine.run_cycle(now()).await;

    let decision = &report.decisions[0];
    assert_eq!(decision.action, DecisionAction::SetTarget);
    assert_eq!(decision.strategy, Some(ThermalStrategy::Preheat));
    assert!(decision.to_temperature_c.unwrap() >= 19.5);
}

#[tokio::test]
async fn test_expensive_hour_never_raises_a_low_setpoint() {
    let series = [0.60, 0.50, 1.20, 0.80, 2.20, 0.40, 1.50, 0.70];
    let mut h = harness(Telemetry::new(21.0, 19.0), price_data(2.20, &series));

    let report = h.engine.run_cycle(now()).await;

    let decision = &report.decisions[0];
    assert_eq!(decision.percentile, Some(1.0));
    assert_eq!(decision.action, DecisionAction::Hold);
    assert_eq!(decision.to_temperature_c, Some(19.0));
    assert!(decision.reason.starts_with("Expensive hour"));
    assert!(h.device.writes().is_empty());
}

#[tokio::test]
async fn test_expensive_hour_lowers_a_high_setpoint() {
    let mut h = harness(Telemetry::new(21.0, 22.5), price_data(2.20, &PRICES));

    let report = h.engine.run_cycle(now()).await;

    let decision = &report.decisions[0];
    assert_eq!(decision.action, DecisionAction::SetTarget);
    assert_eq!(decision.strategy, Some(ThermalStrategy::Coast));
    assert!(decision.to_temperature_c.unwrap() <= 22.0);
}

#[tokio::test]
async fn test_efficiency_boost_named_in_reason() {
    let store = Arc::new(MemorySettingsStore::new());
    let config = HeatConfig::default();
    let learned = CopRange {
        min_observed: 2.0,
        max_observed: 4.0,
        update_count: 5,
        history: [2.0, 2.5, 3.0, 3.5, 4.0].into_iter().collect(),
    };
    save_json(
        store.as_ref(),
        &SettingsKeys::new(&config.device_id).cop_range(),
        &learned,
    )
    .unwrap();
    let mut telemetry = Telemetry::new(21.0, 20.0);
    telemetry.observed_cop = Some(4.0);
    let mut h = harness_on(
        store,
        config,
        MockDevice::new(telemetry),
        MockPrices::new(price_data(0.60, &PRICES)),
    );

    let report = h.engine.run_cycle(now()).await;

    let decision = &report.decisions[0];
    assert_eq!(decision.action, DecisionAction::SetTarget);
    assert_eq!(decision.reason, "Cheaper hour, preheat, Eff. Boost");
    assert!(decision.to_temperature_c.unwrap() <= 23.0);
}

#[tokio::test]
async fn test_away_setback_lowers_band() {
    let mut h = harness(Telemetry::new(20.5, 20.5), price_data(1.5, &[1.5; 24]));
    h.engine.set_occupancy(false).unwrap();

    let report = h.engine.run_cycle(now()).await;

    let decision = &report.decisions[0];
    assert_eq!(decision.action, DecisionAction::SetTarget);
    // preferred 20.5 minus the 2.0 setback
    assert_eq!(decision.to_temperature_c, Some(18.5));
    assert!(decision.reason.starts_with("Flat prices"));
}

#[tokio::test]
async fn test_flat_prices_maintain() {
    let mut h = harness(Telemetry::new(20.5, 20.5), price_data(1.5, &[1.5; 24]));

    let report = h.engine.run_cycle(now()).await;

    let decision = &report.decisions[0];
    assert_eq!(decision.action, DecisionAction::Hold);
    assert_eq!(decision.strategy, Some(ThermalStrategy::Maintain));
    assert_eq!(decision.price_level, Some(PriceLevel::Normal));
    assert!(decision.reason.starts_with("Flat prices"));
    assert!(h.device.writes().is_empty());
}

#[tokio::test]
async fn test_empty_price_series_holds() {
    let mut h = harness(Telemetry::new(21.0, 20.0), price_data(0.6, &[]));

    let report = h.engine.run_cycle(now()).await;

    let decision = &report.decisions[0];
    assert_eq!(decision.action, DecisionAction::Hold);
    assert_eq!(decision.to_temperature_c, Some(20.0));
    assert_eq!(decision.reason, "no price data");
    assert!(h.device.writes().is_empty());
}

// ============= Outages and failures =============

#[tokio::test(start_paused = true)]
async fn test_price_outage_holds_current_target() {
    let mut h = harness_with(
        HeatConfig::default(),
        MockDevice::new(Telemetry::new(21.0, 20.0)),
        MockPrices::unavailable(),
    );

    let report = h.engine.run_cycle(now()).await;

    assert!(!report.is_failed());
    let decision = &report.decisions[0];
    assert_eq!(decision.action, DecisionAction::Hold);
    assert_eq!(decision.to_temperature_c, Some(20.0));
    assert_eq!(decision.reason, "price outage");
    assert!(h.device.writes().is_empty());
}

#[tokio::test]
async fn test_stale_prices_count_as_outage() {
    let mut h = harness(Telemetry::new(21.0, 20.0), price_data(0.60, &PRICES));

    let report = h.engine.run_cycle(now() + Duration::hours(3)).await;

    assert_eq!(report.decisions[0].reason, "price outage");
    assert!(h.device.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_write_failure_holds_everything_and_reuses_token() {
    let mut h = harness_with(
        HeatConfig::default(),
        MockDevice::failing(Telemetry::new(21.0, 20.0)),
        MockPrices::new(price_data(0.60, &PRICES)),
    );

    let report = h.engine.run_cycle(now()).await;

    assert!(report.is_failed());
    assert!(report.decisions.iter().all(|d| d.is_hold()));
    assert!(report.decisions[0].reason.starts_with("device write failed"));
    assert_eq!(report.decisions[0].to_temperature_c, Some(20.0));

    let writes = h.device.writes();
    assert!(!writes.is_empty());
    let token = report.write_token.unwrap();
    assert!(writes.iter().all(|(_, ctx)| ctx.token == token));
    let attempts: Vec<u32> = writes.iter().map(|(_, ctx)| ctx.attempt).collect();
    assert_eq!(attempts, (1..=writes.len() as u32).collect::<Vec<_>>());

    // Nothing was applied, so nothing is remembered
    assert!(load_json::<f64>(h.store.as_ref(), &h.keys.last_applied_target(Zone::Primary)).is_none());
}

// ============= Device writes and persistence =============

#[tokio::test]
async fn test_one_write_per_cycle_covers_all_zones() {
    let mut config = HeatConfig::default();
    config.zones.tank = Some(ZoneConfig::tank());
    let mut telemetry = Telemetry::new(21.0, 20.0);
    telemetry.extra_zones.push(ZoneReading::HotWaterTank {
        tank_temperature_c: 46.0,
        current_target_temperature_c: 44.0,
    });
    let mut h = harness_with(
        config,
        MockDevice::new(telemetry),
        MockPrices::new(price_data(0.60, &PRICES)),
    );

    let report = h.engine.run_cycle(now()).await;

    assert_eq!(report.decisions.len(), 2);
    let writes = h.device.writes();
    assert_eq!(writes.len(), 1);
    let (request, ctx) = &writes[0];
    assert_eq!(request.changes.len(), 2);
    assert_eq!(ctx.attempt, 1);
    assert_eq!(Some(ctx.token), report.write_token);
    let tank = request
        .changes
        .iter()
        .find(|c| c.zone == Zone::HotWaterTank)
        .unwrap();
    assert!(tank.target_c > 44.0 && tank.target_c <= 55.0);
}

#[tokio::test]
async fn test_applied_target_is_persisted() {
    let mut h = harness(Telemetry::new(21.0, 20.0), price_data(0.60, &PRICES));

    let report = h.engine.run_cycle(now()).await;
    let applied = report.decisions[0].to_temperature_c.unwrap();

    let stored: f64 =
        load_json(h.store.as_ref(), &h.keys.last_applied_target(Zone::Primary)).unwrap();
    assert_eq!(stored, applied);
    let changed_ms: i64 =
        load_json(h.store.as_ref(), &h.keys.last_setpoint_change_ms(Zone::Primary)).unwrap();
    assert_eq!(changed_ms, now().timestamp_millis());
}

#[tokio::test]
async fn test_setpoint_already_at_choice_is_within_deadband() {
    let mut h = harness(Telemetry::new(21.0, 20.0), price_data(0.60, &PRICES));
    let first = h.engine.run_cycle(now()).await;
    let applied = first.decisions[0].to_temperature_c.unwrap();

    h.device.set_telemetry(Telemetry::new(21.0, applied));
    let second = h.engine.run_cycle(now() + Duration::hours(1)).await;

    let decision = &second.decisions[0];
    assert_eq!(decision.action, DecisionAction::Hold);
    assert!(decision.reason.ends_with("(within deadband)"));
    assert_eq!(h.device.writes().len(), 1);
}

#[tokio::test]
async fn test_recent_change_is_debounced() {
    let h = harness(Telemetry::new(21.0, 20.0), price_data(0.60, &PRICES));
    let ten_minutes_ago = (now() - Duration::minutes(10)).timestamp_millis();
    save_json(
        h.store.as_ref(),
        &h.keys.last_setpoint_change_ms(Zone::Primary),
        &ten_minutes_ago,
    )
    .unwrap();
    let mut engine = h.engine;

    let report = engine.run_cycle(now()).await;

    let decision = &report.decisions[0];
    assert_eq!(decision.action, DecisionAction::Hold);
    assert!(decision.reason.ends_with("(debounce)"));
    assert!(h.device.writes().is_empty());
}

#[tokio::test]
async fn test_manual_change_is_respected() {
    let mut h = harness(Telemetry::new(21.0, 20.0), price_data(0.60, &PRICES));
    h.engine.run_cycle(now()).await;

    // Someone turned the thermostat down by hand
    h.device.set_telemetry(Telemetry::new(21.0, 19.0));
    let report = h.engine.run_cycle(now() + Duration::hours(1)).await;

    let decision = &report.decisions[0];
    assert_eq!(decision.action, DecisionAction::Hold);
    assert_eq!(decision.reason, "manual change detected");
    assert_eq!(decision.to_temperature_c, Some(19.0));
    assert_eq!(h.device.writes().len(), 1);
}

#[tokio::test]
async fn test_setpoint_matching_engine_choice_is_adopted() {
    let mut h = harness(Telemetry::new(21.0, 20.0), price_data(0.60, &PRICES));
    h.engine.run_cycle(now()).await;

    // Setpoint moved to exactly what flat prices call for
    h.device.set_telemetry(Telemetry::new(21.0, 20.5));
    h.prices.set(price_data(1.5, &[1.5; 24]));
    let second = h.engine.run_cycle(now() + Duration::minutes(40)).await;
    assert_eq!(second.decisions[0].action, DecisionAction::Hold);
    let stored: f64 =
        load_json(h.store.as_ref(), &h.keys.last_applied_target(Zone::Primary)).unwrap();
    assert_eq!(stored, 20.5);

    h.prices.set(price_data(2.20, &PRICES));
    let third = h.engine.run_cycle(now() + Duration::minutes(80)).await;

    let decision = &third.decisions[0];
    assert_eq!(decision.action, DecisionAction::SetTarget);
    assert!(decision.reason.starts_with("Expensive hour"));
    assert_eq!(h.device.writes().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_expired_override_adopts_manual_setpoint() {
    let mut h = harness(Telemetry::new(21.0, 20.0), price_data(0.60, &PRICES));
    h.engine.run_cycle(now()).await;

    h.device.set_telemetry(Telemetry::new(21.0, 19.0));
    let held = h.engine.run_cycle(now() + Duration::hours(1)).await;
    assert_eq!(held.decisions[0].reason, "manual change detected");

    // Past the 240 minute hold, with a write that does not go through
    let later = now() + Duration::hours(5);
    h.prices.set(price_data_at(later, 0.60, &PRICES));
    h.device.set_fail_writes(true);
    let report = h.engine.run_cycle(later).await;

    assert_ne!(report.decisions[0].reason, "manual change detected");
    let stored: f64 =
        load_json(h.store.as_ref(), &h.keys.last_applied_target(Zone::Primary)).unwrap();
    assert_eq!(stored, 19.0);
}

#[tokio::test]
async fn test_observed_cop_is_learned_and_persisted() {
    let mut telemetry = Telemetry::new(21.0, 20.0);
    telemetry.observed_cop = Some(3.2);
    let mut h = harness(telemetry.clone(), price_data(0.60, &PRICES));

    h.engine.run_cycle(now()).await;

    assert_eq!(h.engine.cop_range().update_count, 1);
    assert_eq!(h.engine.cop_range().history.back(), Some(&3.2));
    let stored: CopRange = load_json(h.store.as_ref(), &h.keys.cop_range()).unwrap();
    assert_eq!(stored.history.iter().copied().collect::<Vec<_>>(), vec![3.2]);

    // Implausible readings are dropped before they reach the snapshot
    telemetry.observed_cop = Some(9.0);
    h.device.set_telemetry(telemetry);
    h.engine.run_cycle(now() + Duration::hours(1)).await;
    let stored: CopRange = load_json(h.store.as_ref(), &h.keys.cop_range()).unwrap();
    assert_eq!(stored.update_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_retried_write_is_applied_once() {
    let device = MockDevice {
        lose_next_reply: Mutex::new(true),
        ..MockDevice::new(Telemetry::new(21.0, 20.0))
    };
    let mut h = harness_with(
        HeatConfig::default(),
        device,
        MockPrices::new(price_data(0.60, &PRICES)),
    );

    let report = h.engine.run_cycle(now()).await;

    assert!(!report.is_failed());
    let writes = h.device.writes();
    assert_eq!(writes.len(), 2);
    assert!(writes.iter().all(|(_, ctx)| Some(ctx.token) == report.write_token));
    assert_eq!(h.device.applied_count(), 1);
    let stored: f64 =
        load_json(h.store.as_ref(), &h.keys.last_applied_target(Zone::Primary)).unwrap();
    assert_eq!(Some(stored), report.decisions[0].to_temperature_c);
}

#[tokio::test]
async fn test_weather_samples_feed_thermal_model() {
    let device = Arc::new(MockDevice::new(Telemetry::new(21.0, 20.0)));
    let store: Arc<dyn SettingsStore> = Arc::new(MemorySettingsStore::new());
    let collaborators = EngineCollaborators {
        device: Arc::clone(&device) as Arc<dyn DeviceApi>,
        prices: Arc::new(MockPrices::new(price_data(0.60, &PRICES))),
        weather: Some(Arc::new(MockWeather(WeatherSample::new(2.0)))),
        settings: store,
    };
    let mut engine = DecisionEngine::new(HeatConfig::default(), collaborators).unwrap();

    engine.run_cycle(now()).await;

    assert_eq!(engine.thermal_model().samples().len(), 1);
    assert_eq!(
        engine.thermal_model().samples()[0].outdoor_temperature_c,
        2.0
    );
}

// ============= Configuration and scheduling =============

#[test]
fn test_invalid_thresholds_are_rejected() {
    let mut config = HeatConfig::default();
    config.price.cheap_threshold = 0.8;
    let collaborators = EngineCollaborators {
        device: Arc::new(MockDevice::new(Telemetry::new(21.0, 20.0))),
        prices: Arc::new(MockPrices::unavailable()),
        weather: None,
        settings: Arc::new(MemorySettingsStore::new()),
    };

    let err = DecisionEngine::new(config, collaborators).unwrap_err();
    assert!(matches!(err, HeatError::Validation(_)));
}

#[tokio::test]
async fn test_occupancy_survives_restart() {
    let store: Arc<dyn SettingsStore> = Arc::new(MemorySettingsStore::new());
    let collaborators = EngineCollaborators {
        device: Arc::new(MockDevice::new(Telemetry::new(21.0, 20.0))),
        prices: Arc::new(MockPrices::new(price_data(0.60, &PRICES))),
        weather: None,
        settings: store,
    };
    let mut engine = DecisionEngine::new(HeatConfig::default(), collaborators.clone()).unwrap();
    assert!(engine.is_occupied());
    engine.set_occupancy(false).unwrap();

    let restored = DecisionEngine::new(HeatConfig::default(), collaborators).unwrap();
    assert!(!restored.is_occupied());
}

#[tokio::test]
async fn test_second_manual_run_is_rejected_while_first_is_pending() {
    let entered = Arc::new(Notify::new());
    let gate = Arc::new(Notify::new());
    let device = MockDevice {
        gate: Some((Arc::clone(&entered), Arc::clone(&gate))),
        ..MockDevice::new(Telemetry::new(21.0, 20.0))
    };
    let h = harness_with(
        HeatConfig::default(),
        device,
        MockPrices::new(price_data(0.60, &PRICES)),
    );
    let runner = CycleRunner::new(h.engine).unwrap();

    let first = runner.run_manual(now());
    let second = async {
        entered.notified().await;
        let rejected = runner.run_manual(now()).await;
        gate.notify_one();
        rejected
    };
    let (first, second) = tokio::join!(first, second);

    assert!(first.is_ok());
    assert!(matches!(
        second,
        Err(HeatError::ManualJobRejected { active: 1, max: 1 })
    ));
}
