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

//! Shared data model for the FluxION heating optimizer.
//!
//! Everything in here is plain data: price samples, device telemetry, weather,
//! thermal characteristics, decisions and the configuration tree. Behaviour
//! lives in `fluxion-heat-core`.

pub mod config;
pub mod decision;
pub mod pricing;
pub mod telemetry;
pub mod thermal;
pub mod zone;

pub use config::{
    BreakerConfig, CopGuardConfig, HeatConfig, ManualOverrideConfig, PriceConfig, ScheduleConfig,
    ThermalConfig, ZoneConfig, ZonesConfig,
};
pub use decision::{
    Decision, DecisionAction, PriceLevel, SetpointChange, SetpointRequest, ThermalStrategy,
};
pub use pricing::{PriceData, PriceSample};
pub use telemetry::{Telemetry, WeatherSample, ZoneReading};
pub use thermal::{ThermalCharacteristics, ThermalDataPoint, TimeToTarget};
pub use zone::Zone;
