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

//! Price-aware heating optimizer for air-to-water heat pumps.
//!
//! The [`DecisionEngine`] ranks the current electricity price, consults the
//! learned COP range and thermal model, and emits one setpoint decision per
//! zone. Device, price and weather access go through the traits in
//! [`traits`], each guarded by a [`CircuitBreaker`].

pub mod circuit_breaker;
pub mod cop_range;
pub mod engine;
pub mod error;
pub mod manual_change;
pub mod pricing;
pub mod scheduling;
pub mod settings;
pub mod strategy;
pub mod thermal_model;
pub mod traits;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use cop_range::{CopRange, CopRangeLearner};
pub use engine::{
    CycleReport, CycleStatus, DecisionContext, DecisionEngine, EngineCollaborators,
};
pub use error::{HeatError, Result};
pub use manual_change::{ManualChangeDetector, ManualOverrideTracker, OverrideStatus};
pub use pricing::PriceAnalysis;
pub use scheduling::{CycleRunner, Job, Schedule, Trigger};
pub use settings::{
    DEFAULT_SETTINGS_PATH, JsonFileSettingsStore, MemorySettingsStore, SettingsKeys,
    SettingsStore, load_json, save_json,
};
pub use strategy::ThermalMassStrategy;
pub use thermal_model::ThermalModel;
pub use traits::{DeviceApi, PriceProvider, RequestContext, WeatherProvider, WriteOutcome};
