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

//! Thermal-mass strategy.
//!
//! Cheap hours store heat in the building (preheat), expensive hours let it
//! drift down toward the comfort minimum (coast). How far either goes depends
//! on how extreme the price is, how much heat the building holds and how
//! efficiently the heat pump is currently running.

use fluxion_heat_types::{ThermalConfig, ThermalStrategy, WeatherSample, Zone, ZoneConfig};
use tracing::debug;

use crate::cop_range::CopRangeLearner;
use crate::pricing::PriceAnalysis;
use crate::thermal_model::ThermalModel;

/// Reason fragment appended when the efficiency boost applies
pub const EFFICIENCY_BOOST_REASON: &str = "Eff. Boost";

/// Lower bound on strategy strength once a strategy is chosen
const MIN_STRENGTH: f64 = 0.25;

/// Weight of the observed COP in the projected COP
const OBSERVED_COP_WEIGHT: f64 = 0.7;

/// Offset of tank COP against room heating (higher flow temperature)
const TANK_COP_PENALTY: f64 = 0.8;

/// COP expected at an outdoor temperature, without device feedback
pub fn estimate_cop(outdoor_c: f64, zone: Zone) -> f64 {
    let base = 3.0 + 0.1 * outdoor_c;
    let estimate = if zone.is_room() {
        base
    } else {
        base - TANK_COP_PENALTY
    };
    estimate.clamp(1.5, 5.5)
}

/// Blend the accepted observed COP with the outdoor-based estimate
pub fn projected_cop(observed: Option<f64>, outdoor_c: Option<f64>, zone: Zone) -> Option<f64> {
    let estimate = outdoor_c.map(|o| estimate_cop(o, zone));
    match (observed, estimate) {
        (Some(obs), Some(est)) => Some(OBSERVED_COP_WEIGHT * obs + (1.0 - OBSERVED_COP_WEIGHT) * est),
        (Some(obs), None) => Some(obs),
        (None, est) => est,
    }
}

/// Inputs for evaluating one zone
#[derive(Debug)]
pub struct StrategyContext<'a> {
    pub zone: Zone,
    pub zone_config: &'a ZoneConfig,
    pub analysis: &'a PriceAnalysis,
    pub cheap_threshold: f64,
    pub expensive_threshold: f64,
    /// Measured temperature of the zone's medium
    pub measured_c: f64,
    /// Setpoint the device currently holds
    pub current_target_c: f64,
    pub outdoor_c: Option<f64>,
    pub weather: Option<&'a WeatherSample>,
    pub occupied: bool,
    pub projected_cop: Option<f64>,
    pub thermal_model: &'a ThermalModel,
    pub cop_learner: &'a CopRangeLearner,
}

/// Unclamped target proposed for a zone
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyEvaluation {
    pub strategy: ThermalStrategy,
    pub target_c: f64,
    pub efficiency_boost: bool,
    /// Qualifier explaining the choice, e.g. "preheat" or "maintain (no headroom)"
    pub detail: String,
}

#[derive(Debug, Clone)]
pub struct ThermalMassStrategy {
    config: ThermalConfig,
}

impl ThermalMassStrategy {
    pub fn new(config: ThermalConfig) -> Self {
        Self { config }
    }

    /// Temperature held when no price signal applies
    fn baseline(zone_config: &ZoneConfig, occupied: bool) -> f64 {
        if occupied {
            zone_config.preferred_c
        } else {
            (zone_config.preferred_c - zone_config.away_setback_c).max(zone_config.hard_min_c)
        }
    }

    fn strength(depth: f64, thermal_mass: f64, cop_factor: f64) -> f64 {
        (0.5 * depth.clamp(0.0, 1.0) + 0.25 * thermal_mass + 0.25 * cop_factor)
            .clamp(MIN_STRENGTH, 1.0)
    }

    pub fn evaluate(&self, ctx: &StrategyContext<'_>) -> StrategyEvaluation {
        let cfg = ctx.zone_config;
        let (comfort_min, comfort_max) = cfg.comfort_band(ctx.occupied);
        let baseline = Self::baseline(cfg, ctx.occupied);
        let thermal_mass = ctx.thermal_model.characteristics().thermal_mass;
        let cop_norm = ctx
            .projected_cop
            .map_or(0.5, |cop| ctx.cop_learner.normalize(cop));
        let percentile = ctx.analysis.percentile;

        let mut evaluation = if ctx.analysis.is_flat {
            Self::maintain(baseline, "maintain")
        } else if percentile <= ctx.cheap_threshold {
            self.preheat(ctx, baseline, comfort_max, thermal_mass, cop_norm)
        } else if percentile >= ctx.expensive_threshold {
            self.coast(ctx, baseline, comfort_min, thermal_mass, cop_norm)
        } else {
            Self::maintain(baseline, "maintain")
        };

        if evaluation.strategy != ThermalStrategy::Maintain
            && cfg.efficiency_boost_c > 0.0
            && ctx
                .projected_cop
                .is_some_and(|cop| ctx.cop_learner.is_top_quartile(cop))
        {
            evaluation.target_c += evaluation.strategy.direction() * cfg.efficiency_boost_c;
            evaluation.efficiency_boost = true;
        }

        debug!(
            zone = %ctx.zone,
            strategy = %evaluation.strategy,
            percentile,
            target = evaluation.target_c,
            thermal_mass,
            cop_norm,
            boost = evaluation.efficiency_boost,
            "Thermal strategy evaluated"
        );
        evaluation
    }

    fn maintain(target_c: f64, detail: &str) -> StrategyEvaluation {
        StrategyEvaluation {
            strategy: ThermalStrategy::Maintain,
            target_c,
            efficiency_boost: false,
            detail: detail.to_owned(),
        }
    }

    /// Raise the setpoint past the deadband; a cheap hour never lowers it
    fn preheat(
        &self,
        ctx: &StrategyContext<'_>,
        baseline: f64,
        comfort_max: f64,
        thermal_mass: f64,
        cop_norm: f64,
    ) -> StrategyEvaluation {
        let cfg = ctx.zone_config;
        let fallback = |detail: &str| Self::maintain(baseline.max(ctx.current_target_c), detail);
        if comfort_max - ctx.measured_c <= cfg.min_headroom_c {
            return fallback("maintain (no headroom)");
        }
        let floor = ctx.current_target_c + cfg.min_change_c;
        if floor > comfort_max + 1e-9 {
            return fallback("maintain (setpoint at comfort max)");
        }

        let depth = if ctx.cheap_threshold > 0.0 {
            (ctx.cheap_threshold - ctx.analysis.percentile) / ctx.cheap_threshold
        } else {
            1.0
        };
        let mut target =
            baseline + Self::strength(depth, thermal_mass, cop_norm) * cfg.preheat_delta_c;
        // Within half a step the device rounds onto the floor
        if target + cfg.step_c / 2.0 < floor {
            return fallback("maintain (setpoint already higher)");
        }

        // Only store what the house can absorb within the preheat window
        if ctx.zone.is_room()
            && let Some(outdoor) = ctx.outdoor_c
        {
            let reachable = ctx.thermal_model.predict_temperature(
                ctx.measured_c,
                target,
                outdoor,
                true,
                ctx.weather,
                f64::from(self.config.preheat_window_minutes),
            );
            if reachable <= baseline || reachable < floor {
                debug!(zone = %ctx.zone, reachable, baseline, floor, "Preheat target not reachable in window");
                return fallback("maintain (preheat not reachable)");
            }
            target = target.min(reachable);
        }

        StrategyEvaluation {
            strategy: ThermalStrategy::Preheat,
            target_c: target,
            efficiency_boost: false,
            detail: "preheat".to_owned(),
        }
    }

    /// Lower the setpoint past the deadband while comfort allows
    fn coast(
        &self,
        ctx: &StrategyContext<'_>,
        baseline: f64,
        comfort_min: f64,
        thermal_mass: f64,
        cop_norm: f64,
    ) -> StrategyEvaluation {
        let cfg = ctx.zone_config;
        if ctx.measured_c - comfort_min <= cfg.coast_margin_c {
            return Self::maintain(baseline, "maintain (comfort floor)");
        }
        let ceiling = ctx.current_target_c - cfg.min_change_c;
        if ceiling < comfort_min - 1e-9 {
            return Self::maintain(
                baseline.min(ctx.current_target_c),
                "maintain (setpoint at comfort min)",
            );
        }

        let span = 1.0 - ctx.expensive_threshold;
        let depth = if span > f64::EPSILON {
            (ctx.analysis.percentile - ctx.expensive_threshold) / span
        } else {
            1.0
        };
        let target =
            baseline - Self::strength(depth, thermal_mass, 1.0 - cop_norm) * cfg.coast_delta_c;
        if target - cfg.step_c / 2.0 > ceiling {
            return Self::maintain(
                baseline.min(ctx.current_target_c),
                "maintain (setpoint already lower)",
            );
        }

        // The room has to stay comfortable for the whole coast horizon
        if ctx.zone.is_room()
            && let Some(outdoor) = ctx.outdoor_c
        {
            let predicted = ctx.thermal_model.predict_temperature(
                ctx.measured_c,
                target,
                outdoor,
                false,
                ctx.weather,
                f64::from(self.config.coast_horizon_minutes),
            );
            if predicted < comfort_min {
                debug!(zone = %ctx.zone, predicted, comfort_min, "Coasting would breach comfort minimum");
                return Self::maintain(baseline, "maintain (comfort floor)");
            }
        }

        StrategyEvaluation {
            strategy: ThermalStrategy::Coast,
            target_c: target,
            efficiency_boost: false,
            detail: "coast".to_owned(),
        }
    }
}
