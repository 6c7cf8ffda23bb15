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
use std::fmt;

use crate::zone::Zone;

/// What the engine wants the device to do for a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    /// Keep the current setpoint
    Hold,
    /// Write a new setpoint
    SetTarget,
}

/// Price classification of the current interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceLevel {
    Cheap,
    Normal,
    Expensive,
}

impl PriceLevel {
    /// Reason fragment naming this level
    pub fn reason_label(&self) -> &'static str {
        match self {
            Self::Cheap => "Cheaper hour",
            Self::Normal => "Normal hour",
            Self::Expensive => "Expensive hour",
        }
    }
}

/// How the building's thermal mass is used this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThermalStrategy {
    /// Store extra heat while electricity is cheap
    Preheat,
    /// Let the building drift down while electricity is expensive
    Coast,
    /// Hold the preferred temperature
    Maintain,
}

impl ThermalStrategy {
    /// Sign of the temperature bias this strategy applies
    pub fn direction(&self) -> f64 {
        match self {
            Self::Preheat => 1.0,
            Self::Coast => -1.0,
            Self::Maintain => 0.0,
        }
    }
}

impl fmt::Display for ThermalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Preheat => "preheat",
            Self::Coast => "coast",
            Self::Maintain => "maintain",
        };
        f.write_str(name)
    }
}

/// Heating decision for one zone and one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub zone: Zone,
    pub action: DecisionAction,
    /// Setpoint to apply (SetTarget) or the setpoint that stays in force (Hold)
    pub to_temperature_c: Option<f64>,
    /// Human-readable explanation naming the deciding factor
    pub reason: String,
    #[serde(default)]
    pub strategy: Option<ThermalStrategy>,
    #[serde(default)]
    pub price_level: Option<PriceLevel>,
    #[serde(default)]
    pub percentile: Option<f64>,
}

impl Decision {
    pub fn hold(zone: Zone, target_c: Option<f64>, reason: impl Into<String>) -> Self {
        Self {
            zone,
            action: DecisionAction::Hold,
            to_temperature_c: target_c,
            reason: reason.into(),
            strategy: None,
            price_level: None,
            percentile: None,
        }
    }

    pub fn set_target(zone: Zone, target_c: f64, reason: impl Into<String>) -> Self {
        Self {
            zone,
            action: DecisionAction::SetTarget,
            to_temperature_c: Some(target_c),
            reason: reason.into(),
            strategy: None,
            price_level: None,
            percentile: None,
        }
    }

    pub fn is_hold(&self) -> bool {
        self.action == DecisionAction::Hold
    }

    /// Attach the price analysis that led to this decision
    #[must_use]
    pub fn with_analysis(
        mut self,
        strategy: ThermalStrategy,
        price_level: PriceLevel,
        percentile: f64,
    ) -> Self {
        self.strategy = Some(strategy);
        self.price_level = Some(price_level);
        self.percentile = Some(percentile);
        self
    }
}

/// A single setpoint change sent to the device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetpointChange {
    pub zone: Zone,
    pub target_c: f64,
}

/// All setpoint changes of one cycle, written in a single device call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetpointRequest {
    pub changes: Vec<SetpointChange>,
}

impl SetpointRequest {
    /// Collect the SetTarget decisions of a cycle
    pub fn from_decisions(decisions: &[Decision]) -> Self {
        let changes = decisions
            .iter()
            .filter(|d| d.action == DecisionAction::SetTarget)
            .filter_map(|d| {
                d.to_temperature_c.map(|target_c| SetpointChange {
                    zone: d.zone,
                    target_c,
                })
            })
            .collect();
        Self { changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
