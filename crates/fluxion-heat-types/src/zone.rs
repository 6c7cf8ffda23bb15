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
use std::str::FromStr;

/// Heating zones a heat pump can expose.
///
/// Each device always has a primary room zone. A secondary room circuit and a
/// domestic hot water tank are optional capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    /// Main room heating circuit
    Primary,
    /// Second room heating circuit
    Secondary,
    /// Domestic hot water tank
    HotWaterTank,
}

impl Zone {
    /// Settings key fragment for this zone
    pub fn key(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::HotWaterTank => "tank",
        }
    }

    /// Human-readable name for logs and reasons
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Primary => "Zone 1",
            Self::Secondary => "Zone 2",
            Self::HotWaterTank => "Hot water",
        }
    }

    /// Room zones heat air and are covered by the building thermal model.
    pub fn is_room(&self) -> bool {
        matches!(self, Self::Primary | Self::Secondary)
    }

    /// List all zones in evaluation order
    pub fn all() -> &'static [Zone] {
        &[Self::Primary, Self::Secondary, Self::HotWaterTank]
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for Zone {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "primary" | "zone1" => Ok(Self::Primary),
            "secondary" | "zone2" => Ok(Self::Secondary),
            "tank" | "hot_water_tank" => Ok(Self::HotWaterTank),
            _ => Err(anyhow::anyhow!(
                "Unknown zone: '{}'. Supported zones: {}",
                s,
                Self::all()
                    .iter()
                    .map(Zone::key)
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_from_str_accepts_aliases() {
        assert_eq!("zone2".parse::<Zone>().unwrap(), Zone::Secondary);
        assert_eq!("Tank".parse::<Zone>().unwrap(), Zone::HotWaterTank);
        assert!("garage".parse::<Zone>().is_err());
    }

    #[test]
    fn test_only_room_zones_use_thermal_model() {
        assert!(Zone::Primary.is_room());
        assert!(Zone::Secondary.is_room());
        assert!(!Zone::HotWaterTank.is_room());
    }
}
