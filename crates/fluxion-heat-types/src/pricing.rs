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

/// Electricity price for one pricing interval (typically one hour)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    /// Interval start
    pub time: DateTime<Utc>,
    /// Price per kWh in the provider's currency
    pub price: f64,
}

impl PriceSample {
    pub fn new(time: DateTime<Utc>, price: f64) -> Self {
        Self { time, price }
    }
}

/// Price data returned by a price provider for the evaluation horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceData {
    /// Price in force right now
    pub current: PriceSample,
    /// All samples covering the evaluation horizon
    pub prices: Vec<PriceSample>,
}

impl PriceData {
    pub fn new(current: PriceSample, prices: Vec<PriceSample>) -> Self {
        Self { current, prices }
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Lowest and highest price in the series
    pub fn price_range(&self) -> Option<(f64, f64)> {
        let mut iter = self.prices.iter().map(|p| p.price);
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p))))
    }
}
