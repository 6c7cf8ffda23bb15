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

use chrono::{DateTime, Duration, Utc};
use fluxion_heat_types::{PriceData, PriceLevel};

/// Spread below which a price series counts as flat
pub const FLAT_PRICE_EPSILON: f64 = 1e-9;

/// Where the current price sits within the series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceAnalysis {
    /// Fraction of prices at or below the current price (0.0 = cheapest, 1.0 = most expensive)
    pub percentile: f64,
    pub level: PriceLevel,
    /// True when every price in the series is the same
    pub is_flat: bool,
    pub current_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

/// Fraction of prices at or below the current price, `None` for an empty series
pub fn price_percentile(data: &PriceData) -> Option<f64> {
    if data.prices.is_empty() {
        return None;
    }
    let current = data.current.price;
    let at_or_below = data.prices.iter().filter(|s| s.price <= current).count();
    Some(at_or_below as f64 / data.prices.len() as f64)
}

pub fn classify(percentile: f64, cheap_threshold: f64, expensive_threshold: f64) -> PriceLevel {
    if percentile <= cheap_threshold {
        PriceLevel::Cheap
    } else if percentile >= expensive_threshold {
        PriceLevel::Expensive
    } else {
        PriceLevel::Normal
    }
}

/// Analyze the current price against the series
///
/// A flat series always resolves to `Normal`: with a single price level
/// there is nothing to shift load toward.
pub fn analyze(
    data: &PriceData,
    cheap_threshold: f64,
    expensive_threshold: f64,
) -> Option<PriceAnalysis> {
    let percentile = price_percentile(data)?;
    let (min_price, max_price) = data.price_range()?;
    let is_flat = max_price - min_price < FLAT_PRICE_EPSILON;
    let level = if is_flat {
        PriceLevel::Normal
    } else {
        classify(percentile, cheap_threshold, expensive_threshold)
    };

    Some(PriceAnalysis {
        percentile,
        level,
        is_flat,
        current_price: data.current.price,
        min_price,
        max_price,
    })
}

/// Whether the current price sample is too old to act on
pub fn is_stale(data: &PriceData, now: DateTime<Utc>, max_age_minutes: u32) -> bool {
    now - data.current.time > Duration::minutes(i64::from(max_age_minutes))
}
