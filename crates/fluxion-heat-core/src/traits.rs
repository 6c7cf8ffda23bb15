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

use anyhow::Result;
use async_trait::async_trait;
use fluxion_heat_types::{PriceData, SetpointRequest, Telemetry, WeatherSample};
use std::fmt;
use uuid::Uuid;

// ============= Collaborator Data Source Traits =============

/// Identity of one logical device write
///
/// Retries of the same write carry the same token so the device side can
/// recognise a repeated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub token: Uuid,
    /// 1-based attempt number
    pub attempt: u32,
}

impl RequestContext {
    pub fn new(token: Uuid, attempt: u32) -> Self {
        Self { token, attempt }
    }
}

/// Result of a device write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// The device had already applied a request with this token
    AlreadyApplied,
}

/// Heat pump access (vendor-agnostic)
/// Business logic uses this trait, never knows about the transport
#[async_trait]
pub trait DeviceApi: Send + Sync + fmt::Debug {
    /// Read current telemetry
    async fn get_device_state(&self) -> Result<Telemetry>;

    /// Apply all setpoint changes of one cycle in a single call
    async fn set_temperature(
        &self,
        request: &SetpointRequest,
        context: &RequestContext,
    ) -> Result<WriteOutcome>;

    /// Get device name
    fn name(&self) -> &str;
}

/// Electricity price source
#[async_trait]
pub trait PriceProvider: Send + Sync + fmt::Debug {
    /// Current price and the series it is ranked against
    async fn fetch_prices(&self) -> Result<PriceData>;

    fn name(&self) -> &str;
}

/// Optional weather source
#[async_trait]
pub trait WeatherProvider: Send + Sync + fmt::Debug {
    async fn current_weather(&self) -> Result<WeatherSample>;

    fn name(&self) -> &str;
}
