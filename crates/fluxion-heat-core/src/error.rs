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

//! Error types for the heating decision engine

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeatError {
    /// Bad configuration, raised at construction time and never clamped
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// Implausible sample, malformed stored value or too little data
    #[error("data quality: {0}")]
    DataQuality(String),

    /// Network, timeout or rate-limit failure of an external dependency
    #[error("{dependency} failed: {reason}")]
    TransientDependency { dependency: String, reason: String },

    /// Circuit breaker is open, the call was not attempted
    #[error("service unavailable: {dependency} circuit is open")]
    Unavailable { dependency: String },

    #[error("{dependency} call timed out after {}s", .after.as_secs())]
    Timeout { dependency: String, after: Duration },

    #[error("manual run rejected: {active} of {max} manual jobs already pending")]
    ManualJobRejected { active: usize, max: usize },

    #[error("settings persistence failed: {0}")]
    Persistence(String),
}

impl HeatError {
    /// Failures that may succeed when retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransientDependency { .. } | Self::Timeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, HeatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_message_names_dependency() {
        let err = HeatError::Unavailable {
            dependency: "device".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "service unavailable: device circuit is open"
        );
        assert!(!err.is_transient());
    }

    #[test]
    fn test_timeout_is_transient() {
        let err = HeatError::Timeout {
            dependency: "price".to_owned(),
            after: Duration::from_secs(30),
        };
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "price call timed out after 30s");
    }
}
