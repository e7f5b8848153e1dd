//! Error types for simulation operations.

use thiserror::Error;

use crate::id::BodyId;

/// Errors that can occur during simulation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// Invalid body ID referenced.
    #[error("invalid body ID: {0}")]
    InvalidBodyId(u64),

    /// Invalid geometry ID referenced.
    #[error("invalid geometry ID: {0}")]
    InvalidGeomId(u64),

    /// Non-finite generalized coordinates after integration.
    #[error("non-finite state in {body} after integration")]
    InvalidState {
        /// The offending body.
        body: BodyId,
    },

    /// Non-finite generalized velocity after integration.
    #[error("non-finite velocity in {body} after integration")]
    InvalidVelocity {
        /// The offending body.
        body: BodyId,
    },

    /// The impulsive solve left residual penetration velocity above the
    /// configured tolerance.
    #[error("impact residual {residual} exceeds tolerance {tolerance}")]
    ImpactToleranceExceeded {
        /// Worst remaining approach velocity along a contact normal.
        residual: f64,
        /// Configured admissible residual.
        tolerance: f64,
    },

    /// A sustained/impulsive contact LCP remained unsolvable after the full
    /// regularization sweep.
    #[error("sustained contact LCP unsolvable after regularization")]
    SustainedContactSolveFailed,

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Telemetry output could not be written.
    #[error("telemetry write failed: {reason}")]
    TelemetryWrite {
        /// Underlying I/O failure, stringified.
        reason: String,
    },
}

impl SimError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Check if this error denotes non-finite integrated state.
    #[must_use]
    pub fn is_state_integrity(&self) -> bool {
        matches!(self, Self::InvalidState { .. } | Self::InvalidVelocity { .. })
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SimError::InvalidState {
            body: BodyId::new(7),
        };
        assert!(err.to_string().contains("Body(7)"));

        let err = SimError::ImpactToleranceExceeded {
            residual: 0.25,
            tolerance: 1e-6,
        };
        assert!(err.to_string().contains("0.25"));
    }

    #[test]
    fn test_error_predicates() {
        assert!(SimError::InvalidVelocity {
            body: BodyId::new(0)
        }
        .is_state_integrity());
        assert!(SimError::invalid_config("bad").is_config_error());
        assert!(!SimError::SustainedContactSolveFailed.is_config_error());
    }
}
