//! Configuration for the time-stepping driver and the constraint solvers.

use std::path::PathBuf;

use nalgebra::Vector3;

use crate::id::BodyId;
use crate::NEAR_ZERO;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Main configuration for a simulator instance.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulatorConfig {
    /// Gravitational acceleration (m/s²).
    pub gravity: Vector3<f64>,

    /// Floor on the conservative-advancement substep length (seconds).
    ///
    /// Prevents the position-integration loop from stalling on spuriously
    /// small advancement estimates.
    pub min_step_size: f64,

    /// Distance at which a geometry pair is treated as in contact for
    /// unilateral-constraint formation.
    pub contact_dist_thresh: f64,

    /// Minimum acceptable signed gap before stabilization terminates.
    pub stab_eps: f64,

    /// Hard cap on stabilization outer iterations (termination backstop).
    pub max_stabilization_iters: usize,

    /// Worst admissible residual approach velocity after the impulsive solve.
    pub impact_vel_tol: f64,

    /// LCP numerics.
    pub lcp: LcpConfig,

    /// Optional post-integration velocity dissipation.
    pub dissipation: Option<DissipationConfig>,

    /// Optional append-only telemetry outputs.
    pub telemetry: TelemetryConfig,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            gravity: Vector3::new(0.0, 0.0, -9.81),
            min_step_size: NEAR_ZERO,
            contact_dist_thresh: 1e-4,
            stab_eps: 1e-6,
            max_stabilization_iters: 100,
            impact_vel_tol: 1e-6,
            lcp: LcpConfig::default(),
            dissipation: None,
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl SimulatorConfig {
    /// Set the gravity vector.
    #[must_use]
    pub fn gravity(mut self, gravity: Vector3<f64>) -> Self {
        self.gravity = gravity;
        self
    }

    /// Disable gravity.
    #[must_use]
    pub fn zero_gravity(mut self) -> Self {
        self.gravity = Vector3::zeros();
        self
    }

    /// Set the contact distance threshold.
    #[must_use]
    pub fn contact_dist_thresh(mut self, thresh: f64) -> Self {
        self.contact_dist_thresh = thresh;
        self
    }

    /// Set the stabilization gap tolerance.
    #[must_use]
    pub fn stab_eps(mut self, eps: f64) -> Self {
        self.stab_eps = eps;
        self
    }

    /// Enable velocity dissipation.
    #[must_use]
    pub fn with_dissipation(mut self, dissipation: DissipationConfig) -> Self {
        self.dissipation = Some(dissipation);
        self
    }

    /// Set the telemetry outputs.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.min_step_size.is_finite() || self.min_step_size <= 0.0 {
            return Err(crate::SimError::invalid_config(
                "min_step_size must be positive and finite",
            ));
        }
        if self.contact_dist_thresh < 0.0 {
            return Err(crate::SimError::invalid_config(
                "contact_dist_thresh must be nonnegative",
            ));
        }
        if self.stab_eps < 0.0 {
            return Err(crate::SimError::invalid_config(
                "stab_eps must be nonnegative",
            ));
        }
        if !self.gravity.iter().all(|g| g.is_finite()) {
            return Err(crate::SimError::invalid_config("gravity must be finite"));
        }
        self.lcp.validate()
    }
}

/// Numerics for the Lemke solver and its regularized wrapper.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LcpConfig {
    /// Smallest regularization exponent: λ starts at `10^min_exp`.
    pub min_exp: i32,
    /// Exponent increment per regularization retry.
    pub step_exp: u32,
    /// Largest regularization exponent (exclusive).
    pub max_exp: i32,
    /// Pivot tolerance; `0.0` selects `ε·n·max(1, ‖B_e‖∞)` per pivot.
    pub piv_tol: f64,
    /// Zero tolerance; `0.0` selects `ε·‖M‖∞·n`.
    pub zero_tol: f64,
}

impl Default for LcpConfig {
    fn default() -> Self {
        Self {
            min_exp: -20,
            step_exp: 4,
            max_exp: -4,
            piv_tol: 0.0,
            zero_tol: 0.0,
        }
    }
}

impl LcpConfig {
    /// Validate the LCP numerics.
    pub fn validate(&self) -> crate::Result<()> {
        if self.min_exp > self.max_exp {
            return Err(crate::SimError::invalid_config(
                "lcp min_exp must not exceed max_exp",
            ));
        }
        if self.step_exp == 0 {
            return Err(crate::SimError::invalid_config(
                "lcp step_exp must be positive",
            ));
        }
        if self.piv_tol < 0.0 || self.zero_tol < 0.0 {
            return Err(crate::SimError::invalid_config(
                "lcp tolerances must be nonnegative",
            ));
        }
        Ok(())
    }
}

/// Post-integration velocity dissipation coefficients.
///
/// Applied between velocity integration and constraint collection; a crude
/// stand-in for unmodeled losses that also tames resting-contact jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DissipationConfig {
    /// Linear velocity damping coefficient (1/s).
    pub linear: f64,
    /// Angular velocity damping coefficient (1/s).
    pub angular: f64,
}

impl DissipationConfig {
    /// Create dissipation with the given coefficients.
    #[must_use]
    pub const fn new(linear: f64, angular: f64) -> Self {
        Self { linear, angular }
    }
}

/// Append-only telemetry outputs.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TelemetryConfig {
    /// Per-step `KE PE (KE+PE)` records for `energy_body`.
    pub energy_path: Option<PathBuf>,
    /// The body whose energy is recorded.
    pub energy_body: Option<BodyId>,
    /// Per-step minimum pairwise gap (constraint-violation metric).
    pub cvio_path: Option<PathBuf>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SimulatorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_min_step_rejected() {
        let mut config = SimulatorConfig::default();
        config.min_step_size = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lcp_exponent_order_enforced() {
        let mut config = SimulatorConfig::default();
        config.lcp.min_exp = -2;
        config.lcp.max_exp = -8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_style() {
        let config = SimulatorConfig::default()
            .zero_gravity()
            .contact_dist_thresh(1e-3)
            .with_dissipation(DissipationConfig::new(0.1, 0.1));
        assert_eq!(config.gravity.norm(), 0.0);
        assert_eq!(config.contact_dist_thresh, 1e-3);
        assert!(config.dissipation.is_some());
        assert!(config.validate().is_ok());
    }
}
