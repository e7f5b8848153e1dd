//! Foundational types for the impetus rigid-multibody simulator.
//!
//! This crate provides the shared vocabulary of the simulator:
//!
//! - [`BodyId`], [`GeomId`], [`JointId`] - stable arena identifiers
//! - [`Pose`], [`Twist`], [`Wrench`] - rigid-body kinematic and force state
//! - [`SpatialVector`], [`SpatialInertia`] - Featherstone 6D spatial algebra
//! - [`SimulatorConfig`] - driver and solver tuning knobs
//! - [`SimError`] - error surface of the whole pipeline
//!
//! # Design Philosophy
//!
//! These types are **pure data plus math**. They carry no stepping logic and
//! no collision state; they are the common language between the body model,
//! the collision layer, the constraint solver, and the time-stepping driver.
//!
//! # Coordinate System
//!
//! - X: right
//! - Y: forward
//! - Z: up
//! - Right-handed
//!
//! Spatial 6-vectors are ordered `[angular (3), linear (3)]` and, unless a
//! function says otherwise, are expressed in world axes about the world
//! origin. That convention makes velocity composition along a kinematic tree
//! a plain vector sum.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,  // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,      // mul_add style changes aren't always clearer
    clippy::missing_errors_doc,    // Error docs added where non-obvious
)]

mod config;
mod error;
mod id;
mod inertia;
mod spatial;

pub use config::{DissipationConfig, LcpConfig, SimulatorConfig, TelemetryConfig};
pub use error::SimError;
pub use id::{BodyId, GeomId, JointId};
pub use inertia::SpatialInertia;
pub use spatial::{
    spatial_cross_force, spatial_cross_motion, CoordinateEncoding, Pose, RefFrame, SpatialVector,
    Twist, Wrench,
};

// Re-export the math types the rest of the workspace builds on.
pub use nalgebra::{
    DMatrix, DVector, Isometry3, Matrix3, Matrix6, Point3, UnitQuaternion, Vector3, Vector6,
};

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;

/// A value near machine zero used as the default tolerance for "touching"
/// tests throughout the pipeline (square root of `f64::EPSILON`).
pub const NEAR_ZERO: f64 = 1.490_116_119_384_765_6e-8;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_near_zero_matches_eps_sqrt() {
        assert!((NEAR_ZERO - f64::EPSILON.sqrt()).abs() < 1e-20);
    }

    #[test]
    fn test_reexports_compose() {
        let pose = Pose::from_position(Point3::new(1.0, 2.0, 3.0));
        let twist = Twist::zero();
        assert!(pose.is_finite());
        assert_eq!(twist.linear.norm(), 0.0);
    }
}
