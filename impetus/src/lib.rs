//! Rigid-multibody simulation with non-smooth contact and joint constraints.
//!
//! `impetus` advances collections of rigid and articulated bodies through
//! time while enforcing non-penetration, joint limits, and articulation
//! constraints. The pipeline combines:
//!
//! - semi-implicit Euler integration with conservative advancement
//!   (no tunneling),
//! - contact and joint-limit constraint generation grouped into independent
//!   islands,
//! - Lemke-pivoting LCP solves with Tikhonov regularization,
//! - post-step constraint stabilization via line-searched projection,
//! - recursive Newton-Euler inverse dynamics over articulated trees.
//!
//! This crate re-exports the workspace surface; see [`Simulator`] for the
//! entry point.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]

pub use impetus_body::{
    calc_constraint_forces, calc_inv_dyn, forward_dynamics, inverse_dynamics, mass_matrix,
    ArticulatedBody, Compliance, DynamicBody, InvDynResult, Joint, JointKind, LimitSide,
    RigidBody,
};
pub use impetus_collision::{
    broad_phase, calc_ca_euler_step, calc_signed_dist, find_contacts, tangent_basis, Aabb,
    CollisionGeometry, CollisionWorld, ContactPoint, HeightField, PairwiseDistInfo, Proximity,
    Shape, ShapeTag,
};
pub use impetus_constraint::{
    assemble_island, calc_impacting_constraint_forces, collect_constraints, lcp_fast, lcp_lemke,
    lcp_lemke_regularized, lcp_lemke_sparse, partition_islands, stabilize, Island, IslandProblem,
    LcpError, UnilateralConstraint,
};
pub use impetus_core::{body_energy, total_energy, ContactParams, Simulator, StepCallback};
pub use impetus_types::{
    spatial_cross_force, spatial_cross_motion, BodyId, CoordinateEncoding, DissipationConfig,
    GeomId, JointId, LcpConfig, Pose, RefFrame, Result, SimError, SimulatorConfig,
    SpatialInertia, SpatialVector, TelemetryConfig, Twist, Wrench, NEAR_ZERO,
};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    #[test]
    fn test_umbrella_surface_compiles_together() {
        let mut sim = Simulator::new(SimulatorConfig::default()).unwrap();
        let ground = sim.add_rigid_body(RigidBody::new_static(BodyId::new(0), Pose::identity()));
        sim.attach_geometry(ground, Shape::Plane, Pose::identity())
            .unwrap();
        let ball = sim.add_rigid_body(RigidBody::sphere(
            BodyId::new(1),
            Pose::from_position(Point3::new(0.0, 0.0, 1.0)),
            1.0,
            0.5,
        ));
        sim.attach_geometry(ball, Shape::sphere(0.5), Pose::identity())
            .unwrap();
        sim.step(1e-3).unwrap();
        assert!(sim.current_time() > 0.0);
    }
}
