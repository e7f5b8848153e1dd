//! Rigid and articulated body model with recursive Newton-Euler dynamics.
//!
//! This crate provides:
//!
//! - [`RigidBody`] - pose, twist, spatial inertia, accumulated wrench
//! - [`Joint`] - revolute/prismatic joints with spatial axes and limits
//! - [`ArticulatedBody`] - a kinematic tree with fixed or floating base and
//!   generalized coordinates in euler/spatial encodings
//! - [`rne`] - inverse dynamics (fixed base, floating base, constraint-force
//!   recovery)
//! - [`forward_dynamics`] - accelerations from the current state, with the
//!   mass matrix assembled through the same inverse-dynamics recursion
//! - [`DynamicBody`] - the super-body enum the driver and constraint
//!   assembler consume
//!
//! Spatial 6-vectors are `[angular, linear]`, world axes, world-origin
//! referenced unless noted.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,  // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,      // mul_add style changes aren't always clearer
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
)]

mod articulated;
mod dynamic;
mod forward;
mod joint;
mod rigid;
pub mod rne;

pub use articulated::{rigid_euler_rate, ArticulatedBody};
pub use dynamic::DynamicBody;
pub use forward::{external_forces, forward_dynamics, mass_matrix};
pub use joint::{Joint, JointKind, LimitSide};
pub use rigid::{Compliance, RigidBody};
pub use rne::{calc_constraint_forces, calc_inv_dyn, inverse_dynamics, InvDynResult};
