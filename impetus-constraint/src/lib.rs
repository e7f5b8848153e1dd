//! Unilateral constraints, island partitioning, LCP solvers, and
//! stabilization.
//!
//! This crate turns proximity data and joint states into solvable
//! complementarity problems:
//!
//! - [`UnilateralConstraint`] / [`collect_constraints`] - contact and
//!   joint-limit discovery
//! - [`partition_islands`] - independent subproblems via union-find
//! - [`IslandProblem`] / [`assemble_island`] - effective-mass blocks
//!   `J·M⁻¹·Jᵀ` and right-hand sides over a pinned super-body layout
//! - [`lcp_lemke`] / [`lcp_lemke_sparse`] / [`lcp_lemke_regularized`] /
//!   [`lcp_fast`] - the pivoting solvers
//! - [`calc_impacting_constraint_forces`] - the impulsive velocity solve
//! - [`stabilize`] - post-step projection onto the non-penetration manifold
//!
//! Numerical sub-failures stay inside this crate: the regularized wrapper
//! absorbs [`LcpError`]s and retries; only persistent failure surfaces to
//! the driver as a `SimError`.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::cast_precision_loss,   // n as f64 in tolerance formulas
)]

mod error;
mod fast;
mod impact;
mod islands;
mod lemke;
mod problem;
mod sparse;
mod stabilization;
mod unilateral;

pub use error::LcpError;
pub use fast::lcp_fast;
pub use impact::{calc_impacting_constraint_forces, solve_island_impacts};
pub use islands::{partition_islands, Island};
pub use lemke::{lcp_lemke, lcp_lemke_regularized, max_lemke_iterations};
pub use problem::{assemble_island, IslandProblem};
pub use sparse::lcp_lemke_sparse;
pub use stabilization::{compute_s, min_stabilization_gap, stabilize};
pub use unilateral::{collect_constraints, link_map, UnilateralConstraint};
