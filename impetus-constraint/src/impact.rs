//! Impulsive contact resolution.
//!
//! Builds the velocity-level LCP per island and applies the resulting
//! impulses through each super-body's inverse inertia. A negative
//! restitution (the driver passes `-1.0`) selects pure projection:
//! penetrating approach velocities are driven to zero with no bounce.

use std::collections::HashMap;

use impetus_body::DynamicBody;
use impetus_collision::CollisionWorld;
use impetus_types::{BodyId, CoordinateEncoding, DVector, LcpConfig, SimError};
use tracing::{debug, trace};

use crate::islands::partition_islands;
use crate::lemke::lcp_lemke_regularized;
use crate::problem::{assemble_island, IslandProblem};
use crate::unilateral::collect_constraints;

/// Solve one island's impulsive LCP and return the impulse vector.
pub fn solve_island_impacts(
    problem: &IslandProblem,
    restitution: f64,
    lcp: &LcpConfig,
) -> Result<DVector<f64>, crate::LcpError> {
    let mm = problem.lcp_matrix();
    let qq = problem.impact_rhs(restitution);
    let mut z = DVector::zeros(0);
    lcp_lemke_regularized(&mm, &qq, &mut z, lcp)?;
    Ok(z)
}

/// Resolve impact velocities across all islands.
///
/// Collects the current unilateral constraints (within `contact_dist_thresh`),
/// partitions them into islands, solves each island's LCP, and applies the
/// impulses. Surfaces [`SimError::SustainedContactSolveFailed`] when an
/// island's LCP stays unsolvable through the regularization sweep, and
/// [`SimError::ImpactToleranceExceeded`] when the post-impulse approach
/// velocity at any contact is still below `-impact_vel_tol`.
pub fn calc_impacting_constraint_forces(
    bodies: &mut [DynamicBody],
    collision: &CollisionWorld,
    restitution: f64,
    contact_dist_thresh: f64,
    impact_vel_tol: f64,
    lcp: &LcpConfig,
) -> Result<(), SimError> {
    let constraints = collect_constraints(bodies, collision, contact_dist_thresh);
    if constraints.is_empty() {
        return Ok(());
    }

    let statics: Vec<BodyId> = bodies
        .iter()
        .filter(|b| b.is_static())
        .map(DynamicBody::id)
        .collect();
    let islands = partition_islands(&constraints, |id| statics.contains(&id));
    trace!(
        constraints = constraints.len(),
        islands = islands.len(),
        "impulsive solve"
    );

    let index_of: HashMap<BodyId, usize> = bodies
        .iter()
        .enumerate()
        .map(|(i, b)| (b.id(), i))
        .collect();

    for island in &islands {
        // Assemble against shared borrows, then apply mutably.
        let (problem, z) = {
            let refs: HashMap<BodyId, &DynamicBody> =
                bodies.iter().map(|b| (b.id(), b)).collect();
            let problem = assemble_island(island, &constraints, &refs);
            let z = solve_island_impacts(&problem, restitution, lcp).map_err(|e| {
                debug!(error = %e, "island impact LCP unsolvable");
                SimError::SustainedContactSolveFailed
            })?;
            (problem, z)
        };

        // Residual approach velocity check on the contact rows.
        let post = problem.lcp_matrix() * &z + problem.impact_rhs(restitution);
        let mut residual: f64 = 0.0;
        for i in 0..problem.num_contacts() {
            residual = residual.max(-post[i]);
        }
        if residual > impact_vel_tol {
            return Err(SimError::ImpactToleranceExceeded {
                residual,
                tolerance: impact_vel_tol,
            });
        }

        for (id, delta) in problem.generalized_deltas(&z) {
            let Some(&idx) = index_of.get(&id) else {
                continue;
            };
            let body = &mut bodies[idx];
            let qd = body.get_generalized_velocity(CoordinateEncoding::Spatial) + delta;
            body.set_generalized_velocity(&qd);
        }
    }

    Ok(())
}
