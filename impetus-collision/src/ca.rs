//! Conservative advancement step estimation.
//!
//! Given a pairwise distance snapshot and the current geometry twists, bound
//! the time a constant-velocity Euler step can take before the pair could
//! move within the contact threshold. A pair already inside the threshold is
//! a current event: it reports a zero step while still approaching (the
//! driver must stop and resolve the impact) and infinity once resting or
//! separating (the constraint machinery owns it; reporting zero then would
//! stall the position integrator).

use impetus_types::NEAR_ZERO;

use crate::geometry::CollisionGeometry;
use crate::pdi::PairwiseDistInfo;

/// Upper bound on the admissible Euler step for one geometry pair.
///
/// Returns `f64::INFINITY` when no approach is predicted.
#[must_use]
pub fn calc_ca_euler_step(
    pdi: &PairwiseDistInfo,
    ga: &CollisionGeometry,
    gb: &CollisionGeometry,
    contact_dist_thresh: f64,
) -> f64 {
    // Closing speed of the witness points along the contact normal. The
    // normal points from B into A, so separation grows at n·(va - vb).
    let va = ga.velocity_at(&pdi.point_a).linear;
    let vb = gb.velocity_at(&pdi.point_b).linear;
    let closing = -pdi.normal.dot(&(va - vb));

    if pdi.dist <= contact_dist_thresh {
        // Current event: an impact if still closing, otherwise a resting
        // contact owned by the impulsive/sustained solvers.
        return if closing > NEAR_ZERO { 0.0 } else { f64::INFINITY };
    }

    // Rotation can swing surface features toward the other body at most at
    // ω·r for a bounded shape; unbounded shapes contribute through the
    // linear term only.
    let rot_a = rotation_bound(ga);
    let rot_b = rotation_bound(gb);

    let bound = closing.max(0.0) + rot_a + rot_b;
    if bound <= f64::EPSILON {
        return f64::INFINITY;
    }

    ((pdi.dist - contact_dist_thresh) / bound).max(0.0)
}

fn rotation_bound(g: &CollisionGeometry) -> f64 {
    let r = g.shape.bounding_radius();
    if r.is_finite() {
        g.twist.angular.norm() * r
    } else {
        0.0
    }
}
