//! Post-step constraint stabilization.
//!
//! Projects the configuration back onto the feasible manifold (all pairwise
//! gaps nonnegative, no joint-limit violation) without touching velocities.
//! Each round builds the stabilization problem data (gaps as the right-hand
//! side, treated as velocities of a fictitious zero-time step), solves every
//! island with the fast pivoting method - escalating to regularized Lemke on
//! failure - and applies the resulting Δq through a backtracking line search
//! on the violation measure.
//!
//! Convergence is not proved; the loop terminates when the minimum gap
//! clears the tolerance, when the line-search step underflows, or at the
//! configured iteration cap.

use std::collections::HashMap;

use impetus_body::DynamicBody;
use impetus_collision::CollisionWorld;
use impetus_types::{BodyId, CoordinateEncoding, DVector, SimulatorConfig};
use tracing::{debug, trace, warn};

use crate::fast::lcp_fast;
use crate::islands::partition_islands;
use crate::lemke::lcp_lemke_regularized;
use crate::problem::assemble_island;
use crate::unilateral::{collect_constraints, link_map};

/// Backtracking line-search parameters.
const ALPHA: f64 = 0.05;
const BETA: f64 = 0.8;
/// Smallest admissible line-search step.
const T_MIN: f64 = 1e-10;

/// Minimum pairwise gap over pairs eligible for stabilization (compliant
/// pairs are exempt).
#[must_use]
pub fn min_stabilization_gap(bodies: &[DynamicBody], collision: &CollisionWorld) -> f64 {
    let links = link_map(bodies);
    let mut min_gap = f64::INFINITY;
    for pdi in collision.pairwise_distances() {
        let (Some(ga), Some(gb)) = (collision.geom(pdi.geom_a), collision.geom(pdi.geom_b))
        else {
            continue;
        };
        if ga.compliant || gb.compliant {
            continue;
        }
        if compliant_link(bodies, &links, ga.body) || compliant_link(bodies, &links, gb.body) {
            continue;
        }
        min_gap = min_gap.min(pdi.dist);
    }
    min_gap
}

fn compliant_link(
    bodies: &[DynamicBody],
    links: &HashMap<BodyId, (BodyId, usize)>,
    link: BodyId,
) -> bool {
    links.get(&link).is_some_and(|&(_, idx)| {
        bodies[idx].link_compliance(link) == impetus_body::Compliance::Compliant
    })
}

/// The violation measure `s(q)`: penetration depth plus the sum of
/// joint-limit violations.
#[must_use]
pub fn compute_s(bodies: &[DynamicBody], collision: &CollisionWorld) -> f64 {
    let min_gap = min_stabilization_gap(bodies, collision);
    let mut s = if min_gap.is_finite() {
        (-min_gap).max(0.0)
    } else {
        0.0
    };
    for body in bodies {
        let DynamicBody::Articulated(ab) = body else {
            continue;
        };
        for joint in ab.joints() {
            for d in 0..joint.dof() {
                if let Some((_, violation)) = joint.limit_violation(d) {
                    s += violation;
                }
            }
        }
    }
    s
}

fn refresh(bodies: &[DynamicBody], collision: &mut CollisionWorld) {
    let links = link_map(bodies);
    collision.sync_geometry(|id| {
        links
            .get(&id)
            .and_then(|&(_, idx)| bodies[idx].link_state(id))
    });
    collision.broad_phase(0.0);
    collision.calc_pairwise_distances();
}

/// Stabilize the configuration: iterate LCP projection plus line search
/// until the minimum pairwise gap clears `config.stab_eps`.
pub fn stabilize(
    bodies: &mut [DynamicBody],
    collision: &mut CollisionWorld,
    config: &SimulatorConfig,
) {
    // Euler-coordinate layout across the body arena.
    let offsets: Vec<usize> = {
        let mut acc = 0;
        bodies
            .iter()
            .map(|b| {
                let o = acc;
                acc += b.num_generalized_coordinates(CoordinateEncoding::Euler);
                o
            })
            .collect()
    };
    let total: usize = bodies
        .iter()
        .map(|b| b.num_generalized_coordinates(CoordinateEncoding::Euler))
        .sum();

    let gather = |bodies: &[DynamicBody]| -> DVector<f64> {
        let mut q = DVector::zeros(total);
        for (k, body) in bodies.iter().enumerate() {
            let qb = body.get_generalized_coordinates(CoordinateEncoding::Euler);
            q.rows_mut(offsets[k], qb.len()).copy_from(&qb);
        }
        q
    };
    let scatter = |bodies: &mut [DynamicBody], q: &DVector<f64>| {
        for (k, body) in bodies.iter_mut().enumerate() {
            if body.is_static() {
                continue;
            }
            let len = body.num_generalized_coordinates(CoordinateEncoding::Euler);
            let qb = DVector::from(q.rows(offsets[k], len).clone_owned());
            body.set_generalized_coordinates(CoordinateEncoding::Euler, &qb);
        }
    };

    refresh(bodies, collision);
    let mut q = gather(bodies);

    for iter in 0..config.max_stabilization_iters {
        let min_gap = min_stabilization_gap(bodies, collision);
        if min_gap >= config.stab_eps {
            trace!(iter, min_gap, "stabilization converged");
            return;
        }
        let s0 = compute_s(bodies, collision);
        if s0 <= 0.0 {
            // Gaps are nonnegative (merely inside the epsilon band) and no
            // limits are violated: nothing left to decrease.
            return;
        }

        let constraints = collect_constraints(bodies, collision, config.contact_dist_thresh);
        if constraints.is_empty() {
            return;
        }
        let statics: Vec<BodyId> = bodies
            .iter()
            .filter(|b| b.is_static())
            .map(DynamicBody::id)
            .collect();
        let islands = partition_islands(&constraints, |id| statics.contains(&id));

        // Per-island Δq, scattered into the global euler layout.
        let mut dq = DVector::zeros(total);
        let index_of: HashMap<BodyId, usize> = bodies
            .iter()
            .enumerate()
            .map(|(i, b)| (b.id(), i))
            .collect();
        for island in &islands {
            let refs: HashMap<BodyId, &DynamicBody> =
                bodies.iter().map(|b| (b.id(), b)).collect();
            let problem = assemble_island(island, &constraints, &refs);
            let mm = problem.lcp_matrix();
            let qq = problem.stabilization_rhs();

            let mut z = DVector::zeros(0);
            if lcp_fast(&mm, &qq, &mut z, config.lcp.zero_tol).is_err() {
                z = DVector::zeros(0);
                if let Err(e) = lcp_lemke_regularized(&mm, &qq, &mut z, &config.lcp) {
                    warn!(error = %e, "stabilization LCP unsolvable; skipping island");
                    continue;
                }
            }

            for (id, delta) in problem.generalized_deltas(&z) {
                let Some(&idx) = index_of.get(&id) else {
                    continue;
                };
                let euler_delta = bodies[idx].spatial_to_euler_rate(&delta);
                let off = offsets[idx];
                for r in 0..euler_delta.len() {
                    dq[off + r] += euler_delta[r];
                }
            }
        }

        if dq.amax() == 0.0 {
            debug!("stabilization produced no displacement");
            return;
        }

        // Backtracking line search on the violation measure (sufficient
        // decrease, gradient term omitted).
        let mut t = 1.0;
        let accepted = loop {
            let q_star = &q + &dq * t;
            scatter(bodies, &q_star);
            refresh(bodies, collision);
            let s_star = compute_s(bodies, collision);
            if s_star < (1.0 - ALPHA * t) * s0 {
                q = q_star;
                break true;
            }
            t *= BETA;
            if t < T_MIN {
                break false;
            }
        };

        if !accepted {
            // Restore the last accepted configuration and give up.
            scatter(bodies, &q);
            refresh(bodies, collision);
            debug!("stabilization line search underflowed");
            return;
        }
    }
    debug!("stabilization iteration cap reached");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use impetus_body::RigidBody;
    use impetus_collision::{CollisionGeometry, Shape};
    use impetus_types::{GeomId, Pose};
    use nalgebra::Point3;

    fn sunk_sphere_scene(depth: f64) -> (Vec<DynamicBody>, CollisionWorld) {
        let sphere = RigidBody::sphere(
            BodyId::new(0),
            Pose::from_position(Point3::new(0.0, 0.0, 0.5 - depth)),
            1.0,
            0.5,
        );
        let ground = RigidBody::new_static(BodyId::new(1), Pose::identity());
        let bodies = vec![DynamicBody::Rigid(sphere), DynamicBody::Rigid(ground)];

        let mut world = CollisionWorld::new();
        world.insert(CollisionGeometry::new(
            GeomId::new(0),
            BodyId::new(0),
            Shape::sphere(0.5),
        ));
        world.insert(CollisionGeometry::new(
            GeomId::new(1),
            BodyId::new(1),
            Shape::Plane,
        ));
        (bodies, world)
    }

    #[test]
    fn test_penetrating_sphere_is_lifted() {
        let (mut bodies, mut world) = sunk_sphere_scene(0.05);
        stabilize(&mut bodies, &mut world, &SimulatorConfig::default());
        refresh(&bodies, &mut world);
        let min_gap = min_stabilization_gap(&bodies, &world);
        assert!(
            min_gap >= -SimulatorConfig::default().stab_eps,
            "gap {min_gap} still negative"
        );
        // Velocities untouched.
        let DynamicBody::Rigid(b) = &bodies[0] else {
            unreachable!()
        };
        assert_eq!(b.velocity.linear.norm(), 0.0);
    }

    #[test]
    fn test_stabilization_idempotent() {
        let (mut bodies, mut world) = sunk_sphere_scene(0.05);
        let config = SimulatorConfig::default();
        stabilize(&mut bodies, &mut world, &config);
        let q1 = bodies[0].get_generalized_coordinates(CoordinateEncoding::Euler);
        stabilize(&mut bodies, &mut world, &config);
        let q2 = bodies[0].get_generalized_coordinates(CoordinateEncoding::Euler);
        assert!((q2 - q1).norm() < 1e-6);
    }

    #[test]
    fn test_separated_scene_untouched() {
        let (mut bodies, mut world) = sunk_sphere_scene(-1.0);
        let q_before = bodies[0].get_generalized_coordinates(CoordinateEncoding::Euler);
        stabilize(&mut bodies, &mut world, &SimulatorConfig::default());
        let q_after = bodies[0].get_generalized_coordinates(CoordinateEncoding::Euler);
        assert!((q_after - q_before).norm() < 1e-12);
    }

    #[test]
    fn test_compliant_pair_exempt() {
        let (mut bodies, mut world) = sunk_sphere_scene(0.05);
        world.geom_mut(GeomId::new(0)).unwrap().compliant = true;
        let q_before = bodies[0].get_generalized_coordinates(CoordinateEncoding::Euler);
        stabilize(&mut bodies, &mut world, &SimulatorConfig::default());
        let q_after = bodies[0].get_generalized_coordinates(CoordinateEncoding::Euler);
        assert!((q_after - q_before).norm() < 1e-12);
    }
}
