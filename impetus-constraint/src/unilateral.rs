//! Unilateral constraint records and their discovery.

use impetus_body::{Compliance, DynamicBody, LimitSide};
use impetus_collision::{tangent_basis, CollisionWorld, ContactPoint};
use impetus_types::{BodyId, GeomId};
use nalgebra::{Point3, Vector3};
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A unilateral constraint: a contact or a joint limit.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum UnilateralConstraint {
    /// A contact between two geometries.
    Contact {
        /// Geometry on the normal side.
        geom_a: GeomId,
        /// Geometry the normal points away from.
        geom_b: GeomId,
        /// Link (or free body) owning `geom_a`.
        link_a: BodyId,
        /// Link (or free body) owning `geom_b`.
        link_b: BodyId,
        /// Super-body of `link_a`.
        super_a: BodyId,
        /// Super-body of `link_b`.
        super_b: BodyId,
        /// World-space contact point.
        point: Point3<f64>,
        /// Unit normal pointing from B into A.
        normal: Vector3<f64>,
        /// Orthonormal tangent frame completing the normal.
        tangents: (Vector3<f64>, Vector3<f64>),
        /// Signed gap at discovery.
        gap: f64,
    },
    /// A joint DOF at (or past) a position limit.
    Limit {
        /// The articulated body owning the joint.
        super_body: BodyId,
        /// Joint index within the articulated body.
        joint: usize,
        /// DOF index within the joint.
        dof: usize,
        /// Which bound is active.
        side: LimitSide,
        /// Violation magnitude (zero at the bound, positive past it).
        violation: f64,
    },
}

impl UnilateralConstraint {
    /// Whether this is a contact constraint.
    #[must_use]
    pub fn is_contact(&self) -> bool {
        matches!(self, Self::Contact { .. })
    }

    /// The super-bodies this constraint couples (one or two entries).
    #[must_use]
    pub fn super_bodies(&self) -> Vec<BodyId> {
        match self {
            Self::Contact { super_a, super_b, .. } => {
                if super_a == super_b {
                    vec![*super_a]
                } else {
                    vec![*super_a, *super_b]
                }
            }
            Self::Limit { super_body, .. } => vec![*super_body],
        }
    }
}

/// Map from link id to (super-body id, arena index of the dynamic body).
#[must_use]
pub fn link_map(bodies: &[DynamicBody]) -> HashMap<BodyId, (BodyId, usize)> {
    let mut map = HashMap::new();
    for (idx, body) in bodies.iter().enumerate() {
        for link in body.link_ids() {
            map.insert(link, (body.id(), idx));
        }
    }
    map
}

/// Collect the current unilateral constraints: contacts for every kissing or
/// interpenetrating pair within `thresh`, and a limit record for every joint
/// DOF outside its bounds.
///
/// Pairs involving a compliant geometry or a compliant link are excluded;
/// they are resolved by penalty forces, not impulses. Interpenetrating pairs
/// whose narrowphase kernels emit nothing are still guaranteed one
/// constraint, synthesized from the pair's closest-point snapshot.
#[must_use]
pub fn collect_constraints(
    bodies: &[DynamicBody],
    collision: &CollisionWorld,
    thresh: f64,
) -> Vec<UnilateralConstraint> {
    let links = link_map(bodies);
    let mut constraints = Vec::new();
    let mut scratch: Vec<ContactPoint> = Vec::new();

    for pdi in collision.pairwise_distances() {
        if !pdi.is_kissing(thresh) {
            continue;
        }
        let (Some(ga), Some(gb)) = (collision.geom(pdi.geom_a), collision.geom(pdi.geom_b))
        else {
            continue;
        };
        if ga.compliant || gb.compliant {
            continue;
        }
        let (Some(&(super_a, idx_a)), Some(&(super_b, idx_b))) =
            (links.get(&ga.body), links.get(&gb.body))
        else {
            continue;
        };
        if bodies[idx_a].link_compliance(ga.body) == Compliance::Compliant
            || bodies[idx_b].link_compliance(gb.body) == Compliance::Compliant
        {
            continue;
        }
        // Two immobile participants produce nothing to solve.
        if bodies[idx_a].is_static() && bodies[idx_b].is_static() {
            continue;
        }

        scratch.clear();
        collision.find_contacts_pair(pdi.geom_a, pdi.geom_b, thresh, &mut scratch);

        if scratch.is_empty() && pdi.is_penetrating() {
            // Narrowphase emitted nothing for a penetrating pair: fall back
            // to one contact at the closest-point snapshot.
            scratch.push(ContactPoint {
                geom_a: pdi.geom_a,
                geom_b: pdi.geom_b,
                point: pdi.point_a,
                normal: pdi.normal,
                gap: pdi.dist,
            });
        }

        for c in &scratch {
            // Kernels may emit in swapped order; resolve owners per record.
            let (Some(rec_a), Some(rec_b)) = (collision.geom(c.geom_a), collision.geom(c.geom_b))
            else {
                continue;
            };
            let (Some(&(sa, _)), Some(&(sb, _))) =
                (links.get(&rec_a.body), links.get(&rec_b.body))
            else {
                continue;
            };
            constraints.push(UnilateralConstraint::Contact {
                geom_a: c.geom_a,
                geom_b: c.geom_b,
                link_a: rec_a.body,
                link_b: rec_b.body,
                super_a: sa,
                super_b: sb,
                point: c.point,
                normal: c.normal,
                tangents: tangent_basis(&c.normal),
                gap: c.gap,
            });
        }
    }

    // Joint limits.
    for body in bodies {
        let DynamicBody::Articulated(ab) = body else {
            continue;
        };
        for (j, joint) in ab.joints().iter().enumerate() {
            for d in 0..joint.dof() {
                if let Some((side, violation)) = joint.limit_violation(d) {
                    constraints.push(UnilateralConstraint::Limit {
                        super_body: ab.id,
                        joint: j,
                        dof: d,
                        side,
                        violation,
                    });
                }
            }
        }
    }

    constraints
}
