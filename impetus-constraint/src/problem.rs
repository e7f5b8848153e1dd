//! Per-island problem data assembly.
//!
//! An [`IslandProblem`] owns everything one LCP solve needs: the constraint
//! Jacobian over the island's flattened generalized coordinates, the
//! effective-mass blocks `J·M⁻¹·Jᵀ` (computed through each super-body's
//! factored inertia), and the right-hand sides for both the impulsive
//! (velocity-level) and stabilization (gap-level) formulations. Problem data
//! is owned by the solver invocation and dropped on return.
//!
//! Layout: super-bodies are deduplicated and sorted by id; contacts occupy
//! rows `[CN_IDX, L_IDX)`, limits `[L_IDX, ALPHA_X_IDX)`, and
//! `[ALPHA_X_IDX, N_VARS)` is reserved for implicit articulation equations
//! (empty for tree-structured bodies).

use std::collections::HashMap;

use impetus_body::{DynamicBody, LimitSide};
use impetus_types::{BodyId, CoordinateEncoding, DMatrix, DVector};

use crate::islands::Island;
use crate::unilateral::UnilateralConstraint;

/// Assembled problem data for one island.
#[derive(Debug, Clone)]
pub struct IslandProblem {
    /// Constraint-list indices of the island's contacts (row order).
    pub contacts: Vec<usize>,
    /// Constraint-list indices of the island's limits (row order).
    pub limits: Vec<usize>,
    /// Dynamic super-bodies, sorted by id.
    pub super_bodies: Vec<BodyId>,
    /// Per-super-body offset into the flattened coordinate vector.
    pub offsets: Vec<usize>,
    /// Flattened generalized-velocity length.
    pub n_gc: usize,
    /// First contact row.
    pub cn_idx: usize,
    /// First limit row.
    pub l_idx: usize,
    /// First implicit-articulation row (reserved).
    pub alpha_x_idx: usize,
    /// Total variable count including reserved rows.
    pub n_vars: usize,
    /// Contact/contact effective-mass block `Cn·M⁻¹·Cnᵀ` (Nc×Nc).
    pub cn_im_cnt: DMatrix<f64>,
    /// Contact/limit coupling block `Cn·M⁻¹·Lᵀ` (Nc×Nl).
    pub cn_im_lt: DMatrix<f64>,
    /// Limit/limit block `L·M⁻¹·Lᵀ` (Nl×Nl), symmetric.
    pub l_im_lt: DMatrix<f64>,
    /// Signed gaps per contact (stabilization right-hand side).
    pub cn_v: DVector<f64>,
    /// Limit right-hand side (zero during stabilization).
    pub l_v: DVector<f64>,
    /// Constraint-space velocity `J·qd` (impulsive right-hand side).
    constraint_vel: DVector<f64>,
    /// `M⁻¹·Jᵀ` for impulse scatter.
    minv_jt: DMatrix<f64>,
}

impl IslandProblem {
    /// Number of contact rows.
    #[must_use]
    pub fn num_contacts(&self) -> usize {
        self.contacts.len()
    }

    /// Number of limit rows.
    #[must_use]
    pub fn num_limits(&self) -> usize {
        self.limits.len()
    }

    /// The full symmetric LCP matrix `[Cn; L]·M⁻¹·[Cn; L]ᵀ`.
    #[must_use]
    pub fn lcp_matrix(&self) -> DMatrix<f64> {
        let (nc, nl) = (self.num_contacts(), self.num_limits());
        let n = nc + nl;
        let mut mm = DMatrix::zeros(n, n);
        mm.view_mut((0, 0), (nc, nc)).copy_from(&self.cn_im_cnt);
        mm.view_mut((0, nc), (nc, nl)).copy_from(&self.cn_im_lt);
        mm.view_mut((nc, 0), (nl, nc))
            .copy_from(&self.cn_im_lt.transpose());
        mm.view_mut((nc, nc), (nl, nl)).copy_from(&self.l_im_lt);
        mm
    }

    /// Right-hand side for the stabilization solve: signed gaps for
    /// contacts, zeros for limits.
    #[must_use]
    pub fn stabilization_rhs(&self) -> DVector<f64> {
        let (nc, nl) = (self.num_contacts(), self.num_limits());
        let mut q = DVector::zeros(nc + nl);
        q.rows_mut(0, nc).copy_from(&self.cn_v);
        q.rows_mut(nc, nl).copy_from(&self.l_v);
        q
    }

    /// Right-hand side for the impulsive solve.
    ///
    /// Negative `restitution` is the pure-projection sentinel: penetrating
    /// approach velocities are driven to zero. Nonnegative values add a
    /// Newton restitution target `e·|v⁻|` on the contact rows.
    #[must_use]
    pub fn impact_rhs(&self, restitution: f64) -> DVector<f64> {
        let mut q = self.constraint_vel.clone();
        if restitution >= 0.0 {
            for i in 0..self.num_contacts() {
                q[i] += restitution * self.constraint_vel[i].min(0.0);
            }
        }
        q
    }

    /// Constraint-space velocity `J·qd` at assembly time.
    #[must_use]
    pub fn constraint_velocities(&self) -> &DVector<f64> {
        &self.constraint_vel
    }

    /// Generalized-velocity (or displacement) change per super-body induced
    /// by the impulse vector `z`: slices of `M⁻¹·Jᵀ·z`.
    #[must_use]
    pub fn generalized_deltas(&self, z: &DVector<f64>) -> Vec<(BodyId, DVector<f64>)> {
        let delta = &self.minv_jt * z;
        let mut out = Vec::with_capacity(self.super_bodies.len());
        for (k, &id) in self.super_bodies.iter().enumerate() {
            let start = self.offsets[k];
            let len = if k + 1 < self.offsets.len() {
                self.offsets[k + 1] - start
            } else {
                self.n_gc - start
            };
            out.push((id, DVector::from(delta.rows(start, len).clone_owned())));
        }
        out
    }
}

/// Assemble the problem data for one island.
#[must_use]
pub fn assemble_island(
    island: &Island,
    constraints: &[UnilateralConstraint],
    bodies: &HashMap<BodyId, &DynamicBody>,
) -> IslandProblem {
    // Partition rows: contacts first, then limits.
    let mut contacts = Vec::new();
    let mut limits = Vec::new();
    for &ci in &island.constraint_indices {
        if constraints[ci].is_contact() {
            contacts.push(ci);
        } else {
            limits.push(ci);
        }
    }
    let (nc, nl) = (contacts.len(), limits.len());
    let n_rows = nc + nl;

    // Flattened layout over the sorted super-bodies.
    let mut offsets = Vec::with_capacity(island.super_bodies.len());
    let mut n_gc = 0;
    for id in &island.super_bodies {
        offsets.push(n_gc);
        n_gc += bodies[id].num_generalized_velocities();
    }
    let offset_of: HashMap<BodyId, (usize, usize)> = island
        .super_bodies
        .iter()
        .enumerate()
        .map(|(k, &id)| (id, (offsets[k], bodies[&id].num_generalized_velocities())))
        .collect();

    let n_imp: usize = island
        .super_bodies
        .iter()
        .map(|id| bodies[id].num_implicit_constraint_eqns())
        .sum();

    // Constraint Jacobian rows.
    let mut jac = DMatrix::zeros(n_rows, n_gc);
    let mut cn_v = DVector::zeros(nc);
    for (row, &ci) in contacts.iter().chain(limits.iter()).enumerate() {
        match &constraints[ci] {
            UnilateralConstraint::Contact {
                link_a,
                link_b,
                super_a,
                super_b,
                point,
                normal,
                gap,
                ..
            } => {
                cn_v[row] = *gap;
                for (link, super_id, sign) in
                    [(link_a, super_a, 1.0), (link_b, super_b, -1.0)]
                {
                    let Some(&(offset, _)) = offset_of.get(super_id) else {
                        continue;
                    };
                    let Some(jp) = bodies[super_id].point_jacobian(*link, point) else {
                        continue;
                    };
                    let row_seg = normal.transpose() * &jp;
                    for c in 0..row_seg.ncols() {
                        jac[(row, offset + c)] += sign * row_seg[(0, c)];
                    }
                }
            }
            UnilateralConstraint::Limit {
                super_body,
                joint,
                dof,
                side,
                ..
            } => {
                let Some(&(offset, _)) = offset_of.get(super_body) else {
                    continue;
                };
                let Some(unit) = bodies[super_body].joint_dof_row(*joint, *dof) else {
                    continue;
                };
                let sign = match side {
                    LimitSide::Lower => 1.0,
                    LimitSide::Upper => -1.0,
                };
                for c in 0..unit.len() {
                    jac[(row, offset + c)] += sign * unit[c];
                }
            }
        }
    }

    // Flattened generalized velocity.
    let mut qd = DVector::zeros(n_gc);
    for (k, id) in island.super_bodies.iter().enumerate() {
        let v = bodies[id].get_generalized_velocity(CoordinateEncoding::Spatial);
        qd.rows_mut(offsets[k], v.len()).copy_from(&v);
    }

    // M⁻¹·Jᵀ through each super-body's factored inertia.
    let mut minv_jt = DMatrix::zeros(n_gc, n_rows);
    for (k, id) in island.super_bodies.iter().enumerate() {
        let body = bodies[id];
        let (offset, nv) = (offsets[k], body.num_generalized_velocities());
        let lu = body.mass_matrix().lu();
        for row in 0..n_rows {
            let mut rhs = DVector::zeros(nv);
            for c in 0..nv {
                rhs[c] = jac[(row, offset + c)];
            }
            if rhs.amax() == 0.0 {
                continue;
            }
            if let Some(x) = lu.solve(&rhs) {
                minv_jt.view_mut((offset, row), (nv, 1)).copy_from(&x);
            }
        }
    }

    let mm = &jac * &minv_jt;
    let constraint_vel = &jac * &qd;

    IslandProblem {
        cn_im_cnt: DMatrix::from(mm.view((0, 0), (nc, nc)).clone_owned()),
        cn_im_lt: DMatrix::from(mm.view((0, nc), (nc, nl)).clone_owned()),
        l_im_lt: DMatrix::from(mm.view((nc, nc), (nl, nl)).clone_owned()),
        cn_v,
        l_v: DVector::zeros(nl),
        constraint_vel,
        minv_jt,
        contacts,
        limits,
        super_bodies: island.super_bodies.clone(),
        offsets,
        n_gc,
        cn_idx: 0,
        l_idx: nc,
        alpha_x_idx: nc + nl,
        n_vars: nc + nl + n_imp,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::islands::partition_islands;
    use crate::unilateral::collect_constraints;
    use approx::assert_relative_eq;
    use impetus_body::RigidBody;
    use impetus_collision::{CollisionGeometry, CollisionWorld, Shape};
    use impetus_types::{GeomId, Pose, Twist};
    use nalgebra::{Point3, Vector3};

    fn falling_sphere_scene(vz: f64) -> (Vec<DynamicBody>, CollisionWorld) {
        let sphere = RigidBody::sphere(
            BodyId::new(0),
            Pose::from_position(Point3::new(0.0, 0.0, 0.5)),
            1.0,
            0.5,
        )
        .with_velocity(Twist::from_linear(Vector3::new(0.0, 0.0, vz)));
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
        let map = crate::unilateral::link_map(&bodies);
        world.sync_geometry(|id| map.get(&id).and_then(|&(_, idx)| bodies[idx].link_state(id)));
        world.broad_phase(0.0);
        world.calc_pairwise_distances();
        (bodies, world)
    }

    fn assemble(bodies: &[DynamicBody], world: &CollisionWorld) -> IslandProblem {
        let constraints = collect_constraints(bodies, world, 1e-3);
        assert!(!constraints.is_empty());
        let statics: Vec<BodyId> = bodies
            .iter()
            .filter(|b| b.is_static())
            .map(DynamicBody::id)
            .collect();
        let islands = partition_islands(&constraints, |id| statics.contains(&id));
        assert_eq!(islands.len(), 1);
        let map: HashMap<BodyId, &DynamicBody> =
            bodies.iter().map(|b| (b.id(), b)).collect();
        assemble_island(&islands[0], &constraints, &map)
    }

    #[test]
    fn test_sphere_on_plane_effective_mass() {
        let (bodies, world) = falling_sphere_scene(-1.0);
        let problem = assemble(&bodies, &world);

        assert_eq!(problem.num_contacts(), 1);
        assert_eq!(problem.num_limits(), 0);
        assert_eq!(problem.n_gc, 6);
        assert_eq!(problem.n_vars, 1);

        // Unit mass, normal through the COM: effective mass 1, so
        // Cn·M⁻¹·Cnᵀ = 1.
        assert_relative_eq!(problem.cn_im_cnt[(0, 0)], 1.0, epsilon = 1e-9);

        // Approach velocity -1 along the normal.
        assert_relative_eq!(problem.constraint_velocities()[0], -1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_impact_rhs_projection_sentinel() {
        let (bodies, world) = falling_sphere_scene(-2.0);
        let problem = assemble(&bodies, &world);
        // Sentinel: plain approach velocity.
        assert_relative_eq!(problem.impact_rhs(-1.0)[0], -2.0, epsilon = 1e-9);
        // Restitution 0.5 deepens the target to bounce at half speed.
        assert_relative_eq!(problem.impact_rhs(0.5)[0], -3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_generalized_delta_stops_sphere() {
        let (bodies, world) = falling_sphere_scene(-2.0);
        let problem = assemble(&bodies, &world);
        // Impulse z = 2 N·s on a unit-effective-mass contact cancels the
        // 2 m/s approach.
        let z = DVector::from_vec(vec![2.0]);
        let deltas = problem.generalized_deltas(&z);
        assert_eq!(deltas.len(), 1);
        let (id, dv) = &deltas[0];
        assert_eq!(*id, BodyId::new(0));
        // [ω, v₀] layout: linear z component rises by 2.
        assert_relative_eq!(dv[5], 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_stabilization_rhs_uses_gaps() {
        let (mut bodies, _) = falling_sphere_scene(0.0);
        // Sink the sphere 0.1 into the plane.
        let q = DVector::from_vec(vec![0.0, 0.0, 0.4, 1.0, 0.0, 0.0, 0.0]);
        bodies[0].set_generalized_coordinates(CoordinateEncoding::Euler, &q);
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
        let map = crate::unilateral::link_map(&bodies);
        world.sync_geometry(|id| map.get(&id).and_then(|&(_, idx)| bodies[idx].link_state(id)));
        world.broad_phase(0.0);
        world.calc_pairwise_distances();

        let problem = assemble(&bodies, &world);
        let rhs = problem.stabilization_rhs();
        assert!(rhs[0] < -0.09 && rhs[0] > -0.11);
    }
}
