//! The super-body abstraction: free rigid body or articulated body.
//!
//! [`DynamicBody`] is the unit at which generalized coordinates are
//! concatenated for solver block layout, and the surface the driver and the
//! constraint assembler program against. "Is this body articulated" is an
//! enum discriminant, not a downcast.

use impetus_types::{
    spatial_cross_force, BodyId, CoordinateEncoding, DMatrix, DVector, Pose, SpatialVector, Twist,
    UnitQuaternion,
};
use nalgebra::{Point3, Quaternion, Vector3};

use crate::articulated::{rigid_euler_rate, ArticulatedBody};
use crate::forward;
use crate::rigid::{Compliance, RigidBody};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A dynamic body: the articulated body containing a link, or the free rigid
/// body itself.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DynamicBody {
    /// A free rigid body.
    Rigid(RigidBody),
    /// An articulated body (tree of links and joints).
    Articulated(ArticulatedBody),
}

impl DynamicBody {
    /// The super-body's stable id.
    #[must_use]
    pub fn id(&self) -> BodyId {
        match self {
            Self::Rigid(b) => b.id,
            Self::Articulated(ab) => ab.id,
        }
    }

    /// Whether this is an articulated body.
    #[must_use]
    pub fn is_articulated(&self) -> bool {
        matches!(self, Self::Articulated(_))
    }

    /// Whether the body never moves (static free body).
    #[must_use]
    pub fn is_static(&self) -> bool {
        match self {
            Self::Rigid(b) => b.is_static,
            Self::Articulated(_) => false,
        }
    }

    /// Ids of the member links (the body's own id for a free body).
    #[must_use]
    pub fn link_ids(&self) -> Vec<BodyId> {
        match self {
            Self::Rigid(b) => vec![b.id],
            Self::Articulated(ab) => ab.links().iter().map(|l| l.id).collect(),
        }
    }

    /// Pose and twist of a member link, for collision-geometry sync.
    #[must_use]
    pub fn link_state(&self, link_id: BodyId) -> Option<(Pose, Twist)> {
        match self {
            Self::Rigid(b) => (b.id == link_id).then(|| (b.pose, b.velocity)),
            Self::Articulated(ab) => ab
                .link_index(link_id)
                .map(|i| (ab.links()[i].pose, ab.links()[i].velocity)),
        }
    }

    /// Contact response class of a member link.
    #[must_use]
    pub fn link_compliance(&self, link_id: BodyId) -> Compliance {
        match self {
            Self::Rigid(b) => b.compliance,
            Self::Articulated(ab) => ab
                .link_index(link_id)
                .map_or(Compliance::Rigid, |i| ab.links()[i].compliance),
        }
    }

    /// Generalized-velocity length (spatial encoding).
    #[must_use]
    pub fn num_generalized_velocities(&self) -> usize {
        match self {
            Self::Rigid(_) => 6,
            Self::Articulated(ab) => ab.num_generalized_velocities(),
        }
    }

    /// Generalized-coordinate length in the given encoding.
    #[must_use]
    pub fn num_generalized_coordinates(&self, enc: CoordinateEncoding) -> usize {
        match self {
            Self::Rigid(_) => match enc {
                CoordinateEncoding::Euler => 7,
                CoordinateEncoding::Spatial => 6,
            },
            Self::Articulated(ab) => ab.num_generalized_coordinates(enc),
        }
    }

    /// Read the generalized coordinates.
    #[must_use]
    pub fn get_generalized_coordinates(&self, enc: CoordinateEncoding) -> DVector<f64> {
        match self {
            Self::Rigid(b) => {
                let mut out = DVector::zeros(self.num_generalized_coordinates(enc));
                out[0] = b.pose.position.x;
                out[1] = b.pose.position.y;
                out[2] = b.pose.position.z;
                match enc {
                    CoordinateEncoding::Euler => {
                        let q = b.pose.rotation.quaternion();
                        out[3] = q.w;
                        out[4] = q.i;
                        out[5] = q.j;
                        out[6] = q.k;
                    }
                    CoordinateEncoding::Spatial => {
                        let sv = b.pose.rotation.scaled_axis();
                        out[3] = sv.x;
                        out[4] = sv.y;
                        out[5] = sv.z;
                    }
                }
                out
            }
            Self::Articulated(ab) => ab.get_generalized_coordinates(enc),
        }
    }

    /// Write the generalized coordinates (Euler-encoded quaternions are
    /// renormalized).
    pub fn set_generalized_coordinates(&mut self, enc: CoordinateEncoding, v: &DVector<f64>) {
        match self {
            Self::Rigid(b) => {
                b.pose.position = Point3::new(v[0], v[1], v[2]);
                match enc {
                    CoordinateEncoding::Euler => {
                        b.pose.rotation = UnitQuaternion::from_quaternion(Quaternion::new(
                            v[3], v[4], v[5], v[6],
                        ));
                    }
                    CoordinateEncoding::Spatial => {
                        b.pose.rotation =
                            UnitQuaternion::from_scaled_axis(Vector3::new(v[3], v[4], v[5]));
                    }
                }
            }
            Self::Articulated(ab) => ab.set_generalized_coordinates(enc, v),
        }
    }

    /// Read the generalized velocity.
    ///
    /// `Spatial` is `[ω, v₀]` world-origin referenced (plus joint rates);
    /// `Euler` is the position-integration rate matching the euler
    /// coordinate layout.
    #[must_use]
    pub fn get_generalized_velocity(&self, enc: CoordinateEncoding) -> DVector<f64> {
        match self {
            Self::Rigid(b) => match enc {
                CoordinateEncoding::Spatial => {
                    DVector::from_iterator(6, b.spatial_velocity_origin().iter().copied())
                }
                CoordinateEncoding::Euler => rigid_euler_rate(b),
            },
            Self::Articulated(ab) => ab.get_generalized_velocity(enc),
        }
    }

    /// Write the generalized velocity (spatial encoding).
    pub fn set_generalized_velocity(&mut self, v: &DVector<f64>) {
        match self {
            Self::Rigid(b) => {
                let mut sv = SpatialVector::zeros();
                for r in 0..6 {
                    sv[r] = v[r];
                }
                b.set_spatial_velocity_origin(&sv);
            }
            Self::Articulated(ab) => ab.set_generalized_velocity(v),
        }
    }

    /// Generalized acceleration from the last forward-dynamics call
    /// (spatial encoding).
    #[must_use]
    pub fn get_generalized_acceleration(&self) -> DVector<f64> {
        match self {
            Self::Rigid(b) => DVector::from_iterator(6, b.accel.iter().copied()),
            Self::Articulated(ab) => ab.generalized_acceleration().clone(),
        }
    }

    /// Clear accumulated external wrenches.
    pub fn clear_forces(&mut self) {
        match self {
            Self::Rigid(b) => b.clear_forces(),
            Self::Articulated(ab) => {
                for link in ab.links_mut() {
                    link.clear_forces();
                }
            }
        }
    }

    /// Compute and store generalized accelerations.
    pub fn forward_dynamics(&mut self, gravity: &Vector3<f64>) {
        match self {
            Self::Rigid(b) => {
                if b.is_static {
                    b.accel = SpatialVector::zeros();
                    return;
                }
                let inertia = b.spatial_inertia_at(&Point3::origin());
                let v = b.spatial_velocity_origin();
                let grav = impetus_types::Wrench::from_force_at_point(
                    gravity * b.mass(),
                    &b.com_world(),
                    &Point3::origin(),
                );
                let rhs = b.ext_wrench_origin() + grav.to_spatial()
                    - spatial_cross_force(v, inertia.mul_motion(&v));
                b.accel = inertia.solve_motion(&rhs).unwrap_or_else(SpatialVector::zeros);
            }
            Self::Articulated(ab) => forward::forward_dynamics(ab, gravity),
        }
    }

    /// Integrate velocities by `h` using the stored accelerations
    /// (semi-implicit Euler velocity update).
    pub fn integrate_velocity(&mut self, h: f64) {
        if self.is_static() {
            return;
        }
        let qd = self.get_generalized_velocity(CoordinateEncoding::Spatial)
            + self.get_generalized_acceleration() * h;
        self.set_generalized_velocity(&qd);
    }

    /// Joint-space (or 6×6 spatial) mass matrix.
    #[must_use]
    pub fn mass_matrix(&self) -> DMatrix<f64> {
        match self {
            Self::Rigid(b) => {
                let inertia = b.spatial_inertia_at(&Point3::origin());
                DMatrix::from_fn(6, 6, |i, j| inertia.matrix()[(i, j)])
            }
            Self::Articulated(ab) => forward::mass_matrix(ab),
        }
    }

    /// Solve `M x = rhs`. Static bodies absorb anything (`x = 0`).
    #[must_use]
    pub fn solve_inertia(&self, rhs: &DVector<f64>) -> DVector<f64> {
        if self.is_static() {
            return DVector::zeros(rhs.len());
        }
        self.mass_matrix()
            .lu()
            .solve(rhs)
            .unwrap_or_else(|| DVector::zeros(rhs.len()))
    }

    /// Apply a generalized impulse: `qd += M⁻¹·imp`.
    pub fn apply_generalized_impulse(&mut self, imp: &DVector<f64>) {
        if self.is_static() {
            return;
        }
        let delta = self.solve_inertia(imp);
        let qd = self.get_generalized_velocity(CoordinateEncoding::Spatial) + delta;
        self.set_generalized_velocity(&qd);
    }

    /// Jacobian of a world point attached to `link_id` with respect to the
    /// spatial-encoding generalized velocity (3×nv).
    #[must_use]
    pub fn point_jacobian(&self, link_id: BodyId, point: &Point3<f64>) -> Option<DMatrix<f64>> {
        match self {
            Self::Rigid(b) => {
                if b.id != link_id {
                    return None;
                }
                let p = point.coords;
                let mut jac = DMatrix::zeros(3, 6);
                jac[(0, 1)] = p.z;
                jac[(0, 2)] = -p.y;
                jac[(1, 0)] = -p.z;
                jac[(1, 2)] = p.x;
                jac[(2, 0)] = p.y;
                jac[(2, 1)] = -p.x;
                jac[(0, 3)] = 1.0;
                jac[(1, 4)] = 1.0;
                jac[(2, 5)] = 1.0;
                Some(jac)
            }
            Self::Articulated(ab) => {
                let link = ab.link_index(link_id)?;
                Some(ab.point_jacobian(link, point))
            }
        }
    }

    /// Unit generalized-force row for one joint DOF (articulated bodies
    /// only; 1×nv).
    #[must_use]
    pub fn joint_dof_row(&self, joint: usize, dof: usize) -> Option<DVector<f64>> {
        match self {
            Self::Rigid(_) => None,
            Self::Articulated(ab) => {
                let mut row = DVector::zeros(ab.num_generalized_velocities());
                let off = ab.joint_dof_offset(joint) + dof;
                row[off] = 1.0;
                Some(row)
            }
        }
    }

    /// Accumulate a force applied at a world point onto a member link.
    pub fn apply_force_at_link(
        &mut self,
        link_id: BodyId,
        force: Vector3<f64>,
        point: &Point3<f64>,
    ) {
        match self {
            Self::Rigid(b) => {
                if b.id == link_id && !b.is_static {
                    b.apply_force_at_point(force, point);
                }
            }
            Self::Articulated(ab) => {
                if let Some(i) = ab.link_index(link_id) {
                    ab.links_mut()[i].apply_force_at_point(force, point);
                }
            }
        }
    }

    /// Number of implicit articulation constraint equations (loop closures).
    ///
    /// Zero for tree-structured bodies; reserved in the solver index scheme.
    #[must_use]
    pub fn num_implicit_constraint_eqns(&self) -> usize {
        0
    }

    /// Map a spatial-encoding velocity (or displacement rate) to the euler
    /// coordinate rate at the current configuration.
    ///
    /// The base linear/quaternion slots follow `ṗ = v₀ + ω × p` and
    /// `q̇ = ½ ω ⊗ q`; joint slots pass through.
    #[must_use]
    pub fn spatial_to_euler_rate(&self, qd_spatial: &DVector<f64>) -> DVector<f64> {
        let map_base = |pose: &Pose, v: &[f64], out: &mut DVector<f64>| {
            let omega = Vector3::new(v[0], v[1], v[2]);
            let v0 = Vector3::new(v[3], v[4], v[5]);
            let pdot = v0 + omega.cross(&pose.position.coords);
            out[0] = pdot.x;
            out[1] = pdot.y;
            out[2] = pdot.z;
            let qdot = Quaternion::from_parts(0.0, omega) * pose.rotation.into_inner() * 0.5;
            out[3] = qdot.w;
            out[4] = qdot.i;
            out[5] = qdot.j;
            out[6] = qdot.k;
        };

        match self {
            Self::Rigid(b) => {
                let mut out = DVector::zeros(7);
                let v: Vec<f64> = qd_spatial.iter().copied().collect();
                map_base(&b.pose, &v, &mut out);
                out
            }
            Self::Articulated(ab) => {
                let nq = ab.num_generalized_coordinates(CoordinateEncoding::Euler);
                let mut out = DVector::zeros(nq);
                let mut src = 0;
                let mut dst = 0;
                if ab.is_floating_base() {
                    let v: Vec<f64> = qd_spatial.iter().take(6).copied().collect();
                    map_base(&ab.links()[0].pose, &v, &mut out);
                    src = 6;
                    dst = 7;
                }
                while src < qd_spatial.len() {
                    out[dst] = qd_spatial[src];
                    src += 1;
                    dst += 1;
                }
                out
            }
        }
    }

    /// Total kinetic energy.
    #[must_use]
    pub fn kinetic_energy(&self) -> f64 {
        match self {
            Self::Rigid(b) => b.kinetic_energy(),
            Self::Articulated(ab) => ab.kinetic_energy(),
        }
    }

    /// Total gravitational potential energy.
    #[must_use]
    pub fn potential_energy(&self, gravity: &Vector3<f64>) -> f64 {
        match self {
            Self::Rigid(b) => b.potential_energy(gravity),
            Self::Articulated(ab) => ab.potential_energy(gravity),
        }
    }

    /// Whether all coordinates are finite.
    #[must_use]
    pub fn coordinates_finite(&self) -> bool {
        match self {
            Self::Rigid(b) => b.pose.is_finite(),
            Self::Articulated(ab) => ab.is_finite(),
        }
    }

    /// Whether all velocities are finite.
    #[must_use]
    pub fn velocities_finite(&self) -> bool {
        self.get_generalized_velocity(CoordinateEncoding::Spatial)
            .iter()
            .all(|x| x.is_finite())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn free_sphere() -> DynamicBody {
        DynamicBody::Rigid(RigidBody::sphere(
            BodyId::new(0),
            Pose::from_position(Point3::new(0.0, 0.0, 2.0)),
            1.0,
            0.5,
        ))
    }

    #[test]
    fn test_euler_coordinate_roundtrip() {
        let mut body = free_sphere();
        let q = body.get_generalized_coordinates(CoordinateEncoding::Euler);
        body.set_generalized_coordinates(CoordinateEncoding::Euler, &q);
        let q2 = body.get_generalized_coordinates(CoordinateEncoding::Euler);
        assert_relative_eq!((q2 - q).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_free_fall_acceleration() {
        let mut body = free_sphere();
        body.forward_dynamics(&Vector3::new(0.0, 0.0, -9.81));
        let qdd = body.get_generalized_acceleration();
        assert_relative_eq!(qdd[5], -9.81, epsilon = 1e-10);
        assert_relative_eq!(qdd[0], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_velocity_integration() {
        let mut body = free_sphere();
        body.forward_dynamics(&Vector3::new(0.0, 0.0, -9.81));
        body.integrate_velocity(0.1);
        let DynamicBody::Rigid(b) = &body else {
            unreachable!()
        };
        assert_relative_eq!(b.velocity.linear.z, -0.981, epsilon = 1e-9);
    }

    #[test]
    fn test_impulse_changes_momentum() {
        let mut body = free_sphere();
        // Impulse of 2 N·s along +x on a 1 kg body: Δv = 2 m/s.
        let point = Point3::new(0.0, 0.0, 2.0);
        let jac = body.point_jacobian(BodyId::new(0), &point).unwrap();
        let imp = jac.transpose() * Vector3::new(2.0, 0.0, 0.0);
        body.apply_generalized_impulse(&imp);
        let DynamicBody::Rigid(b) = &body else {
            unreachable!()
        };
        assert_relative_eq!(b.velocity.linear.x, 2.0, epsilon = 1e-9);
        // Through the COM: no spin.
        assert_relative_eq!(b.velocity.angular.norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_static_body_ignores_impulse() {
        let mut body = DynamicBody::Rigid(RigidBody::new_static(BodyId::new(0), Pose::identity()));
        body.apply_generalized_impulse(&DVector::from_element(6, 100.0));
        assert!(body.velocities_finite());
        assert_relative_eq!(
            body.get_generalized_velocity(CoordinateEncoding::Spatial).norm(),
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_point_jacobian_rigid_matches_velocity() {
        let mut body = free_sphere();
        let qd = DVector::from_vec(vec![0.3, -0.1, 0.2, 1.0, 0.0, -0.5]);
        body.set_generalized_velocity(&qd);
        let point = Point3::new(0.5, -1.0, 2.5);
        let jac = body.point_jacobian(BodyId::new(0), &point).unwrap();
        let v_pred = &jac * &qd;
        let DynamicBody::Rigid(b) = &body else {
            unreachable!()
        };
        let v_actual = b.velocity.at_point(&point, &b.pose.position).linear;
        for r in 0..3 {
            assert_relative_eq!(v_pred[r], v_actual[r], epsilon = 1e-10);
        }
    }
}
