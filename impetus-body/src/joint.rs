//! Joints connecting links of an articulated body.
//!
//! A joint carries its own coordinates `q` and velocities `qd`, per-DOF
//! position limits, and storage for the constraint forces recovered by
//! inverse dynamics. Spatial axes are exposed as 6×d matrices in either the
//! global convention (world axes, world-origin referenced) or the child
//! link's frame.
//!
//! The shipped joint kinds (revolute, prismatic) have axes fixed in the
//! parent link, so the intrinsic axis derivative `s_dot` is zero; the
//! frame-motion contribution enters the dynamics through the `v ×ₘ (s·qd)`
//! term instead.

use impetus_types::{DMatrix, DVector, JointId, Pose, RefFrame, SpatialVector};
use nalgebra::{Point3, UnitQuaternion, UnitVector3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Joint kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum JointKind {
    /// Rotation about the joint axis.
    Revolute,
    /// Translation along the joint axis.
    Prismatic,
}

/// A joint between a parent link and its outboard (child) link.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Joint {
    /// Stable identifier.
    pub id: JointId,
    /// Parent link index (set when the joint is added to a tree).
    pub parent: usize,
    /// Outboard link index (set when the joint is added to a tree).
    pub child: usize,
    /// Joint kind.
    pub kind: JointKind,
    /// Joint axis in the joint frame.
    pub axis: UnitVector3<f64>,
    /// Joint frame in parent link coordinates.
    pub parent_anchor: Pose,
    /// Joint frame in child link coordinates.
    pub child_anchor: Pose,
    /// Joint coordinates (length `dof`).
    pub q: DVector<f64>,
    /// Joint velocities (length `dof`).
    pub qd: DVector<f64>,
    /// Per-DOF lower position limits.
    pub lo: DVector<f64>,
    /// Per-DOF upper position limits.
    pub hi: DVector<f64>,
    /// Constraint forces along the constrained directions, recovered by
    /// inverse dynamics (length `6 - dof`).
    pub lambda: DVector<f64>,
    /// Actuator forces applied along the free directions (length `dof`).
    pub actuator_force: DVector<f64>,
}

impl Joint {
    /// Create a joint of the given kind about `axis` (joint-frame).
    ///
    /// Limits default to unbounded; anchors default to identity.
    #[must_use]
    pub fn new(id: JointId, kind: JointKind, axis: UnitVector3<f64>) -> Self {
        let dof = 1;
        Self {
            id,
            parent: usize::MAX,
            child: usize::MAX,
            kind,
            axis,
            parent_anchor: Pose::identity(),
            child_anchor: Pose::identity(),
            q: DVector::zeros(dof),
            qd: DVector::zeros(dof),
            lo: DVector::from_element(dof, f64::NEG_INFINITY),
            hi: DVector::from_element(dof, f64::INFINITY),
            lambda: DVector::zeros(6 - dof),
            actuator_force: DVector::zeros(dof),
        }
    }

    /// Create a revolute joint.
    #[must_use]
    pub fn revolute(id: JointId, axis: UnitVector3<f64>) -> Self {
        Self::new(id, JointKind::Revolute, axis)
    }

    /// Create a prismatic joint.
    #[must_use]
    pub fn prismatic(id: JointId, axis: UnitVector3<f64>) -> Self {
        Self::new(id, JointKind::Prismatic, axis)
    }

    /// Set the joint frame in parent link coordinates.
    #[must_use]
    pub fn with_parent_anchor(mut self, anchor: Pose) -> Self {
        self.parent_anchor = anchor;
        self
    }

    /// Set the joint frame in child link coordinates.
    #[must_use]
    pub fn with_child_anchor(mut self, anchor: Pose) -> Self {
        self.child_anchor = anchor;
        self
    }

    /// Set per-DOF position limits.
    ///
    /// Swapped bounds are reordered so `lo <= hi` holds per DOF.
    #[must_use]
    pub fn with_limits(mut self, lo: f64, hi: f64) -> Self {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        self.lo = DVector::from_element(self.dof(), lo);
        self.hi = DVector::from_element(self.dof(), hi);
        self
    }

    /// Degrees of freedom.
    #[must_use]
    pub fn dof(&self) -> usize {
        match self.kind {
            JointKind::Revolute | JointKind::Prismatic => 1,
        }
    }

    /// The joint's motion as a child-anchor pose displacement.
    #[must_use]
    pub fn motion_transform(&self) -> Pose {
        match self.kind {
            JointKind::Revolute => Pose::from_position_rotation(
                Point3::origin(),
                UnitQuaternion::from_axis_angle(&self.axis, self.q[0]),
            ),
            JointKind::Prismatic => Pose::from_position(Point3::from(self.axis.as_ref() * self.q[0])),
        }
    }

    /// Child link pose given the parent link pose.
    #[must_use]
    pub fn child_pose(&self, parent_pose: &Pose) -> Pose {
        parent_pose
            .compose(&self.parent_anchor)
            .compose(&self.motion_transform())
            .compose(&self.child_anchor.inverse())
    }

    /// Joint frame in world coordinates given the parent link pose.
    #[must_use]
    pub fn world_frame(&self, parent_pose: &Pose) -> Pose {
        parent_pose.compose(&self.parent_anchor)
    }

    /// Spatial axis matrix `s` (6×d).
    ///
    /// `Global` is world axes referenced at the world origin; `Link` is the
    /// child link frame referenced at the child link origin.
    #[must_use]
    pub fn spatial_axes(&self, frame: RefFrame, parent_pose: &Pose, child_pose: &Pose) -> DMatrix<f64> {
        let mut s = DMatrix::zeros(6, self.dof());
        let col = self.spatial_axis_global(parent_pose);
        match frame {
            RefFrame::Global => {
                for r in 0..6 {
                    s[(r, 0)] = col[r];
                }
            }
            RefFrame::Link => {
                let local = transform_motion_to_link(&col, child_pose);
                for r in 0..6 {
                    s[(r, 0)] = local[r];
                }
            }
        }
        s
    }

    /// Time derivative of the spatial axis matrix `ṡ` (6×d).
    ///
    /// Zero for the shipped joint kinds: their axes are fixed in the parent
    /// link and the frame-motion part is carried by the velocity-product
    /// term of the recursions.
    #[must_use]
    pub fn spatial_axes_dot(&self, _frame: RefFrame) -> DMatrix<f64> {
        DMatrix::zeros(6, self.dof())
    }

    /// Rigid transform carrying parent-link coordinates into child-link
    /// coordinates at the current joint position.
    ///
    /// In the global convention the dynamics recursions need no transport
    /// (all quantities share the world frame); this is the link-frame
    /// counterpart.
    #[must_use]
    pub fn spatial_transform_forward(
        &self,
        parent_pose: &Pose,
        child_pose: &Pose,
    ) -> impetus_types::Isometry3<f64> {
        child_pose.inverse().compose(parent_pose).to_isometry()
    }

    /// Inverse of [`Self::spatial_transform_forward`]: child-link coordinates
    /// into parent-link coordinates.
    #[must_use]
    pub fn spatial_transform_backward(
        &self,
        parent_pose: &Pose,
        child_pose: &Pose,
    ) -> impetus_types::Isometry3<f64> {
        parent_pose.inverse().compose(child_pose).to_isometry()
    }

    /// The single global-frame axis column (world axes, world origin).
    #[must_use]
    pub fn spatial_axis_global(&self, parent_pose: &Pose) -> SpatialVector {
        let frame = self.world_frame(parent_pose);
        let axis_w = frame.transform_vector(self.axis.as_ref());
        let anchor_w = frame.position.coords;
        match self.kind {
            JointKind::Revolute => {
                let lin = anchor_w.cross(&axis_w);
                SpatialVector::new(axis_w.x, axis_w.y, axis_w.z, lin.x, lin.y, lin.z)
            }
            JointKind::Prismatic => {
                SpatialVector::new(0.0, 0.0, 0.0, axis_w.x, axis_w.y, axis_w.z)
            }
        }
    }

    /// An orthonormal basis of the constrained directions: the complement of
    /// the free axes within the 6D motion space (6×(6−d), global frame).
    #[must_use]
    pub fn constraint_axes_global(&self, parent_pose: &Pose) -> DMatrix<f64> {
        let free = self.spatial_axis_global(parent_pose);
        let free_unit = if free.norm() > 1e-12 {
            free / free.norm()
        } else {
            free
        };

        // Gram-Schmidt the identity basis against the free axis.
        let mut cols: Vec<SpatialVector> = Vec::with_capacity(6 - self.dof());
        for k in 0..6 {
            let mut e = SpatialVector::zeros();
            e[k] = 1.0;
            let mut v = e - free_unit * free_unit.dot(&e);
            for c in &cols {
                v -= c * c.dot(&v);
            }
            let len = v.norm();
            if len > 1e-9 {
                cols.push(v / len);
                if cols.len() == 6 - self.dof() {
                    break;
                }
            }
        }

        let mut out = DMatrix::zeros(6, cols.len());
        for (j, c) in cols.iter().enumerate() {
            for r in 0..6 {
                out[(r, j)] = c[r];
            }
        }
        out
    }

    /// Whether DOF `j` is at or past a limit; returns the violation
    /// magnitude (zero exactly at the bound) and the side.
    ///
    /// Firing at the bound, not only past it, lets the impulsive solver
    /// strip pressing velocities before any overshoot accumulates.
    #[must_use]
    pub fn limit_violation(&self, j: usize) -> Option<(LimitSide, f64)> {
        if self.q[j] >= self.hi[j] {
            Some((LimitSide::Upper, self.q[j] - self.hi[j]))
        } else if self.q[j] <= self.lo[j] {
            Some((LimitSide::Lower, self.lo[j] - self.q[j]))
        } else {
            None
        }
    }
}

/// Which limit of a DOF a constraint acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LimitSide {
    /// Lower bound `lo`.
    Lower,
    /// Upper bound `hi`.
    Upper,
}

/// Re-express a world-origin motion vector in a link frame referenced at the
/// link origin.
fn transform_motion_to_link(v: &SpatialVector, link_pose: &Pose) -> SpatialVector {
    let ang = Vector3::new(v[0], v[1], v[2]);
    let lin_origin = Vector3::new(v[3], v[4], v[5]);
    // Reference shift from the world origin to the link origin, then rotate
    // into link axes.
    let lin_at_link = lin_origin + ang.cross(&link_pose.position.coords);
    let r_inv = link_pose.rotation.inverse();
    let ang_l = r_inv * ang;
    let lin_l = r_inv * lin_at_link;
    SpatialVector::new(ang_l.x, ang_l.y, ang_l.z, lin_l.x, lin_l.y, lin_l.z)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_revolute_child_pose() {
        // Joint at the origin rotating about ẑ; child anchored 1 m out along
        // its own -x, so the link origin orbits at radius 1.
        let mut joint = Joint::revolute(JointId::new(0), Vector3::z_axis())
            .with_child_anchor(Pose::from_position(Point3::new(-1.0, 0.0, 0.0)));
        joint.q[0] = std::f64::consts::FRAC_PI_2;
        let child = joint.child_pose(&Pose::identity());
        assert_relative_eq!(child.position.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(child.position.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_prismatic_child_pose() {
        let mut joint = Joint::prismatic(JointId::new(0), Vector3::x_axis());
        joint.q[0] = 2.5;
        let child = joint.child_pose(&Pose::identity());
        assert_relative_eq!(child.position.x, 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_revolute_spatial_axis_offset_anchor() {
        // Revolute about ẑ through the point (1, 0, 0): the world-origin
        // referenced axis picks up a linear component p × a = (0, -1, 0)...
        let joint = Joint::revolute(JointId::new(0), Vector3::z_axis())
            .with_parent_anchor(Pose::from_position(Point3::new(1.0, 0.0, 0.0)));
        let s = joint.spatial_axis_global(&Pose::identity());
        assert_relative_eq!(s[2], 1.0, epsilon = 1e-12);
        // p × a = (1,0,0) × (0,0,1) = (0·1 - 0·0, 0·0 - 1·1, 0) = (0, -1, 0)
        assert_relative_eq!(s[3], 0.0, epsilon = 1e-12);
        assert_relative_eq!(s[4], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_constraint_axes_complement() {
        let joint = Joint::revolute(JointId::new(0), Vector3::z_axis());
        let c = joint.constraint_axes_global(&Pose::identity());
        assert_eq!(c.ncols(), 5);
        let s = joint.spatial_axis_global(&Pose::identity());
        let s_unit = s / s.norm();
        for j in 0..c.ncols() {
            let col = c.column(j);
            assert_relative_eq!(col.dot(&s_unit), 0.0, epsilon = 1e-9);
            assert_relative_eq!(col.norm(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_limit_violation_sides() {
        let mut joint = Joint::revolute(JointId::new(0), Vector3::z_axis()).with_limits(-0.1, 0.1);
        joint.q[0] = 0.15;
        let (side, v) = joint.limit_violation(0).unwrap();
        assert_eq!(side, LimitSide::Upper);
        assert_relative_eq!(v, 0.05, epsilon = 1e-12);

        joint.q[0] = -0.3;
        let (side, v) = joint.limit_violation(0).unwrap();
        assert_eq!(side, LimitSide::Lower);
        assert_relative_eq!(v, 0.2, epsilon = 1e-12);

        joint.q[0] = 0.0;
        assert!(joint.limit_violation(0).is_none());
    }

    #[test]
    fn test_swapped_limits_reordered() {
        let joint = Joint::revolute(JointId::new(0), Vector3::z_axis()).with_limits(0.5, -0.5);
        assert!(joint.lo[0] < joint.hi[0]);
    }

    #[test]
    fn test_spatial_axes_dot_is_zero() {
        let joint = Joint::revolute(JointId::new(0), Vector3::z_axis());
        let sdot = joint.spatial_axes_dot(RefFrame::Global);
        assert_eq!(sdot.norm(), 0.0);
    }
}
