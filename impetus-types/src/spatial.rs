//! Poses, twists, wrenches, and 6D spatial vector algebra.
//!
//! Implements the spatial vector operations used throughout the dynamics
//! pipeline (RNE, forward dynamics, constraint Jacobians). Functions here are
//! pure math with no pipeline state.
//!
//! Following Featherstone's convention, 6-vectors are `[angular (3),
//! linear (3)]`:
//!
//! - Motion vectors: `[ω, v]` (angular velocity, linear velocity)
//! - Force vectors: `[τ, f]` (torque, force)

use nalgebra::{Isometry3, Point3, UnitQuaternion, Vector3, Vector6};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 6D spatial vector: `[angular (3), linear (3)]`.
pub type SpatialVector = Vector6<f64>;

/// Reference frame in which a spatial quantity is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RefFrame {
    /// World axes, world origin. Tree propagation is plain vector addition.
    #[default]
    Global,
    /// The owning link's body frame.
    Link,
}

/// Encoding of a generalized-coordinate vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CoordinateEncoding {
    /// Position-level encoding: orientations are unit quaternions (length nq).
    Euler,
    /// Velocity-level encoding: orientations are angular velocities (length nv).
    Spatial,
}

/// Spatial cross product for motion vectors: `v ×ₘ s`.
#[inline]
#[must_use]
pub fn spatial_cross_motion(v: SpatialVector, s: SpatialVector) -> SpatialVector {
    let w = Vector3::new(v[0], v[1], v[2]);
    let v_lin = Vector3::new(v[3], v[4], v[5]);
    let s_ang = Vector3::new(s[0], s[1], s[2]);
    let s_lin = Vector3::new(s[3], s[4], s[5]);

    let result_ang = w.cross(&s_ang);
    let result_lin = w.cross(&s_lin) + v_lin.cross(&s_ang);

    SpatialVector::new(
        result_ang.x,
        result_ang.y,
        result_ang.z,
        result_lin.x,
        result_lin.y,
        result_lin.z,
    )
}

/// Spatial cross product for force vectors: `v ×* f`.
#[inline]
#[must_use]
pub fn spatial_cross_force(v: SpatialVector, f: SpatialVector) -> SpatialVector {
    let w = Vector3::new(v[0], v[1], v[2]);
    let v_lin = Vector3::new(v[3], v[4], v[5]);
    let f_ang = Vector3::new(f[0], f[1], f[2]);
    let f_lin = Vector3::new(f[3], f[4], f[5]);

    let result_ang = w.cross(&f_ang) + v_lin.cross(&f_lin);
    let result_lin = w.cross(&f_lin);

    SpatialVector::new(
        result_ang.x,
        result_ang.y,
        result_ang.z,
        result_lin.x,
        result_lin.y,
        result_lin.z,
    )
}

/// Position and orientation of a rigid body.
///
/// # Example
///
/// ```
/// use impetus_types::Pose;
/// use nalgebra::Point3;
///
/// let pose = Pose::from_position(Point3::new(1.0, 2.0, 3.0));
/// let world = pose.transform_point(&Point3::new(1.0, 0.0, 0.0));
/// assert_eq!(world, Point3::new(2.0, 2.0, 3.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    /// Position in world coordinates.
    pub position: Point3<f64>,
    /// Orientation as a unit quaternion.
    pub rotation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// Create an identity pose (origin, no rotation).
    #[must_use]
    pub fn identity() -> Self {
        Self {
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Create a pose from position only (identity rotation).
    #[must_use]
    pub fn from_position(position: Point3<f64>) -> Self {
        Self {
            position,
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Create a pose from position and rotation.
    #[must_use]
    pub const fn from_position_rotation(
        position: Point3<f64>,
        rotation: UnitQuaternion<f64>,
    ) -> Self {
        Self { position, rotation }
    }

    /// Convert to an isometry.
    #[must_use]
    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(self.position.coords.into(), self.rotation)
    }

    /// Transform a point from local to world coordinates.
    #[must_use]
    pub fn transform_point(&self, local: &Point3<f64>) -> Point3<f64> {
        self.position + self.rotation * local.coords
    }

    /// Transform a vector from local to world coordinates (rotation only).
    #[must_use]
    pub fn transform_vector(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * local
    }

    /// Transform a point from world to local coordinates.
    #[must_use]
    pub fn inverse_transform_point(&self, world: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation.inverse() * (world - self.position))
    }

    /// Transform a vector from world to local coordinates.
    #[must_use]
    pub fn inverse_transform_vector(&self, world: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse() * world
    }

    /// Compute the inverse pose.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let inv_rotation = self.rotation.inverse();
        Self {
            position: Point3::from(-(inv_rotation * self.position.coords)),
            rotation: inv_rotation,
        }
    }

    /// Compose two poses: `self * other`.
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            position: self.transform_point(&other.position),
            rotation: self.rotation * other.rotation,
        }
    }

    /// Check if the pose contains `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.coords.iter().all(|x| x.is_finite())
            && self.rotation.coords.iter().all(|x| x.is_finite())
    }
}

/// Angular and linear velocity of a rigid body.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Twist {
    /// Angular velocity (rad/s).
    pub angular: Vector3<f64>,
    /// Linear velocity (m/s).
    pub linear: Vector3<f64>,
}

impl Default for Twist {
    fn default() -> Self {
        Self::zero()
    }
}

impl Twist {
    /// Create a twist with specified angular and linear velocity.
    #[must_use]
    pub const fn new(angular: Vector3<f64>, linear: Vector3<f64>) -> Self {
        Self { angular, linear }
    }

    /// Create a zero twist (at rest).
    #[must_use]
    pub fn zero() -> Self {
        Self {
            angular: Vector3::zeros(),
            linear: Vector3::zeros(),
        }
    }

    /// Create a twist with linear velocity only.
    #[must_use]
    pub fn from_linear(v: Vector3<f64>) -> Self {
        Self {
            angular: Vector3::zeros(),
            linear: v,
        }
    }

    /// Create a twist with angular velocity only.
    #[must_use]
    pub fn from_angular(w: Vector3<f64>) -> Self {
        Self {
            angular: w,
            linear: Vector3::zeros(),
        }
    }

    /// Pack into a `[angular, linear]` spatial vector.
    #[must_use]
    pub fn to_spatial(&self) -> SpatialVector {
        SpatialVector::new(
            self.angular.x,
            self.angular.y,
            self.angular.z,
            self.linear.x,
            self.linear.y,
            self.linear.z,
        )
    }

    /// Unpack from a `[angular, linear]` spatial vector.
    #[must_use]
    pub fn from_spatial(v: &SpatialVector) -> Self {
        Self {
            angular: Vector3::new(v[0], v[1], v[2]),
            linear: Vector3::new(v[3], v[4], v[5]),
        }
    }

    /// Velocity of the material point at `target` given this twist referenced
    /// at `reference`.
    ///
    /// Motion transport: angular unchanged, linear += angular × r.
    #[must_use]
    pub fn at_point(&self, target: &Point3<f64>, reference: &Point3<f64>) -> Self {
        let r = target - reference;
        Self {
            angular: self.angular,
            linear: self.linear + self.angular.cross(&r),
        }
    }

    /// Check if the twist contains `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.angular.iter().all(|x| x.is_finite()) && self.linear.iter().all(|x| x.is_finite())
    }
}

/// Torque and force acting on a rigid body.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Wrench {
    /// Torque (N·m).
    pub torque: Vector3<f64>,
    /// Force (N).
    pub force: Vector3<f64>,
}

impl Default for Wrench {
    fn default() -> Self {
        Self::zero()
    }
}

impl Wrench {
    /// Create a wrench from torque and force.
    #[must_use]
    pub const fn new(torque: Vector3<f64>, force: Vector3<f64>) -> Self {
        Self { torque, force }
    }

    /// Create a zero wrench.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            torque: Vector3::zeros(),
            force: Vector3::zeros(),
        }
    }

    /// A pure force applied at `point`, referenced about `reference`.
    ///
    /// Force transport: force unchanged, torque = (point − reference) × force.
    #[must_use]
    pub fn from_force_at_point(
        force: Vector3<f64>,
        point: &Point3<f64>,
        reference: &Point3<f64>,
    ) -> Self {
        let r = point - reference;
        Self {
            torque: r.cross(&force),
            force,
        }
    }

    /// Pack into a `[torque, force]` spatial vector.
    #[must_use]
    pub fn to_spatial(&self) -> SpatialVector {
        SpatialVector::new(
            self.torque.x,
            self.torque.y,
            self.torque.z,
            self.force.x,
            self.force.y,
            self.force.z,
        )
    }

    /// Unpack from a `[torque, force]` spatial vector.
    #[must_use]
    pub fn from_spatial(v: &SpatialVector) -> Self {
        Self {
            torque: Vector3::new(v[0], v[1], v[2]),
            force: Vector3::new(v[3], v[4], v[5]),
        }
    }

    /// Shift the wrench reference point from `reference` to `target`.
    ///
    /// Force transport: force unchanged, torque -= r × force.
    #[must_use]
    pub fn at_point(&self, target: &Point3<f64>, reference: &Point3<f64>) -> Self {
        let r = target - reference;
        Self {
            torque: self.torque - r.cross(&self.force),
            force: self.force,
        }
    }

    /// Accumulate another wrench (same reference point).
    pub fn accumulate(&mut self, other: &Self) {
        self.torque += other.torque;
        self.force += other.force;
    }
}
