//! Collision geometry instances.
//!
//! A [`CollisionGeometry`] pairs a [`Shape`] with a pose offset on an owning
//! body. The driver refreshes the cached world pose and twist from the body
//! state before any proximity query; the collision layer itself never reaches
//! back into the body model.

use impetus_types::{BodyId, GeomId, Pose, Twist};
use nalgebra::Point3;

use crate::shape::{Aabb, Shape};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A collision geometry attached to a body.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CollisionGeometry {
    /// Stable identifier.
    pub id: GeomId,
    /// The owning body.
    pub body: BodyId,
    /// The shape primitive.
    pub shape: Shape,
    /// Pose offset on the owning body.
    pub local_pose: Pose,
    /// Cached world pose; refreshed by the driver each query cycle.
    pub world_pose: Pose,
    /// Cached world twist of the geometry, referenced at `world_pose.position`.
    pub twist: Twist,
    /// Compliant geometries get penalty forces instead of impulses and are
    /// excluded from conservative advancement and stabilization.
    pub compliant: bool,
    /// Disabled geometries are skipped by the broadphase.
    pub enabled: bool,
}

impl CollisionGeometry {
    /// Create a geometry at the body origin.
    #[must_use]
    pub fn new(id: GeomId, body: BodyId, shape: Shape) -> Self {
        Self {
            id,
            body,
            shape,
            local_pose: Pose::identity(),
            world_pose: Pose::identity(),
            twist: Twist::zero(),
            compliant: false,
            enabled: true,
        }
    }

    /// Set the pose offset on the owning body.
    #[must_use]
    pub fn with_local_pose(mut self, local_pose: Pose) -> Self {
        self.local_pose = local_pose;
        self
    }

    /// Mark the geometry compliant.
    #[must_use]
    pub fn with_compliance(mut self, compliant: bool) -> Self {
        self.compliant = compliant;
        self
    }

    /// Refresh the cached world pose and twist from the owning body's state.
    ///
    /// `body_twist` is referenced at `body_pose.position`; the stored twist is
    /// re-referenced at the geometry origin.
    pub fn sync(&mut self, body_pose: &Pose, body_twist: &Twist) {
        self.world_pose = body_pose.compose(&self.local_pose);
        self.twist = body_twist.at_point(&self.world_pose.position, &body_pose.position);
    }

    /// World AABB at the cached pose.
    #[must_use]
    pub fn aabb(&self) -> Aabb {
        self.shape.aabb(&self.world_pose)
    }

    /// Velocity of the material point at `point` (world frame).
    #[must_use]
    pub fn velocity_at(&self, point: &Point3<f64>) -> Twist {
        self.twist.at_point(point, &self.world_pose.position)
    }

    /// Whether the shape is unbounded (plane or height field).
    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.shape.bounding_radius().is_infinite()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn test_sync_composes_poses() {
        let mut geom = CollisionGeometry::new(GeomId::new(0), BodyId::new(0), Shape::sphere(1.0))
            .with_local_pose(Pose::from_position(Point3::new(0.0, 0.0, 1.0)));
        let body_pose = Pose::from_position(Point3::new(2.0, 0.0, 0.0));
        geom.sync(&body_pose, &Twist::zero());
        assert_relative_eq!(geom.world_pose.position.x, 2.0, epsilon = 1e-12);
        assert_relative_eq!(geom.world_pose.position.z, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sync_rereferences_twist() {
        // Body spinning about ẑ at its origin; a geometry offset along x
        // acquires a linear velocity along y.
        let mut geom = CollisionGeometry::new(GeomId::new(0), BodyId::new(0), Shape::sphere(0.1))
            .with_local_pose(Pose::from_position(Point3::new(1.0, 0.0, 0.0)));
        let body_pose = Pose::identity();
        geom.sync(&body_pose, &Twist::from_angular(Vector3::z()));
        assert_relative_eq!(geom.twist.linear.y, 1.0, epsilon = 1e-12);
    }
}
