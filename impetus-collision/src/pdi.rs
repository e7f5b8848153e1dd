//! Pairwise distance information.

use impetus_types::GeomId;
use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Immutable proximity snapshot for one geometry pair.
///
/// Produced by [`CollisionWorld::calc_pairwise_distances`] and consumed
/// read-only by the driver and the stabilizer. `dist < 0` denotes
/// interpenetration. The normal points from geometry B into geometry A, the
/// same convention contacts use.
///
/// [`CollisionWorld::calc_pairwise_distances`]: crate::CollisionWorld::calc_pairwise_distances
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PairwiseDistInfo {
    /// First geometry of the pair.
    pub geom_a: GeomId,
    /// Second geometry of the pair.
    pub geom_b: GeomId,
    /// Signed distance between the shapes.
    pub dist: f64,
    /// Closest point on A (world frame).
    pub point_a: Point3<f64>,
    /// Closest point on B (world frame).
    pub point_b: Point3<f64>,
    /// Unit normal pointing from B into A (world frame).
    pub normal: Vector3<f64>,
}

impl PairwiseDistInfo {
    /// Whether the pair interpenetrates.
    #[must_use]
    pub fn is_penetrating(&self) -> bool {
        self.dist < 0.0
    }

    /// Whether the pair is within `tol` of touching (or penetrating).
    #[must_use]
    pub fn is_kissing(&self, tol: f64) -> bool {
        self.dist <= tol
    }
}
