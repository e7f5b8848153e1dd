//! Collision shape primitives.
//!
//! Shapes are a tagged enum; pairwise behavior is selected by a dispatch
//! table over the tags rather than by dynamic casts. Each shape supports the
//! small query surface the narrowphase needs: world AABBs, a bounding radius
//! for conservative advancement, representative surface vertices for the
//! vertex-scan kernels, and a signed-distance-with-normal point query.

use impetus_types::Pose;
use nalgebra::{Point3, Vector3};

use crate::heightfield::HeightField;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Aabb {
    /// Minimum corner.
    pub min: Point3<f64>,
    /// Maximum corner.
    pub max: Point3<f64>,
}

impl Aabb {
    /// Create an AABB from corners.
    #[must_use]
    pub const fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// An AABB containing only `point`.
    #[must_use]
    pub fn from_point(point: Point3<f64>) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    /// Grow symmetrically by `margin` on every axis.
    #[must_use]
    pub fn expanded(&self, margin: f64) -> Self {
        let m = Vector3::repeat(margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Test for overlap with another AABB.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }
}

/// Tag identifying a shape variant; drives narrowphase dispatch.
///
/// Ordering matters: kernels are written for `tag_a <= tag_b` and callers
/// swap-and-negate when the incoming pair is reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ShapeTag {
    /// Sphere primitive.
    Sphere,
    /// Box primitive.
    Box,
    /// Infinite half-space.
    Plane,
    /// Height field terrain.
    HeightField,
    /// Convex point cloud.
    Convex,
}

/// A collision shape primitive.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Shape {
    /// Sphere centered at the local origin.
    Sphere {
        /// Sphere radius.
        radius: f64,
    },
    /// Box centered at the local origin, axis-aligned in the local frame.
    Box {
        /// Half-extents along the local axes.
        half_extents: Vector3<f64>,
    },
    /// Infinite half-space; outward normal is the local +Z axis, surface
    /// passes through the local origin.
    Plane,
    /// Height field terrain (local Z-up).
    HeightField(HeightField),
    /// Convex hull of a point cloud (local coordinates).
    Convex {
        /// Hull vertices.
        vertices: Vec<Point3<f64>>,
    },
}

impl Shape {
    /// Create a sphere.
    #[must_use]
    pub fn sphere(radius: f64) -> Self {
        Self::Sphere { radius }
    }

    /// Create a box from half-extents.
    #[must_use]
    pub fn cuboid(half_extents: Vector3<f64>) -> Self {
        Self::Box { half_extents }
    }

    /// The shape's dispatch tag.
    #[must_use]
    pub fn tag(&self) -> ShapeTag {
        match self {
            Self::Sphere { .. } => ShapeTag::Sphere,
            Self::Box { .. } => ShapeTag::Box,
            Self::Plane => ShapeTag::Plane,
            Self::HeightField(_) => ShapeTag::HeightField,
            Self::Convex { .. } => ShapeTag::Convex,
        }
    }

    /// Radius of a bounding sphere about the local origin.
    ///
    /// Infinite shapes (plane, height field) report `f64::INFINITY`; the
    /// conservative-advancement bound treats them as immobile extent.
    #[must_use]
    pub fn bounding_radius(&self) -> f64 {
        match self {
            Self::Sphere { radius } => *radius,
            Self::Box { half_extents } => half_extents.norm(),
            Self::Plane | Self::HeightField(_) => f64::INFINITY,
            Self::Convex { vertices } => vertices
                .iter()
                .map(|v| v.coords.norm())
                .fold(0.0, f64::max),
        }
    }

    /// World-frame AABB of the shape posed at `pose`.
    #[must_use]
    pub fn aabb(&self, pose: &Pose) -> Aabb {
        match self {
            Self::Sphere { radius } => {
                Aabb::from_point(pose.position).expanded(*radius)
            }
            Self::Box { half_extents } => {
                // Rotated box extent: |R| * h per axis.
                let rot = pose.rotation.to_rotation_matrix();
                let m = rot.matrix();
                let ext = Vector3::new(
                    m[(0, 0)].abs() * half_extents.x
                        + m[(0, 1)].abs() * half_extents.y
                        + m[(0, 2)].abs() * half_extents.z,
                    m[(1, 0)].abs() * half_extents.x
                        + m[(1, 1)].abs() * half_extents.y
                        + m[(1, 2)].abs() * half_extents.z,
                    m[(2, 0)].abs() * half_extents.x
                        + m[(2, 1)].abs() * half_extents.y
                        + m[(2, 2)].abs() * half_extents.z,
                );
                Aabb::new(pose.position - ext, pose.position + ext)
            }
            Self::Plane => {
                // Unbounded; callers special-case planes before broadphase
                // culling, so a huge box is adequate.
                const BIG: f64 = 1e12;
                Aabb::new(
                    Point3::new(-BIG, -BIG, -BIG),
                    Point3::new(BIG, BIG, BIG),
                )
            }
            Self::HeightField(hf) => {
                let corners = [
                    Point3::new(0.0, 0.0, hf.min_height()),
                    Point3::new(hf.extent_x(), 0.0, hf.min_height()),
                    Point3::new(0.0, hf.extent_y(), hf.min_height()),
                    Point3::new(hf.extent_x(), hf.extent_y(), hf.min_height()),
                    Point3::new(0.0, 0.0, hf.max_height()),
                    Point3::new(hf.extent_x(), 0.0, hf.max_height()),
                    Point3::new(0.0, hf.extent_y(), hf.max_height()),
                    Point3::new(hf.extent_x(), hf.extent_y(), hf.max_height()),
                ];
                Self::aabb_of_points(pose, &corners)
            }
            Self::Convex { vertices } => Self::aabb_of_points(pose, vertices),
        }
    }

    fn aabb_of_points(pose: &Pose, points: &[Point3<f64>]) -> Aabb {
        let mut min = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        let mut max = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in points {
            let w = pose.transform_point(p);
            for k in 0..3 {
                if w[k] < min[k] {
                    min[k] = w[k];
                }
                if w[k] > max[k] {
                    max[k] = w[k];
                }
            }
        }
        Aabb::new(min, max)
    }

    /// Representative world-frame surface vertices for vertex-scan kernels.
    ///
    /// - Box: the 8 corners
    /// - Convex: the hull vertices
    /// - Sphere: the 6 axis-extreme surface points (sufficient for the
    ///   half-space and terrain scans, which probe toward a known direction)
    /// - Plane / height field: empty (never the scanned side)
    #[must_use]
    pub fn vertices(&self, pose: &Pose) -> Vec<Point3<f64>> {
        match self {
            Self::Sphere { radius } => {
                let c = pose.position;
                let r = *radius;
                vec![
                    c + Vector3::new(r, 0.0, 0.0),
                    c + Vector3::new(-r, 0.0, 0.0),
                    c + Vector3::new(0.0, r, 0.0),
                    c + Vector3::new(0.0, -r, 0.0),
                    c + Vector3::new(0.0, 0.0, r),
                    c + Vector3::new(0.0, 0.0, -r),
                ]
            }
            Self::Box { half_extents } => {
                let h = half_extents;
                let mut out = Vec::with_capacity(8);
                for &sx in &[-1.0, 1.0] {
                    for &sy in &[-1.0, 1.0] {
                        for &sz in &[-1.0, 1.0] {
                            out.push(pose.transform_point(&Point3::new(
                                sx * h.x,
                                sy * h.y,
                                sz * h.z,
                            )));
                        }
                    }
                }
                out
            }
            Self::Plane | Self::HeightField(_) => Vec::new(),
            Self::Convex { vertices } => {
                vertices.iter().map(|v| pose.transform_point(v)).collect()
            }
        }
    }

    /// Signed distance from a world point to the shape surface, with the
    /// outward normal at the closest feature.
    ///
    /// Returns `None` when the query is not meaningful for the shape
    /// (degenerate convex input).
    #[must_use]
    pub fn signed_dist_and_normal(
        &self,
        pose: &Pose,
        point: &Point3<f64>,
    ) -> Option<(f64, Vector3<f64>)> {
        match self {
            Self::Sphere { radius } => {
                let d = point - pose.position;
                let len = d.norm();
                if len < 1e-12 {
                    // Center query; any direction is a valid gradient.
                    return Some((-radius, Vector3::z()));
                }
                Some((len - radius, d / len))
            }
            Self::Box { half_extents } => {
                let local = pose.inverse_transform_point(point);
                let q = Vector3::new(
                    local.x.abs() - half_extents.x,
                    local.y.abs() - half_extents.y,
                    local.z.abs() - half_extents.z,
                );
                if q.x <= 0.0 && q.y <= 0.0 && q.z <= 0.0 {
                    // Inside: distance is the least face distance, normal the
                    // corresponding face normal.
                    let (mut axis, mut best) = (0, q.x);
                    if q.y > best {
                        axis = 1;
                        best = q.y;
                    }
                    if q.z > best {
                        axis = 2;
                        best = q.z;
                    }
                    let mut n_local = Vector3::zeros();
                    n_local[axis] = local[axis].signum();
                    Some((best, pose.transform_vector(&n_local)))
                } else {
                    let outside = Vector3::new(q.x.max(0.0), q.y.max(0.0), q.z.max(0.0));
                    let dist = outside.norm();
                    let mut n_local = outside;
                    n_local.x *= local.x.signum();
                    n_local.y *= local.y.signum();
                    n_local.z *= local.z.signum();
                    let len = n_local.norm();
                    if len < 1e-12 {
                        return None;
                    }
                    Some((dist, pose.transform_vector(&(n_local / len))))
                }
            }
            Self::Plane => {
                let n = pose.transform_vector(&Vector3::z());
                let dist = n.dot(&(point - pose.position));
                Some((dist, n))
            }
            Self::HeightField(hf) => {
                // Vertical distance to the interpolated surface; adequate for
                // the shallow-slope terrains the probe kernels assume.
                let local = pose.inverse_transform_point(point);
                let dist = hf.height_above(&local);
                let n_local = hf.surface_normal(local.x, local.y);
                Some((dist, pose.transform_vector(&n_local)))
            }
            Self::Convex { vertices } => {
                // Point-cloud fallback: distance to the nearest vertex. Never
                // negative, so convex-convex vertex scans only fire within
                // the contact tolerance.
                let local = pose.inverse_transform_point(point);
                let mut best: Option<(f64, Vector3<f64>)> = None;
                for v in vertices {
                    let d = local - v;
                    let len = d.norm();
                    if best.map_or(true, |(b, _)| len < b) {
                        if len < 1e-12 {
                            return Some((0.0, pose.transform_vector(&Vector3::z())));
                        }
                        best = Some((len, d / len));
                    }
                }
                best.map(|(d, n)| (d, pose.transform_vector(&n)))
            }
        }
    }
}
