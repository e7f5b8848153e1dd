//! Pairwise signed-distance and closest-point queries.
//!
//! One kernel per canonical shape pair; reversed pairs are answered by
//! swapping the canonical result. All results are world-frame and the normal
//! points from B into A.

use impetus_types::Pose;
use nalgebra::{Point3, Vector3};

use crate::shape::{Shape, ShapeTag};

/// Result of a pairwise proximity query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proximity {
    /// Signed distance (negative on interpenetration).
    pub dist: f64,
    /// Closest point on A.
    pub point_a: Point3<f64>,
    /// Closest point on B.
    pub point_b: Point3<f64>,
    /// Unit normal from B into A.
    pub normal: Vector3<f64>,
}

impl Proximity {
    fn swapped(self) -> Self {
        Self {
            dist: self.dist,
            point_a: self.point_b,
            point_b: self.point_a,
            normal: -self.normal,
        }
    }
}

/// Signed distance between two posed shapes with closest points and normal.
///
/// Returns `None` for pairs with no meaningful proximity (two unbounded
/// shapes, or degenerate geometry).
#[must_use]
pub fn calc_signed_dist(
    shape_a: &Shape,
    pose_a: &Pose,
    shape_b: &Shape,
    pose_b: &Pose,
) -> Option<Proximity> {
    use ShapeTag::{Box as BoxT, Convex, HeightField, Plane, Sphere};

    match (shape_a.tag(), shape_b.tag()) {
        // Both unbounded: nothing useful to report.
        (Plane | HeightField, Plane | HeightField) => None,

        (Sphere, Sphere) => sphere_sphere(shape_a, pose_a, shape_b, pose_b),
        (Sphere, BoxT | Plane | HeightField | Convex) => {
            sphere_any(shape_a, pose_a, shape_b, pose_b)
        }
        (BoxT | Plane | HeightField | Convex, Sphere) => {
            sphere_any(shape_b, pose_b, shape_a, pose_a).map(Proximity::swapped)
        }

        (BoxT | Convex, Plane | HeightField) => vertex_probe(shape_a, pose_a, shape_b, pose_b),
        (Plane | HeightField, BoxT | Convex) => {
            vertex_probe(shape_b, pose_b, shape_a, pose_a).map(Proximity::swapped)
        }

        (BoxT | Convex, BoxT | Convex) => {
            // Reciprocal vertex probe; keep the tighter of the two directions.
            let ab = vertex_probe(shape_a, pose_a, shape_b, pose_b);
            let ba = vertex_probe(shape_b, pose_b, shape_a, pose_a).map(Proximity::swapped);
            match (ab, ba) {
                (Some(x), Some(y)) => Some(if x.dist <= y.dist { x } else { y }),
                (x, y) => x.or(y),
            }
        }
    }
}

/// Exact sphere-sphere distance.
fn sphere_sphere(
    shape_a: &Shape,
    pose_a: &Pose,
    shape_b: &Shape,
    pose_b: &Pose,
) -> Option<Proximity> {
    let (Shape::Sphere { radius: ra }, Shape::Sphere { radius: rb }) = (shape_a, shape_b) else {
        return None;
    };
    let ca = pose_a.position;
    let cb = pose_b.position;
    let d = ca - cb;
    let len = d.norm();
    // Concentric spheres have no preferred direction; pick +Z.
    let normal = if len < 1e-12 { Vector3::z() } else { d / len };
    Some(Proximity {
        dist: len - ra - rb,
        point_a: ca - normal * *ra,
        point_b: cb + normal * *rb,
        normal,
    })
}

/// Sphere (A) against any point-queryable shape (B): shrink the center query
/// by the radius.
fn sphere_any(
    shape_a: &Shape,
    pose_a: &Pose,
    shape_b: &Shape,
    pose_b: &Pose,
) -> Option<Proximity> {
    let Shape::Sphere { radius } = shape_a else {
        return None;
    };
    let center = pose_a.position;
    let (center_dist, normal) = shape_b.signed_dist_and_normal(pose_b, &center)?;
    if normal.norm() < 1e-12 {
        return None;
    }
    Some(Proximity {
        dist: center_dist - radius,
        point_a: center - normal * *radius,
        point_b: center - normal * center_dist,
        normal,
    })
}

/// Probe the vertices of A against B's signed-distance field, keeping the
/// closest one.
fn vertex_probe(
    shape_a: &Shape,
    pose_a: &Pose,
    shape_b: &Shape,
    pose_b: &Pose,
) -> Option<Proximity> {
    let mut best: Option<Proximity> = None;
    for v in shape_a.vertices(pose_a) {
        let Some((dist, normal)) = shape_b.signed_dist_and_normal(pose_b, &v) else {
            continue;
        };
        if normal.norm() < 1e-12 {
            continue;
        }
        if best.map_or(true, |b| dist < b.dist) {
            best = Some(Proximity {
                dist,
                point_a: v,
                point_b: v - normal * dist,
                normal,
            });
        }
    }
    best
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn test_sphere_sphere_separated() {
        let a = Shape::sphere(0.5);
        let b = Shape::sphere(0.5);
        let pa = Pose::from_position(Point3::new(0.0, 0.0, 2.0));
        let pb = Pose::from_position(Point3::origin());
        let prox = calc_signed_dist(&a, &pa, &b, &pb).unwrap();
        assert_relative_eq!(prox.dist, 1.0, epsilon = 1e-12);
        assert_relative_eq!(prox.normal.z, 1.0, epsilon = 1e-12);
        assert_relative_eq!(prox.point_a.z, 1.5, epsilon = 1e-12);
        assert_relative_eq!(prox.point_b.z, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_sphere_swap_symmetry() {
        let a = Shape::sphere(0.4);
        let b = Shape::sphere(0.6);
        let pa = Pose::from_position(Point3::new(0.0, 1.5, 0.0));
        let pb = Pose::from_position(Point3::origin());
        let ab = calc_signed_dist(&a, &pa, &b, &pb).unwrap();
        let ba = calc_signed_dist(&b, &pb, &a, &pa).unwrap();
        assert_relative_eq!(ab.dist, ba.dist, epsilon = 1e-12);
        assert_relative_eq!((ab.normal + ba.normal).norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!((ab.point_a - ba.point_b).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_plane() {
        let sphere = Shape::sphere(0.5);
        let plane = Shape::Plane;
        let ps = Pose::from_position(Point3::new(0.0, 0.0, 2.0));
        let pp = Pose::identity();
        let prox = calc_signed_dist(&sphere, &ps, &plane, &pp).unwrap();
        assert_relative_eq!(prox.dist, 1.5, epsilon = 1e-12);
        assert_relative_eq!(prox.point_a.z, 1.5, epsilon = 1e-12);
        assert_relative_eq!(prox.point_b.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_plane_penetrating() {
        let sphere = Shape::sphere(0.5);
        let plane = Shape::Plane;
        let ps = Pose::from_position(Point3::new(0.0, 0.0, 0.3));
        let prox = calc_signed_dist(&sphere, &ps, &plane, &Pose::identity()).unwrap();
        assert_relative_eq!(prox.dist, -0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_box_plane_lowest_corner() {
        let cube = Shape::cuboid(Vector3::new(0.5, 0.5, 0.5));
        let plane = Shape::Plane;
        let pc = Pose::from_position(Point3::new(0.0, 0.0, 0.75));
        let prox = calc_signed_dist(&cube, &pc, &plane, &Pose::identity()).unwrap();
        assert_relative_eq!(prox.dist, 0.25, epsilon = 1e-12);
        assert_relative_eq!(prox.point_a.z, 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_plane_plane_is_none() {
        assert!(
            calc_signed_dist(&Shape::Plane, &Pose::identity(), &Shape::Plane, &Pose::identity())
                .is_none()
        );
    }

    #[test]
    fn test_sphere_box() {
        let sphere = Shape::sphere(0.5);
        let cube = Shape::cuboid(Vector3::new(1.0, 1.0, 1.0));
        let ps = Pose::from_position(Point3::new(0.0, 0.0, 3.0));
        let prox = calc_signed_dist(&sphere, &ps, &cube, &Pose::identity()).unwrap();
        assert_relative_eq!(prox.dist, 1.5, epsilon = 1e-12);
        assert_relative_eq!(prox.point_b.z, 1.0, epsilon = 1e-12);
        assert_relative_eq!(prox.point_a.z, 2.5, epsilon = 1e-12);
    }
}
