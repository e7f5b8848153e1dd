//! Contact generation (narrowphase dispatch).
//!
//! Given two geometries known to be near each other, the kernels here emit
//! zero or more contact records with a world-space point and a unit normal
//! pointing from the second geometry of the *emitted record* into the first.
//! Dispatch normalizes the pair order per kernel; because each record carries
//! its own geometry ids, callers never need to re-negate normals.
//!
//! Every kernel guards against degenerate (near-zero) normals and skips the
//! offending point.

use impetus_types::GeomId;
use nalgebra::{Point3, Vector3};

use crate::geometry::CollisionGeometry;
use crate::query;
use crate::shape::{Shape, ShapeTag};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const DEGENERATE_NORMAL: f64 = 1e-10;

/// A single contact emitted by the narrowphase.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactPoint {
    /// Geometry on the normal side.
    pub geom_a: GeomId,
    /// Geometry the normal points away from.
    pub geom_b: GeomId,
    /// Contact point (world frame).
    pub point: Point3<f64>,
    /// Unit normal from B into A (world frame).
    pub normal: Vector3<f64>,
    /// Signed gap at emission.
    pub gap: f64,
}

/// An orthonormal tangent frame `(s, t)` completing `normal` to a basis.
#[must_use]
pub fn tangent_basis(normal: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let helper = if normal.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let s = normal.cross(&helper).normalize();
    let t = normal.cross(&s);
    (s, t)
}

/// Narrowphase dispatch: emit contacts for a geometry pair into `out`.
///
/// `tol` is the distance at which a separated feature still counts as
/// touching (the driver's contact threshold).
pub fn find_contacts(
    ga: &CollisionGeometry,
    gb: &CollisionGeometry,
    tol: f64,
    out: &mut Vec<ContactPoint>,
) {
    use ShapeTag::{Box as BoxT, Convex, HeightField, Plane, Sphere};

    match (ga.shape.tag(), gb.shape.tag()) {
        (Sphere, Sphere) => sphere_sphere(ga, gb, tol, out),

        (BoxT, Sphere) => box_sphere(ga, gb, tol, out),
        (Sphere, BoxT) => box_sphere(gb, ga, tol, out),

        (Plane, Plane) | (HeightField, HeightField) | (Plane, HeightField)
        | (HeightField, Plane) => {}

        (Plane, _) => plane_generic(ga, gb, tol, out),
        (_, Plane) => plane_generic(gb, ga, tol, out),

        (Sphere, HeightField) => sphere_heightfield(ga, gb, tol, out),
        (HeightField, Sphere) => sphere_heightfield(gb, ga, tol, out),

        (BoxT | Convex, HeightField) => convex_heightfield(ga, gb, tol, out),
        (HeightField, BoxT | Convex) => convex_heightfield(gb, ga, tol, out),

        (Sphere | BoxT | Convex, Sphere | BoxT | Convex) => vertex_scan(ga, gb, tol, out),
    }
}

/// One contact at the midpoint of the closest surface points.
fn sphere_sphere(ga: &CollisionGeometry, gb: &CollisionGeometry, tol: f64, out: &mut Vec<ContactPoint>) {
    let (Shape::Sphere { radius: ra }, Shape::Sphere { radius: rb }) = (&ga.shape, &gb.shape)
    else {
        return;
    };
    let ca = ga.world_pose.position;
    let cb = gb.world_pose.position;
    let d = ca - cb;
    let len = d.norm();
    if len < DEGENERATE_NORMAL {
        return;
    }
    let gap = len - ra - rb;
    if gap > tol {
        return;
    }
    let normal = d / len;
    let closest_a = ca - normal * *ra;
    let closest_b = cb + normal * *rb;
    out.push(ContactPoint {
        geom_a: ga.id,
        geom_b: gb.id,
        point: Point3::from((closest_a.coords + closest_b.coords) * 0.5),
        normal,
        gap,
    });
}

/// Box/sphere: midpoint contact when separated, sphere surface point with the
/// box gradient direction on penetration.
fn box_sphere(
    gbox: &CollisionGeometry,
    gsph: &CollisionGeometry,
    tol: f64,
    out: &mut Vec<ContactPoint>,
) {
    let Some(prox) = query::calc_signed_dist(
        &gbox.shape,
        &gbox.world_pose,
        &gsph.shape,
        &gsph.world_pose,
    ) else {
        return;
    };
    if prox.dist > tol || prox.normal.norm() < DEGENERATE_NORMAL {
        return;
    }
    let point = if prox.dist > 0.0 {
        Point3::from((prox.point_a.coords + prox.point_b.coords) * 0.5)
    } else {
        // NOTE: the sphere's surface point along the box gradient, which is
        // not necessarily the deepest penetrating point.
        prox.point_b
    };
    out.push(ContactPoint {
        geom_a: gbox.id,
        geom_b: gsph.id,
        point,
        normal: prox.normal,
        gap: prox.dist,
    });
}

/// Plane against anything with vertices: emit every vertex within `tol` of
/// the half-space, normal flipped into the plane.
fn plane_generic(
    gplane: &CollisionGeometry,
    gother: &CollisionGeometry,
    tol: f64,
    out: &mut Vec<ContactPoint>,
) {
    let n = gplane.world_pose.transform_vector(&Vector3::z());
    if n.norm() < DEGENERATE_NORMAL {
        return;
    }
    let p0 = gplane.world_pose.position;
    for v in gother.shape.vertices(&gother.world_pose) {
        let dist = n.dot(&(v - p0));
        if dist <= tol {
            out.push(ContactPoint {
                geom_a: gplane.id,
                geom_b: gother.id,
                point: v,
                normal: -n,
                gap: dist,
            });
        }
    }
}

/// Sphere against a height field: probe the lowest sphere point, then test
/// grid corners under the sphere's footprint against the sphere.
fn sphere_heightfield(
    gsph: &CollisionGeometry,
    ghf: &CollisionGeometry,
    tol: f64,
    out: &mut Vec<ContactPoint>,
) {
    let Shape::Sphere { radius } = &gsph.shape else {
        return;
    };
    let Shape::HeightField(hf) = &ghf.shape else {
        return;
    };
    let r = *radius;
    let hf_pose = &ghf.world_pose;
    let center_local = hf_pose.inverse_transform_point(&gsph.world_pose.position);

    // Pass 1: lowest sphere point against the terrain surface.
    let lowest = Point3::new(center_local.x, center_local.y, center_local.z - r);
    let residual = hf.height_above(&lowest);
    if residual <= tol {
        let n_local = if residual >= 0.0 {
            hf.surface_normal(lowest.x, lowest.y)
        } else {
            Vector3::z()
        };
        push_terrain_contact(gsph, ghf, hf_pose.transform_point(&lowest), hf_pose.transform_vector(&n_local), residual, out);
    }

    // Pass 2: grid corners within the sphere footprint against the sphere.
    let (ix_lo, ix_hi) = hf.index_range_x(center_local.x - r, center_local.x + r);
    let (iy_lo, iy_hi) = hf.index_range_y(center_local.y - r, center_local.y + r);
    for iy in iy_lo..=iy_hi {
        for ix in ix_lo..=ix_hi {
            let corner_local = hf.vertex(ix, iy);
            let corner = hf_pose.transform_point(&corner_local);
            let dist = (corner - gsph.world_pose.position).norm() - r;
            if dist > tol {
                continue;
            }
            let n_local = if dist >= 0.0 {
                hf.surface_normal(corner_local.x, corner_local.y)
            } else {
                Vector3::z()
            };
            push_terrain_contact(gsph, ghf, corner, hf_pose.transform_vector(&n_local), dist, out);
        }
    }
}

/// Convex shape (box or hull) against a height field: probe the shape's
/// vertices against the terrain, then terrain corners under the shape's AABB
/// against the shape.
fn convex_heightfield(
    gconv: &CollisionGeometry,
    ghf: &CollisionGeometry,
    tol: f64,
    out: &mut Vec<ContactPoint>,
) {
    let Shape::HeightField(hf) = &ghf.shape else {
        return;
    };
    let hf_pose = &ghf.world_pose;

    // Pass 1: shape vertices against the terrain.
    for v in gconv.shape.vertices(&gconv.world_pose) {
        let v_local = hf_pose.inverse_transform_point(&v);
        let residual = hf.height_above(&v_local);
        if residual > tol {
            continue;
        }
        let n_local = if residual >= 0.0 {
            hf.surface_normal(v_local.x, v_local.y)
        } else {
            Vector3::z()
        };
        push_terrain_contact(gconv, ghf, v, hf_pose.transform_vector(&n_local), residual, out);
    }

    // Pass 2: terrain corners within the shape's footprint against the shape.
    let aabb = gconv.aabb();
    let lo = hf_pose.inverse_transform_point(&aabb.min);
    let hi = hf_pose.inverse_transform_point(&aabb.max);
    let (ix_lo, ix_hi) = hf.index_range_x(lo.x.min(hi.x), lo.x.max(hi.x));
    let (iy_lo, iy_hi) = hf.index_range_y(lo.y.min(hi.y), lo.y.max(hi.y));
    for iy in iy_lo..=iy_hi {
        for ix in ix_lo..=ix_hi {
            let corner_local = hf.vertex(ix, iy);
            let corner = hf_pose.transform_point(&corner_local);
            let Some((dist, _)) = gconv.shape.signed_dist_and_normal(&gconv.world_pose, &corner)
            else {
                continue;
            };
            if dist > tol {
                continue;
            }
            let n_local = if dist >= 0.0 {
                hf.surface_normal(corner_local.x, corner_local.y)
            } else {
                Vector3::z()
            };
            push_terrain_contact(gconv, ghf, corner, hf_pose.transform_vector(&n_local), dist, out);
        }
    }
}

fn push_terrain_contact(
    ga: &CollisionGeometry,
    ghf: &CollisionGeometry,
    point: Point3<f64>,
    normal: Vector3<f64>,
    gap: f64,
    out: &mut Vec<ContactPoint>,
) {
    if normal.norm() < DEGENERATE_NORMAL {
        return;
    }
    out.push(ContactPoint {
        geom_a: ga.id,
        geom_b: ghf.id,
        point,
        normal,
        gap,
    });
}

/// Height field against a shape without a convex decomposition: reciprocal
/// vertex scan with the contact tolerance.
pub fn heightfield_generic(
    ghf: &CollisionGeometry,
    gother: &CollisionGeometry,
    tol: f64,
    out: &mut Vec<ContactPoint>,
) {
    let Shape::HeightField(hf) = &ghf.shape else {
        return;
    };
    let hf_pose = &ghf.world_pose;

    // Terrain corners under the other shape's AABB against the other shape.
    let aabb = gother.aabb();
    let lo = hf_pose.inverse_transform_point(&aabb.min);
    let hi = hf_pose.inverse_transform_point(&aabb.max);
    let (ix_lo, ix_hi) = hf.index_range_x(lo.x.min(hi.x), lo.x.max(hi.x));
    let (iy_lo, iy_hi) = hf.index_range_y(lo.y.min(hi.y), lo.y.max(hi.y));
    for iy in iy_lo..=iy_hi {
        for ix in ix_lo..=ix_hi {
            let corner = hf_pose.transform_point(&hf.vertex(ix, iy));
            let Some((dist, normal)) =
                gother.shape.signed_dist_and_normal(&gother.world_pose, &corner)
            else {
                continue;
            };
            if dist > tol || normal.norm() < DEGENERATE_NORMAL {
                continue;
            }
            out.push(ContactPoint {
                geom_a: ghf.id,
                geom_b: gother.id,
                point: corner,
                normal,
                gap: dist,
            });
        }
    }

    // Other shape's vertices against the terrain.
    for v in gother.shape.vertices(&gother.world_pose) {
        let Some((dist, normal)) = ghf.shape.signed_dist_and_normal(hf_pose, &v) else {
            continue;
        };
        if dist > tol || normal.norm() < DEGENERATE_NORMAL {
            continue;
        }
        out.push(ContactPoint {
            geom_a: ghf.id,
            geom_b: gother.id,
            point: v,
            normal: -normal,
            gap: dist,
        });
    }
}

/// Generic fallback: scan each shape's vertices against the other's
/// signed-distance field.
fn vertex_scan(ga: &CollisionGeometry, gb: &CollisionGeometry, tol: f64, out: &mut Vec<ContactPoint>) {
    for v in ga.shape.vertices(&ga.world_pose) {
        let Some((dist, normal)) = gb.shape.signed_dist_and_normal(&gb.world_pose, &v) else {
            continue;
        };
        if dist > tol || normal.norm() < DEGENERATE_NORMAL {
            continue;
        }
        out.push(ContactPoint {
            geom_a: ga.id,
            geom_b: gb.id,
            point: v,
            normal,
            gap: dist,
        });
    }
    for v in gb.shape.vertices(&gb.world_pose) {
        let Some((dist, normal)) = ga.shape.signed_dist_and_normal(&ga.world_pose, &v) else {
            continue;
        };
        if dist > tol || normal.norm() < DEGENERATE_NORMAL {
            continue;
        }
        out.push(ContactPoint {
            geom_a: ga.id,
            geom_b: gb.id,
            point: v,
            normal: -normal,
            gap: dist,
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::heightfield::HeightField;
    use approx::assert_relative_eq;
    use impetus_types::{BodyId, Pose};

    fn geom(id: u64, body: u64, shape: Shape, pose: Pose) -> CollisionGeometry {
        let mut g = CollisionGeometry::new(GeomId::new(id), BodyId::new(body), shape);
        g.world_pose = pose;
        g
    }

    #[test]
    fn test_sphere_sphere_midpoint_contact() {
        let a = geom(0, 0, Shape::sphere(0.5), Pose::from_position(Point3::new(0.0, 0.0, 1.0)));
        let b = geom(1, 1, Shape::sphere(0.5), Pose::from_position(Point3::origin()));
        let mut out = Vec::new();
        find_contacts(&a, &b, 1e-6, &mut out);
        assert_eq!(out.len(), 1);
        let c = out[0];
        assert_relative_eq!(c.point.z, 0.5, epsilon = 1e-12);
        assert_relative_eq!(c.normal.z, 1.0, epsilon = 1e-12);
        assert_relative_eq!(c.gap, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_sphere_swap_symmetry() {
        // Point unchanged under argument swap; normal negates with the pair
        // order recorded in the emitted ids.
        let a = geom(0, 0, Shape::sphere(0.5), Pose::from_position(Point3::new(0.0, 0.0, 1.0)));
        let b = geom(1, 1, Shape::sphere(0.5), Pose::from_position(Point3::origin()));
        let (mut ab, mut ba) = (Vec::new(), Vec::new());
        find_contacts(&a, &b, 1e-6, &mut ab);
        find_contacts(&b, &a, 1e-6, &mut ba);
        assert_eq!(ab.len(), 1);
        assert_eq!(ba.len(), 1);
        assert_relative_eq!((ab[0].point - ba[0].point).norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!((ab[0].normal + ba[0].normal).norm(), 0.0, epsilon = 1e-12);
        assert_eq!(ab[0].geom_a, ba[0].geom_b);
    }

    #[test]
    fn test_separated_spheres_no_contact() {
        let a = geom(0, 0, Shape::sphere(0.5), Pose::from_position(Point3::new(0.0, 0.0, 5.0)));
        let b = geom(1, 1, Shape::sphere(0.5), Pose::from_position(Point3::origin()));
        let mut out = Vec::new();
        find_contacts(&a, &b, 1e-6, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_box_resting_on_plane_emits_four_contacts() {
        let cube = geom(
            0,
            0,
            Shape::cuboid(Vector3::new(0.5, 0.5, 0.5)),
            Pose::from_position(Point3::new(0.0, 0.0, 0.5)),
        );
        let plane = geom(1, 1, Shape::Plane, Pose::identity());
        let mut out = Vec::new();
        find_contacts(&cube, &plane, 1e-6, &mut out);
        assert_eq!(out.len(), 4);
        for c in &out {
            // Kernel order is (plane, box): normal points into the plane.
            assert_eq!(c.geom_a, GeomId::new(1));
            assert_relative_eq!(c.normal.z, -1.0, epsilon = 1e-12);
            assert_relative_eq!(c.point.z, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_sphere_on_plane_single_bottom_contact() {
        let sphere = geom(
            0,
            0,
            Shape::sphere(0.5),
            Pose::from_position(Point3::new(0.0, 0.0, 0.5)),
        );
        let plane = geom(1, 1, Shape::Plane, Pose::identity());
        let mut out = Vec::new();
        find_contacts(&sphere, &plane, 1e-6, &mut out);
        assert_eq!(out.len(), 1);
        assert_relative_eq!(out[0].point.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_box_sphere_midpoint() {
        let cube = geom(
            0,
            0,
            Shape::cuboid(Vector3::new(1.0, 1.0, 1.0)),
            Pose::identity(),
        );
        let sphere = geom(
            1,
            1,
            Shape::sphere(0.5),
            Pose::from_position(Point3::new(0.0, 0.0, 1.5)),
        );
        let mut out = Vec::new();
        find_contacts(&cube, &sphere, 1e-3, &mut out);
        assert_eq!(out.len(), 1);
        assert_relative_eq!(out[0].point.z, 1.0, epsilon = 1e-9);
        // Normal from sphere (B) into box (A): downward.
        assert_relative_eq!(out[0].normal.z, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_on_flat_heightfield() {
        let hf = HeightField::flat(9, 9, 1.0, 0.0);
        let terrain = geom(
            1,
            1,
            Shape::HeightField(hf),
            Pose::from_position(Point3::new(-4.0, -4.0, 0.0)),
        );
        let sphere = geom(
            0,
            0,
            Shape::sphere(0.5),
            Pose::from_position(Point3::new(0.0, 0.0, 0.5)),
        );
        let mut out = Vec::new();
        find_contacts(&sphere, &terrain, 1e-6, &mut out);
        assert!(!out.is_empty());
        // Lowest-point probe lands under the center with an up normal.
        let lowest = out
            .iter()
            .find(|c| c.point.x.abs() < 1e-9 && c.point.y.abs() < 1e-9)
            .expect("lowest-point contact");
        assert_relative_eq!(lowest.normal.z, 1.0, epsilon = 1e-9);
        assert_relative_eq!(lowest.gap, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_normal_skipped() {
        // Two concentric spheres: direction undefined, nothing emitted.
        let a = geom(0, 0, Shape::sphere(0.5), Pose::identity());
        let b = geom(1, 1, Shape::sphere(0.5), Pose::identity());
        let mut out = Vec::new();
        find_contacts(&a, &b, 1e-6, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_tangent_basis_orthonormal() {
        let n = Vector3::new(0.3, -0.4, 0.866).normalize();
        let (s, t) = tangent_basis(&n);
        assert_relative_eq!(s.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(t.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(s.dot(&n), 0.0, epsilon = 1e-12);
        assert_relative_eq!(t.dot(&n), 0.0, epsilon = 1e-12);
        assert_relative_eq!(s.dot(&t), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_heightfield_generic_reciprocal_scan() {
        let hf = HeightField::flat(5, 5, 1.0, 0.0);
        let terrain = geom(
            0,
            0,
            Shape::HeightField(hf),
            Pose::from_position(Point3::new(-2.0, -2.0, 0.0)),
        );
        let cube = geom(
            1,
            1,
            Shape::cuboid(Vector3::new(0.5, 0.5, 0.5)),
            Pose::from_position(Point3::new(0.0, 0.0, 0.5)),
        );
        let mut out = Vec::new();
        heightfield_generic(&terrain, &cube, 1e-6, &mut out);
        assert!(!out.is_empty());
        for c in &out {
            assert!(c.gap <= 1e-6);
        }
    }
}
