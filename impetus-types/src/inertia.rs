//! Spatial rigid-body inertia.
//!
//! A [`SpatialInertia`] is the 6×6 matrix coupling a spatial motion vector to
//! a spatial force vector, referenced at an arbitrary point. It is built from
//! mass, a world-axes rotational inertia about the center of mass, and the
//! COM offset from the reference point:
//!
//! ```text
//! Φ = [I_com + m·(h·h·E − h⊗h),  m·[h]×  ]
//!     [m·[h]×ᵀ,                  m·E     ]
//! ```
//!
//! with `h` the COM offset. Rows/columns follow the `[angular, linear]`
//! spatial convention.

use nalgebra::{Matrix3, Matrix6, Vector3};

use crate::spatial::SpatialVector;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 6×6 spatial inertia of a rigid body about a reference point.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpatialInertia {
    matrix: Matrix6<f64>,
    mass: f64,
}

impl Default for SpatialInertia {
    fn default() -> Self {
        Self::zero()
    }
}

impl SpatialInertia {
    /// The zero inertia (massless body).
    #[must_use]
    pub fn zero() -> Self {
        Self {
            matrix: Matrix6::zeros(),
            mass: 0.0,
        }
    }

    /// Build a spatial inertia from mass properties.
    ///
    /// * `mass` - body mass
    /// * `inertia_com` - rotational inertia about the COM, world axes (3×3)
    /// * `com_offset` - COM position relative to the reference point, world axes
    #[must_use]
    pub fn from_mass_properties(
        mass: f64,
        inertia_com: &Matrix3<f64>,
        com_offset: Vector3<f64>,
    ) -> Self {
        let h = com_offset;
        let mut m = Matrix6::zeros();

        // Upper-left 3x3: rotational inertia about the reference point
        // (parallel axis theorem).
        let h_dot_h = h.dot(&h);
        for row in 0..3 {
            for col in 0..3 {
                let delta = if row == col { 1.0 } else { 0.0 };
                m[(row, col)] = inertia_com[(row, col)] + mass * (h_dot_h * delta - h[row] * h[col]);
            }
        }

        // Lower-right 3x3: translational inertia.
        m[(3, 3)] = mass;
        m[(4, 4)] = mass;
        m[(5, 5)] = mass;

        // Off-diagonal coupling: m·skew(h) upper-right, transpose lower-left.
        let mh = mass * h;
        m[(0, 4)] = -mh.z;
        m[(0, 5)] = mh.y;
        m[(1, 3)] = mh.z;
        m[(1, 5)] = -mh.x;
        m[(2, 3)] = -mh.y;
        m[(2, 4)] = mh.x;
        m[(4, 0)] = -mh.z;
        m[(5, 0)] = mh.y;
        m[(3, 1)] = mh.z;
        m[(5, 1)] = -mh.x;
        m[(3, 2)] = -mh.y;
        m[(4, 2)] = mh.x;

        Self { matrix: m, mass }
    }

    /// Build from a diagonal body-frame inertia rotated into world axes.
    ///
    /// * `inertia_diag` - principal moments of inertia
    /// * `rotation` - rotation from the principal frame to world (3×3)
    #[must_use]
    pub fn from_diagonal(
        mass: f64,
        inertia_diag: Vector3<f64>,
        rotation: &Matrix3<f64>,
        com_offset: Vector3<f64>,
    ) -> Self {
        // I_world = R * diag * R^T
        let mut i_rot = Matrix3::zeros();
        for row in 0..3 {
            for col in 0..3 {
                i_rot[(row, col)] = rotation[(row, 0)] * inertia_diag[0] * rotation[(col, 0)]
                    + rotation[(row, 1)] * inertia_diag[1] * rotation[(col, 1)]
                    + rotation[(row, 2)] * inertia_diag[2] * rotation[(col, 2)];
            }
        }
        Self::from_mass_properties(mass, &i_rot, com_offset)
    }

    /// Body mass.
    #[must_use]
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// The full 6×6 matrix.
    #[must_use]
    pub fn matrix(&self) -> &Matrix6<f64> {
        &self.matrix
    }

    /// Apply the inertia to a motion vector: `f = Φ · v`.
    #[must_use]
    pub fn mul_motion(&self, v: &SpatialVector) -> SpatialVector {
        self.matrix * v
    }

    /// Solve `Φ · a = f` for the motion vector `a`.
    ///
    /// Returns `None` when the inertia is singular (massless or degenerate).
    #[must_use]
    pub fn solve_motion(&self, f: &SpatialVector) -> Option<SpatialVector> {
        self.matrix.lu().solve(f)
    }

    /// Kinetic energy of a body with this inertia moving with twist `v`
    /// (same reference point): `½ vᵀ Φ v`.
    #[must_use]
    pub fn kinetic_energy(&self, v: &SpatialVector) -> f64 {
        0.5 * v.dot(&(self.matrix * v))
    }

    /// Add another spatial inertia referenced at the same point (composite
    /// bodies).
    pub fn accumulate(&mut self, other: &Self) {
        self.matrix += other.matrix;
        self.mass += other.mass;
    }

    /// Shift the reference point by `d` (new = old + d on the COM offset).
    ///
    /// Extracts `(I_com, m, h)` and rebuilds with `h' = h + d`.
    #[must_use]
    pub fn shifted(&self, d: &Vector3<f64>) -> Self {
        let m = self.mass;
        if m == 0.0 {
            return *self;
        }

        // Recover m·h from the coupling block: phi[(2,4)] = m·hx,
        // phi[(0,5)] = m·hy, phi[(1,3)] = m·hz.
        let h = Vector3::new(
            self.matrix[(2, 4)] / m,
            self.matrix[(0, 5)] / m,
            self.matrix[(1, 3)] / m,
        );

        // Reverse the parallel axis theorem to recover I_com.
        let hh = h.dot(&h);
        let mut i_com = Matrix3::zeros();
        for row in 0..3 {
            for col in 0..3 {
                let delta = if row == col { 1.0 } else { 0.0 };
                i_com[(row, col)] = self.matrix[(row, col)] - m * (hh * delta - h[row] * h[col]);
            }
        }

        Self::from_mass_properties(m, &i_com, h + d)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sphere_inertia(mass: f64, radius: f64) -> Matrix3<f64> {
        Matrix3::identity() * (0.4 * mass * radius * radius)
    }

    #[test]
    fn test_point_mass_at_reference() {
        let phi = SpatialInertia::from_mass_properties(
            2.0,
            &sphere_inertia(2.0, 0.5),
            Vector3::zeros(),
        );
        // Pure translation: f = m·a on the linear block.
        let a = SpatialVector::new(0.0, 0.0, 0.0, 1.0, 0.0, 0.0);
        let f = phi.mul_motion(&a);
        assert_relative_eq!(f[3], 2.0, epsilon = 1e-12);
        assert_relative_eq!(f[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_shift_roundtrip() {
        let phi = SpatialInertia::from_mass_properties(
            1.5,
            &sphere_inertia(1.5, 0.3),
            Vector3::new(0.2, -0.1, 0.4),
        );
        let d = Vector3::new(1.0, 2.0, -0.5);
        let back = phi.shifted(&d).shifted(&-d);
        for i in 0..6 {
            for j in 0..6 {
                assert_relative_eq!(back.matrix()[(i, j)], phi.matrix()[(i, j)], epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_kinetic_energy_translation() {
        let phi =
            SpatialInertia::from_mass_properties(3.0, &sphere_inertia(3.0, 1.0), Vector3::zeros());
        let v = SpatialVector::new(0.0, 0.0, 0.0, 2.0, 0.0, 0.0);
        // E = 1/2 m v^2 = 6
        assert_relative_eq!(phi.kinetic_energy(&v), 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_solve_motion_inverts() {
        let phi = SpatialInertia::from_mass_properties(
            1.0,
            &sphere_inertia(1.0, 0.5),
            Vector3::new(0.1, 0.0, 0.0),
        );
        let a = SpatialVector::new(0.3, -0.2, 0.1, 1.0, 0.5, -0.4);
        let f = phi.mul_motion(&a);
        let a_back = phi.solve_motion(&f).expect("invertible");
        assert_relative_eq!((a_back - a).norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_mass_shift_is_noop() {
        let phi = SpatialInertia::zero();
        let shifted = phi.shifted(&Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(shifted.mass(), 0.0);
    }
}
