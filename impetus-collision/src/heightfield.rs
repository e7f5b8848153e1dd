//! Height field collision shape for terrain.
//!
//! A height field is a 2D grid of height values defining a 3D surface. It is
//! defined in the local XY plane with heights along Z:
//!
//! - X axis spans `[0, (nx - 1) * cell_size]`
//! - Y axis spans `[0, (ny - 1) * cell_size]`
//! - Z values come from the height data
//!
//! Heights are stored in row-major order (`heights[y * nx + x]`). Queries
//! outside the grid clamp to the border samples.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation
)]

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Height field data: a regular grid of heights over the local XY plane.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeightField {
    /// Height values in row-major order (`heights[y * nx + x]`).
    heights: Vec<f64>,
    /// Number of samples along X.
    nx: usize,
    /// Number of samples along Y.
    ny: usize,
    /// Grid spacing in meters.
    cell_size: f64,
    /// Cached minimum height (for AABBs).
    min_height: f64,
    /// Cached maximum height (for AABBs).
    max_height: f64,
}

impl HeightField {
    /// Create a height field from raw data.
    ///
    /// # Panics
    ///
    /// Panics if `heights.len() != nx * ny`, if either dimension is below 2,
    /// or if `cell_size` is not positive. These are programmer errors at
    /// scene-construction time.
    #[must_use]
    pub fn new(heights: Vec<f64>, nx: usize, ny: usize, cell_size: f64) -> Self {
        assert!(nx >= 2 && ny >= 2, "height field needs at least 2x2 samples");
        assert!(
            heights.len() == nx * ny,
            "height data length {} does not match {}x{}",
            heights.len(),
            nx,
            ny
        );
        assert!(cell_size > 0.0, "cell_size must be positive");

        let min_height = heights.iter().copied().fold(f64::INFINITY, f64::min);
        let max_height = heights.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Self {
            heights,
            nx,
            ny,
            cell_size,
            min_height,
            max_height,
        }
    }

    /// Create a flat height field of the given extent.
    #[must_use]
    pub fn flat(nx: usize, ny: usize, cell_size: f64, height: f64) -> Self {
        Self::new(vec![height; nx * ny], nx, ny, cell_size)
    }

    /// Number of samples along X.
    #[must_use]
    pub fn sample_count_x(&self) -> usize {
        self.nx
    }

    /// Number of samples along Y.
    #[must_use]
    pub fn sample_count_y(&self) -> usize {
        self.ny
    }

    /// Grid spacing.
    #[must_use]
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Extent along local X.
    #[must_use]
    pub fn extent_x(&self) -> f64 {
        (self.nx - 1) as f64 * self.cell_size
    }

    /// Extent along local Y.
    #[must_use]
    pub fn extent_y(&self) -> f64 {
        (self.ny - 1) as f64 * self.cell_size
    }

    /// Minimum stored height.
    #[must_use]
    pub fn min_height(&self) -> f64 {
        self.min_height
    }

    /// Maximum stored height.
    #[must_use]
    pub fn max_height(&self) -> f64 {
        self.max_height
    }

    /// Height sample at grid indices, clamped to the border.
    #[must_use]
    pub fn sample(&self, ix: usize, iy: usize) -> f64 {
        let ix = ix.min(self.nx - 1);
        let iy = iy.min(self.ny - 1);
        self.heights[iy * self.nx + ix]
    }

    /// Grid vertex position in local coordinates.
    #[must_use]
    pub fn vertex(&self, ix: usize, iy: usize) -> Point3<f64> {
        Point3::new(
            ix as f64 * self.cell_size,
            iy as f64 * self.cell_size,
            self.sample(ix, iy),
        )
    }

    /// Bilinearly interpolated terrain height at local `(x, y)`.
    ///
    /// Coordinates outside the grid clamp to the border.
    #[must_use]
    pub fn interpolate(&self, x: f64, y: f64) -> f64 {
        let fx = (x / self.cell_size).clamp(0.0, (self.nx - 1) as f64);
        let fy = (y / self.cell_size).clamp(0.0, (self.ny - 1) as f64);

        let ix = (fx.floor() as usize).min(self.nx - 2);
        let iy = (fy.floor() as usize).min(self.ny - 2);
        let tx = fx - ix as f64;
        let ty = fy - iy as f64;

        let h00 = self.sample(ix, iy);
        let h10 = self.sample(ix + 1, iy);
        let h01 = self.sample(ix, iy + 1);
        let h11 = self.sample(ix + 1, iy + 1);

        h00 * (1.0 - tx) * (1.0 - ty)
            + h10 * tx * (1.0 - ty)
            + h01 * (1.0 - tx) * ty
            + h11 * tx * ty
    }

    /// Height of a local-frame point above the terrain (negative when below).
    #[must_use]
    pub fn height_above(&self, p: &Point3<f64>) -> f64 {
        p.z - self.interpolate(p.x, p.y)
    }

    /// Terrain gradient `(∂h/∂x, ∂h/∂y)` at local `(x, y)` via central
    /// differences of the interpolant.
    #[must_use]
    pub fn gradient(&self, x: f64, y: f64) -> (f64, f64) {
        let d = 0.5 * self.cell_size;
        let gx = (self.interpolate(x + d, y) - self.interpolate(x - d, y)) / (2.0 * d);
        let gy = (self.interpolate(x, y + d) - self.interpolate(x, y - d)) / (2.0 * d);
        (gx, gy)
    }

    /// Outward (upward) surface normal at local `(x, y)`.
    ///
    /// Derived from the gradient as `normalize(-∂h/∂x, -∂h/∂y, 1)`.
    #[must_use]
    pub fn surface_normal(&self, x: f64, y: f64) -> Vector3<f64> {
        let (gx, gy) = self.gradient(x, y);
        Vector3::new(-gx, -gy, 1.0).normalize()
    }

    /// Grid index range `[lo, hi]` (inclusive) covering local X interval.
    #[must_use]
    pub fn index_range_x(&self, x_lo: f64, x_hi: f64) -> (usize, usize) {
        let lo = (x_lo / self.cell_size).floor().max(0.0) as usize;
        let hi = ((x_hi / self.cell_size).ceil().max(0.0) as usize).min(self.nx - 1);
        (lo.min(self.nx - 1), hi)
    }

    /// Grid index range `[lo, hi]` (inclusive) covering local Y interval.
    #[must_use]
    pub fn index_range_y(&self, y_lo: f64, y_hi: f64) -> (usize, usize) {
        let lo = (y_lo / self.cell_size).floor().max(0.0) as usize;
        let hi = ((y_hi / self.cell_size).ceil().max(0.0) as usize).min(self.ny - 1);
        (lo.min(self.ny - 1), hi)
    }
}
