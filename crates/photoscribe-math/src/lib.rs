#![warn(missing_docs)]

//! Math types for the photoscribe tool-path compiler.
//!
//! Thin wrappers around nalgebra providing the coordinate pipeline that
//! maps laser tool-path points into stage coordinates: origin shift, axis
//! flips, rigid in-plane rotation, depth scaling by the effective
//! refractive index, and optional surface-warp compensation.

use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A point in 2D space.
pub type Point2 = nalgebra::Point2<f64>;

/// Height-correction function `(x, y) -> dz`, sampled once per point.
///
/// Produced externally (e.g. by interpolating a measured substrate
/// surface); the pipeline only calls it.
pub type WarpFn = Box<dyn Fn(f64, f64) -> f64 + Send + Sync>;

/// Coordinate pipeline applied to every tool-path point before emission.
///
/// The step order is fixed: translate to the new origin, flip, rotate in
/// the xy-plane while scaling depth by `1/neff`, then optionally add the
/// warp correction to the depth. Output coordinates are narrowed to `f32`
/// to match controller precision and bound artifact size.
pub struct PathTransform {
    rotation_angle: f64,
    neff: f64,
    flip_x: bool,
    flip_y: bool,
    origin: (f64, f64),
    warp: Option<WarpFn>,
}

impl std::fmt::Debug for PathTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathTransform")
            .field("rotation_angle", &self.rotation_angle)
            .field("neff", &self.neff)
            .field("flip_x", &self.flip_x)
            .field("flip_y", &self.flip_y)
            .field("origin", &self.origin)
            .field("warp", &self.warp.is_some())
            .finish()
    }
}

impl PathTransform {
    /// Create a pipeline with the given xy rotation (radians) and
    /// effective refractive index ratio. `neff` must be strictly positive;
    /// validation happens at compiler-configuration time.
    pub fn new(rotation_angle: f64, neff: f64) -> Self {
        Self {
            rotation_angle,
            neff,
            flip_x: false,
            flip_y: false,
            origin: (0.0, 0.0),
            warp: None,
        }
    }

    /// Mirror the path about the (shifted) origin along x and/or y.
    pub fn with_flips(mut self, flip_x: bool, flip_y: bool) -> Self {
        self.flip_x = flip_x;
        self.flip_y = flip_y;
        self
    }

    /// Shift the path origin; the offset is subtracted before any other step.
    pub fn with_origin(mut self, x: f64, y: f64) -> Self {
        self.origin = (x, y);
        self
    }

    /// Enable warp compensation with the given height function.
    pub fn with_warp(mut self, warp: WarpFn) -> Self {
        self.warp = Some(warp);
        self
    }

    /// Effective refractive index ratio.
    pub fn neff(&self) -> f64 {
        self.neff
    }

    /// The linear map `S * R`: xy rotation composed with depth scaling.
    pub fn matrix(&self) -> Matrix3<f64> {
        let (s, c) = self.rotation_angle.sin_cos();
        let rotation = Matrix3::new(
            c, -s, 0.0, //
            s, c, 0.0, //
            0.0, 0.0, 1.0,
        );
        let scale = Matrix3::new(
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 1.0 / self.neff,
        );
        scale * rotation
    }

    /// Transform parallel coordinate arrays into stage coordinates.
    ///
    /// The slices must have equal length; points are processed
    /// independently and in order.
    pub fn apply(&self, x: &[f64], y: &[f64], z: &[f64]) -> (Vec<f32>, Vec<f32>, Vec<f32>) {
        let m = self.matrix();
        let mut xt = Vec::with_capacity(x.len());
        let mut yt = Vec::with_capacity(y.len());
        let mut zt = Vec::with_capacity(z.len());
        for ((&xi, &yi), &zi) in x.iter().zip(y).zip(z) {
            let (px, py) = self.shift_and_flip(xi, yi);
            let v = m * Vector3::new(px, py, zi);
            let dz = match &self.warp {
                Some(warp) => warp(v.x, v.y) / self.neff,
                None => 0.0,
            };
            xt.push(v.x as f32);
            yt.push(v.y as f32);
            zt.push((v.z + dz) as f32);
        }
        (xt, yt, zt)
    }

    /// Planar variant of [`apply`](Self::apply) for paths with no depth
    /// coordinate. Warp compensation does not apply.
    pub fn apply_xy(&self, x: &[f64], y: &[f64]) -> (Vec<f32>, Vec<f32>) {
        let (s, c) = self.rotation_angle.sin_cos();
        let m = Matrix2::new(c, -s, s, c);
        let mut xt = Vec::with_capacity(x.len());
        let mut yt = Vec::with_capacity(y.len());
        for (&xi, &yi) in x.iter().zip(y) {
            let (px, py) = self.shift_and_flip(xi, yi);
            let v = m * Vector2::new(px, py);
            xt.push(v.x as f32);
            yt.push(v.y as f32);
        }
        (xt, yt)
    }

    fn shift_and_flip(&self, x: f64, y: f64) -> (f64, f64) {
        let x = x - self.origin.0;
        let y = y - self.origin.1;
        let x = if self.flip_x { -x } else { x };
        let y = if self.flip_y { -y } else { y };
        (x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_identity() {
        let t = PathTransform::new(0.0, 1.0);
        let (x, y, z) = t.apply(&[1.0, -2.5], &[0.5, 3.0], &[0.1, -0.035]);
        assert_relative_eq!(x[0], 1.0_f32);
        assert_relative_eq!(y[1], 3.0_f32);
        assert_relative_eq!(z[1], -0.035_f32);
    }

    #[test]
    fn test_rotation_quarter_turn() {
        let t = PathTransform::new(FRAC_PI_2, 1.0);
        let (x, y, _) = t.apply(&[1.0], &[0.0], &[0.0]);
        assert!(x[0].abs() < 1e-6);
        assert_relative_eq!(y[0], 1.0_f32, epsilon = 1e-6_f32);
    }

    #[test]
    fn test_depth_scaled_by_neff() {
        let neff = 1.5 / 1.33;
        let t = PathTransform::new(0.0, neff);
        let (_, _, z) = t.apply(&[0.0], &[0.0], &[0.1]);
        assert_relative_eq!(z[0], (0.1 / neff) as f32, epsilon = 1e-6_f32);
    }

    #[test]
    fn test_flip_and_origin() {
        let t = PathTransform::new(0.0, 1.0)
            .with_origin(1.0, 2.0)
            .with_flips(true, false);
        let (x, y, _) = t.apply(&[3.0], &[5.0], &[0.0]);
        // (3 - 1, 5 - 2) then x negated
        assert_relative_eq!(x[0], -2.0_f32);
        assert_relative_eq!(y[0], 3.0_f32);
    }

    #[test]
    fn test_warp_compensation() {
        let neff = 2.0;
        let t = PathTransform::new(0.0, neff).with_warp(Box::new(|_, _| 0.010));
        let (_, _, z) = t.apply(&[10.0], &[5.0], &[0.2]);
        assert_relative_eq!(z[0], (0.2 / neff + 0.010 / neff) as f32, epsilon = 1e-6_f32);
    }

    #[test]
    fn test_warp_sampled_on_transformed_coordinates() {
        // 90 degree turn maps (1, 0) to (0, 1); the warp function must see
        // the rotated pair.
        let t = PathTransform::new(FRAC_PI_2, 1.0).with_warp(Box::new(|x, y| {
            assert!(x.abs() < 1e-9);
            assert!((y - 1.0).abs() < 1e-9);
            0.0
        }));
        t.apply(&[1.0], &[0.0], &[0.0]);
    }

    #[test]
    fn test_apply_xy() {
        let t = PathTransform::new(FRAC_PI_2, 1.5);
        let (x, y) = t.apply_xy(&[2.0], &[0.0]);
        assert!(x[0].abs() < 1e-6);
        assert_relative_eq!(y[0], 2.0_f32, epsilon = 1e-6_f32);
    }
}
