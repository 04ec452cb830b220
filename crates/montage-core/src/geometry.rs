//! 2D geometry for clip placement in the composited frame.

use glam::{Affine2, Vec2};

/// Placement of a clip's frame inside the output canvas.
///
/// Built from the clip's automated geometry parameters. `zoom` scales around
/// the canvas center, `pan` shifts in canvas-size fractions, `rotation` is in
/// degrees. The mixer samples source pixels through the inverse mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementTransform {
    forward: Affine2,
    inverse: Affine2,
}

impl PlacementTransform {
    /// Identity placement (source pasted 1:1).
    pub const IDENTITY: Self = Self {
        forward: Affine2::IDENTITY,
        inverse: Affine2::IDENTITY,
    };

    /// Build a placement from zoom, pan and rotation, relative to a canvas
    /// of the given size.
    pub fn new(canvas_width: f32, canvas_height: f32, zoom: f32, pan_x: f32, pan_y: f32, rotation_degrees: f32) -> Self {
        let center = Vec2::new(canvas_width * 0.5, canvas_height * 0.5);
        let translation = center + Vec2::new(pan_x * canvas_width, pan_y * canvas_height);
        let forward = Affine2::from_translation(translation)
            * Affine2::from_angle(rotation_degrees.to_radians())
            * Affine2::from_scale(Vec2::splat(zoom.max(1e-6)))
            * Affine2::from_translation(-center);
        Self {
            forward,
            inverse: forward.inverse(),
        }
    }

    /// Whether this is the identity mapping.
    pub fn is_identity(&self) -> bool {
        self.forward
            .abs_diff_eq(Affine2::IDENTITY, 1e-6)
    }

    /// Map a source point into the canvas.
    #[inline]
    pub fn transform_point(&self, point: Vec2) -> Vec2 {
        self.forward.transform_point2(point)
    }

    /// Map a canvas point back into source coordinates.
    #[inline]
    pub fn source_point(&self, point: Vec2) -> Vec2 {
        self.inverse.transform_point2(point)
    }
}

impl Default for PlacementTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_placement() {
        let t = PlacementTransform::new(1920.0, 1080.0, 1.0, 0.0, 0.0, 0.0);
        assert!(t.is_identity());
        let p = t.transform_point(Vec2::new(10.0, 20.0));
        assert!((p.x - 10.0).abs() < 1e-3);
        assert!((p.y - 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_zoom_scales_around_center() {
        let t = PlacementTransform::new(100.0, 100.0, 2.0, 0.0, 0.0, 0.0);
        // Center stays fixed
        let c = t.transform_point(Vec2::new(50.0, 50.0));
        assert!((c.x - 50.0).abs() < 1e-3);
        assert!((c.y - 50.0).abs() < 1e-3);
        // Corner moves outward
        let p = t.transform_point(Vec2::new(0.0, 0.0));
        assert!((p.x - -50.0).abs() < 1e-3);
    }

    #[test]
    fn test_inverse_round_trip() {
        let t = PlacementTransform::new(1920.0, 1080.0, 1.5, 0.1, -0.2, 30.0);
        let p = Vec2::new(123.0, 456.0);
        let back = t.source_point(t.transform_point(p));
        assert!((back.x - p.x).abs() < 1e-2);
        assert!((back.y - p.y).abs() < 1e-2);
    }

    #[test]
    fn test_pan_shifts_center() {
        let t = PlacementTransform::new(100.0, 100.0, 1.0, 0.5, 0.0, 0.0);
        let c = t.transform_point(Vec2::new(50.0, 50.0));
        assert!((c.x - 100.0).abs() < 1e-3);
        assert!((c.y - 50.0).abs() < 1e-3);
    }
}
