//! Resolution of 2D eye detections to 3D surface positions.
//!
//! A 2D eye centre can land just off the surface (an eye socket hole, a
//! scan artefact) so each pick walks the query point inward by a small
//! fixed nudge until the surface is hit or the attempt budget runs out.

use log::debug;

use crate::error::{DetectError, PickTarget, Result};
use crate::types::{Point2, Vec3f};
use crate::view::SurfaceView;

/// Attempts before a pick is abandoned.
pub const MAX_PICK_ATTEMPTS: usize = 20;

/// Per-attempt nudge in normalized view coordinates.
pub const PICK_NUDGE: f32 = 0.005;

/// The three picked surface positions the orientation search starts from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyePoints {
    pub left: Vec3f,
    pub right: Vec3f,
    pub mid: Vec3f,
}

/// Pick 3D surface positions for both eye centres and their midpoint.
///
/// The left eye is nudged toward the face midline (+x in view coordinates),
/// the right eye the opposite way, and the midpoint upward in the view.
/// The nudge directions assume a roughly upright, frontal subject.
pub fn resolve_eye_points(view: &dyn SurfaceView, e0: Point2, e1: Point2) -> Result<EyePoints> {
    let fmid = Point2::midpoint(e0, e1);
    let left = pick_with_retry(view, e0, PICK_NUDGE, 0.0, PickTarget::LeftEye)?;
    let right = pick_with_retry(view, e1, -PICK_NUDGE, 0.0, PickTarget::RightEye)?;
    let mid = pick_with_retry(view, fmid, 0.0, -PICK_NUDGE, PickTarget::EyeMidPoint)?;
    Ok(EyePoints { left, right, mid })
}

fn pick_with_retry(
    view: &dyn SurfaceView,
    start: Point2,
    dx: f32,
    dy: f32,
    target: PickTarget,
) -> Result<Vec3f> {
    let mut p = start;
    for _ in 0..MAX_PICK_ATTEMPTS {
        if let Some(v) = view.pick(p) {
            if p != start {
                debug!(
                    "{target} pick succeeded after nudging ({:.3}, {:.3}) -> ({:.3}, {:.3})",
                    start.x, start.y, p.x, p.y
                );
            }
            return Ok(v);
        }
        p.x += dx;
        p.y += dy;
    }
    debug!(
        "{target} pick exhausted {MAX_PICK_ATTEMPTS} attempts from ({:.3}, {:.3})",
        start.x, start.y
    );
    Err(DetectError::PickMiss(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finder2d::GrayImage;

    /// Picks succeed only inside a half-open x interval.
    struct BandView {
        img: GrayImage,
        x_min: f32,
        x_max: f32,
    }

    impl BandView {
        fn new(x_min: f32, x_max: f32) -> Self {
            Self {
                img: GrayImage::new(1, 1),
                x_min,
                x_max,
            }
        }
    }

    impl SurfaceView for BandView {
        fn light_map(&self) -> &GrayImage {
            &self.img
        }

        fn pick(&self, p: Point2) -> Option<Vec3f> {
            if p.x >= self.x_min && p.x < self.x_max && (0.0..1.0).contains(&p.y) {
                Some(Vec3f::new(p.x, p.y, 1.0))
            } else {
                None
            }
        }

        fn project(&self, v: &Vec3f) -> Point2 {
            Point2::new(v.x, v.y)
        }
    }

    #[test]
    fn direct_hits_need_no_retry() {
        let view = BandView::new(0.0, 1.0);
        let pts = resolve_eye_points(&view, Point2::new(0.4, 0.4), Point2::new(0.6, 0.4)).unwrap();
        assert!((pts.left.x - 0.4).abs() < 1e-6);
        assert!((pts.right.x - 0.6).abs() < 1e-6);
        assert!((pts.mid.x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn left_eye_recovers_by_nudging_inward() {
        // Surface starts at x = 0.42; the left eye detection is at 0.40.
        let view = BandView::new(0.42, 1.0);
        let pts = resolve_eye_points(&view, Point2::new(0.40, 0.4), Point2::new(0.6, 0.4)).unwrap();
        assert!(pts.left.x >= 0.42);
        assert!(pts.left.x < 0.43 + PICK_NUDGE);
    }

    #[test]
    fn exhausted_retries_name_the_failing_target() {
        // Gap wider than the full retry walk of 20 * 0.005 = 0.1.
        let view = BandView::new(0.55, 1.0);
        let err = resolve_eye_points(&view, Point2::new(0.40, 0.4), Point2::new(0.6, 0.4))
            .unwrap_err();
        assert!(matches!(err, DetectError::PickMiss(PickTarget::LeftEye)));
        assert_eq!(
            err.to_string(),
            "Failed to pick 3D position from 2D left eye position!"
        );
    }

    #[test]
    fn midpoint_failure_reported_after_eyes_succeed() {
        struct EyesOnly(GrayImage);
        impl SurfaceView for EyesOnly {
            fn light_map(&self) -> &GrayImage {
                &self.0
            }
            fn pick(&self, p: Point2) -> Option<Vec3f> {
                // A hole spanning the midline; nudging upward never escapes it.
                if (p.x - 0.5).abs() < 0.05 {
                    None
                } else {
                    Some(Vec3f::new(p.x, p.y, 0.0))
                }
            }
            fn project(&self, v: &Vec3f) -> Point2 {
                Point2::new(v.x, v.y)
            }
        }
        let view = EyesOnly(GrayImage::new(1, 1));
        let err = resolve_eye_points(&view, Point2::new(0.4, 0.4), Point2::new(0.6, 0.4))
            .unwrap_err();
        assert!(matches!(
            err,
            DetectError::PickMiss(PickTarget::EyeMidPoint)
        ));
    }
}
