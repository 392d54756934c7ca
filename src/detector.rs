//! End-to-end landmark detection: render, locate the face in 2D, discover
//! the orientation frame from the surface, then place and refine the full
//! landmark set.

use log::{info, warn};

use crate::curvature::{smooth, CurvatureMap};
use crate::error::{DetectError, Result};
use crate::finder2d::{CascadeDetector, FaceFinder2D, GrayImage};
use crate::kdtree::KdTree;
use crate::landmarks::{self, LandmarkSet, PRONASALE, PUPIL};
use crate::mesh::Mesh;
use crate::meshops;
use crate::nose::NoseFinder;
use crate::orient::{calc_face_centre, estimate_orientation, Orientation};
use crate::picker::resolve_eye_points;
use crate::types::{Side, Vec3f};
use crate::view::{CameraParams, OffscreenView, SurfaceView};

/// Camera range for the initial frontal render used to find the face.
pub const DEFAULT_ORIENTATION_RANGE: f32 = 700.0;
/// Camera range for the re-aimed render used to place landmarks.
pub const DEFAULT_DETECTION_RANGE: f32 = 400.0;
/// Square offscreen render resolution.
pub const VIEW_SIZE: u32 = 600;

/// Radius of the first crop about the mid-eye point.
const ORIENTATION_CROP_RADIUS: f32 = 70.0;
/// Minimum polygon count for a usable crop.
const MIN_CROP_FACES: usize = 50;
const SMOOTH_FACTOR: f32 = 0.7;
const SMOOTH_ITERATIONS: usize = 10;

/// Places the remaining landmarks on a rendered view given the orientation
/// frame and any landmarks already recorded.
pub trait LandmarkPredictor {
    /// Returns false when prediction could not produce a complete set.
    fn detect(
        &mut self,
        view: &dyn SurfaceView,
        frame: &Orientation,
        landmarks: &mut LandmarkSet,
    ) -> bool;
}

/// Landmark placement from the registry's canonical shape priors.
///
/// Requires both pupils and the pronasale to already be recorded; every
/// other registered landmark is placed at its prior offset in the face
/// frame, scaled by the inter-pupil distance. Already-recorded landmarks
/// are left untouched.
#[derive(Debug, Default)]
pub struct MeanShapePrior;

impl LandmarkPredictor for MeanShapePrior {
    fn detect(
        &mut self,
        _view: &dyn SurfaceView,
        frame: &Orientation,
        lmks: &mut LandmarkSet,
    ) -> bool {
        let (Ok(l), Ok(r), Ok(_)) = (
            lmks.pos(PUPIL, Side::Left),
            lmks.pos(PUPIL, Side::Right),
            lmks.pos(PRONASALE, Side::Medial),
        ) else {
            return false;
        };
        let ipd = (r - l).norm();
        if ipd <= f32::EPSILON {
            return false;
        }
        let mid = (l + r) * 0.5;
        let xhat = frame.up.cross(&frame.normal);

        let place = |prior: [f32; 3], mirror: f32| -> Vec3f {
            mid + xhat * (mirror * prior[0] * ipd)
                + frame.up * (prior[1] * ipd)
                + frame.normal * (prior[2] * ipd)
        };
        for lmk in landmarks::registry() {
            if lmk.bilateral {
                for (side, mirror) in [(Side::Left, -1.0), (Side::Right, 1.0)] {
                    if !lmks.has_side(lmk.id, side) {
                        lmks.set(lmk.id, place(lmk.prior, mirror), side);
                    }
                }
            } else if !lmks.has_side(lmk.id, Side::Medial) {
                lmks.set(lmk.id, place(lmk.prior, 1.0), Side::Medial);
            }
        }
        true
    }
}

/// The collaborating detectors a [`FaceDetector`] drives. Construct once and
/// reuse across models.
pub struct DetectionContext {
    pub cascade: Box<dyn CascadeDetector>,
    pub predictor: Box<dyn LandmarkPredictor>,
}

impl DetectionContext {
    pub fn new(cascade: Box<dyn CascadeDetector>, predictor: Box<dyn LandmarkPredictor>) -> Self {
        Self { cascade, predictor }
    }
}

/// Which render a snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectStage {
    OrientationRender,
    LandmarkRender,
}

/// Callback receiving each offscreen render as it is produced.
pub type SnapshotObserver = Box<dyn FnMut(DetectStage, &GrayImage)>;

/// Successful detection output.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub orientation: Orientation,
    pub landmarks: LandmarkSet,
}

/// Drives the full detection pipeline over a facial surface mesh.
pub struct FaceDetector {
    ctx: DetectionContext,
    orientation_range: f32,
    detection_range: f32,
    view_size: u32,
    observer: Option<SnapshotObserver>,
}

impl FaceDetector {
    pub fn new(ctx: DetectionContext) -> Self {
        Self {
            ctx,
            orientation_range: DEFAULT_ORIENTATION_RANGE,
            detection_range: DEFAULT_DETECTION_RANGE,
            view_size: VIEW_SIZE,
            observer: None,
        }
    }

    /// Override the camera ranges of the two renders.
    pub fn with_ranges(mut self, orientation_range: f32, detection_range: f32) -> Self {
        self.orientation_range = orientation_range;
        self.detection_range = detection_range;
        self
    }

    /// Install a callback observing each offscreen render.
    pub fn set_observer(&mut self, observer: SnapshotObserver) {
        self.observer = Some(observer);
    }

    /// Detect the orientation frame and full landmark set for the mesh.
    ///
    /// `kd` must index the vertices of `mesh`.
    pub fn detect(&mut self, mesh: &Mesh, kd: &KdTree) -> Result<Detection> {
        match self.run(mesh, kd) {
            Ok(d) => {
                info!(
                    "detected {} landmarks, normal ({:.3}, {:.3}, {:.3})",
                    d.landmarks.ids().len(),
                    d.orientation.normal.x,
                    d.orientation.normal.y,
                    d.orientation.normal.z
                );
                Ok(d)
            }
            Err(e) => {
                warn!("detection failed: {e}");
                Err(e)
            }
        }
    }

    fn observe(&mut self, stage: DetectStage, image: &GrayImage) {
        if let Some(cb) = self.observer.as_mut() {
            cb(stage, image);
        }
    }

    fn run(&mut self, mesh: &Mesh, kd: &KdTree) -> Result<Detection> {
        let view = OffscreenView::new(
            mesh,
            self.view_size,
            CameraParams::front(self.orientation_range),
        );
        self.observe(DetectStage::OrientationRender, view.light_map());

        let (orientation, mut lmks) = self.find_orientation(mesh, kd, &view)?;

        // Re-aim at the face centre for the landmark render so the full
        // face fills the frame regardless of the model's initial pose.
        let left = lmks.pos(PUPIL, Side::Left)?;
        let right = lmks.pos(PUPIL, Side::Right)?;
        let tip = lmks.pos(PRONASALE, Side::Medial)?;
        let fc = calc_face_centre(&orientation.up, &left, &right, &tip);
        let camera = CameraParams::new(
            fc + orientation.normal * self.detection_range,
            fc,
            orientation.up,
        );
        let view = OffscreenView::new(mesh, self.view_size, camera);
        self.observe(DetectStage::LandmarkRender, view.light_map());

        if !self.ctx.predictor.detect(&view, &orientation, &mut lmks) {
            return Err(DetectError::IncompleteLandmarks);
        }
        lmks.move_to_surface(mesh, kd);

        Ok(Detection {
            orientation,
            landmarks: lmks,
        })
    }

    /// Locate the eyes and nose tip on the surface and derive the
    /// orientation frame from the smoothed region around them.
    fn find_orientation(
        &mut self,
        mesh: &Mesh,
        kd: &KdTree,
        view: &OffscreenView,
    ) -> Result<(Orientation, LandmarkSet)> {
        let found = FaceFinder2D::find(self.ctx.cascade.as_mut(), view.light_map())?;
        let eyes = resolve_eye_points(view, found.left_eye_centre(), found.right_eye_centre())?;

        // First crop: a fixed radius about the mid-eye point, just enough
        // surface to find the nose on.
        let seed = kd.nearest(&eyes.mid).ok_or(DetectError::EmptyMesh)?;
        let crop = meshops::crop(mesh, &eyes.mid, seed, ORIENTATION_CROP_RADIUS)?;
        if crop.num_faces() < MIN_CROP_FACES {
            return Err(DetectError::RegionTooSmall);
        }

        let crop_kd = KdTree::build(&crop);
        let lv = crop_kd.nearest(&eyes.left).ok_or(DetectError::EmptyMesh)?;
        let rv = crop_kd.nearest(&eyes.right).ok_or(DetectError::EmptyMesh)?;
        let mut map = CurvatureMap::new(crop, lv)?;
        smooth(&mut map, SMOOTH_FACTOR, SMOOTH_ITERATIONS);

        let mut nose = NoseFinder::new(&map, lv, rv);
        if !nose.find() {
            return Err(DetectError::NoNoseTip);
        }
        let tip = nose.nose_tip().ok_or(DetectError::NoNoseTip)?;

        let mut lmks = LandmarkSet::new();
        lmks.set(PRONASALE, tip, Side::Medial);
        lmks.set(PUPIL, eyes.left, Side::Left);
        lmks.set(PUPIL, eyes.right, Side::Right);

        // Second crop: recentre on the three points, radius twice their
        // spread, and clean it up before estimating the frame.
        let centre = (eyes.left + eyes.right + tip) / 3.0;
        let spread = (eyes.left - centre)
            .norm()
            .max((eyes.right - centre).norm())
            .max((tip - centre).norm());
        let seed = kd.nearest(&tip).ok_or(DetectError::EmptyMesh)?;
        let mut region = meshops::crop(mesh, &centre, seed, 2.0 * spread)?;
        meshops::clean(&mut region);

        let region_kd = KdTree::build(&region);
        let tv = region_kd.nearest(&tip).ok_or(DetectError::EmptyMesh)?;
        let mut map = CurvatureMap::new(region, tv)?;
        smooth(&mut map, SMOOTH_FACTOR, SMOOTH_ITERATIONS);

        let orientation = estimate_orientation(&map, &region_kd, &eyes.left, &eyes.right)?;
        Ok((orientation, lmks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{EXOCANTHION, GNATHION, NASION};
    use crate::types::Point2;

    struct FlatView(GrayImage);

    impl SurfaceView for FlatView {
        fn light_map(&self) -> &GrayImage {
            &self.0
        }
        fn pick(&self, _p: Point2) -> Option<Vec3f> {
            None
        }
        fn project(&self, _v: &Vec3f) -> Point2 {
            Point2::zero()
        }
    }

    fn anchored_set() -> LandmarkSet {
        let mut s = LandmarkSet::new();
        s.set(PUPIL, Vec3f::new(-30.0, 0.0, 0.0), Side::Left);
        s.set(PUPIL, Vec3f::new(30.0, 0.0, 0.0), Side::Right);
        s.set(PRONASALE, Vec3f::new(0.0, -33.0, 21.0), Side::Medial);
        s
    }

    #[test]
    fn mean_shape_fills_the_registry() {
        let frame = Orientation::new(Vec3f::z(), Vec3f::y());
        let view = FlatView(GrayImage::new(1, 1));
        let mut s = anchored_set();
        assert!(MeanShapePrior.detect(&view, &frame, &mut s));
        assert_eq!(s.ids().len(), landmarks::registry().len());

        // Bilateral placements mirror in x about the midline; ipd is 60.
        let exl = s.pos(EXOCANTHION, Side::Left).unwrap();
        let exr = s.pos(EXOCANTHION, Side::Right).unwrap();
        assert!((exl.x + 43.2).abs() < 1e-3, "exl.x = {}", exl.x);
        assert!((exr.x - 43.2).abs() < 1e-3);
        assert!((exl.y - exr.y).abs() < 1e-6);

        let gn = s.pos(GNATHION, Side::Medial).unwrap();
        assert!((gn.y + 99.0).abs() < 1e-3);
        assert!(gn.x.abs() < 1e-6);
    }

    #[test]
    fn mean_shape_keeps_existing_positions() {
        let frame = Orientation::new(Vec3f::z(), Vec3f::y());
        let view = FlatView(GrayImage::new(1, 1));
        let mut s = anchored_set();
        let pinned = Vec3f::new(1.0, 2.0, 3.0);
        s.set(NASION, pinned, Side::Medial);
        assert!(MeanShapePrior.detect(&view, &frame, &mut s));
        assert_eq!(s.pos(NASION, Side::Medial).unwrap(), pinned);
    }

    #[test]
    fn mean_shape_requires_anchor_landmarks() {
        let frame = Orientation::new(Vec3f::z(), Vec3f::y());
        let view = FlatView(GrayImage::new(1, 1));
        let mut empty = LandmarkSet::new();
        assert!(!MeanShapePrior.detect(&view, &frame, &mut empty));

        // Coincident pupils cannot scale the priors.
        let mut s = LandmarkSet::new();
        s.set(PUPIL, Vec3f::zeros(), Side::Left);
        s.set(PUPIL, Vec3f::zeros(), Side::Right);
        s.set(PRONASALE, Vec3f::new(0.0, -1.0, 1.0), Side::Medial);
        assert!(!MeanShapePrior.detect(&view, &frame, &mut s));
    }
}
