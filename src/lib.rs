//! Automatic facial landmark detection and orientation discovery for 3D
//! facial surface meshes.
//!
//! The pipeline renders the mesh to an offscreen grayscale view, locates
//! the face and eyes in 2D with a cascade detector, picks the eye points
//! back onto the surface, and searches a cropped, smoothed region of the
//! surface for the nose tip. From the eyes and nose it derives an
//! orthonormal orientation frame and a complete positioned
//! [`LandmarkSet`], every landmark projected onto the surface.
//!
//! ```no_run
//! use face_orient::{
//!     DetectionContext, FaceDetector, KdTree, MeanShapePrior, Mesh, RustfaceDetector,
//! };
//!
//! # fn main() -> face_orient::Result<()> {
//! let mesh = Mesh::new(); // load a facial scan here
//! let kd = KdTree::build(&mesh);
//! let cascade = RustfaceDetector::from_file("seeta_fd_model.bin".as_ref())?;
//! let ctx = DetectionContext::new(Box::new(cascade), Box::new(MeanShapePrior));
//! let mut detector = FaceDetector::new(ctx);
//! let detection = detector.detect(&mesh, &kd)?;
//! println!("face normal: {}", detection.orientation.normal);
//! # Ok(())
//! # }
//! ```

mod curvature;
mod detector;
mod error;
mod finder2d;
mod kdtree;
pub mod landmarks;
mod mesh;
mod meshops;
mod nose;
mod orient;
mod picker;
#[cfg(test)]
mod testutil;
mod types;
mod view;

pub use curvature::{smooth, CurvatureMap};
pub use detector::{
    Detection, DetectionContext, DetectStage, FaceDetector, LandmarkPredictor, MeanShapePrior,
    SnapshotObserver, DEFAULT_DETECTION_RANGE, DEFAULT_ORIENTATION_RANGE, VIEW_SIZE,
};
pub use error::{DetectError, PickTarget, Result};
pub use finder2d::{CascadeDetector, FaceFinder2D, GrayImage, RustfaceDetector};
pub use kdtree::KdTree;
pub use landmarks::{Bounds, Landmark, LandmarkId, LandmarkSet};
pub use mesh::Mesh;
pub use meshops::{clean, component, crop, fill_holes, to_surface};
pub use nose::NoseFinder;
pub use orient::{calc_crop_radius, calc_face_centre, estimate_orientation, Orientation};
pub use picker::{resolve_eye_points, EyePoints, MAX_PICK_ATTEMPTS, PICK_NUDGE};
pub use types::{transform_pos, FeatureBox, Mat4f, Point2, Side, Vec3f};
pub use view::{CameraParams, OffscreenView, SurfaceView};
