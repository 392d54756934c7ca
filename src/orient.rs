//! Orientation frame estimation from the picked eye positions and the
//! smoothed facial surface.

use serde::{Deserialize, Serialize};

use crate::curvature::CurvatureMap;
use crate::error::{DetectError, Result};
use crate::kdtree::KdTree;
use crate::types::Vec3f;

/// Orthogonality tolerance for a valid frame.
const ORTHO_EPS: f32 = 1e-3;

/// An orientation frame for a facial surface: the outward-facing normal and
/// the up direction, both unit length and mutually orthogonal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub normal: Vec3f,
    pub up: Vec3f,
}

impl Orientation {
    pub fn new(normal: Vec3f, up: Vec3f) -> Self {
        Self { normal, up }
    }

    pub fn is_valid(&self) -> bool {
        self.normal.norm() > f32::EPSILON
            && self.up.norm() > f32::EPSILON
            && self.normal.normalize().dot(&self.up.normalize()).abs() < ORTHO_EPS
    }
}

/// Estimate the orientation frame from the eye positions and the local
/// surface around their midpoint.
///
/// The normal is the area-weighted mean of face normals within one
/// inter-eye distance of the mid-eye point, with the eye axis projected out
/// so the frame is exactly orthogonal. The outward side is taken to be +z,
/// matching the frontal detection view.
pub fn estimate_orientation(
    map: &CurvatureMap,
    kd: &KdTree,
    left_eye: &Vec3f,
    right_eye: &Vec3f,
) -> Result<Orientation> {
    let ev = right_eye - left_eye;
    let d = ev.norm();
    if d <= f32::EPSILON {
        return Err(DetectError::DegenerateEyes);
    }
    let xhat = ev / d;
    let mid = (left_eye + right_eye) * 0.5;

    let m = map.mesh();
    let mut n = Vec3f::zeros();
    for f in 0..m.num_faces() {
        if (m.face_centroid(f) - mid).norm() <= d {
            n += map.face_normal(f) * m.face_area(f);
        }
    }
    if n.norm() <= f32::EPSILON {
        // Sparse or disconnected local surface; fall back to the normal at
        // the single nearest vertex.
        match kd.nearest(&mid) {
            Some(v) => n = map.vertex_normal(v),
            None => return Err(DetectError::DegenerateFrame),
        }
        if n.norm() <= f32::EPSILON {
            return Err(DetectError::DegenerateFrame);
        }
    }
    if n.z < 0.0 {
        n = -n;
    }

    let mut normal = n - xhat * n.dot(&xhat);
    if normal.norm() <= f32::EPSILON {
        return Err(DetectError::DegenerateFrame);
    }
    normal.normalize_mut();
    let up = normal.cross(&xhat);
    Ok(Orientation::new(normal, up))
}

/// Face centre: the mid-eye point dropped along the frame's down direction
/// by the nose tip's extent in that direction.
pub fn calc_face_centre(up: &Vec3f, left_eye: &Vec3f, right_eye: &Vec3f, nose_tip: &Vec3f) -> Vec3f {
    let mid = (left_eye + right_eye) * 0.5;
    let down = -up.normalize();
    mid + down * down.dot(&(nose_tip - mid))
}

/// Crop radius about the face centre: the mean of the eye distances from
/// the face centre, scaled by the growth factor.
pub fn calc_crop_radius(
    face_centre: &Vec3f,
    left_eye: &Vec3f,
    right_eye: &Vec3f,
    growth: f32,
) -> f32 {
    growth * ((face_centre - left_eye).norm() + (face_centre - right_eye).norm()) / 2.0
}
