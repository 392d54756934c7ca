//! Nose-tip search over a smoothed curvature map.

use log::debug;

use crate::curvature::CurvatureMap;
use crate::types::Vec3f;

/// Horizontal search band half-width, in inter-eye distances.
const X_BAND: f32 = 0.75;
/// Vertical search band below the mid-eye point, in inter-eye distances.
const DOWN_MIN: f32 = 0.25;
const DOWN_MAX: f32 = 1.6;
/// Minimum forward protrusion for a credible nose tip, in inter-eye distances.
const MIN_PROTRUSION: f32 = 0.08;

/// Searches the curvature-scored neighbourhood below and between the eyes
/// for the vertex most consistent with a nose-tip profile: protruding
/// toward the viewer and locally convex.
///
/// The detection view looks down -z at the face, so the outward direction
/// is taken to have a positive z component.
pub struct NoseFinder<'a> {
    map: &'a CurvatureMap,
    left_eye: usize,
    right_eye: usize,
    tip: Option<usize>,
}

impl<'a> NoseFinder<'a> {
    pub fn new(map: &'a CurvatureMap, left_eye: usize, right_eye: usize) -> Self {
        Self {
            map,
            left_eye,
            right_eye,
            tip: None,
        }
    }

    /// Returns false when no consistent candidate exists, e.g. because the
    /// cropped region is too small or too flat.
    pub fn find(&mut self) -> bool {
        let m = self.map.mesh();
        let l = m.vertex(self.left_eye);
        let r = m.vertex(self.right_eye);
        let ev = r - l;
        let d = ev.norm();
        if d <= f32::EPSILON {
            return false;
        }
        let xhat = ev / d;
        let mid = (l + r) * 0.5;

        // Outward direction: mean eye normal with the eye axis projected out.
        let n0 = self.map.vertex_normal(self.left_eye) + self.map.vertex_normal(self.right_eye);
        let mut zhat = n0 - xhat * n0.dot(&xhat);
        if zhat.norm() <= f32::EPSILON {
            return false;
        }
        zhat.normalize_mut();
        if zhat.z < 0.0 {
            zhat = -zhat;
        }
        let down = -zhat.cross(&xhat);

        let mut best: Option<(usize, f32)> = None;
        let mut best_h = 0.0f32;
        for v in 0..m.num_vertices() {
            let q = m.vertex(v) - mid;
            let a = q.dot(&xhat);
            let b = q.dot(&down);
            if a.abs() > X_BAND * d || b < DOWN_MIN * d || b > DOWN_MAX * d {
                continue;
            }
            let h = q.dot(&zhat);
            // Convexity with respect to the outward direction at this vertex.
            let csign = if self.map.vertex_normal(v).dot(&zhat) < 0.0 {
                -1.0
            } else {
                1.0
            };
            let c = csign * self.map.curvature_at(v);
            let score = h + 0.25 * d * c.clamp(-1.0, 1.0);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((v, score));
                best_h = h;
            }
        }

        match best {
            Some((v, _)) if best_h >= MIN_PROTRUSION * d => {
                debug!("nose tip at vertex {v}, protrusion {best_h:.2}");
                self.tip = Some(v);
                true
            }
            _ => {
                debug!("no nose-tip candidate (best protrusion {best_h:.2})");
                false
            }
        }
    }

    /// Vertex index of the discovered nose tip.
    pub fn tip_vertex(&self) -> Option<usize> {
        self.tip
    }

    /// World position of the discovered nose tip.
    pub fn nose_tip(&self) -> Option<Vec3f> {
        self.tip.map(|v| self.map.mesh().vertex(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curvature::{smooth, CurvatureMap};
    use crate::kdtree::KdTree;
    use crate::testutil::{eye_positions, face_mesh, grid_mesh};

    #[test]
    fn finds_nose_bump() {
        let m = face_mesh();
        let kd = KdTree::build(&m);
        let (le, re) = eye_positions();
        let lv = kd.nearest(&le).unwrap();
        let rv = kd.nearest(&re).unwrap();

        let mut map = CurvatureMap::new(m, lv).unwrap();
        smooth(&mut map, 0.7, 10);
        let mut finder = NoseFinder::new(&map, lv, rv);
        assert!(finder.find());

        let tip = finder.nose_tip().unwrap();
        // The synthetic nose peaks at (0, -25).
        assert!(tip.x.abs() < 10.0, "tip.x = {}", tip.x);
        assert!((tip.y + 25.0).abs() < 12.0, "tip.y = {}", tip.y);
        assert!(tip.z > 35.0, "tip.z = {}", tip.z);
    }

    #[test]
    fn flat_region_yields_no_tip() {
        let m = grid_mesh(60.0, 3.0, |_, _| 0.0);
        let kd = KdTree::build(&m);
        let lv = kd.nearest(&Vec3f::new(-20.0, 10.0, 0.0)).unwrap();
        let rv = kd.nearest(&Vec3f::new(20.0, 10.0, 0.0)).unwrap();
        let map = CurvatureMap::new(m, lv).unwrap();
        let mut finder = NoseFinder::new(&map, lv, rv);
        assert!(!finder.find());
        assert!(finder.nose_tip().is_none());
    }

    #[test]
    fn coincident_eyes_fail() {
        let m = face_mesh();
        let map = CurvatureMap::new(m, 0).unwrap();
        let mut finder = NoseFinder::new(&map, 5, 5);
        assert!(!finder.find());
    }
}
