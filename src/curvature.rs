//! Per-vertex curvature descriptors anchored at a seed vertex, with
//! fixed-iteration Laplacian smoothing.

use std::collections::VecDeque;

use crate::error::{DetectError, Result};
use crate::mesh::Mesh;
use crate::types::Vec3f;

/// A curvature map over a mesh it exclusively owns.
///
/// Face normals are oriented consistently by propagation from the seed
/// vertex's first face, so the sign of the curvature estimate is coherent
/// across the whole map (though globally ambiguous: the seed face fixes
/// which side counts as "outward").
#[derive(Debug, Clone)]
pub struct CurvatureMap {
    mesh: Mesh,
    seed: usize,
    face_normals: Vec<Vec3f>,
    vertex_normals: Vec<Vec3f>,
    curvature: Vec<f32>,
}

impl CurvatureMap {
    pub fn new(mesh: Mesh, seed: usize) -> Result<Self> {
        if seed >= mesh.num_vertices() || mesh.faces_of(seed).is_empty() {
            return Err(DetectError::InvalidSeedVertex(seed));
        }
        let mut map = Self {
            mesh,
            seed,
            face_normals: Vec::new(),
            vertex_normals: Vec::new(),
            curvature: Vec::new(),
        };
        map.rebuild();
        Ok(map)
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn seed(&self) -> usize {
        self.seed
    }

    /// Consistently oriented unit normal of a face.
    pub fn face_normal(&self, f: usize) -> Vec3f {
        self.face_normals[f]
    }

    /// Area-weighted unit normal at a vertex.
    pub fn vertex_normal(&self, v: usize) -> Vec3f {
        self.vertex_normals[v]
    }

    /// Signed local curvature estimate: positive where the surface is
    /// locally convex with respect to the oriented normal.
    pub fn curvature_at(&self, v: usize) -> f32 {
        self.curvature[v]
    }

    fn rebuild(&mut self) {
        let m = &self.mesh;
        let nf = m.num_faces();
        let nv = m.num_vertices();

        let mut fnorms: Vec<Vec3f> = (0..nf).map(|f| m.face_normal(f)).collect();

        // Orient normals consistently outward from the seed face.
        let start = m.faces_of(self.seed)[0] as usize;
        let mut seen = vec![false; nf];
        seen[start] = true;
        let mut queue = VecDeque::from([start]);
        while let Some(f) = queue.pop_front() {
            for g in m.adjacent_faces(f) {
                if !seen[g] {
                    seen[g] = true;
                    if fnorms[f].dot(&fnorms[g]) < 0.0 {
                        fnorms[g] = -fnorms[g];
                    }
                    queue.push_back(g);
                }
            }
        }

        let mut vnorms = vec![Vec3f::zeros(); nv];
        for f in 0..nf {
            let w = m.face_area(f);
            for &v in &m.face(f) {
                vnorms[v as usize] += fnorms[f] * w;
            }
        }
        for n in &mut vnorms {
            let len = n.norm();
            if len > f32::EPSILON {
                *n /= len;
            }
        }

        let mut curvature = vec![0.0f32; nv];
        for v in 0..nv {
            let p = m.vertex(v);
            let n = vnorms[v];
            let mut sum = 0.0;
            let mut cnt = 0;
            for u in m.vertex_neighbours(v) {
                let d = p - m.vertex(u);
                let len = d.norm();
                if len > f32::EPSILON {
                    sum += n.dot(&d) / len;
                    cnt += 1;
                }
            }
            if cnt > 0 {
                curvature[v] = sum / cnt as f32;
            }
        }

        self.face_normals = fnorms;
        self.vertex_normals = vnorms;
        self.curvature = curvature;
    }
}

/// Apply `iterations` passes of weighted Laplacian smoothing to the map's
/// vertex positions, then refresh the curvature descriptors once.
///
/// There is no convergence check: the fixed iteration count trades accuracy
/// for bounded runtime.
pub fn smooth(map: &mut CurvatureMap, factor: f32, iterations: usize) {
    for _ in 0..iterations {
        let m = &map.mesh;
        let moved: Vec<Vec3f> = (0..m.num_vertices())
            .map(|v| {
                let nb = m.vertex_neighbours(v);
                if nb.is_empty() {
                    return m.vertex(v);
                }
                let mut mean = Vec3f::zeros();
                for &u in &nb {
                    mean += m.vertex(u);
                }
                mean /= nb.len() as f32;
                let p = m.vertex(v);
                p + (mean - p) * factor
            })
            .collect();
        for (v, p) in moved.into_iter().enumerate() {
            map.mesh.set_vertex(v, p);
        }
    }
    if iterations > 0 {
        map.rebuild();
    }
}
