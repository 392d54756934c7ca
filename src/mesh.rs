//! Indexed triangle mesh with vertex/face adjacency queries.
//!
//! Vertices keep stable indices for the lifetime of a mesh instance; the
//! editing operations in [`crate::meshops`] produce new independent meshes
//! rather than renumbering in place.

use crate::types::{transform_pos, Mat4f, Vec3f};

/// A triangulated (or point-only) 3D surface.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    verts: Vec<Vec3f>,
    faces: Vec<[u32; 3]>,
    /// Incident face ids per vertex.
    vfaces: Vec<Vec<u32>>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(nverts: usize, nfaces: usize) -> Self {
        Self {
            verts: Vec::with_capacity(nverts),
            faces: Vec::with_capacity(nfaces),
            vfaces: Vec::with_capacity(nverts),
        }
    }

    pub fn add_vertex(&mut self, v: Vec3f) -> usize {
        self.verts.push(v);
        self.vfaces.push(Vec::new());
        self.verts.len() - 1
    }

    /// Add a triangle over existing vertices. Returns the new face id.
    pub fn add_face(&mut self, a: usize, b: usize, c: usize) -> usize {
        debug_assert!(a < self.verts.len() && b < self.verts.len() && c < self.verts.len());
        let fid = self.faces.len() as u32;
        self.faces.push([a as u32, b as u32, c as u32]);
        self.vfaces[a].push(fid);
        self.vfaces[b].push(fid);
        self.vfaces[c].push(fid);
        fid as usize
    }

    pub fn num_vertices(&self) -> usize {
        self.verts.len()
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    pub fn vertex(&self, v: usize) -> Vec3f {
        self.verts[v]
    }

    pub fn set_vertex(&mut self, v: usize, p: Vec3f) {
        self.verts[v] = p;
    }

    pub fn vertices(&self) -> &[Vec3f] {
        &self.verts
    }

    pub fn face(&self, f: usize) -> [u32; 3] {
        self.faces[f]
    }

    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    /// Ids of the faces incident to a vertex.
    pub fn faces_of(&self, v: usize) -> &[u32] {
        &self.vfaces[v]
    }

    /// Distinct vertices sharing a face with `v`.
    pub fn vertex_neighbours(&self, v: usize) -> Vec<usize> {
        let mut out = Vec::new();
        for &fid in &self.vfaces[v] {
            for &u in &self.faces[fid as usize] {
                let u = u as usize;
                if u != v && !out.contains(&u) {
                    out.push(u);
                }
            }
        }
        out
    }

    /// Faces sharing an edge with face `f`.
    pub fn adjacent_faces(&self, f: usize) -> Vec<usize> {
        let [a, b, c] = self.faces[f];
        let mut out = Vec::new();
        for (u, v) in [(a, b), (b, c), (c, a)] {
            for &g in &self.vfaces[u as usize] {
                let g = g as usize;
                if g == f || out.contains(&g) {
                    continue;
                }
                if self.faces[g].contains(&v) {
                    out.push(g);
                }
            }
        }
        out
    }

    /// Number of faces containing the (undirected) edge `(a, b)`.
    pub fn edge_face_count(&self, a: usize, b: usize) -> usize {
        self.vfaces[a]
            .iter()
            .filter(|&&f| self.faces[f as usize].contains(&(b as u32)))
            .count()
    }

    /// Unit normal of a face, or zero for a degenerate triangle.
    pub fn face_normal(&self, f: usize) -> Vec3f {
        let [a, b, c] = self.faces[f];
        let pa = self.verts[a as usize];
        let n = (self.verts[b as usize] - pa).cross(&(self.verts[c as usize] - pa));
        let len = n.norm();
        if len > f32::EPSILON {
            n / len
        } else {
            Vec3f::zeros()
        }
    }

    pub fn face_area(&self, f: usize) -> f32 {
        let [a, b, c] = self.faces[f];
        let pa = self.verts[a as usize];
        (self.verts[b as usize] - pa)
            .cross(&(self.verts[c as usize] - pa))
            .norm()
            * 0.5
    }

    pub fn face_centroid(&self, f: usize) -> Vec3f {
        let [a, b, c] = self.faces[f];
        (self.verts[a as usize] + self.verts[b as usize] + self.verts[c as usize]) / 3.0
    }

    /// Axis-aligned bounds over all vertices, or `None` for an empty mesh.
    pub fn bounds(&self) -> Option<(Vec3f, Vec3f)> {
        let first = *self.verts.first()?;
        let mut min = first;
        let mut max = first;
        for v in &self.verts[1..] {
            for i in 0..3 {
                min[i] = min[i].min(v[i]);
                max[i] = max[i].max(v[i]);
            }
        }
        Some((min, max))
    }

    /// Apply a homogeneous transform to every vertex.
    pub fn transform(&mut self, t: &Mat4f) {
        for v in &mut self.verts {
            *v = transform_pos(t, v);
        }
    }

    /// Copy a subset of faces into a new independent mesh, renumbering the
    /// referenced vertices. Vertices used by no selected face are dropped.
    pub fn copy_faces<I>(&self, fids: I) -> Mesh
    where
        I: IntoIterator<Item = usize>,
    {
        let tris: Vec<[u32; 3]> = fids.into_iter().map(|f| self.faces[f]).collect();
        self.copy_triples(&tris)
    }

    /// As [`Mesh::copy_faces`] but from explicit vertex triples (which need
    /// not correspond to existing faces).
    pub(crate) fn copy_triples(&self, tris: &[[u32; 3]]) -> Mesh {
        let mut remap: Vec<i64> = vec![-1; self.verts.len()];
        let mut out = Mesh::new();
        for t in tris {
            let mut nt = [0usize; 3];
            for (i, &v) in t.iter().enumerate() {
                let v = v as usize;
                if remap[v] < 0 {
                    remap[v] = out.add_vertex(self.verts[v]) as i64;
                }
                nt[i] = remap[v] as usize;
            }
            out.add_face(nt[0], nt[1], nt[2]);
        }
        out
    }
}
