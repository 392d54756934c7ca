//! Spatial index over mesh vertices supporting nearest-point queries.

use crate::mesh::Mesh;
use crate::types::Vec3f;

#[derive(Debug, Clone)]
struct Node {
    point: Vec3f,
    /// Vertex index in the source mesh.
    vidx: u32,
    axis: u8,
    left: i32,
    right: i32,
}

/// A KD-tree over the vertices of a mesh.
///
/// The tree copies vertex positions at build time; it does not observe later
/// mutation of the source mesh.
#[derive(Debug, Clone)]
pub struct KdTree {
    nodes: Vec<Node>,
    root: i32,
}

impl KdTree {
    pub fn build(mesh: &Mesh) -> Self {
        let mut items: Vec<(u32, Vec3f)> = mesh
            .vertices()
            .iter()
            .enumerate()
            .map(|(i, &p)| (i as u32, p))
            .collect();
        let mut nodes = Vec::with_capacity(items.len());
        let root = Self::build_rec(&mut items[..], 0, &mut nodes);
        Self { nodes, root }
    }

    fn build_rec(items: &mut [(u32, Vec3f)], depth: usize, nodes: &mut Vec<Node>) -> i32 {
        if items.is_empty() {
            return -1;
        }
        let axis = (depth % 3) as u8;
        items.sort_unstable_by(|a, b| {
            a.1[axis as usize]
                .partial_cmp(&b.1[axis as usize])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mid = items.len() / 2;
        let (vidx, point) = items[mid];
        let id = nodes.len() as i32;
        nodes.push(Node {
            point,
            vidx,
            axis,
            left: -1,
            right: -1,
        });
        let (lo, hi) = items.split_at_mut(mid);
        let left = Self::build_rec(lo, depth + 1, nodes);
        let right = Self::build_rec(&mut hi[1..], depth + 1, nodes);
        nodes[id as usize].left = left;
        nodes[id as usize].right = right;
        id
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Index of the mesh vertex nearest to `p`, or `None` for an empty tree.
    pub fn nearest(&self, p: &Vec3f) -> Option<usize> {
        self.nearest_sq(p).map(|(v, _)| v)
    }

    /// Nearest vertex index together with the squared distance to it.
    pub fn nearest_sq(&self, p: &Vec3f) -> Option<(usize, f32)> {
        if self.root < 0 {
            return None;
        }
        let mut best = (0usize, f32::MAX);
        self.search(self.root, p, &mut best);
        Some(best)
    }

    fn search(&self, id: i32, p: &Vec3f, best: &mut (usize, f32)) {
        if id < 0 {
            return;
        }
        let node = &self.nodes[id as usize];
        let sq = (node.point - p).norm_squared();
        if sq < best.1 {
            *best = (node.vidx as usize, sq);
        }
        let axis = node.axis as usize;
        let delta = p[axis] - node.point[axis];
        let (near, far) = if delta < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };
        self.search(near, p, best);
        // Only descend the far side if the splitting plane is within range.
        if delta * delta < best.1 {
            self.search(far, p, best);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesh;

    /// Deterministic pseudo-random coordinates.
    fn scatter(n: usize) -> Mesh {
        let mut m = Mesh::new();
        let mut state = 0x2545f491u64;
        let mut next = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 33) as f32 / u32::MAX as f32) * 200.0 - 100.0
        };
        for _ in 0..n {
            let v = Vec3f::new(next(), next(), next());
            m.add_vertex(v);
        }
        m
    }

    fn brute_nearest(m: &Mesh, p: &Vec3f) -> usize {
        let mut best = (0usize, f32::MAX);
        for (i, v) in m.vertices().iter().enumerate() {
            let sq = (v - p).norm_squared();
            if sq < best.1 {
                best = (i, sq);
            }
        }
        best.0
    }

    #[test]
    fn matches_brute_force() {
        let m = scatter(500);
        let kd = KdTree::build(&m);
        for i in 0..50 {
            let q = Vec3f::new(i as f32 * 3.7 - 90.0, (i * 13 % 17) as f32, -(i as f32));
            let found = kd.nearest(&q).unwrap();
            let expect = brute_nearest(&m, &q);
            let d_found = (m.vertex(found) - q).norm_squared();
            let d_expect = (m.vertex(expect) - q).norm_squared();
            assert!((d_found - d_expect).abs() < 1e-4);
        }
    }

    #[test]
    fn empty_tree() {
        let kd = KdTree::build(&Mesh::new());
        assert!(kd.is_empty());
        assert!(kd.nearest(&Vec3f::zeros()).is_none());
    }

    #[test]
    fn exact_hit() {
        let mut m = Mesh::new();
        m.add_vertex(Vec3f::new(1.0, 2.0, 3.0));
        m.add_vertex(Vec3f::new(-4.0, 0.0, 1.0));
        let kd = KdTree::build(&m);
        let (v, sq) = kd.nearest_sq(&Vec3f::new(-4.0, 0.0, 1.0)).unwrap();
        assert_eq!(v, 1);
        assert!(sq < 1e-12);
    }
}
