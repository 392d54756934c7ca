//! Primitive mesh utilities: radius cropping, connected-component
//! extraction, cleaning, and surface projection.

use std::collections::{HashMap, HashSet, VecDeque};

use log::{debug, info};

use crate::error::{DetectError, Result};
use crate::kdtree::KdTree;
use crate::mesh::Mesh;
use crate::types::Vec3f;

/// Extract the connected component containing the seed vertex.
///
/// Faces are connected when they share an edge. The result is an independent
/// copy with renumbered vertices.
pub fn component(mesh: &Mesh, seed: usize) -> Result<Mesh> {
    if seed >= mesh.num_vertices() || mesh.faces_of(seed).is_empty() {
        return Err(DetectError::InvalidSeedVertex(seed));
    }

    let start = mesh.faces_of(seed)[0] as usize;
    let mut seen = vec![false; mesh.num_faces()];
    let mut queue = VecDeque::from([start]);
    seen[start] = true;
    let mut fids = vec![start];
    while let Some(f) = queue.pop_front() {
        for g in mesh.adjacent_faces(f) {
            if !seen[g] {
                seen[g] = true;
                fids.push(g);
                queue.push_back(g);
            }
        }
    }
    Ok(mesh.copy_faces(fids))
}

/// Crop the subset of faces reachable from the seed vertex that lie within
/// `radius` of `centre`, returning a cleaned single-component copy.
///
/// A face qualifies when any of its vertices is within range. After copying,
/// non-manifold vertices are removed, dangling boundary vertices are
/// stripped repeatedly so the rim is clean, then the component containing a
/// surviving vertex is extracted. The result may be empty when nothing
/// survives pruning.
pub fn crop(mesh: &Mesh, centre: &Vec3f, seed: usize, radius: f32) -> Result<Mesh> {
    if seed >= mesh.num_vertices() {
        return Err(DetectError::InvalidSeedVertex(seed));
    }
    if mesh.faces_of(seed).is_empty() {
        return Err(DetectError::InvalidSeedVertex(seed));
    }

    let sq_radius = radius * radius;
    let in_range = |f: usize| {
        mesh.face(f)
            .iter()
            .any(|&v| (mesh.vertex(v as usize) - centre).norm_squared() <= sq_radius)
    };

    let mut seen = vec![false; mesh.num_faces()];
    let mut fids = Vec::new();
    let mut queue = VecDeque::new();
    for &f in mesh.faces_of(seed) {
        let f = f as usize;
        if !seen[f] && in_range(f) {
            seen[f] = true;
            fids.push(f);
            queue.push_back(f);
        }
    }
    while let Some(f) = queue.pop_front() {
        for g in mesh.adjacent_faces(f) {
            if !seen[g] && in_range(g) {
                seen[g] = true;
                fids.push(g);
                queue.push_back(g);
            }
        }
    }
    debug!("crop: {} of {} faces within radius {radius}", fids.len(), mesh.num_faces());

    let mut m = mesh.copy_faces(fids);
    remove_unclean(&mut m);

    // Strip dangling boundary vertices until stable.
    loop {
        let drop: HashSet<usize> = (0..m.num_vertices())
            .filter(|&v| is_dangling(&m, v))
            .collect();
        if drop.is_empty() {
            break;
        }
        let keep: Vec<usize> = (0..m.num_faces())
            .filter(|&f| m.face(f).iter().all(|&v| !drop.contains(&(v as usize))))
            .collect();
        m = m.copy_faces(keep);
    }

    match (0..m.num_vertices()).find(|&v| !m.faces_of(v).is_empty()) {
        Some(v) => component(&m, v),
        None => Ok(Mesh::new()),
    }
}

/// A vertex with one or two incident faces dangles when those faces attach
/// to the rest of the mesh through fewer shared edges than the vertex has
/// faces. Stripping such vertices removes flaps and spikes hanging off a
/// crop boundary while leaving well-attached rim vertices alone, so the
/// prune converges instead of eating the rim ring by ring.
fn is_dangling(m: &Mesh, v: usize) -> bool {
    let fids = m.faces_of(v);
    if fids.is_empty() || fids.len() > 2 {
        return false;
    }
    let attached = fids
        .iter()
        .filter(|&&f| {
            let [a, b, c] = m.face(f as usize);
            // The edge opposite v.
            let (x, y) = if a as usize == v {
                (b, c)
            } else if b as usize == v {
                (a, c)
            } else {
                (a, b)
            };
            m.edge_face_count(x as usize, y as usize) >= 2
        })
        .count();
    attached < fids.len()
}

/// Remove vertices on non-manifold edges (shared by more than two faces)
/// together with their faces, and drop vertices referenced by no face.
/// Returns the counts removed.
fn remove_unclean(mesh: &mut Mesh) -> (usize, usize) {
    let mut edge_count: HashMap<(u32, u32), u32> = HashMap::new();
    for f in mesh.faces() {
        let [a, b, c] = *f;
        for (u, v) in [(a, b), (b, c), (c, a)] {
            let key = (u.min(v), u.max(v));
            *edge_count.entry(key).or_insert(0) += 1;
        }
    }
    let mut bad: HashSet<u32> = HashSet::new();
    for (&(u, v), &n) in &edge_count {
        if n > 2 {
            bad.insert(u);
            bad.insert(v);
        }
    }
    let rem3d = bad.len();
    let rem1d = (0..mesh.num_vertices())
        .filter(|&v| mesh.faces_of(v).is_empty())
        .count();

    if rem3d > 0 || rem1d > 0 {
        let keep: Vec<usize> = (0..mesh.num_faces())
            .filter(|&f| mesh.face(f).iter().all(|v| !bad.contains(v)))
            .collect();
        *mesh = mesh.copy_faces(keep); // dangling vertices dropped by the copy
    }
    (rem3d, rem1d)
}

/// Remove non-manifold and dangling vertices, then iteratively collapse
/// tetrahedron peaks until none remain. Mutates in place; logs counts.
pub fn clean(mesh: &mut Mesh) {
    let (rem3d, rem1d) = remove_unclean(mesh);
    if rem3d > 0 || rem1d > 0 {
        info!("clean: removed {rem3d} non-manifold and {rem1d} dangling vertices");
    }

    // A tetrahedron peak is a vertex with exactly three incident faces over
    // exactly three distinct neighbours; replace the peak with its base face.
    let mut total = 0;
    loop {
        let mut removed_verts: HashSet<usize> = HashSet::new();
        let mut removed_faces: HashSet<usize> = HashSet::new();
        let mut base_faces: Vec<[u32; 3]> = Vec::new();
        for v in 0..mesh.num_vertices() {
            if mesh.faces_of(v).len() != 3 {
                continue;
            }
            let nb = mesh.vertex_neighbours(v);
            if nb.len() != 3 {
                continue;
            }
            if removed_verts.contains(&v) || nb.iter().any(|u| removed_verts.contains(u)) {
                continue;
            }
            removed_verts.insert(v);
            for &f in mesh.faces_of(v) {
                removed_faces.insert(f as usize);
            }
            base_faces.push([nb[0] as u32, nb[1] as u32, nb[2] as u32]);
        }
        if removed_verts.is_empty() {
            break;
        }
        total += removed_verts.len();
        let mut tris: Vec<[u32; 3]> = (0..mesh.num_faces())
            .filter(|f| !removed_faces.contains(f))
            .map(|f| mesh.face(f))
            .collect();
        tris.extend(base_faces);
        *mesh = mesh.copy_triples(&tris);
    }
    if total > 0 {
        info!("clean: collapsed {total} tetrahedron peaks");
    }
}

/// Fill holes in a triangulated mesh by fanning new faces about each hole
/// boundary's centroid. The longest boundary loop is taken to be the outer
/// rim of the surface and is left open. Returns the number of holes filled.
pub fn fill_holes(mesh: &mut Mesh) -> usize {
    // Boundary edges have exactly one incident face.
    let mut edge_count: HashMap<(u32, u32), u32> = HashMap::new();
    for f in mesh.faces() {
        let [a, b, c] = *f;
        for (u, v) in [(a, b), (b, c), (c, a)] {
            *edge_count.entry((u.min(v), u.max(v))).or_insert(0) += 1;
        }
    }
    let mut adj: HashMap<u32, Vec<u32>> = HashMap::new();
    for (&(u, v), &n) in &edge_count {
        if n == 1 {
            adj.entry(u).or_default().push(v);
            adj.entry(v).or_default().push(u);
        }
    }

    // Trace closed loops; vertices with more than two boundary edges are
    // non-manifold junctions and their loops are skipped.
    let mut loops: Vec<Vec<u32>> = Vec::new();
    let mut visited: HashSet<u32> = HashSet::new();
    for &start in adj.keys() {
        if visited.contains(&start) || adj[&start].len() != 2 {
            continue;
        }
        let mut path = vec![start];
        visited.insert(start);
        let mut prev = start;
        let mut cur = adj[&start][0];
        let mut closed = false;
        loop {
            if cur == start {
                closed = true;
                break;
            }
            let Some(nb) = adj.get(&cur) else { break };
            if nb.len() != 2 || visited.contains(&cur) {
                break;
            }
            visited.insert(cur);
            path.push(cur);
            let next = if nb[0] == prev { nb[1] } else { nb[0] };
            prev = cur;
            cur = next;
        }
        if closed && path.len() >= 3 {
            loops.push(path);
        }
    }
    if loops.len() < 2 {
        return 0;
    }

    let rim = loops
        .iter()
        .enumerate()
        .max_by_key(|(_, l)| l.len())
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut filled = 0;
    for (i, l) in loops.iter().enumerate() {
        if i == rim {
            continue;
        }
        let mut centre = Vec3f::zeros();
        for &v in l {
            centre += mesh.vertex(v as usize);
        }
        centre /= l.len() as f32;
        let c = mesh.add_vertex(centre);
        for k in 0..l.len() {
            let a = l[k] as usize;
            let b = l[(k + 1) % l.len()] as usize;
            mesh.add_face(a, b, c);
        }
        filled += 1;
    }
    if filled > 0 {
        info!("filled {filled} holes");
    }
    filled
}

/// Project a point onto the mesh surface: the closest point on any face
/// incident to the nearest vertex, falling back to the vertex itself.
pub fn to_surface(mesh: &Mesh, kd: &KdTree, p: &Vec3f) -> Vec3f {
    let Some(v) = kd.nearest(p) else {
        return *p;
    };
    let mut best = mesh.vertex(v);
    let mut best_sq = (best - p).norm_squared();
    for &f in mesh.faces_of(v) {
        let [a, b, c] = mesh.face(f as usize);
        let q = closest_on_triangle(
            p,
            &mesh.vertex(a as usize),
            &mesh.vertex(b as usize),
            &mesh.vertex(c as usize),
        );
        let sq = (q - p).norm_squared();
        if sq < best_sq {
            best_sq = sq;
            best = q;
        }
    }
    best
}

/// Closest point on triangle (a, b, c) to p.
fn closest_on_triangle(p: &Vec3f, a: &Vec3f, b: &Vec3f, c: &Vec3f) -> Vec3f {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let t = d1 / (d1 - d3);
        return a + ab * t;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let t = d2 / (d2 - d6);
        return a + ac * t;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let t = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * t;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::grid_mesh;

    #[test]
    fn crop_is_single_component() {
        let m = grid_mesh(50.0, 5.0, |_, _| 0.0);
        let kd = KdTree::build(&m);
        let centre = Vec3f::zeros();
        let seed = kd.nearest(&centre).unwrap();
        let cropped = crop(&m, &centre, seed, 20.0).unwrap();
        assert!(cropped.num_faces() > 0);
        assert!(cropped.num_faces() < m.num_faces());

        // All faces reachable from any vertex: same count as its component.
        let comp = component(&cropped, 0).unwrap();
        assert_eq!(comp.num_faces(), cropped.num_faces());

        // Pruning converged: nothing hangs off the boundary, and interior
        // vertices keep their full fan.
        for v in 0..cropped.num_vertices() {
            assert!(!is_dangling(&cropped, v));
        }
    }

    #[test]
    fn crop_pruning_preserves_the_interior() {
        let m = grid_mesh(50.0, 5.0, |_, _| 0.0);
        let kd = KdTree::build(&m);
        let seed = kd.nearest(&Vec3f::zeros()).unwrap();
        let cropped = crop(&m, &Vec3f::zeros(), seed, 20.0).unwrap();

        // A radius-20 disk of 5-unit cells holds on the order of a hundred
        // faces; rim cleanup must not eat the crop ring by ring.
        assert!(
            cropped.num_faces() > 80,
            "only {} faces survived pruning",
            cropped.num_faces()
        );
        let centre = KdTree::build(&cropped).nearest(&Vec3f::zeros()).unwrap();
        assert_eq!(cropped.faces_of(centre).len(), 6);
    }

    #[test]
    fn crop_removes_nonmanifold_fin() {
        let mut m = grid_mesh(50.0, 5.0, |_, _| 0.0);
        let kd = KdTree::build(&m);
        let a = kd.nearest(&Vec3f::new(5.0, 5.0, 0.0)).unwrap();
        let b = kd.nearest(&Vec3f::new(10.0, 5.0, 0.0)).unwrap();
        assert_eq!(m.edge_face_count(a, b), 2);
        // A fin raised off an interior edge makes that edge non-manifold.
        let apex = m.add_vertex(Vec3f::new(7.5, 5.0, 8.0));
        m.add_face(a, b, apex);

        let seed = kd.nearest(&Vec3f::zeros()).unwrap();
        let cropped = crop(&m, &Vec3f::zeros(), seed, 20.0).unwrap();
        assert!(cropped.num_faces() > 0);
        for f in 0..cropped.num_faces() {
            let [x, y, z] = cropped.face(f);
            for (u, v) in [(x, y), (y, z), (z, x)] {
                assert!(cropped.edge_face_count(u as usize, v as usize) <= 2);
            }
        }
        // The fin apex did not survive into the crop.
        for v in 0..cropped.num_vertices() {
            assert!(cropped.vertex(v).z.abs() < 1e-6);
        }
    }

    #[test]
    fn crop_rejects_invalid_seed() {
        let m = grid_mesh(10.0, 5.0, |_, _| 0.0);
        assert!(matches!(
            crop(&m, &Vec3f::zeros(), 10_000, 5.0),
            Err(DetectError::InvalidSeedVertex(_))
        ));

        let mut lone = Mesh::new();
        let v = lone.add_vertex(Vec3f::zeros());
        assert!(matches!(
            crop(&lone, &Vec3f::zeros(), v, 5.0),
            Err(DetectError::InvalidSeedVertex(_))
        ));
    }

    #[test]
    fn component_splits_disconnected_mesh() {
        let mut m = grid_mesh(10.0, 5.0, |_, _| 0.0);
        let nfaces = m.num_faces();
        // A distant isolated triangle.
        let a = m.add_vertex(Vec3f::new(100.0, 100.0, 0.0));
        let b = m.add_vertex(Vec3f::new(101.0, 100.0, 0.0));
        let c = m.add_vertex(Vec3f::new(100.0, 101.0, 0.0));
        m.add_face(a, b, c);

        let comp = component(&m, 0).unwrap();
        assert_eq!(comp.num_faces(), nfaces);

        let tri = component(&m, a).unwrap();
        assert_eq!(tri.num_faces(), 1);
    }

    #[test]
    fn clean_collapses_tetrahedron_peak() {
        let mut m = grid_mesh(10.0, 5.0, |_, _| 0.0);
        // Build a spike over the middle of an existing face.
        let [a, b, c] = m.face(0);
        let peak = m.add_vertex(m.face_centroid(0) + Vec3f::new(0.0, 0.0, 10.0));
        // Remove face 0 and fan the peak over its corners.
        let mut tris: Vec<[u32; 3]> = m.faces()[1..].to_vec();
        tris.push([a, b, peak as u32]);
        tris.push([b, c, peak as u32]);
        tris.push([c, a, peak as u32]);
        let mut spiked = m.copy_triples(&tris);
        let before = spiked.num_vertices();

        clean(&mut spiked);
        assert_eq!(spiked.num_vertices(), before - 1);
        for v in 0..spiked.num_vertices() {
            assert!(spiked.vertex(v).z.abs() < 1e-6);
        }
    }

    #[test]
    fn clean_removes_dangling_vertex() {
        let mut m = grid_mesh(10.0, 5.0, |_, _| 0.0);
        m.add_vertex(Vec3f::new(500.0, 0.0, 0.0));
        let nv = m.num_vertices();
        clean(&mut m);
        assert_eq!(m.num_vertices(), nv - 1);
    }

    #[test]
    fn fills_interior_hole_but_not_the_rim() {
        let full = grid_mesh(20.0, 2.0, |_, _| 0.0);
        let kept = (0..full.num_faces())
            .filter(|&f| full.face_centroid(f).norm() > 3.0)
            .collect::<Vec<_>>();
        let mut holed = full.copy_faces(kept);
        let before = holed.num_faces();

        assert_eq!(fill_holes(&mut holed), 1);
        assert!(holed.num_faces() > before);
        // All edges are manifold again.
        for f in 0..holed.num_faces() {
            let [a, b, c] = holed.face(f);
            for (u, v) in [(a, b), (b, c), (c, a)] {
                assert!(holed.edge_face_count(u as usize, v as usize) <= 2);
            }
        }
        // Nothing more to fill; the outer rim stays open.
        assert_eq!(fill_holes(&mut holed), 0);
    }

    #[test]
    fn intact_mesh_has_no_holes_to_fill() {
        let mut m = grid_mesh(10.0, 5.0, |_, _| 0.0);
        assert_eq!(fill_holes(&mut m), 0);
    }

    #[test]
    fn surface_projection() {
        let m = grid_mesh(10.0, 5.0, |_, _| 0.0);
        let kd = KdTree::build(&m);
        let p = Vec3f::new(1.3, -2.7, 8.0);
        let q = to_surface(&m, &kd, &p);
        assert!(q.z.abs() < 1e-5);
        assert!((q.x - 1.3).abs() < 1e-5);
        assert!((q.y + 2.7).abs() < 1e-5);
    }

    #[test]
    fn closest_point_cases() {
        let a = Vec3f::new(0.0, 0.0, 0.0);
        let b = Vec3f::new(2.0, 0.0, 0.0);
        let c = Vec3f::new(0.0, 2.0, 0.0);
        // Interior projection.
        let q = closest_on_triangle(&Vec3f::new(0.5, 0.5, 3.0), &a, &b, &c);
        assert!((q - Vec3f::new(0.5, 0.5, 0.0)).norm() < 1e-6);
        // Vertex region.
        let q = closest_on_triangle(&Vec3f::new(-1.0, -1.0, 0.0), &a, &b, &c);
        assert!((q - a).norm() < 1e-6);
        // Edge region.
        let q = closest_on_triangle(&Vec3f::new(1.0, -1.0, 0.0), &a, &b, &c);
        assert!((q - Vec3f::new(1.0, 0.0, 0.0)).norm() < 1e-6);
    }
}
