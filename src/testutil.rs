//! Shared synthetic meshes for unit tests.

use crate::mesh::Mesh;
use crate::types::Vec3f;

/// Regular grid heightfield mesh over [-ext, ext] squared.
pub(crate) fn grid_mesh<F>(ext: f32, step: f32, height: F) -> Mesh
where
    F: Fn(f32, f32) -> f32,
{
    let n = (2.0 * ext / step).round() as usize + 1;
    let mut m = Mesh::with_capacity(n * n, 2 * (n - 1) * (n - 1));
    for j in 0..n {
        for i in 0..n {
            let x = -ext + i as f32 * step;
            let y = -ext + j as f32 * step;
            m.add_vertex(Vec3f::new(x, y, height(x, y)));
        }
    }
    for j in 0..n - 1 {
        for i in 0..n - 1 {
            let v00 = j * n + i;
            let v10 = v00 + 1;
            let v01 = v00 + n;
            let v11 = v01 + 1;
            m.add_face(v00, v10, v11);
            m.add_face(v00, v11, v01);
        }
    }
    m
}

/// Height function of a face-like surface: a broad dome with a pronounced
/// nose bump below and between the eye positions at (+-32, 10).
pub(crate) fn face_height(x: f32, y: f32) -> f32 {
    let dome = 30.0 * (-(x * x + y * y) / 5000.0).exp();
    let nx = x;
    let ny = y + 25.0;
    let nose = 25.0 * (-(nx * nx + ny * ny) / 300.0).exp();
    dome + nose
}

/// The synthetic face mesh used across detection tests.
pub(crate) fn face_mesh() -> Mesh {
    grid_mesh(120.0, 2.5, face_height)
}

/// World positions of the synthetic eyes (on the dome surface).
pub(crate) fn eye_positions() -> (Vec3f, Vec3f) {
    let (lx, rx, ey) = (-32.0f32, 32.0f32, 10.0f32);
    (
        Vec3f::new(lx, ey, face_height(lx, ey)),
        Vec3f::new(rx, ey, face_height(rx, ey)),
    )
}
