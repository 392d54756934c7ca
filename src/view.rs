//! Offscreen rendering of a mesh to a shaded grayscale view, with 2D to 3D
//! surface picking and the inverse projection.

use crate::finder2d::GrayImage;
use crate::mesh::Mesh;
use crate::types::{Point2, Vec3f};

/// Camera placement for a view of the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraParams {
    pub position: Vec3f,
    pub focus: Vec3f,
    pub up: Vec3f,
}

impl CameraParams {
    pub fn new(position: Vec3f, focus: Vec3f, up: Vec3f) -> Self {
        Self {
            position,
            focus,
            up,
        }
    }

    /// A camera on the +z axis at `range` from the origin, looking down -z
    /// with +y up. The standard frontal framing for orientation discovery.
    pub fn front(range: f32) -> Self {
        Self::new(Vec3f::new(0.0, 0.0, range), Vec3f::zeros(), Vec3f::y())
    }
}

/// A rendered view of a surface that supports picking surface positions
/// from 2D view coordinates and projecting 3D positions back into the view.
pub trait SurfaceView {
    /// The shaded grayscale render of the surface.
    fn light_map(&self) -> &GrayImage;

    /// The surface position under the normalized view point, or `None` when
    /// the point does not land on the surface.
    fn pick(&self, p: Point2) -> Option<Vec3f>;

    /// Normalized view coordinates of a world position.
    fn project(&self, v: &Vec3f) -> Point2;
}

/// Margin around the projected mesh extent, as a fraction of the extent.
const FRAME_MARGIN: f32 = 1.05;

/// An orthographic software render of a mesh into a square offscreen buffer.
///
/// Each covered pixel records the front-most face and its depth, so picks
/// recover exact surface positions without a second traversal.
pub struct OffscreenView {
    size: u32,
    focus: Vec3f,
    right: Vec3f,
    upv: Vec3f,
    back: Vec3f,
    halfspan: f32,
    light: GrayImage,
    depth: Vec<f32>,
    face_id: Vec<i32>,
}

impl OffscreenView {
    pub fn new(mesh: &Mesh, size: u32, camera: CameraParams) -> Self {
        let mut back = camera.position - camera.focus;
        if back.norm() <= f32::EPSILON {
            back = Vec3f::z();
        }
        back.normalize_mut();
        let mut right = camera.up.cross(&back);
        if right.norm() <= f32::EPSILON {
            right = Vec3f::x();
        }
        right.normalize_mut();
        let upv = back.cross(&right);

        // Camera-space vertex coordinates.
        let cam: Vec<Vec3f> = mesh
            .vertices()
            .iter()
            .map(|v| {
                let rel = v - camera.focus;
                Vec3f::new(rel.dot(&right), rel.dot(&upv), rel.dot(&back))
            })
            .collect();

        let mut extent = 0.0f32;
        for c in &cam {
            extent = extent.max(c.x.abs()).max(c.y.abs());
        }
        let halfspan = if extent > 0.0 {
            extent * FRAME_MARGIN
        } else {
            1.0
        };

        let mut view = Self {
            size,
            focus: camera.focus,
            right,
            upv,
            back,
            halfspan,
            light: GrayImage::new(size, size),
            depth: vec![f32::NEG_INFINITY; (size * size) as usize],
            face_id: vec![-1; (size * size) as usize],
        };
        view.rasterize(mesh, &cam);
        view
    }

    fn to_pixel(&self, cx: f32, cy: f32) -> (f32, f32) {
        let s = self.size as f32;
        (
            (cx / self.halfspan * 0.5 + 0.5) * s,
            (0.5 - cy / self.halfspan * 0.5) * s,
        )
    }

    fn rasterize(&mut self, mesh: &Mesh, cam: &[Vec3f]) {
        let size = self.size as i32;
        for f in 0..mesh.num_faces() {
            let [a, b, c] = mesh.face(f);
            let pa = cam[a as usize];
            let pb = cam[b as usize];
            let pc = cam[c as usize];
            let (ax, ay) = self.to_pixel(pa.x, pa.y);
            let (bx, by) = self.to_pixel(pb.x, pb.y);
            let (cx, cy) = self.to_pixel(pc.x, pc.y);

            let area = (bx - ax) * (cy - ay) - (by - ay) * (cx - ax);
            if area.abs() < 1e-12 {
                continue;
            }

            // Flat shading from the incidence angle against the view axis.
            let n = mesh.face_normal(f);
            let shade = (n.dot(&self.back).abs() * 255.0) as u8;

            let x0 = (ax.min(bx).min(cx).floor() as i32).max(0);
            let x1 = (ax.max(bx).max(cx).ceil() as i32).min(size - 1);
            let y0 = (ay.min(by).min(cy).floor() as i32).max(0);
            let y1 = (ay.max(by).max(cy).ceil() as i32).min(size - 1);

            for py in y0..=y1 {
                for px in x0..=x1 {
                    let qx = px as f32 + 0.5;
                    let qy = py as f32 + 0.5;
                    let w0 = (bx - ax) * (qy - ay) - (by - ay) * (qx - ax);
                    let w1 = (cx - bx) * (qy - by) - (cy - by) * (qx - bx);
                    let w2 = (ax - cx) * (qy - cy) - (ay - cy) * (qx - cx);
                    let inside = if area > 0.0 {
                        w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0
                    } else {
                        w0 <= 0.0 && w1 <= 0.0 && w2 <= 0.0
                    };
                    if !inside {
                        continue;
                    }
                    // Barycentric depth; larger z is nearer the camera.
                    let (u, v, w) = (w1 / area, w2 / area, w0 / area);
                    let z = u * pa.z + v * pb.z + w * pc.z;
                    let idx = (py * size + px) as usize;
                    if z > self.depth[idx] {
                        self.depth[idx] = z;
                        self.face_id[idx] = f as i32;
                        self.light.set_pixel(px as u32, py as u32, shade);
                    }
                }
            }
        }
    }
}

impl SurfaceView for OffscreenView {
    fn light_map(&self) -> &GrayImage {
        &self.light
    }

    fn pick(&self, p: Point2) -> Option<Vec3f> {
        let s = self.size as f32;
        let px = (p.x * s).floor() as i32;
        let py = (p.y * s).floor() as i32;
        if px < 0 || py < 0 || px >= self.size as i32 || py >= self.size as i32 {
            return None;
        }
        let idx = (py * self.size as i32 + px) as usize;
        if self.face_id[idx] < 0 {
            return None;
        }
        // Unproject through the pixel centre at the recorded depth.
        let qx = (px as f32 + 0.5) / s;
        let qy = (py as f32 + 0.5) / s;
        let cx = (qx - 0.5) * 2.0 * self.halfspan;
        let cy = (0.5 - qy) * 2.0 * self.halfspan;
        let cz = self.depth[idx];
        Some(self.focus + self.right * cx + self.upv * cy + self.back * cz)
    }

    fn project(&self, v: &Vec3f) -> Point2 {
        let rel = v - self.focus;
        let cx = rel.dot(&self.right);
        let cy = rel.dot(&self.upv);
        Point2::new(
            cx / self.halfspan * 0.5 + 0.5,
            0.5 - cy / self.halfspan * 0.5,
        )
    }
}
