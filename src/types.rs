use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// 3D position or direction.
pub type Vec3f = Vector3<f32>;

/// Homogeneous 4x4 transform.
pub type Mat4f = Matrix4<f32>;

/// Apply a homogeneous transform to a position.
pub fn transform_pos(t: &Mat4f, v: &Vec3f) -> Vec3f {
    t.transform_point(&Point3::from(*v)).coords
}

/// A 2D point in normalized view coordinates: [0,1] on both axes with the
/// origin at the top-left of the view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub const fn zero() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    pub fn midpoint(a: Point2, b: Point2) -> Point2 {
        Point2::new((a.x + b.x) * 0.5, (a.y + b.y) * 0.5)
    }

    pub fn distance(&self, other: &Point2) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl std::ops::Add for Point2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Point2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Mul<f32> for Point2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

/// Laterality of a landmark position within a [`crate::LandmarkSet`].
///
/// Left and right are from the viewer's perspective, matching the 2D face
/// finder's eye ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Medial,
    Right,
}

/// A rotated rectangle in normalized view coordinates representing a detected
/// face or eye region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureBox {
    pub centre: Point2,
    pub width: f32,
    pub height: f32,
    /// Rotation about the centre, degrees.
    pub angle: f32,
}

impl FeatureBox {
    pub const fn new(centre: Point2, width: f32, height: f32, angle: f32) -> Self {
        Self {
            centre,
            width,
            height,
            angle,
        }
    }

    /// Build an axis-aligned box from its top-left corner and size.
    pub fn axis_aligned(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(
            Point2::new(x + width / 2.0, y + height / 2.0),
            width,
            height,
            0.0,
        )
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}
