//! 2D face and eye localisation on a rendered grayscale view.
//!
//! A cascade detector proposes face boxes on the light map; eye centres are
//! then refined inside the winning face box. All boxes and points are in
//! normalized view coordinates so downstream picking is independent of the
//! render resolution.

use std::path::Path;

use log::debug;

use crate::error::{DetectError, Result};
use crate::types::{FeatureBox, Point2};

/// An 8-bit single-channel image with row-major pixel storage.
#[derive(Debug, Clone)]
pub struct GrayImage {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl GrayImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0; (width * height) as usize],
            width,
            height,
        }
    }

    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> u8,
    {
        let mut img = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                img.data[(y * width + x) as usize] = f(x, y);
            }
        }
        img
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel value at (x, y), or zero outside the image bounds.
    pub fn get_pixel(&self, x: i32, y: i32) -> u8 {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return 0;
        }
        self.data[(y as u32 * self.width + x as u32) as usize]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, value: u8) {
        self.data[(y * self.width + x) as usize] = value;
    }

    /// Row-major pixel buffer.
    pub fn raw(&self) -> &[u8] {
        &self.data
    }
}

/// Source of candidate face and eye regions in a grayscale view.
///
/// Implementations return boxes in normalized view coordinates.
pub trait CascadeDetector {
    /// All candidate face boxes found in the image.
    fn detect_faces(&mut self, image: &GrayImage) -> Vec<FeatureBox>;

    /// Candidate eye boxes within a previously detected face box.
    fn detect_eyes(&mut self, image: &GrayImage, face: &FeatureBox) -> Vec<FeatureBox>;
}

/// Cascade face detection backed by a rustface SeetaFace model, with eye
/// localisation by intensity-valley search inside the face box.
pub struct RustfaceDetector {
    inner: Box<dyn rustface::Detector>,
}

impl RustfaceDetector {
    pub fn from_file(model_path: &Path) -> Result<Self> {
        let path = model_path
            .to_str()
            .ok_or_else(|| DetectError::DetectorInit("model path is not UTF-8".into()))?;
        let mut inner = rustface::create_detector(path)
            .map_err(|e| DetectError::DetectorInit(e.to_string()))?;
        inner.set_min_face_size(20);
        inner.set_score_thresh(2.0);
        inner.set_pyramid_scale_factor(0.8);
        inner.set_slide_window_step(4, 4);
        Ok(Self { inner })
    }
}

impl CascadeDetector for RustfaceDetector {
    fn detect_faces(&mut self, image: &GrayImage) -> Vec<FeatureBox> {
        let data = rustface::ImageData::new(image.raw(), image.width(), image.height());
        let (w, h) = (image.width() as f32, image.height() as f32);
        self.inner
            .detect(&data)
            .iter()
            .map(|info| {
                let b = info.bbox();
                FeatureBox::axis_aligned(
                    b.x() as f32 / w,
                    b.y() as f32 / h,
                    b.width() as f32 / w,
                    b.height() as f32 / h,
                )
            })
            .collect()
    }

    fn detect_eyes(&mut self, image: &GrayImage, face: &FeatureBox) -> Vec<FeatureBox> {
        let mut eyes = Vec::with_capacity(2);
        if let Some(b) = eye_valley(image, face, true) {
            eyes.push(b);
        }
        if let Some(b) = eye_valley(image, face, false) {
            eyes.push(b);
        }
        eyes
    }
}

/// Minimum number of dark pixels for a credible eye region.
const MIN_VALLEY_PIXELS: usize = 4;

/// Locate an eye as the centroid of unusually dark pixels in the upper
/// left or right quarter of the face box.
///
/// Rendered surface views have no iris texture; the eye sockets read as
/// shading valleys instead, which is what this picks up.
fn eye_valley(image: &GrayImage, face: &FeatureBox, left: bool) -> Option<FeatureBox> {
    let (iw, ih) = (image.width() as f32, image.height() as f32);
    let fx = (face.centre.x - face.width / 2.0) * iw;
    let fy = (face.centre.y - face.height / 2.0) * ih;
    let fw = face.width * iw;
    let fh = face.height * ih;

    // Search band: vertically the eye line, horizontally one half of the face.
    let y0 = (fy + 0.20 * fh) as i32;
    let y1 = (fy + 0.50 * fh) as i32;
    let (x0, x1) = if left {
        ((fx + 0.08 * fw) as i32, (fx + 0.48 * fw) as i32)
    } else {
        ((fx + 0.52 * fw) as i32, (fx + 0.92 * fw) as i32)
    };
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut n = 0usize;
    for y in y0..y1 {
        for x in x0..x1 {
            let v = image.get_pixel(x, y) as f64;
            sum += v;
            sum_sq += v * v;
            n += 1;
        }
    }
    if n == 0 {
        return None;
    }
    let mean = sum / n as f64;
    let var = (sum_sq / n as f64 - mean * mean).max(0.0);
    let thresh = mean - 0.75 * var.sqrt();

    let mut cx = 0.0f64;
    let mut cy = 0.0f64;
    let mut cnt = 0usize;
    for y in y0..y1 {
        for x in x0..x1 {
            if (image.get_pixel(x, y) as f64) < thresh {
                cx += x as f64;
                cy += y as f64;
                cnt += 1;
            }
        }
    }
    if cnt < MIN_VALLEY_PIXELS {
        return None;
    }

    let centre = Point2::new((cx / cnt as f64) as f32 / iw, (cy / cnt as f64) as f32 / ih);
    Some(FeatureBox::new(
        centre,
        0.18 * face.width,
        0.12 * face.height,
        0.0,
    ))
}

/// Result of locating a face and both eyes in a 2D view.
#[derive(Debug, Clone)]
pub struct FaceFinder2D {
    face: FeatureBox,
    leye: FeatureBox,
    reye: FeatureBox,
    /// Box spanning the two eye centres; its width is the inter-pupil span.
    inter_pupil: FeatureBox,
}

impl FaceFinder2D {
    /// Locate the largest face in the image and both of its eyes.
    ///
    /// Fails with [`DetectError::NoFace`] if no face box is proposed or
    /// fewer than two eyes can be resolved inside the winning box.
    pub fn find(detector: &mut dyn CascadeDetector, image: &GrayImage) -> Result<Self> {
        let faces = detector.detect_faces(image);
        let face = faces
            .into_iter()
            .max_by(|a, b| a.area().total_cmp(&b.area()))
            .ok_or(DetectError::NoFace)?;
        debug!(
            "face box at ({:.3}, {:.3}) size {:.3} x {:.3}",
            face.centre.x, face.centre.y, face.width, face.height
        );

        let eyes = detector.detect_eyes(image, &face);
        if eyes.len() < 2 {
            debug!("only {} eye(s) found within the face box", eyes.len());
            return Err(DetectError::NoFace);
        }
        // Left from the viewer's perspective is the smaller x centre.
        let (leye, reye) = if eyes[0].centre.x <= eyes[1].centre.x {
            (eyes[0], eyes[1])
        } else {
            (eyes[1], eyes[0])
        };

        let mid = Point2::midpoint(leye.centre, reye.centre);
        let span = leye.centre.distance(&reye.centre);
        let inter_pupil = FeatureBox::new(mid, span, (leye.height + reye.height) / 2.0, 0.0);

        Ok(Self {
            face,
            leye,
            reye,
            inter_pupil,
        })
    }

    pub fn face_box(&self) -> FeatureBox {
        self.face
    }

    pub fn left_eye_box(&self) -> FeatureBox {
        self.leye
    }

    pub fn right_eye_box(&self) -> FeatureBox {
        self.reye
    }

    pub fn inter_pupil_box(&self) -> FeatureBox {
        self.inter_pupil
    }

    pub fn left_eye_centre(&self) -> Point2 {
        self.leye.centre
    }

    pub fn right_eye_centre(&self) -> Point2 {
        self.reye.centre
    }
}
