use image::RgbImage;
use std::path::PathBuf;

// Supported image formats for record image resolution
pub const IMG_FORMATS: &[&str] = &["bmp", "jpeg", "jpg", "png", "tif", "tiff", "webp"];

/// Pixel-space shape of a single vendor annotation, upper-left origin.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Box { x: f64, y: f64, w: f64, h: f64 },
    Polygon { points: Vec<(f64, f64)> },
}

/// One vendor annotation: a class code in the vendor's vocabulary plus a shape.
#[derive(Debug, Clone)]
pub struct RawAnnotation {
    pub class_code: String,
    pub shape: Shape,
}

/// Image file location and its declared resolution.
#[derive(Debug, Clone)]
pub struct ImageMeta {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// A single source record: stable id, image metadata, raw annotations.
///
/// The id comes from the vendor's source ID (or the label file stem), never
/// from arrival order, so split assignment and output naming are stable.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub id: String,
    pub image: ImageMeta,
    pub annotations: Vec<RawAnnotation>,
}

/// Axis-aligned box in pixel space: upper-left corner plus extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl PixelBox {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Builds a box from opposite extremes, empty extents allowed.
    pub fn from_extremes(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Self {
            x: x_min,
            y: y_min,
            w: x_max - x_min,
            h: y_max - y_min,
        }
    }

    /// The four corners, clockwise from the upper-left.
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.x, self.y),
            (self.x + self.w, self.y),
            (self.x + self.w, self.y + self.h),
            (self.x, self.y + self.h),
        ]
    }
}

/// Center-format box normalized to the unit square, ready for label output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedAnnotation {
    pub class_index: u32,
    pub cx: f64,
    pub cy: f64,
    pub w: f64,
    pub h: f64,
}

impl NormalizedAnnotation {
    /// One YOLO label line at fixed 6-decimal precision, without the newline.
    pub fn to_label_line(&self) -> String {
        format!(
            "{} {:.6} {:.6} {:.6} {:.6}",
            self.class_index, self.cx, self.cy, self.w, self.h
        )
    }
}

/// One augmentation output: transformed pixels plus pixel-space class/box
/// pairs, normalized later. Ephemeral within a record's processing.
pub struct AugmentedSample {
    pub image: RgbImage,
    pub boxes: Vec<(u32, PixelBox)>,
    pub technique: String,
}
