use image::imageops;
use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use rand::rngs::StdRng;
use rand::Rng;

use crate::types::{AugmentedSample, PixelBox};

// Probability of the pixel-only color techniques in random selection mode.
const COLOR_TECHNIQUE_PROBABILITY: f64 = 0.5;

/// Augmentation technique parameters.
#[derive(Debug, Clone)]
pub struct AugmentConfig {
    pub enabled: bool,
    /// Emit one variant per enabled technique instead of random selection.
    pub augment_all: bool,
    /// Rotation draw range in degrees (`[-R, +R]`); 0 disables rotation.
    pub rotation_range_deg: f64,
    pub brightness_range: (f64, f64),
    pub contrast_range: (f64, f64),
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    pub flip_probability: f64,
    pub blur_probability: f64,
    pub blur_sigma: f32,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            augment_all: false,
            rotation_range_deg: 15.0,
            brightness_range: (0.8, 1.2),
            contrast_range: (0.8, 1.2),
            flip_horizontal: true,
            flip_vertical: false,
            flip_probability: 0.5,
            blur_probability: 0.1,
            blur_sigma: 1.0,
        }
    }
}

/// Produces geometry-consistent variants of one decoded image and its
/// validated pixel-space boxes.
///
/// The output always includes the untouched original. Techniques are never
/// composed into a single sample, so each variant's geometry transform stays
/// independently verifiable.
#[derive(Debug, Clone)]
pub struct Augmenter {
    cfg: AugmentConfig,
}

impl Augmenter {
    pub fn new(cfg: AugmentConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &AugmentConfig {
        &self.cfg
    }

    /// Emits the identity sample plus the selected variants.
    ///
    /// In `augment_all` mode every enabled technique contributes exactly one
    /// variant; otherwise flips and color techniques are sampled
    /// independently and one rotation draw is always applied when rotation
    /// is enabled. All randomness comes from the caller's seeded generator.
    pub fn augment(
        &self,
        image: &RgbImage,
        boxes: &[(u32, PixelBox)],
        rng: &mut StdRng,
    ) -> Vec<AugmentedSample> {
        let mut samples = vec![AugmentedSample {
            image: image.clone(),
            boxes: boxes.to_vec(),
            technique: "original".to_string(),
        }];

        if !self.cfg.enabled {
            return samples;
        }
        let all = self.cfg.augment_all;

        if self.cfg.rotation_range_deg > 0.0 {
            let angle = rng.gen_range(-self.cfg.rotation_range_deg..=self.cfg.rotation_range_deg);
            samples.push(self.rotate(image, boxes, angle));
        }

        if self.cfg.flip_horizontal && (all || rng.gen_bool(self.cfg.flip_probability)) {
            samples.push(flip_horizontal(image, boxes));
        }

        if self.cfg.flip_vertical && (all || rng.gen_bool(self.cfg.flip_probability)) {
            samples.push(flip_vertical(image, boxes));
        }

        if all || rng.gen_bool(COLOR_TECHNIQUE_PROBABILITY) {
            let (lo, hi) = self.cfg.brightness_range;
            let factor = rng.gen_range(lo..=hi);
            samples.push(AugmentedSample {
                image: adjust_brightness(image, factor),
                boxes: boxes.to_vec(),
                technique: format!("brightness_{factor:.2}"),
            });
        }

        if all || rng.gen_bool(COLOR_TECHNIQUE_PROBABILITY) {
            let (lo, hi) = self.cfg.contrast_range;
            let factor = rng.gen_range(lo..=hi);
            samples.push(AugmentedSample {
                image: adjust_contrast(image, factor),
                boxes: boxes.to_vec(),
                technique: format!("contrast_{factor:.2}"),
            });
        }

        if all || rng.gen_bool(self.cfg.blur_probability) {
            samples.push(AugmentedSample {
                image: imageops::blur(image, self.cfg.blur_sigma),
                boxes: boxes.to_vec(),
                technique: "blur".to_string(),
            });
        }

        samples
    }

    /// Rotates the image about its center and transforms each box by
    /// rotating its four corners and taking their new axis-aligned bounding
    /// box. Boxes leaving the frame entirely are dropped; partially-outside
    /// boxes are clipped to the frame.
    pub fn rotate(
        &self,
        image: &RgbImage,
        boxes: &[(u32, PixelBox)],
        angle_deg: f64,
    ) -> AugmentedSample {
        let theta = angle_deg.to_radians();
        let rotated = rotate_about_center(image, theta as f32, Interpolation::Bilinear, Rgb([0, 0, 0]));

        let (width, height) = (f64::from(image.width()), f64::from(image.height()));
        let (center_x, center_y) = (width / 2.0, height / 2.0);

        let boxes = boxes
            .iter()
            .filter_map(|&(class_index, bbox)| {
                let rotated_box = rotate_box(bbox, theta, center_x, center_y);
                clip_to_frame(rotated_box, width, height).map(|clipped| (class_index, clipped))
            })
            .collect();

        AugmentedSample {
            image: rotated,
            boxes,
            technique: format!("rotate_{angle_deg:.1}"),
        }
    }
}

/// Rotates a box's corners by `theta` about `(center_x, center_y)` in pixel
/// coordinates and returns the AABB of the rotated corners. The result can
/// only grow or preserve area relative to the rotated content.
fn rotate_box(bbox: PixelBox, theta: f64, center_x: f64, center_y: f64) -> PixelBox {
    let (sin, cos) = theta.sin_cos();

    let (mut x_min, mut y_min) = (f64::MAX, f64::MAX);
    let (mut x_max, mut y_max) = (f64::MIN, f64::MIN);
    for (x, y) in bbox.corners() {
        let dx = x - center_x;
        let dy = y - center_y;
        let rx = center_x + dx * cos - dy * sin;
        let ry = center_y + dx * sin + dy * cos;
        x_min = x_min.min(rx);
        y_min = y_min.min(ry);
        x_max = x_max.max(rx);
        y_max = y_max.max(ry);
    }

    PixelBox::from_extremes(x_min, y_min, x_max, y_max)
}

/// Clips a pixel box to the frame, dropping it when nothing remains inside.
fn clip_to_frame(bbox: PixelBox, width: f64, height: f64) -> Option<PixelBox> {
    let x1 = bbox.x.max(0.0);
    let y1 = bbox.y.max(0.0);
    let x2 = (bbox.x + bbox.w).min(width);
    let y2 = (bbox.y + bbox.h).min(height);

    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(PixelBox::from_extremes(x1, y1, x2, y2))
}

/// Mirrors the image and boxes about the vertical center axis.
/// Involutive: applying it twice restores the original coordinates exactly.
pub fn flip_horizontal(image: &RgbImage, boxes: &[(u32, PixelBox)]) -> AugmentedSample {
    let width = f64::from(image.width());
    AugmentedSample {
        image: imageops::flip_horizontal(image),
        boxes: boxes
            .iter()
            .map(|&(class_index, b)| {
                (class_index, PixelBox::new(width - (b.x + b.w), b.y, b.w, b.h))
            })
            .collect(),
        technique: "flip_h".to_string(),
    }
}

/// Mirrors the image and boxes about the horizontal center axis.
pub fn flip_vertical(image: &RgbImage, boxes: &[(u32, PixelBox)]) -> AugmentedSample {
    let height = f64::from(image.height());
    AugmentedSample {
        image: imageops::flip_vertical(image),
        boxes: boxes
            .iter()
            .map(|&(class_index, b)| {
                (class_index, PixelBox::new(b.x, height - (b.y + b.h), b.w, b.h))
            })
            .collect(),
        technique: "flip_v".to_string(),
    }
}

/// Multiplies every channel by `factor`, clamped to the valid range.
/// Pixel-only; annotation geometry is unchanged.
pub fn adjust_brightness(image: &RgbImage, factor: f64) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = (f64::from(*channel) * factor).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Scales every channel's distance from mid-gray by `factor`, clamped.
/// Pixel-only; annotation geometry is unchanged.
pub fn adjust_contrast(image: &RgbImage, factor: f64) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = ((f64::from(*channel) - 128.0) * factor + 128.0)
                .round()
                .clamp(0.0, 255.0) as u8;
        }
    }
    out
}
