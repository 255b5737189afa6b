use crate::types::{NormalizedAnnotation, PixelBox, Shape};

/// Axis-aligned bounding box of a polygon's points via a min/max fold.
///
/// Returns `None` for an empty point list. The result contains every input
/// vertex by construction.
pub fn polygon_bbox(points: &[(f64, f64)]) -> Option<PixelBox> {
    if points.is_empty() {
        return None;
    }

    let (x_min, y_min, x_max, y_max) = points.iter().fold(
        (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
        |(x_min, y_min, x_max, y_max), &(x, y)| {
            (x_min.min(x), y_min.min(y), x_max.max(x), y_max.max(y))
        },
    );

    Some(PixelBox::from_extremes(x_min, y_min, x_max, y_max))
}

/// Reduces any shape to its pixel-space axis-aligned bounding box.
pub fn shape_bbox(shape: &Shape) -> Option<PixelBox> {
    match shape {
        Shape::Box { x, y, w, h } => Some(PixelBox::new(*x, *y, *w, *h)),
        Shape::Polygon { points } => polygon_bbox(points),
    }
}

/// Converts pixel-space boxes into clipped, normalized center-format boxes.
#[derive(Debug, Clone, Copy)]
pub struct GeometryConverter {
    /// Minimum surviving extent after clipping, in pixels. Boxes below this
    /// in either dimension are degenerate and dropped.
    degenerate_eps_px: f64,
}

impl Default for GeometryConverter {
    fn default() -> Self {
        Self {
            degenerate_eps_px: 1.0,
        }
    }
}

impl GeometryConverter {
    pub fn new(degenerate_eps_px: f64) -> Self {
        Self { degenerate_eps_px }
    }

    /// Normalizes a pixel box against the image resolution and clips it into
    /// the unit square.
    ///
    /// Returns `None` when the clipped box is degenerate (sub-epsilon extent),
    /// which callers record as a warning, not an error.
    pub fn normalize(
        &self,
        class_index: u32,
        bbox: PixelBox,
        width: u32,
        height: u32,
    ) -> Option<NormalizedAnnotation> {
        let img_w = f64::from(width);
        let img_h = f64::from(height);

        let cx = (bbox.x + bbox.w / 2.0) / img_w;
        let cy = (bbox.y + bbox.h / 2.0) / img_h;
        let nw = bbox.w / img_w;
        let nh = bbox.h / img_h;

        // Clip the box edges into [0, 1] and rebuild the center format from
        // the clipped extremes.
        let x1 = (cx - nw / 2.0).clamp(0.0, 1.0);
        let x2 = (cx + nw / 2.0).clamp(0.0, 1.0);
        let y1 = (cy - nh / 2.0).clamp(0.0, 1.0);
        let y2 = (cy + nh / 2.0).clamp(0.0, 1.0);

        let nw = x2 - x1;
        let nh = y2 - y1;
        if nw <= self.degenerate_eps_px / img_w || nh <= self.degenerate_eps_px / img_h {
            return None;
        }

        Some(NormalizedAnnotation {
            class_index,
            cx: (x1 + x2) / 2.0,
            cy: (y1 + y2) / 2.0,
            w: nw,
            h: nh,
        })
    }
}

/// Inverse of the box path: recovers the pixel box for a normalized
/// annotation against the same resolution.
pub fn denormalize(ann: &NormalizedAnnotation, width: u32, height: u32) -> PixelBox {
    let img_w = f64::from(width);
    let img_h = f64::from(height);

    let w = ann.w * img_w;
    let h = ann.h * img_h;
    PixelBox::new(ann.cx * img_w - w / 2.0, ann.cy * img_h - h / 2.0, w, h)
}
