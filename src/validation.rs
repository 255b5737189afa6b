use std::fmt;

use crate::class_map::{ClassMap, ClassPolicy};
use crate::geometry::shape_bbox;
use crate::report::{ReportAccumulator, ValidationReport};
use crate::types::{ImageMeta, PixelBox, RawAnnotation, SourceRecord};

/// Outcome of checking one annotation.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationCheck {
    /// Resolved and geometrically valid, ready for conversion.
    Valid { class_index: u32, bbox: PixelBox },
    /// The class code is not in the configured table; policy decides.
    UnknownClass,
    /// A polygon with no points.
    EmptyShape,
    BadBBox(BBoxViolation),
}

/// Why a bounding box was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum BBoxViolation {
    OutOfBounds {
        bbox: PixelBox,
        width: u32,
        height: u32,
    },
    TooSmall {
        w: f64,
        h: f64,
        min_size_px: f64,
    },
}

impl fmt::Display for BBoxViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BBoxViolation::OutOfBounds {
                bbox,
                width,
                height,
            } => write!(
                f,
                "bbox ({:.1}, {:.1}, {:.1}, {:.1}) lies outside image {}x{}",
                bbox.x, bbox.y, bbox.w, bbox.h, width, height
            ),
            BBoxViolation::TooSmall { w, h, min_size_px } => write!(
                f,
                "bbox {w:.1}x{h:.1} is below the minimum size of {min_size_px} px"
            ),
        }
    }
}

/// Per-record and per-annotation validity checks.
///
/// The checks are independent and none of them fail-fast at the dataset
/// level: a conversion run over thousands of heterogeneous vendor files must
/// tolerate and report bad records without discarding the whole batch.
#[derive(Debug, Clone, Copy)]
pub struct DatasetValidator {
    /// Minimum bbox extent in pixels; smaller annotations are dropped.
    pub min_bbox_size_px: f64,
    /// Overhang beyond the image bounds that clipping is expected to absorb.
    pub bounds_tolerance_px: f64,
}

impl Default for DatasetValidator {
    fn default() -> Self {
        Self {
            min_bbox_size_px: 10.0,
            bounds_tolerance_px: 1.0,
        }
    }
}

impl DatasetValidator {
    pub fn new(min_bbox_size_px: f64, bounds_tolerance_px: f64) -> Self {
        Self {
            min_bbox_size_px,
            bounds_tolerance_px,
        }
    }

    /// Checks that the image file exists and decodes to a non-zero raster.
    ///
    /// Probes the header only; full decodes happen where the pixels are
    /// actually needed. Returns the decoded dimensions so callers can compare
    /// them against the declared resolution.
    pub fn validate_image(&self, meta: &ImageMeta) -> Result<(u32, u32), String> {
        if !meta.path.exists() {
            return Err(format!("image file not found: {}", meta.path.display()));
        }

        let (width, height) = image::image_dimensions(&meta.path)
            .map_err(|e| format!("cannot decode image {}: {e}", meta.path.display()))?;
        if width == 0 || height == 0 {
            return Err(format!(
                "image {} has zero dimension {width}x{height}",
                meta.path.display()
            ));
        }

        Ok((width, height))
    }

    /// Checks a pixel bbox against the image bounds and the minimum size.
    ///
    /// Boxes overhanging by at most the bounds tolerance are accepted, since
    /// normalization clips them; anything further out is rejected.
    pub fn validate_bbox(
        &self,
        bbox: PixelBox,
        width: u32,
        height: u32,
    ) -> Result<(), BBoxViolation> {
        let t = self.bounds_tolerance_px;
        if bbox.x < -t
            || bbox.y < -t
            || bbox.x + bbox.w > f64::from(width) + t
            || bbox.y + bbox.h > f64::from(height) + t
        {
            return Err(BBoxViolation::OutOfBounds {
                bbox,
                width,
                height,
            });
        }

        if bbox.w < self.min_bbox_size_px || bbox.h < self.min_bbox_size_px {
            return Err(BBoxViolation::TooSmall {
                w: bbox.w,
                h: bbox.h,
                min_size_px: self.min_bbox_size_px,
            });
        }

        Ok(())
    }

    /// Checks one annotation: class code resolvable and geometry valid.
    ///
    /// Required fields are already guaranteed by the typed decode, so this
    /// covers the two failure modes that survive parsing.
    pub fn validate_annotation(
        &self,
        annotation: &RawAnnotation,
        width: u32,
        height: u32,
        class_map: &ClassMap,
    ) -> AnnotationCheck {
        let Some(class_index) = class_map.resolve(&annotation.class_code) else {
            return AnnotationCheck::UnknownClass;
        };
        let Some(bbox) = shape_bbox(&annotation.shape) else {
            return AnnotationCheck::EmptyShape;
        };
        match self.validate_bbox(bbox, width, height) {
            Ok(()) => AnnotationCheck::Valid { class_index, bbox },
            Err(violation) => AnnotationCheck::BadBBox(violation),
        }
    }

    /// Runs all checks over every record without stopping on failures and
    /// returns one aggregated report.
    ///
    /// This is the standalone dry-run sweep; the pipeline applies the same
    /// checks inline while converting.
    pub fn validate_dataset(
        &self,
        records: &[SourceRecord],
        class_map: &ClassMap,
        policy: ClassPolicy,
    ) -> ValidationReport {
        let report = ReportAccumulator::new();

        for record in records {
            report.record_submitted();

            match self.validate_image(&record.image) {
                Ok((width, height)) => {
                    if (width, height) != (record.image.width, record.image.height) {
                        report.warn(
                            &record.id,
                            format!(
                                "declared resolution {}x{} differs from decoded {width}x{height}",
                                record.image.width, record.image.height
                            ),
                        );
                    }
                }
                Err(reason) => {
                    report.warn(&record.id, reason);
                    report.record_skipped();
                    continue;
                }
            }

            for annotation in &record.annotations {
                match self.validate_annotation(
                    annotation,
                    record.image.width,
                    record.image.height,
                    class_map,
                ) {
                    AnnotationCheck::Valid { .. } => {}
                    AnnotationCheck::UnknownClass => match policy {
                        ClassPolicy::Strict => report.error(
                            &record.id,
                            format!("unknown class code '{}'", annotation.class_code),
                        ),
                        ClassPolicy::Lenient => {
                            report.warn(
                                &record.id,
                                format!(
                                    "unknown class code '{}', annotation dropped",
                                    annotation.class_code
                                ),
                            );
                            report.annotation_dropped();
                        }
                    },
                    AnnotationCheck::EmptyShape => {
                        report.warn(&record.id, "polygon annotation with no points, dropped");
                        report.annotation_dropped();
                    }
                    AnnotationCheck::BadBBox(violation) => {
                        report.warn(&record.id, violation.to_string());
                        report.annotation_dropped();
                    }
                }
            }

            report.record_processed();
        }

        report.into_report()
    }
}
