use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
use std::sync::Arc;

use crate::augment::Augmenter;
use crate::class_map::{ClassMap, ClassPolicy};
use crate::config::PipelineConfig;
use crate::error::ConvertError;
use crate::geometry::GeometryConverter;
use crate::loader::{collect_records, discover_categories, sample_records};
use crate::report::{ReportAccumulator, ValidationReport};
use crate::split::{record_key, Split, Splitter};
use crate::types::{NormalizedAnnotation, PixelBox, SourceRecord};
use crate::utils::create_progress_bar;
use crate::validation::{AnnotationCheck, DatasetValidator};
use crate::writer::DatasetWriter;

// Record failure rates are only meaningful once a few records have been
// submitted; below this the escalation threshold is not evaluated.
const MIN_RECORDS_FOR_RATE: usize = 10;

/// Orchestrates the full conversion:
/// load → validate → map/convert → augment (train) → split → write,
/// one record at a time over a bounded worker pool.
///
/// Per-record failures are isolated: they are recorded in the report and the
/// worker moves on. Only pre-flight configuration problems, a strict-policy
/// unknown class, or an explicitly configured error-rate threshold abort the
/// run.
pub struct Pipeline {
    config: PipelineConfig,
    class_map: ClassMap,
    splitter: Splitter,
    validator: DatasetValidator,
    converter: GeometryConverter,
    augmenter: Augmenter,
    cancel: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, class_map: ClassMap) -> Result<Self, ConvertError> {
        config.validate()?;
        let (train, val, test) = config.ratios;
        let splitter = Splitter::new(train, val, test, config.seed)?;
        let validator = DatasetValidator::new(config.min_bbox_size_px, config.bounds_tolerance_px);
        let converter = GeometryConverter::new(config.degenerate_eps_px);
        let augmenter = Augmenter::new(config.augment.clone());

        Ok(Self {
            config,
            class_map,
            splitter,
            validator,
            converter,
            augmenter,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// External stop signal: setting the flag stops submission of new
    /// records while in-flight records finish; atomic writes guarantee no
    /// partial output.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Runs the conversion over every selected category and returns the
    /// aggregated report. The summary is logged in all cases, including a
    /// threshold-escalated abort.
    pub fn run(&self) -> Result<ValidationReport, ConvertError> {
        let categories = discover_categories(&self.config.data_root, &self.config.categories)?;
        if categories.is_empty() {
            return Err(ConvertError::Config(format!(
                "no category directories under {}",
                self.config.data_root.display()
            )));
        }

        let report = ReportAccumulator::new();

        // Load every category before anything is written, so the strict
        // class check below can abort ahead of all output.
        let mut loaded: Vec<(String, Vec<SourceRecord>)> = Vec::with_capacity(categories.len());
        for category in &categories {
            let category_dir = self.config.data_root.join(category);
            let mut records = collect_records(&category_dir, &report)?;
            sample_records(&mut records, self.config.sample_cap, self.config.seed);
            info!("[{category}] loaded {} records", records.len());
            loaded.push((category.clone(), records));
        }

        if self.config.class_policy == ClassPolicy::Strict {
            self.check_all_classes(&loaded)?;
        }

        let has_test = self.config.ratios.2 > 0.0;
        let abort = AtomicBool::new(false);

        for (category, records) in &loaded {
            if self.cancel.load(Relaxed) || abort.load(Relaxed) {
                break;
            }

            let writer = DatasetWriter::create(&self.config.output_root, category, has_test)?;
            let pb = create_progress_bar(records.len() as u64, category);

            records.par_iter().for_each(|record| {
                if self.cancel.load(Relaxed) || abort.load(Relaxed) {
                    pb.inc(1);
                    return;
                }
                self.process_record(record, &writer, &report);
                self.maybe_escalate(&report, &abort);
                pb.inc(1);
            });
            pb.finish_with_message(format!("{category} processing complete"));

            if !abort.load(Relaxed) {
                writer.write_descriptor(&self.class_map)?;
            }
        }

        if self.cancel.load(Relaxed) {
            warn!("cancellation requested; remaining records were not submitted");
        }

        let escalated = if abort.load(Relaxed) {
            self.config.max_error_rate.map(|threshold| {
                let (rate, _) = report.failure_rate();
                ConvertError::ErrorRateExceeded { rate, threshold }
            })
        } else {
            None
        };

        let report = report.into_report();
        report.print_summary();

        match escalated {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Strict policy: resolve every class code of every loaded record up
    /// front, so an unknown code aborts before any file is written.
    fn check_all_classes(
        &self,
        loaded: &[(String, Vec<SourceRecord>)],
    ) -> Result<(), ConvertError> {
        for (_, records) in loaded {
            for record in records {
                for annotation in &record.annotations {
                    if self.class_map.resolve(&annotation.class_code).is_none() {
                        return Err(ConvertError::UnknownClass {
                            record_id: record.id.clone(),
                            code: annotation.class_code.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn process_record(
        &self,
        record: &SourceRecord,
        writer: &DatasetWriter,
        report: &ReportAccumulator,
    ) {
        report.record_submitted();
        let split = self.splitter.assign(&record.id);

        let decoded_dims = match self.validator.validate_image(&record.image) {
            Ok(dims) => dims,
            Err(reason) => {
                report.warn(&record.id, reason);
                report.record_failed();
                return;
            }
        };
        let declared = (record.image.width, record.image.height);
        if decoded_dims != declared {
            report.warn(
                &record.id,
                format!(
                    "declared resolution {}x{} differs from decoded {}x{}",
                    declared.0, declared.1, decoded_dims.0, decoded_dims.1
                ),
            );
        }

        // Resolve classes and validate geometry in pixel space. Annotation
        // failures drop the annotation, never the record. Unknown classes
        // under the strict policy were already caught before any output.
        let mut boxes: Vec<(u32, PixelBox)> = Vec::with_capacity(record.annotations.len());
        for annotation in &record.annotations {
            match self.validator.validate_annotation(
                annotation,
                record.image.width,
                record.image.height,
                &self.class_map,
            ) {
                AnnotationCheck::Valid { class_index, bbox } => boxes.push((class_index, bbox)),
                AnnotationCheck::UnknownClass => {
                    report.warn(
                        &record.id,
                        format!(
                            "unknown class code '{}', annotation dropped",
                            annotation.class_code
                        ),
                    );
                    report.annotation_dropped();
                }
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

        if boxes.is_empty() {
            report.warn(&record.id, "no valid annotations remain, record skipped");
            report.record_skipped();
            return;
        }

        let result = if split == Split::Train && self.augmenter.config().enabled {
            self.write_augmented(record, &boxes, split, writer, report)
        } else {
            self.write_identity(record, &boxes, split, writer, report)
        };

        match result {
            Ok(()) => report.record_processed(),
            Err(e) => {
                report.warn(&record.id, e.to_string());
                report.record_failed();
            }
        }
    }

    /// Identity sample only: the source image is copied unmodified.
    fn write_identity(
        &self,
        record: &SourceRecord,
        boxes: &[(u32, PixelBox)],
        split: Split,
        writer: &DatasetWriter,
        report: &ReportAccumulator,
    ) -> Result<(), ConvertError> {
        let annotations = self.normalize_boxes(record, boxes, report);
        let stem = sample_stem(&record.id, "original");

        writer.write_labels(split, &stem, &annotations)?;
        writer.copy_image(split, &stem, &record.image.path)?;
        report.sample_written(split);
        Ok(())
    }

    /// Train path with augmentation: decode once, emit the identity sample
    /// plus the selected variants, each re-encoded.
    fn write_augmented(
        &self,
        record: &SourceRecord,
        boxes: &[(u32, PixelBox)],
        split: Split,
        writer: &DatasetWriter,
        report: &ReportAccumulator,
    ) -> Result<(), ConvertError> {
        let image = image::open(&record.image.path)
            .map_err(|e| ConvertError::ImageDecode {
                path: record.image.path.clone(),
                reason: e.to_string(),
            })?
            .to_rgb8();

        let mut rng = StdRng::seed_from_u64(record_key(self.config.seed, b"augment", &record.id));
        for sample in self.augmenter.augment(&image, boxes, &mut rng) {
            let annotations = self.normalize_boxes(record, &sample.boxes, report);
            let stem = sample_stem(&record.id, &sample.technique);

            writer.write_labels(split, &stem, &annotations)?;
            writer.write_image(split, &stem, &sample.image)?;
            report.sample_written(split);
        }
        Ok(())
    }

    fn normalize_boxes(
        &self,
        record: &SourceRecord,
        boxes: &[(u32, PixelBox)],
        report: &ReportAccumulator,
    ) -> Vec<NormalizedAnnotation> {
        let mut annotations = Vec::with_capacity(boxes.len());
        for &(class_index, bbox) in boxes {
            match self
                .converter
                .normalize(class_index, bbox, record.image.width, record.image.height)
            {
                Some(annotation) => {
                    report.count_class(self.class_map.name_of(annotation.class_index));
                    annotations.push(annotation);
                }
                None => {
                    report.warn(&record.id, "degenerate bbox after clipping, dropped");
                    report.annotation_dropped();
                }
            }
        }
        annotations
    }

    fn maybe_escalate(&self, report: &ReportAccumulator, abort: &AtomicBool) {
        let Some(threshold) = self.config.max_error_rate else {
            return;
        };
        let (rate, submitted) = report.failure_rate();
        if submitted >= MIN_RECORDS_FOR_RATE && rate > threshold && !abort.swap(true, Relaxed) {
            log::error!(
                "record failure rate {rate:.3} exceeded threshold {threshold:.3}, aborting remaining run"
            );
        }
    }
}

/// Output file stem for one sample, unique per (record, technique).
fn sample_stem(record_id: &str, technique: &str) -> String {
    sanitize_filename::sanitize(format!("{record_id}_{technique}"))
}
