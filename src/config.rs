use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;

use crate::augment::AugmentConfig;
use crate::class_map::ClassPolicy;
use crate::error::ConvertError;

/// Command-line arguments for converting vendor annotation records to YOLO
/// datasets.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Directory containing per-category vendor annotation folders
    #[arg(short = 'd', long = "data_root")]
    pub data_root: PathBuf,

    /// Output root for the converted datasets
    #[arg(short = 'o', long = "output")]
    pub output_root: PathBuf,

    /// Class-list file (YAML or JSON) of ordered {code, name} entries
    #[arg(long = "classes")]
    pub classes: PathBuf,

    /// Categories to process (default: all found under the data root)
    #[arg(long = "categories", use_value_delimiter = true)]
    pub categories: Vec<String>,

    /// Cap on records per category, applied with a seeded shuffle
    #[arg(long = "sample")]
    pub sample: Option<usize>,

    /// Proportion of the dataset to use for training
    #[arg(long = "train_ratio", default_value_t = 0.7, value_parser = validate_ratio)]
    pub train_ratio: f64,

    /// Proportion of the dataset to use for validation
    #[arg(long = "val_ratio", default_value_t = 0.15, value_parser = validate_ratio)]
    pub val_ratio: f64,

    /// Proportion of the dataset to use for testing
    #[arg(long = "test_ratio", default_value_t = 0.15, value_parser = validate_ratio)]
    pub test_ratio: f64,

    /// How unresolved class codes are handled
    #[arg(long = "class_policy", value_enum, default_value = "lenient")]
    pub class_policy: ClassPolicy,

    /// Minimum bbox extent in pixels; smaller annotations are dropped
    #[arg(long = "min_bbox_size", default_value_t = 10.0)]
    pub min_bbox_size: f64,

    /// Seed for split assignment, sampling and augmentation draws
    #[arg(long = "seed", default_value_t = 42)]
    pub seed: u64,

    /// Enable train-split augmentation
    #[arg(long = "augment")]
    pub augment: bool,

    /// Emit one variant per technique instead of random selection
    #[arg(long = "augment_all")]
    pub augment_all: bool,

    /// Rotation draw range in degrees; 0 disables rotation
    #[arg(long = "rotation_range", default_value_t = 15.0)]
    pub rotation_range: f64,

    /// Also mirror about the horizontal axis
    #[arg(long = "flip_vertical")]
    pub flip_vertical: bool,

    /// Probability of the blur variant in random selection mode
    #[arg(long = "blur_probability", default_value_t = 0.1, value_parser = validate_ratio)]
    pub blur_probability: f64,

    /// Abort the run when the record failure rate exceeds this fraction
    #[arg(long = "max_error_rate", value_parser = validate_ratio)]
    pub max_error_rate: Option<f64>,
}

impl Args {
    /// Lowers the parsed flags into the run configuration.
    pub fn to_config(&self) -> PipelineConfig {
        PipelineConfig {
            data_root: self.data_root.clone(),
            output_root: self.output_root.clone(),
            categories: self.categories.clone(),
            sample_cap: self.sample,
            ratios: (self.train_ratio, self.val_ratio, self.test_ratio),
            class_policy: self.class_policy,
            min_bbox_size_px: self.min_bbox_size,
            seed: self.seed,
            augment: AugmentConfig {
                enabled: self.augment,
                augment_all: self.augment_all,
                rotation_range_deg: self.rotation_range,
                flip_vertical: self.flip_vertical,
                blur_probability: self.blur_probability,
                ..AugmentConfig::default()
            },
            max_error_rate: self.max_error_rate,
            ..PipelineConfig::default()
        }
    }
}

// Validate that a ratio lies between 0.0 and 1.0
fn validate_ratio(s: &str) -> Result<f64, String> {
    match f64::from_str(s) {
        Ok(val) if (0.0..=1.0).contains(&val) => Ok(val),
        _ => Err("RATIO must be between 0.0 and 1.0".to_string()),
    }
}

/// The full run configuration, independent of any flag syntax.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_root: PathBuf,
    pub output_root: PathBuf,
    /// Categories to process; empty selects all.
    pub categories: Vec<String>,
    pub sample_cap: Option<usize>,
    /// `(train, val, test)`, must sum to 1.0.
    pub ratios: (f64, f64, f64),
    pub class_policy: ClassPolicy,
    pub min_bbox_size_px: f64,
    /// Accepted overhang beyond image bounds before an annotation is dropped.
    pub bounds_tolerance_px: f64,
    /// Clipped boxes below this extent are degenerate and dropped.
    pub degenerate_eps_px: f64,
    pub seed: u64,
    pub augment: AugmentConfig,
    /// Record failure rate above which the run aborts; `None` never aborts.
    pub max_error_rate: Option<f64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::new(),
            output_root: PathBuf::new(),
            categories: Vec::new(),
            sample_cap: None,
            ratios: (0.7, 0.15, 0.15),
            class_policy: ClassPolicy::Lenient,
            min_bbox_size_px: 10.0,
            bounds_tolerance_px: 1.0,
            degenerate_eps_px: 1.0,
            seed: 42,
            augment: AugmentConfig::default(),
            max_error_rate: None,
        }
    }
}

impl PipelineConfig {
    /// Pre-flight validation; failures here stop the run before any output
    /// is written.
    pub fn validate(&self) -> Result<(), ConvertError> {
        if !self.data_root.is_dir() {
            return Err(ConvertError::Config(format!(
                "data root {} does not exist",
                self.data_root.display()
            )));
        }
        if self.output_root.as_os_str().is_empty() {
            return Err(ConvertError::Config("output root is empty".to_string()));
        }
        if let Some(rate) = self.max_error_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConvertError::Config(format!(
                    "max error rate {rate} must lie in [0, 1]"
                )));
            }
        }
        if self.min_bbox_size_px < 0.0 {
            return Err(ConvertError::Config(format!(
                "minimum bbox size {} must not be negative",
                self.min_bbox_size_px
            )));
        }

        let augment = &self.augment;
        for (name, probability) in [
            ("flip", augment.flip_probability),
            ("blur", augment.blur_probability),
        ] {
            if !(0.0..=1.0).contains(&probability) {
                return Err(ConvertError::Config(format!(
                    "{name} probability {probability} must lie in [0, 1]"
                )));
            }
        }
        if augment.rotation_range_deg < 0.0 {
            return Err(ConvertError::Config(format!(
                "rotation range {} must not be negative",
                augment.rotation_range_deg
            )));
        }
        for (name, (lo, hi)) in [
            ("brightness", augment.brightness_range),
            ("contrast", augment.contrast_range),
        ] {
            if lo < 0.0 || lo > hi {
                return Err(ConvertError::Config(format!(
                    "{name} range [{lo}, {hi}] must be non-negative and ordered"
                )));
            }
        }
        Ok(())
    }
}
