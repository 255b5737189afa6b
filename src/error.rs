use std::path::PathBuf;
use thiserror::Error;

/// The error type for conversion runs.
///
/// Only `Config`, `UnknownClass` (under the strict policy) and
/// `ErrorRateExceeded` abort a run; everything else is recorded in the
/// validation report and processing continues.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown class code '{code}' in record {record_id}")]
    UnknownClass { record_id: String, code: String },

    #[error("failed to decode image {path}: {reason}")]
    ImageDecode { path: PathBuf, reason: String },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("record error rate {rate:.3} exceeded configured threshold {threshold:.3}")]
    ErrorRateExceeded { rate: f64, threshold: f64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
