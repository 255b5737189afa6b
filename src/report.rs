use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};
use std::sync::Mutex;

use crate::split::Split;

const SUMMARY_ISSUE_CAP: usize = 10;

/// The aggregated outcome of a conversion run.
///
/// Accumulated without ever raising: every skipped record and dropped
/// annotation appears here with a reason, and the report is returned even
/// when the run was only partially successful.
#[derive(Debug, Default, Clone)]
pub struct ValidationReport {
    pub errors: Vec<(String, String)>,
    pub warnings: Vec<(String, String)>,
    pub processed: usize,
    pub skipped: usize,
    pub dropped_annotations: usize,
    pub written_train: usize,
    pub written_val: usize,
    pub written_test: usize,
    /// Surviving annotation counts per class name, sorted by name.
    pub class_counts: Vec<(String, usize)>,
}

impl ValidationReport {
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Logs the run summary with a capped issue listing.
    pub fn print_summary(&self) {
        log::info!("=== Conversion Summary ===");
        log::info!("Records processed: {}", self.processed);
        log::info!("Records skipped: {}", self.skipped);
        log::info!("Annotations dropped: {}", self.dropped_annotations);
        log::info!(
            "Samples written: {} train, {} val, {} test",
            self.written_train,
            self.written_val,
            self.written_test
        );
        log::info!(
            "Issues: {} error(s), {} warning(s)",
            self.error_count(),
            self.warning_count()
        );

        for (record_id, reason) in self.errors.iter().take(SUMMARY_ISSUE_CAP) {
            log::error!("  [{record_id}] {reason}");
        }
        if self.errors.len() > SUMMARY_ISSUE_CAP {
            log::error!("  ... and {} more error(s)", self.errors.len() - SUMMARY_ISSUE_CAP);
        }

        for (record_id, reason) in self.warnings.iter().take(SUMMARY_ISSUE_CAP) {
            log::warn!("  [{record_id}] {reason}");
        }
        if self.warnings.len() > SUMMARY_ISSUE_CAP {
            log::warn!(
                "  ... and {} more warning(s)",
                self.warnings.len() - SUMMARY_ISSUE_CAP
            );
        }

        if !self.class_counts.is_empty() {
            log::info!("Annotations per class:");
            for (name, count) in &self.class_counts {
                log::info!("  {name}: {count}");
            }
        }
    }
}

/// Append-only, concurrency-safe accumulator shared across workers.
///
/// Issues go through a mutex-guarded list, counters are atomic, and per-class
/// counts use a concurrent map, so workers never contend beyond a push.
#[derive(Debug, Default)]
pub struct ReportAccumulator {
    errors: Mutex<Vec<(String, String)>>,
    warnings: Mutex<Vec<(String, String)>>,
    processed: AtomicUsize,
    skipped: AtomicUsize,
    dropped_annotations: AtomicUsize,
    written_train: AtomicUsize,
    written_val: AtomicUsize,
    written_test: AtomicUsize,
    record_failures: AtomicUsize,
    submitted: AtomicUsize,
    class_counts: DashMap<String, usize>,
}

impl ReportAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&self, record_id: &str, reason: impl Into<String>) {
        let reason = reason.into();
        log::error!("[{record_id}] {reason}");
        self.errors
            .lock()
            .expect("report lock poisoned")
            .push((record_id.to_string(), reason));
    }

    pub fn warn(&self, record_id: &str, reason: impl Into<String>) {
        let reason = reason.into();
        log::warn!("[{record_id}] {reason}");
        self.warnings
            .lock()
            .expect("report lock poisoned")
            .push((record_id.to_string(), reason));
    }

    /// Marks a record as entering processing.
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Relaxed);
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Relaxed);
    }

    /// Marks a record-level failure for error-rate escalation.
    pub fn record_failed(&self) {
        self.record_failures.fetch_add(1, Relaxed);
        self.skipped.fetch_add(1, Relaxed);
    }

    pub fn annotation_dropped(&self) {
        self.dropped_annotations.fetch_add(1, Relaxed);
    }

    pub fn sample_written(&self, split: Split) {
        match split {
            Split::Train => &self.written_train,
            Split::Val => &self.written_val,
            Split::Test => &self.written_test,
        }
        .fetch_add(1, Relaxed);
    }

    pub fn count_class(&self, name: &str) {
        self.class_counts
            .entry(name.to_string())
            .and_modify(|count| *count += 1)
            .or_insert(1);
    }

    /// Current record failure rate over submitted records.
    ///
    /// Only meaningful once enough records have been submitted; callers gate
    /// escalation on a minimum submission count.
    pub fn failure_rate(&self) -> (f64, usize) {
        let submitted = self.submitted.load(Relaxed);
        if submitted == 0 {
            return (0.0, 0);
        }
        let failures = self.record_failures.load(Relaxed);
        (failures as f64 / submitted as f64, submitted)
    }

    pub fn processed_count(&self) -> usize {
        self.processed.load(Relaxed)
    }

    /// Freezes the accumulator into the final report.
    pub fn into_report(self) -> ValidationReport {
        let mut class_counts: Vec<(String, usize)> = self.class_counts.into_iter().collect();
        class_counts.sort();

        ValidationReport {
            errors: self.errors.into_inner().expect("report lock poisoned"),
            warnings: self.warnings.into_inner().expect("report lock poisoned"),
            processed: self.processed.into_inner(),
            skipped: self.skipped.into_inner(),
            dropped_annotations: self.dropped_annotations.into_inner(),
            written_train: self.written_train.into_inner(),
            written_val: self.written_val.into_inner(),
            written_test: self.written_test.into_inner(),
            class_counts,
        }
    }
}
