// src/clean/mod.rs

use chrono::NaiveDate;
use thiserror::Error;
use tracing::info;

use crate::ingest::Observation;

pub mod gaps;
pub mod repair;

pub use gaps::{classify, Disposition, GapSummary, GroupKey, MAX_REPAIRABLE_GAPS};
pub use repair::repair;

/// Fatal consistency failures from the repair merge. These indicate a defect
/// in the key or merge logic, not bad source data, and abort the run before
/// anything is persisted.
#[derive(Debug, Error)]
pub enum CleanError {
    #[error("record removal variance: expected {expected} rows after repair, found {actual}")]
    CountVariance { expected: usize, actual: usize },
    #[error("duplicate observation key after merge: {cat_code} @ {sales_date}")]
    DuplicateKey {
        cat_code: String,
        sales_date: NaiveDate,
    },
    #[error("no repaired value for absent slot: {cat_code} @ {sales_date}")]
    MissingFill {
        cat_code: String,
        sales_date: NaiveDate,
    },
}

/// The granular series after repair, every retained observation carrying a
/// present value, plus the counts the audits need.
#[derive(Debug)]
pub struct CleanedSales {
    pub observations: Vec<Observation>,
    pub original_count: usize,
    pub dropped_count: usize,
    pub interpolated_count: usize,
}

/// Classify the store series, log the gap report, and repair it. The returned
/// artifact is what gets persisted; a `CleanError` means the dataset is
/// internally inconsistent and nothing downstream should run.
#[tracing::instrument(level = "info", skip(store), fields(records = store.len()))]
pub fn run_clean(store: &[Observation]) -> Result<CleanedSales, CleanError> {
    let summary = gaps::classify(store);
    if summary.repairable.is_empty() && summary.unsalvageable.is_empty() {
        info!("no gapped groups; store sales already complete");
    } else {
        info!(
            repairable = summary.repairable.len(),
            unsalvageable = summary.unsalvageable.len(),
            "{}",
            summary.report()
        );
    }
    repair::repair(store, &summary)
}
