// src/ingest/mod.rs

use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

pub mod sheet;

pub use sheet::DirSupplier;

/// Sentinel strings the source workbook uses for a missing monthly value.
/// `(NA)` means not available, `(S)` means suppressed. Both normalize to the
/// same absent state at ingestion; no sentinel text survives past this module.
const ABSENT_SENTINELS: &[&str] = &["(NA)", "(S)"];

/// One category/date/value record in a sales series. The absent state is
/// `sales: None`, distinct from zero. Uniquely identified by
/// (cat_code, sales_date) within a record family.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub cat_code: String,
    pub cat_name: String,
    pub sales_date: NaiveDate,
    pub sales: Option<f64>,
}

/// A (year, category) annual sales total, one side of the totals audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnualTotal {
    pub year: i32,
    pub cat_name: String,
    pub total: f64,
}

/// Everything one extraction run produces: the aggregate series, the
/// granular per-category series, and the source-side annual totals.
#[derive(Debug)]
pub struct SalesExtract {
    pub combined: Vec<Observation>,
    pub store: Vec<Observation>,
    pub annual: Vec<AnnualTotal>,
}

/// Source of raw sales observations. The cleaning core and the audits take
/// the extract by value; suppliers are injected by the caller, never held in
/// module-level state.
pub trait SalesSupplier {
    fn fetch(&mut self) -> Result<SalesExtract>;
}

/// Trim whitespace and strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parse one sales cell. Sentinels and empty cells are absent; anything else
/// must parse as a number.
pub fn parse_sales_cell(raw: &str) -> Option<f64> {
    let cleaned = clean_str(raw);
    if cleaned.is_empty() || ABSENT_SENTINELS.contains(&cleaned.as_str()) {
        return None;
    }
    match cleaned.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(cell = %cleaned, "unparseable sales cell treated as absent");
            None
        }
    }
}

/// Derive source-side annual totals from the granular series. The source
/// publishes no total for a year with any missing month, so only (year,
/// cat_name) groups with twelve present values contribute. Output is ordered
/// by year, then cat_name.
pub fn derive_annual_totals(store: &[Observation]) -> Vec<AnnualTotal> {
    let mut groups: BTreeMap<(i32, String), (usize, usize, f64)> = BTreeMap::new();
    for obs in store {
        let entry = groups
            .entry((obs.sales_date.year(), obs.cat_name.clone()))
            .or_insert((0, 0, 0.0));
        entry.0 += 1;
        if let Some(v) = obs.sales {
            entry.1 += 1;
            entry.2 += v;
        }
    }

    groups
        .into_iter()
        .filter(|(_, (months, present, _))| *months == 12 && *present == 12)
        .map(|((year, cat_name), (_, _, total))| AnnualTotal {
            year,
            cat_name,
            total,
        })
        .collect()
}
