// src/audit/mod.rs

use anyhow::Result;
use duckdb::Connection;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{error, info};

use crate::ingest::AnnualTotal;
use crate::store;

/// Exact-equality comparison of two record counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountCheck {
    pub source: i64,
    pub persisted: i64,
    pub matched: bool,
}

/// Count comparison for the granular series, where the persisted count must
/// equal the source count less the rows the repair engine dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreCountCheck {
    pub source: i64,
    pub dropped: i64,
    pub persisted: i64,
    /// `(source - dropped) - persisted`; zero on match.
    pub variance: i64,
    pub matched: bool,
}

/// One (year, category) pair whose annual totals differ between source and
/// store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TotalVariance {
    pub year: i32,
    pub cat_name: String,
    pub source_total: f64,
    pub persisted_total: f64,
}

/// Outcome of the annual-totals comparison. `compared` counts the pairs the
/// inner join produced; keys present on only one side are excluded, since a
/// category with an incomplete year has no source-side total to compare.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TotalsCheck {
    pub compared: usize,
    pub variances: Vec<TotalVariance>,
    pub matched: bool,
}

/// The combined outcome of one validation run. Purely informational; never
/// persisted.
#[derive(Debug, Serialize)]
pub struct AuditReport {
    pub combined: CountCheck,
    pub store: StoreCountCheck,
    pub totals: TotalsCheck,
}

impl AuditReport {
    pub fn passed(&self) -> bool {
        self.combined.matched && self.store.matched && self.totals.matched
    }
}

/// Compare the aggregate-series record counts; exact equality required.
pub fn record_count_check(source: i64, persisted: i64) -> CountCheck {
    let matched = source == persisted;
    if matched {
        info!(source, persisted, "combined_sales record counts match");
    } else {
        error!(source, persisted, "combined_sales record count variance");
    }
    CountCheck {
        source,
        persisted,
        matched,
    }
}

/// Verify `source - dropped == persisted` for the granular series.
pub fn store_record_count_check(source: i64, dropped: i64, persisted: i64) -> StoreCountCheck {
    let variance = (source - dropped) - persisted;
    let matched = variance == 0;
    if matched {
        info!(source, dropped, persisted, "store_sales record counts match");
    } else {
        error!(
            source,
            dropped, persisted, variance, "store_sales record count variance"
        );
    }
    StoreCountCheck {
        source,
        dropped,
        persisted,
        variance,
        matched,
    }
}

/// Inner-join both aggregate tables on (year, cat_name) and flag every joined
/// pair whose totals differ. Every offending row is reported, not just the
/// count.
pub fn totals_check(source: &[AnnualTotal], persisted: &[AnnualTotal]) -> TotalsCheck {
    let persisted_by_key: HashMap<(i32, &str), f64> = persisted
        .iter()
        .map(|t| ((t.year, t.cat_name.as_str()), t.total))
        .collect();

    let mut compared = 0usize;
    let mut variances = Vec::new();
    for src in source {
        let Some(&db_total) = persisted_by_key.get(&(src.year, src.cat_name.as_str())) else {
            continue;
        };
        compared += 1;
        if src.total != db_total {
            variances.push(TotalVariance {
                year: src.year,
                cat_name: src.cat_name.clone(),
                source_total: src.total,
                persisted_total: db_total,
            });
        }
    }

    let matched = variances.is_empty();
    if matched {
        info!(compared, "annual totals match between source and store");
    } else {
        error!(
            compared,
            variances = variances.len(),
            "annual totals variance between source and store"
        );
        for v in &variances {
            error!(
                year = v.year,
                cat_name = %v.cat_name,
                source_total = v.source_total,
                persisted_total = v.persisted_total,
                "annual sales variance"
            );
        }
    }

    TotalsCheck {
        compared,
        variances,
        matched,
    }
}

/// Run all three reconciliation checks against the persisted store. Source-
/// side numbers come from the extraction and cleaning stages; persisted-side
/// numbers are queried fresh from the database.
#[tracing::instrument(level = "info", skip(conn, source_totals))]
pub fn run_audit(
    conn: &Connection,
    combined_source_count: i64,
    store_source_count: i64,
    dropped_count: i64,
    source_totals: &[AnnualTotal],
) -> Result<AuditReport> {
    let combined = record_count_check(combined_source_count, store::combined_sales_count(conn)?);
    let store_check = store_record_count_check(
        store_source_count,
        dropped_count,
        store::store_sales_count(conn)?,
    );
    let totals = totals_check(source_totals, &store::store_annual_totals(conn)?);

    Ok(AuditReport {
        combined,
        store: store_check,
        totals,
    })
}
