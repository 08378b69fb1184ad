// src/clean/gaps.rs

use chrono::Datelike;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::warn;

use crate::ingest::Observation;

/// Largest number of absent months a (category, year) group may carry and
/// still be repaired by interpolation. At or above `MAX_REPAIRABLE_GAPS + 1`
/// the whole group is dropped.
pub const MAX_REPAIRABLE_GAPS: usize = 3;

/// Identity of a group: one category in one calendar year. Ordered by
/// cat_code first, then year, so traversal is stable for reporting.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub cat_code: String,
    pub year: i32,
}

impl GroupKey {
    pub fn of(obs: &Observation) -> Self {
        GroupKey {
            cat_code: obs.cat_code.clone(),
            year: obs.sales_date.year(),
        }
    }
}

/// Classification of a group by its count of absent values. Derived, never
/// stored; every group has exactly one disposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Zero absent values, nothing to do.
    Clean,
    /// 1 to 3 absent values, fill by interpolation.
    Repairable,
    /// 4 or more absent values, drop the whole group.
    Unsalvageable,
}

impl Disposition {
    pub fn from_gap_count(gaps: usize) -> Self {
        match gaps {
            0 => Disposition::Clean,
            n if n <= MAX_REPAIRABLE_GAPS => Disposition::Repairable,
            _ => Disposition::Unsalvageable,
        }
    }
}

/// Output of a classification pass: the two gapped group collections, the
/// count of absent slots awaiting interpolation, and a rendered report of
/// gaps by category and year.
#[derive(Debug)]
pub struct GapSummary {
    pub repairable: BTreeMap<GroupKey, Vec<Observation>>,
    pub unsalvageable: BTreeMap<GroupKey, Vec<Observation>>,
    /// Absent slots inside repairable groups; the repair engine must fill
    /// exactly this many values.
    pub interpolation_slots: usize,
    report: String,
}

impl GapSummary {
    /// Human-readable gap report, groups in (cat_code, year) order, with a
    /// marker wherever one category's gapped years jump by more than one.
    pub fn report(&self) -> &str {
        &self.report
    }

    pub fn dropped_observation_count(&self) -> usize {
        self.unsalvageable.values().map(Vec::len).sum()
    }
}

/// Partition the granular series into (category, year) groups and classify
/// each by its absent-value count. Clean groups appear in neither output
/// collection; they need no repair.
pub fn classify(store: &[Observation]) -> GapSummary {
    let mut groups: BTreeMap<GroupKey, Vec<Observation>> = BTreeMap::new();
    for obs in store {
        groups.entry(GroupKey::of(obs)).or_default().push(obs.clone());
    }

    let mut repairable = BTreeMap::new();
    let mut unsalvageable = BTreeMap::new();
    let mut interpolation_slots = 0usize;

    let mut report = String::from("missing values by category and year:");
    let mut cur_cat_code: Option<&str> = None;
    let mut prev_year: Option<i32> = None;

    for (key, group) in &groups {
        if group.len() != 12 {
            warn!(
                cat_code = %key.cat_code,
                year = key.year,
                months = group.len(),
                "group does not have 12 monthly observations"
            );
        }

        let gaps = group.iter().filter(|o| o.sales.is_none()).count();
        if gaps == 0 {
            continue;
        }

        // report formatting: category header, then gapped years in order,
        // flagging jumps of more than one year within the same category
        let is_new_cat = cur_cat_code != Some(key.cat_code.as_str());
        if is_new_cat {
            write!(report, "\n  category {}", key.cat_code).unwrap();
            cur_cat_code = Some(key.cat_code.as_str());
            prev_year = None;
        }
        if let Some(prev) = prev_year {
            if key.year - prev > 1 {
                report.push_str("\n    -- nonconsecutive year --");
            }
        }
        write!(report, "\n    {}: {} missing", key.year, gaps).unwrap();
        prev_year = Some(key.year);

        match Disposition::from_gap_count(gaps) {
            Disposition::Clean => unreachable!("gaps > 0"),
            Disposition::Repairable => {
                interpolation_slots += gaps;
                repairable.insert(key.clone(), group.clone());
            }
            Disposition::Unsalvageable => {
                unsalvageable.insert(key.clone(), group.clone());
            }
        }
    }

    report.push('\n');

    GapSummary {
        repairable,
        unsalvageable,
        interpolation_slots,
        report,
    }
}
