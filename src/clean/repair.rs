// src/clean/repair.rs

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use tracing::info;

use super::gaps::{GapSummary, GroupKey};
use super::{CleanError, CleanedSales};
use crate::ingest::Observation;

/// Fill the absent slots of a month-ordered value series. Interior runs
/// interpolate linearly between the nearest present neighbors; a leading run
/// takes the first present value, a trailing run the last. Returns `None`
/// when the series has no present value to anchor on.
pub fn fill_series(values: &[Option<f64>]) -> Option<Vec<f64>> {
    let first = values.iter().position(|v| v.is_some())?;
    let last = values.iter().rposition(|v| v.is_some())?;

    let mut out: Vec<f64> = values.iter().map(|v| v.unwrap_or(0.0)).collect();
    for slot in out.iter_mut().take(first) {
        *slot = values[first].unwrap();
    }
    for slot in out.iter_mut().skip(last + 1) {
        *slot = values[last].unwrap();
    }

    let mut prev = first;
    for i in first + 1..=last {
        if values[i].is_none() {
            continue;
        }
        if i > prev + 1 {
            let lo = values[prev].unwrap();
            let step = (values[i].unwrap() - lo) / (i - prev) as f64;
            for j in prev + 1..i {
                out[j] = lo + step * (j - prev) as f64;
            }
        }
        prev = i;
    }

    Some(out)
}

/// Repair the granular series against a classification pass:
///
/// 1) interpolate every repairable group's absent slots,
/// 2) drop every unsalvageable group whole,
/// 3) merge the filled values back by exact (cat_code, cat_name, sales_date)
///    key, touching only originally-absent slots.
///
/// The count self-check runs before returning: the cleaned length must equal
/// the original length minus the dropped observations, with no duplicate
/// (cat_code, sales_date) keys. Any mismatch means a merge defect, not a data
/// quality problem, and fails the run.
pub fn repair(store: &[Observation], summary: &GapSummary) -> Result<CleanedSales, CleanError> {
    // 1) build fill values for originally-absent slots of repairable groups
    let mut fills: HashMap<(String, String, NaiveDate), f64> =
        HashMap::with_capacity(summary.interpolation_slots);
    for (key, group) in &summary.repairable {
        let mut ordered: Vec<&Observation> = group.iter().collect();
        ordered.sort_by_key(|o| o.sales_date);

        let values: Vec<Option<f64>> = ordered.iter().map(|o| o.sales).collect();
        let filled = fill_series(&values).ok_or_else(|| CleanError::MissingFill {
            cat_code: key.cat_code.clone(),
            sales_date: ordered[0].sales_date,
        })?;

        for (obs, value) in ordered.iter().zip(filled) {
            if obs.sales.is_none() {
                fills.insert(
                    (obs.cat_code.clone(), obs.cat_name.clone(), obs.sales_date),
                    value,
                );
            }
        }
    }

    // 2) + 3) one pass over the full series: skip dropped groups, patch
    // absent slots, leave present values untouched
    let dropped_count = summary.dropped_observation_count();
    let mut cleaned: Vec<Observation> = Vec::with_capacity(store.len() - dropped_count);
    let mut seen: HashSet<(String, NaiveDate)> = HashSet::with_capacity(store.len());

    for obs in store {
        if summary.unsalvageable.contains_key(&GroupKey::of(obs)) {
            continue;
        }
        let sales = match obs.sales {
            Some(v) => v,
            None => *fills
                .get(&(obs.cat_code.clone(), obs.cat_name.clone(), obs.sales_date))
                .ok_or_else(|| CleanError::MissingFill {
                    cat_code: obs.cat_code.clone(),
                    sales_date: obs.sales_date,
                })?,
        };
        if !seen.insert((obs.cat_code.clone(), obs.sales_date)) {
            return Err(CleanError::DuplicateKey {
                cat_code: obs.cat_code.clone(),
                sales_date: obs.sales_date,
            });
        }
        cleaned.push(Observation {
            cat_code: obs.cat_code.clone(),
            cat_name: obs.cat_name.clone(),
            sales_date: obs.sales_date,
            sales: Some(sales),
        });
    }

    // count self-check
    let expected = store.len() - dropped_count;
    if cleaned.len() != expected {
        return Err(CleanError::CountVariance {
            expected,
            actual: cleaned.len(),
        });
    }

    info!(
        dropped = dropped_count,
        interpolated = summary.interpolation_slots,
        retained = cleaned.len(),
        "repaired store sales"
    );

    Ok(CleanedSales {
        observations: cleaned,
        original_count: store.len(),
        dropped_count,
        interpolated_count: summary.interpolation_slots,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::gaps::classify;
    use chrono::NaiveDate;

    fn obs(cat_code: &str, year: i32, month: u32, sales: Option<f64>) -> Observation {
        Observation {
            cat_code: cat_code.to_string(),
            cat_name: format!("category {}", cat_code),
            sales_date: NaiveDate::from_ymd_opt(year, month, 1).unwrap(),
            sales,
        }
    }

    fn year_of(cat_code: &str, year: i32, values: [Option<f64>; 12]) -> Vec<Observation> {
        values
            .into_iter()
            .enumerate()
            .map(|(i, v)| obs(cat_code, year, i as u32 + 1, v))
            .collect()
    }

    #[test]
    fn interior_gaps_interpolate_between_neighbors() {
        // two absent months between known values
        let values = [
            Some(100.0),
            None,
            Some(120.0),
            None,
            Some(140.0),
            Some(150.0),
            Some(160.0),
            Some(170.0),
            Some(180.0),
            Some(190.0),
            Some(200.0),
            Some(210.0),
        ];
        let filled = fill_series(&values).unwrap();
        assert_eq!(filled[1], 110.0);
        assert_eq!(filled[3], 130.0);
        assert_eq!(filled[0], 100.0);
        assert_eq!(filled[11], 210.0);
    }

    #[test]
    fn multi_month_run_splits_the_span_evenly() {
        let values = [Some(10.0), None, None, Some(40.0)];
        let filled = fill_series(&values).unwrap();
        assert_eq!(filled, vec![10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn edge_runs_take_the_nearest_present_value() {
        let values = [None, Some(50.0), Some(60.0), None];
        let filled = fill_series(&values).unwrap();
        assert_eq!(filled, vec![50.0, 50.0, 60.0, 60.0]);
    }

    #[test]
    fn all_absent_series_has_no_anchor() {
        assert_eq!(fill_series(&[None, None]), None);
    }

    #[test]
    fn fill_is_identity_on_complete_series() {
        let values: Vec<Option<f64>> = (1..=12).map(|m| Some(f64::from(m) * 7.5)).collect();
        let filled = fill_series(&values).unwrap();
        let original: Vec<f64> = values.iter().map(|v| v.unwrap()).collect();
        assert_eq!(filled, original);
    }

    #[test]
    fn repairable_group_is_interpolated_in_place() {
        let store = year_of(
            "44111",
            2020,
            [
                Some(100.0),
                None,
                Some(120.0),
                None,
                Some(140.0),
                Some(150.0),
                Some(160.0),
                Some(170.0),
                Some(180.0),
                Some(190.0),
                Some(200.0),
                Some(210.0),
            ],
        );
        let summary = classify(&store);
        let cleaned = repair(&store, &summary).unwrap();

        assert_eq!(cleaned.observations.len(), 12);
        assert_eq!(cleaned.original_count, 12);
        assert_eq!(cleaned.dropped_count, 0);
        assert_eq!(cleaned.interpolated_count, 2);
        assert_eq!(cleaned.observations[1].sales, Some(110.0));
        assert_eq!(cleaned.observations[3].sales, Some(130.0));
        assert!(cleaned.observations.iter().all(|o| o.sales.is_some()));
    }

    #[test]
    fn unsalvageable_group_is_dropped_whole() {
        let mut store = year_of(
            "45999",
            2019,
            [
                None,
                None,
                None,
                None,
                None,
                Some(60.0),
                Some(70.0),
                Some(80.0),
                Some(90.0),
                Some(100.0),
                Some(110.0),
                Some(120.0),
            ],
        );
        store.extend(year_of("44111", 2019, [Some(1.0); 12]));

        let summary = classify(&store);
        let cleaned = repair(&store, &summary).unwrap();

        assert_eq!(cleaned.original_count, 24);
        assert_eq!(cleaned.dropped_count, 12);
        assert_eq!(cleaned.observations.len(), 12);
        assert!(cleaned.observations.iter().all(|o| o.cat_code == "44111"));
    }

    #[test]
    fn present_values_survive_the_merge_bit_identical() {
        let mut store = year_of(
            "44111",
            2020,
            [
                Some(0.1 + 0.2), // deliberately non-round
                None,
                Some(120.0),
                Some(130.0),
                Some(140.0),
                Some(150.0),
                Some(160.0),
                Some(170.0),
                Some(180.0),
                Some(190.0),
                Some(200.0),
                Some(210.0),
            ],
        );
        store.extend(year_of("44811", 2020, [Some(5.5); 12]));

        let before: Vec<(String, NaiveDate, Option<f64>)> = store
            .iter()
            .filter(|o| o.sales.is_some())
            .map(|o| (o.cat_code.clone(), o.sales_date, o.sales))
            .collect();

        let summary = classify(&store);
        let cleaned = repair(&store, &summary).unwrap();

        for (cat_code, date, sales) in before {
            let after = cleaned
                .observations
                .iter()
                .find(|o| o.cat_code == cat_code && o.sales_date == date)
                .unwrap();
            assert_eq!(after.sales.unwrap().to_bits(), sales.unwrap().to_bits());
        }
    }

    #[test]
    fn no_duplicate_keys_after_repair() {
        let mut store = year_of("44111", 2020, [Some(1.0); 12]);
        store.extend(year_of("44111", 2021, [Some(2.0); 12]));
        let summary = classify(&store);
        let cleaned = repair(&store, &summary).unwrap();

        let mut keys: Vec<(String, NaiveDate)> = cleaned
            .observations
            .iter()
            .map(|o| (o.cat_code.clone(), o.sales_date))
            .collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), cleaned.observations.len());
    }

    #[test]
    fn duplicated_source_row_is_a_fatal_merge_defect() {
        let mut store = year_of("44111", 2020, [Some(1.0); 12]);
        store.push(obs("44111", 2020, 5, Some(1.0)));
        let summary = classify(&store);
        match repair(&store, &summary) {
            Err(CleanError::DuplicateKey { cat_code, .. }) => assert_eq!(cat_code, "44111"),
            other => panic!("expected DuplicateKey, got {:?}", other),
        }
    }

    #[test]
    fn count_invariant_holds_across_mixed_dispositions() {
        let mut store = year_of("44111", 2020, [Some(1.0); 12]);
        let mut gapped = [Some(3.0); 12];
        gapped[6] = None;
        store.extend(year_of("44611", 2020, gapped));
        let mut hopeless = [None; 12];
        hopeless[0] = Some(9.0);
        store.extend(year_of("45999", 2020, hopeless));

        let summary = classify(&store);
        let cleaned = repair(&store, &summary).unwrap();
        assert_eq!(
            cleaned.observations.len(),
            cleaned.original_count - cleaned.dropped_count
        );
        assert_eq!(cleaned.dropped_count, 12);
        assert!(cleaned.observations.iter().all(|o| o.sales.is_some()));
    }
}
