// src/ingest/sheet.rs

use anyhow::{Context, Result};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use glob::glob;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{clean_str, derive_annual_totals, parse_sales_cell, Observation, SalesExtract, SalesSupplier};

/// Number of fields in a sheet row: cat_code, cat_name, then one per month.
const ROW_FIELDS: usize = 14;

/// Reads per-year CSV exports of the retail sales workbook from a directory.
///
/// One file per calendar year, year taken from the filename. Each data row is
/// `cat_code,cat_name,m1..m12`; rows with an empty cat_code belong to the
/// combined series, rows with a cat_code to the store series.
pub struct DirSupplier {
    data_dir: PathBuf,
}

impl DirSupplier {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        DirSupplier {
            data_dir: data_dir.into(),
        }
    }
}

impl SalesSupplier for DirSupplier {
    #[tracing::instrument(level = "info", skip(self), fields(dir = %self.data_dir.display()))]
    fn fetch(&mut self) -> Result<SalesExtract> {
        let pattern = format!("{}/*.csv", self.data_dir.display());
        let mut combined = Vec::new();
        let mut store = Vec::new();
        let mut files = 0usize;

        for entry in glob(&pattern).context("invalid glob pattern for sales sheets")? {
            let path = match entry {
                Ok(p) => p,
                Err(e) => {
                    warn!("cannot read glob entry: {:?}", e);
                    continue;
                }
            };
            let year = match extract_year_from_filename(&path) {
                Some(y) => y,
                None => {
                    warn!(file = %path.display(), "no 4-digit year in filename; skipping");
                    continue;
                }
            };
            read_sheet(&path, year, &mut combined, &mut store)
                .with_context(|| format!("reading sales sheet {:?}", path))?;
            files += 1;
        }

        if files == 0 {
            anyhow::bail!("no sales sheets found under '{}'", pattern);
        }

        let annual = derive_annual_totals(&store);
        info!(
            files,
            combined = combined.len(),
            store = store.len(),
            annual = annual.len(),
            "ingested sales sheets"
        );
        Ok(SalesExtract {
            combined,
            store,
            annual,
        })
    }
}

/// Parse one sheet file into observations, one per (row, month).
fn read_sheet(
    path: &Path,
    year: i32,
    combined: &mut Vec<Observation>,
    store: &mut Vec<Observation>,
) -> Result<()> {
    let file = File::open(path).with_context(|| format!("opening {:?}", path))?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    for (idx, result) in rdr.records().enumerate() {
        let record =
            result.with_context(|| format!("CSV parse error at record {} of {:?}", idx, path))?;

        // skip a header row if the export kept one
        if idx == 0 && record.get(0).map(clean_str).as_deref() == Some("cat_code") {
            continue;
        }
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        if record.len() < ROW_FIELDS {
            warn!(
                file = %path.display(),
                record = idx,
                fields = record.len(),
                "short sheet row; skipping"
            );
            continue;
        }

        let cat_code = clean_str(record.get(0).unwrap_or(""));
        let cat_name = clean_str(record.get(1).unwrap_or(""));
        let out = if cat_code.is_empty() { &mut *combined } else { &mut *store };

        for month in 1..=12u32 {
            // months start at field 2, one per column
            let cell = record.get(1 + month as usize).unwrap_or("");
            let sales_date = NaiveDate::from_ymd_opt(year, month, 1)
                .with_context(|| format!("invalid date {}-{}", year, month))?;
            out.push(Observation {
                cat_code: cat_code.clone(),
                cat_name: cat_name.clone(),
                sales_date,
                sales: parse_sales_cell(cell),
            });
        }
    }

    Ok(())
}

/// Extract a plausible 4-digit calendar year from a filename, e.g.
/// `mrts_2020.csv` or `sales-2019-export.csv`. Returns `None` if no digit run
/// in the plausible range is found.
pub fn extract_year_from_filename(path: &Path) -> Option<i32> {
    let name = path.file_stem()?.to_str()?;
    let chars: Vec<char> = name.chars().collect();
    if chars.len() < 4 {
        return None;
    }
    for i in 0..=chars.len() - 4 {
        let slice = &chars[i..i + 4];
        if slice.iter().all(|c| c.is_ascii_digit()) {
            // reject when part of a longer digit run
            let before_digit = i > 0 && chars[i - 1].is_ascii_digit();
            let after_digit = i + 4 < chars.len() && chars[i + 4].is_ascii_digit();
            if before_digit || after_digit {
                continue;
            }
            let s: String = slice.iter().collect();
            let year: i32 = s.parse().ok()?;
            if (1992..=2035).contains(&year) {
                return Some(year);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_sheet(dir: &Path, name: &str, body: &str) {
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    }

    #[test]
    fn year_extraction() {
        assert_eq!(
            extract_year_from_filename(Path::new("mrts_2020.csv")),
            Some(2020)
        );
        assert_eq!(
            extract_year_from_filename(Path::new("sales-1995-export.csv")),
            Some(1995)
        );
        assert_eq!(extract_year_from_filename(Path::new("sheet1.csv")), None);
        // 8-digit run is a date, not a year on its own
        assert_eq!(extract_year_from_filename(Path::new("dump_20200101.csv")), None);
    }

    #[test]
    fn splits_families_and_normalizes_sentinels() -> Result<()> {
        let dir = tempdir()?;
        write_sheet(
            dir.path(),
            "mrts_2020.csv",
            "cat_code,cat_name,1,2,3,4,5,6,7,8,9,10,11,12\n\
             ,Retail total,900,901,902,903,904,905,906,907,908,909,910,911\n\
             44111,Motor vehicles,100,(NA),120,(S),140,150,160,170,180,190,200,210\n",
        );

        let mut supplier = DirSupplier::new(dir.path());
        let extract = supplier.fetch()?;

        assert_eq!(extract.combined.len(), 12);
        assert_eq!(extract.store.len(), 12);
        assert!(extract.combined.iter().all(|o| o.cat_code.is_empty()));
        assert!(extract.combined.iter().all(|o| o.cat_name == "Retail total"));

        let feb = &extract.store[1];
        assert_eq!(feb.cat_code, "44111");
        assert_eq!(feb.sales_date, NaiveDate::from_ymd_opt(2020, 2, 1).unwrap());
        assert_eq!(feb.sales, None);
        let apr = &extract.store[3];
        assert_eq!(apr.sales, None);
        let dec = &extract.store[11];
        assert_eq!(dec.sales, Some(210.0));

        // gapped year publishes no source total
        assert!(extract.annual.is_empty());
        Ok(())
    }

    #[test]
    fn annual_totals_come_from_complete_store_years() -> Result<()> {
        let dir = tempdir()?;
        write_sheet(
            dir.path(),
            "mrts_2019.csv",
            "44811,Men's clothing,1,2,3,4,5,6,7,8,9,10,11,14\n",
        );
        let mut supplier = DirSupplier::new(dir.path());
        let extract = supplier.fetch()?;
        assert_eq!(extract.annual.len(), 1);
        assert_eq!(extract.annual[0].year, 2019);
        assert_eq!(extract.annual[0].total, 80.0);
        Ok(())
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempdir().unwrap();
        let mut supplier = DirSupplier::new(dir.path());
        assert!(supplier.fetch().is_err());
    }
}
