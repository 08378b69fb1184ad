// src/bin/verify_counts.rs
//
// Standalone recount: re-reads the source sheets, reclassifies gaps, and
// compares the expected counts against an existing database file.

use anyhow::{Context, Result};
use mrtsetl::{
    clean,
    ingest::{DirSupplier, SalesSupplier},
    store,
};
use std::path::PathBuf;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let data_dir = PathBuf::from(args.next().unwrap_or_else(|| "data".to_string()));
    let db_path = PathBuf::from(args.next().unwrap_or_else(|| "mrts.duckdb".to_string()));

    // 1) recount from source
    let mut supplier = DirSupplier::new(&data_dir);
    let extract = supplier
        .fetch()
        .with_context(|| format!("recounting sheets under {:?}", data_dir))?;
    let summary = clean::classify(&extract.store);
    let dropped = summary.dropped_observation_count();
    let expected_store = extract.store.len() - dropped;

    // 2) recount from the database
    let conn = store::open_disk_db(&db_path)?;
    let db_combined = store::combined_sales_count(&conn)?;
    let db_store = store::store_sales_count(&conn)?;

    // 3) summary table
    //
    // delta = count(db) - count(expected from source)
    let delta_combined = db_combined - extract.combined.len() as i64;
    let delta_store = db_store - expected_store as i64;

    println!("{: <20} {:>12} {:>12} {:>10}", "Table", "Source", "DB", "Delta");
    println!("{:-<58}", "");
    println!(
        "{: <20} {:>12} {:>12} {:>10}",
        "combined_sales",
        extract.combined.len(),
        db_combined,
        delta_combined
    );
    println!(
        "{: <20} {:>12} {:>12} {:>10}",
        "store_sales", expected_store, db_store, delta_store
    );
    println!(
        "\n(store source count {} less {} dropped by the gap policy)",
        extract.store.len(),
        dropped
    );

    if delta_combined != 0 || delta_store != 0 {
        anyhow::bail!("record counts do not reconcile");
    }
    Ok(())
}
