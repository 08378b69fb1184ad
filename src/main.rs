use anyhow::Result;
use mrtsetl::{
    audit, clean, config,
    ingest::{DirSupplier, SalesSupplier},
    store,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();
    info!("startup");

    // ─── 2) load config ──────────────────────────────────────────────
    let cfg_path = std::env::var_os("MRTSETL_CONFIG").map(PathBuf::from);
    let cfg = config::load(cfg_path.as_deref())?;
    info!(data_dir = %cfg.data_dir.display(), db = %cfg.db_path.display(), "configured");

    // ─── 3) ingest raw sales sheets ──────────────────────────────────
    let mut supplier = DirSupplier::new(&cfg.data_dir);
    let extract = supplier.fetch()?;

    // ─── 4) classify gaps and repair the store series ────────────────
    // a CleanError here is fatal; nothing gets persisted
    let cleaned = clean::run_clean(&extract.store)?;

    // ─── 5) persist both families ────────────────────────────────────
    let conn = store::open_disk_db(&cfg.db_path)?;
    store::create_tables(&conn)?;
    store::empty_tables(&conn)?;
    store::append_combined_sales(&conn, &extract.combined)?;
    store::append_store_sales(&conn, &cleaned.observations)?;

    // ─── 6) reconcile source against the store ───────────────────────
    let report = audit::run_audit(
        &conn,
        extract.combined.len() as i64,
        cleaned.original_count as i64,
        cleaned.dropped_count as i64,
        &extract.annual,
    )?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.passed() {
        anyhow::bail!("reconciliation failed; see variances above");
    }
    info!("all done");
    Ok(())
}
