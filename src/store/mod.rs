// src/store/mod.rs

use anyhow::{Context, Result};
use duckdb::{Connection, ToSql};
use std::path::Path;
use tracing::info;

use crate::ingest::{AnnualTotal, Observation};

/// Open a DuckDB database on disk at `path`, creating the file if it doesn't
/// exist. The connection is owned by the caller; nothing in this module holds
/// a handle.
pub fn open_disk_db(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();
    let conn = Connection::open(path)
        .with_context(|| format!("opening DuckDB database {:?}", path))?;
    Ok(conn)
}

/// Open a DuckDB in-memory database.
pub fn open_mem_db() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("opening in-memory DuckDB database")?;
    Ok(conn)
}

/// Create both sales tables if they don't exist.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS combined_sales (
            sales_date DATE NOT NULL,
            sales DOUBLE,
            cat_name VARCHAR NOT NULL
        );
        CREATE TABLE IF NOT EXISTS store_sales (
            sales_date DATE NOT NULL,
            sales DOUBLE,
            cat_name VARCHAR NOT NULL,
            cat_code VARCHAR NOT NULL
        );",
    )
    .context("creating sales tables")?;
    Ok(())
}

/// Delete every row from both sales tables, keeping the tables themselves.
pub fn empty_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch("DELETE FROM combined_sales; DELETE FROM store_sales;")
        .context("emptying sales tables")?;
    Ok(())
}

/// Drop both sales tables.
pub fn drop_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "DROP TABLE IF EXISTS combined_sales; DROP TABLE IF EXISTS store_sales;",
    )
    .context("dropping sales tables")?;
    Ok(())
}

/// Bulk-append the aggregate series via the Appender API. Returns the number
/// of rows appended.
pub fn append_combined_sales(conn: &Connection, rows: &[Observation]) -> Result<usize> {
    let mut appender = conn
        .appender("combined_sales")
        .context("creating appender for combined_sales")?;
    appender.append_rows(rows.iter().map(|o| {
        [
            &o.sales_date as &dyn ToSql,
            &o.sales as &dyn ToSql,
            &o.cat_name as &dyn ToSql,
        ]
    }))?;
    appender.flush()?;
    info!(rows = rows.len(), "appended combined_sales");
    Ok(rows.len())
}

/// Bulk-append the granular series. Returns the number of rows appended.
pub fn append_store_sales(conn: &Connection, rows: &[Observation]) -> Result<usize> {
    let mut appender = conn
        .appender("store_sales")
        .context("creating appender for store_sales")?;
    appender.append_rows(rows.iter().map(|o| {
        [
            &o.sales_date as &dyn ToSql,
            &o.sales as &dyn ToSql,
            &o.cat_name as &dyn ToSql,
            &o.cat_code as &dyn ToSql,
        ]
    }))?;
    appender.flush()?;
    info!(rows = rows.len(), "appended store_sales");
    Ok(rows.len())
}

pub fn combined_sales_count(conn: &Connection) -> Result<i64> {
    let count = conn
        .query_row("SELECT COUNT(*) FROM combined_sales;", [], |r| r.get(0))
        .context("counting combined_sales")?;
    Ok(count)
}

pub fn store_sales_count(conn: &Connection) -> Result<i64> {
    let count = conn
        .query_row("SELECT COUNT(*) FROM store_sales;", [], |r| r.get(0))
        .context("counting store_sales")?;
    Ok(count)
}

/// Recompute annual totals from the persisted granular series, grouped by
/// year and category, ordered by year then category to match the source-side
/// ordering.
pub fn store_annual_totals(conn: &Connection) -> Result<Vec<AnnualTotal>> {
    let mut stmt = conn
        .prepare(
            "SELECT CAST(EXTRACT(year FROM sales_date) AS INTEGER) AS year,
                    cat_name,
                    SUM(sales) AS annual_sales
             FROM store_sales
             GROUP BY year, cat_name
             ORDER BY year, cat_name;",
        )
        .context("preparing annual totals query")?;
    let totals = stmt
        .query_map([], |row| {
            Ok(AnnualTotal {
                year: row.get(0)?,
                cat_name: row.get(1)?,
                total: row.get(2)?,
            })
        })
        .context("querying annual totals")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("reading annual totals rows")?;
    Ok(totals)
}
