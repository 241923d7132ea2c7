use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::parser::ParsedReport;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS reports (
            id                INTEGER PRIMARY KEY,
            week              TEXT NOT NULL,
            source            TEXT NOT NULL,
            overall_roas      REAL,
            total_spend       REAL,
            total_revenue     REAL,
            total_roas        REAL,
            adjusted_spend    REAL,
            adjusted_revenue  REAL,
            adjusted_roas     REAL,
            unrecognized      TEXT,
            incomplete_blocks INTEGER NOT NULL DEFAULT 0,
            imported_at       TEXT NOT NULL,
            UNIQUE(week, source)
        );
        CREATE INDEX IF NOT EXISTS idx_reports_week ON reports(week);

        CREATE TABLE IF NOT EXISTS report_campaigns (
            id          INTEGER PRIMARY KEY,
            report_id   INTEGER NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
            position    INTEGER NOT NULL,
            canonical   TEXT NOT NULL,
            raw_name    TEXT NOT NULL,
            ad_group    TEXT,
            spend       REAL NOT NULL,
            revenue     REAL,
            roas        REAL NOT NULL,
            UNIQUE(report_id, position)
        );
        CREATE INDEX IF NOT EXISTS idx_campaigns_canonical ON report_campaigns(canonical);
        ",
    )?;
    Ok(())
}

fn real(v: Option<Decimal>) -> Option<f64> {
    v.and_then(|d| d.to_f64())
}

/// Store parsed reports keyed by (week, source). Importing the same source
/// again replaces the earlier rows.
pub fn save_reports(conn: &Connection, reports: &[(String, ParsedReport)]) -> Result<usize> {
    let imported_at = chrono::Utc::now().to_rfc3339();
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut del_stmt = tx.prepare("DELETE FROM reports WHERE week = ?1 AND source = ?2")?;
        let mut r_stmt = tx.prepare(
            "INSERT INTO reports
             (week, source, overall_roas, total_spend, total_revenue, total_roas,
              adjusted_spend, adjusted_revenue, adjusted_roas, unrecognized,
              incomplete_blocks, imported_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;
        let mut c_stmt = tx.prepare(
            "INSERT INTO report_campaigns
             (report_id, position, canonical, raw_name, ad_group, spend, revenue, roas)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;

        for (source, parsed) in reports {
            let set = &parsed.records;
            let totals = &set.overall;
            let unrecognized = if parsed.diagnostics.unrecognized.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&parsed.diagnostics.unrecognized)?)
            };

            del_stmt.execute(rusqlite::params![set.week, source])?;
            r_stmt.execute(rusqlite::params![
                set.week,
                source,
                real(set.overall_roas),
                real(totals.total_spend),
                real(totals.total_revenue),
                real(totals.total_ratio),
                real(totals.adjusted_spend),
                real(totals.adjusted_revenue),
                real(totals.adjusted_ratio),
                unrecognized,
                parsed.diagnostics.incomplete_blocks as i64,
                imported_at,
            ])?;
            let report_id = tx.last_insert_rowid();

            for (position, r) in set.records.iter().enumerate() {
                c_stmt.execute(rusqlite::params![
                    report_id,
                    position as i64,
                    r.canonical.as_str(),
                    r.raw_name,
                    r.ad_group,
                    real(Some(r.spend)),
                    real(r.revenue),
                    real(Some(r.ratio)),
                ])?;
            }
            count += 1;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── History ──

pub struct HistoryRow {
    pub week: String,
    pub source: String,
    pub canonical: String,
    pub spend: f64,
    pub revenue: Option<f64>,
    pub roas: f64,
}

/// Stored campaign figures, newest week first, in report order within a week.
pub fn fetch_history(conn: &Connection, campaign: Option<&str>, limit: usize) -> Result<Vec<HistoryRow>> {
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let where_clause = match campaign {
        Some(c) => {
            params.push(Box::new(format!("%{}%", c)));
            " WHERE c.canonical LIKE ?1"
        }
        None => "",
    };

    let sql = format!(
        "SELECT r.week, r.source, c.canonical, c.spend, c.revenue, c.roas
         FROM report_campaigns c
         JOIN reports r ON r.id = c.report_id{}
         ORDER BY CAST(r.week AS INTEGER) DESC, r.source, c.position
         LIMIT {}",
        where_clause, limit
    );

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(HistoryRow {
                week: row.get(0)?,
                source: row.get(1)?,
                canonical: row.get(2)?,
                spend: row.get(3)?,
                revenue: row.get(4)?,
                roas: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub reports: usize,
    pub weeks: usize,
    pub campaigns: usize,
    pub with_unrecognized: usize,
    pub incomplete_blocks: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let reports: usize = conn.query_row("SELECT COUNT(*) FROM reports", [], |r| r.get(0))?;
    let weeks: usize =
        conn.query_row("SELECT COUNT(DISTINCT week) FROM reports", [], |r| r.get(0))?;
    let campaigns: usize =
        conn.query_row("SELECT COUNT(*) FROM report_campaigns", [], |r| r.get(0))?;
    let with_unrecognized: usize = conn.query_row(
        "SELECT COUNT(*) FROM reports WHERE unrecognized IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let incomplete_blocks: usize = conn.query_row(
        "SELECT COALESCE(SUM(incomplete_blocks), 0) FROM reports",
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        reports,
        weeks,
        campaigns,
        with_unrecognized,
        incomplete_blocks,
    })
}
