use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rust_decimal::Decimal;

use crate::parser::campaigns::CanonicalCampaign;
use crate::report::RecordSet;

const MISSING: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    /// One row per campaign with spend, revenue and raw label
    Detailed,
    /// Single row: week, overall ROAS, then every canonical campaign in order
    Tracker,
    /// Two columns (campaign, ROAS) in tracker order
    Ab,
    /// Overall and adjusted totals
    Summary,
    /// Serialized report summary
    Json,
}

impl ExportFormat {
    fn name(self) -> &'static str {
        match self {
            ExportFormat::Detailed => "detailed",
            ExportFormat::Tracker => "tracker",
            ExportFormat::Ab => "ab",
            ExportFormat::Summary => "summary",
            ExportFormat::Json => "json",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            _ => "csv",
        }
    }

    pub fn default_file_name(self, week: &str) -> String {
        format!("week_{}_{}.{}", week, self.name(), self.extension())
    }
}

/// Write `set` in the given format to `path`, creating parent directories.
pub fn write_export(set: &RecordSet, format: ExportFormat, path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    match format {
        ExportFormat::Json => {
            let json = serde_json::to_string_pretty(&set.summary())?;
            std::fs::write(path, json + "\n")
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        _ => write_csv(path, &rows(set, format))?,
    }
    Ok(path.to_path_buf())
}

fn write_csv(path: &Path, rows: &[Vec<String>]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Header row first. JSON has no tabular form and yields nothing.
pub fn rows(set: &RecordSet, format: ExportFormat) -> Vec<Vec<String>> {
    match format {
        ExportFormat::Detailed => detailed_rows(set),
        ExportFormat::Tracker => tracker_rows(set),
        ExportFormat::Ab => ab_rows(set),
        ExportFormat::Summary => summary_rows(set),
        ExportFormat::Json => Vec::new(),
    }
}

fn text(v: Option<Decimal>) -> String {
    v.map(|d| d.to_string()).unwrap_or_default()
}

fn detailed_rows(set: &RecordSet) -> Vec<Vec<String>> {
    let mut rows = vec![strings(&[
        "Week",
        "Campaign Name",
        "Spend",
        "Revenue",
        "ROAS",
        "Raw Campaign Name",
        "Ad Group",
    ])];
    for r in &set.records {
        rows.push(vec![
            set.week.clone(),
            r.canonical.as_str().to_string(),
            r.spend.to_string(),
            text(r.revenue),
            r.ratio.to_string(),
            r.raw_name.clone(),
            r.ad_group.clone().unwrap_or_default(),
        ]);
    }
    rows
}

fn tracker_rows(set: &RecordSet) -> Vec<Vec<String>> {
    let mut header = strings(&["Week", "Overall ROAS"]);
    header.extend(CanonicalCampaign::ALL.iter().map(|c| c.as_str().to_string()));

    let mut row = vec![set.week.clone(), text(set.overall_roas)];
    row.extend(CanonicalCampaign::ALL.iter().map(|&c| {
        set.find(c)
            .map(|r| r.ratio.to_string())
            .unwrap_or_else(|| MISSING.to_string())
    }));

    vec![header, row]
}

fn ab_rows(set: &RecordSet) -> Vec<Vec<String>> {
    let mut rows = vec![strings(&["Campaign Name", "ROAS"])];
    if let Some(roas) = set.overall_roas {
        rows.push(vec![format!("Week {} Overall ROAS", set.week), roas.to_string()]);
    }
    rows.push(vec![String::new(), String::new()]);
    for c in CanonicalCampaign::ALL {
        let roas = set.find(c).map(|r| r.ratio.to_string()).unwrap_or_default();
        rows.push(vec![c.as_str().to_string(), roas]);
    }
    rows
}

fn summary_rows(set: &RecordSet) -> Vec<Vec<String>> {
    let t = &set.overall;
    let metrics = [
        ("Total Spend", t.total_spend),
        ("Total Revenue", t.total_revenue),
        ("Total ROAS", t.total_ratio),
        ("Adjusted Spend", t.adjusted_spend),
        ("Adjusted Revenue", t.adjusted_revenue),
        ("Adjusted ROAS", t.adjusted_ratio),
    ];

    let mut rows = vec![strings(&["Metric", "Value"])];
    rows.extend(
        metrics
            .iter()
            .filter_map(|(label, v)| v.map(|d| vec![label.to_string(), d.to_string()])),
    );
    rows
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
