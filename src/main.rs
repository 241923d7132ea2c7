mod db;
mod export;
mod parser;
mod report;
mod settings;
mod sheets;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use parser::{ParsedReport, ReportVariant};

#[derive(Parser)]
#[command(name = "roas_report", about = "Weekly ROAS email report parser")]
struct Cli {
    /// Campaign table layout (overrides the configured variant)
    #[arg(long, global = true, value_enum)]
    variant: Option<ReportVariant>,
    /// SQLite database path (overrides the configured db_path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse one report and print what was found
    Parse {
        file: PathBuf,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Parse one report and write it in an export format
    Export {
        file: PathBuf,
        #[arg(short, long, value_enum, default_value = "tracker")]
        format: export::ExportFormat,
        /// Output path (default: <output_dir>/week_<n>_<format>.<ext>)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Parse many reports and store them
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Stored weekly ROAS per campaign
    History {
        /// Filter by canonical campaign name (substring)
        #[arg(short, long)]
        campaign: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Show store statistics
    Stats,
    /// Write the report's ROAS values into the tracking sheet
    Push {
        file: PathBuf,
        /// Show the planned cell updates without sending them
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = settings::Settings::load()?;
    if let Some(variant) = cli.variant {
        settings.variant = variant;
    }
    if let Some(db) = cli.db {
        settings.db_path = db;
    }

    let result = match cli.command {
        Commands::Parse { file, json } => {
            let parsed = read_report(&file, settings.variant)?;
            log_diagnostics(&file, &parsed);
            let set = &parsed.records;

            if json {
                println!("{}", serde_json::to_string_pretty(&set.summary())?);
                return Ok(());
            }

            println!("Week:         {}", set.week);
            println!("Overall ROAS: {}", opt(set.overall_roas));
            println!();
            println!("{:<52} | {:>12} | {:>12} | {:>6}", "Campaign", "Spend", "Revenue", "ROAS");
            println!("{}", "-".repeat(92));
            for r in &set.records {
                println!(
                    "{:<52} | {:>12} | {:>12} | {:>6}",
                    truncate(r.canonical.as_str(), 52),
                    r.spend,
                    opt(r.revenue),
                    r.ratio
                );
            }

            let t = &set.overall;
            println!();
            println!(
                "Total:    spend {} | revenue {} | ROAS {}",
                opt(t.total_spend),
                opt(t.total_revenue),
                opt(t.total_ratio)
            );
            println!(
                "Adjusted: spend {} | revenue {} | ROAS {}",
                opt(t.adjusted_spend),
                opt(t.adjusted_revenue),
                opt(t.adjusted_ratio)
            );
            println!("\n{} campaigns", set.records.len());
            Ok(())
        }
        Commands::Export { file, format, out } => {
            let parsed = read_report(&file, settings.variant)?;
            log_diagnostics(&file, &parsed);
            let set = &parsed.records;
            let path = out.unwrap_or_else(|| settings.output_dir.join(format.default_file_name(&set.week)));
            let written = export::write_export(set, format, &path)?;
            println!("Wrote week {} ({} campaigns) to {}", set.week, set.records.len(), written.display());
            Ok(())
        }
        Commands::Import { files } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            println!("Importing {} reports...", files.len());
            let counts = import_reports(&conn, &files, settings.variant)?;
            counts.print();
            Ok(())
        }
        Commands::History { campaign, limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let rows = db::fetch_history(&conn, campaign.as_deref(), limit)?;
            if rows.is_empty() {
                println!("No stored reports. Run 'import' first.");
                return Ok(());
            }

            println!(
                "{:>3} | {:>7} | {:<48} | {:>12} | {:>12} | {:>6} | {:<20}",
                "#", "Week", "Campaign", "Spend", "Revenue", "ROAS", "Source"
            );
            println!("{}", "-".repeat(125));

            for (i, r) in rows.iter().enumerate() {
                let revenue = r.revenue.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".into());
                println!(
                    "{:>3} | {:>7} | {:<48} | {:>12.2} | {:>12} | {:>6.2} | {:<20}",
                    i + 1,
                    r.week,
                    truncate(&r.canonical, 48),
                    r.spend,
                    revenue,
                    r.roas,
                    truncate(&r.source, 20)
                );
            }

            println!("\n{} rows", rows.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Reports:           {}", s.reports);
            println!("Weeks:             {}", s.weeks);
            println!("Campaign rows:     {}", s.campaigns);
            println!("With unrecognized: {}", s.with_unrecognized);
            println!("Incomplete blocks: {}", s.incomplete_blocks);
            Ok(())
        }
        Commands::Push { file, dry_run } => {
            let sheet_settings = settings.sheets.clone().ok_or(sheets::SheetError::NotConfigured)?;
            let sheet_id = sheet_settings.sheet_id.clone();
            let parsed = read_report(&file, settings.variant)?;
            log_diagnostics(&file, &parsed);

            let client = sheets::SheetClient::new(sheet_settings);
            let layout = client.fetch_layout().await?;
            let plan = sheets::build_plan(&layout, &parsed.records)?;

            println!("Week {} -> column {}", plan.week, plan.week_column);
            for u in &plan.updates {
                println!("  {:<6} {:>6}  {}", u.cell, u.value, u.label);
            }
            for name in &plan.unmatched {
                warn!("No sheet row for {}", name);
            }
            for name in &plan.conflicts {
                warn!("Sheet row for {} already written by another campaign, skipped", name);
            }

            if dry_run {
                info!("Dry run, nothing sent to sheet {}", sheet_id);
                return Ok(());
            }
            let n = client.push(&plan).await?;
            println!("Updated {} cells.", n);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn read_report(path: &Path, variant: ReportVariant) -> anyhow::Result<ParsedReport> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    parser::parse_bytes(&bytes, variant).with_context(|| format!("Failed to parse {}", path.display()))
}

fn log_diagnostics(path: &Path, parsed: &ParsedReport) {
    let d = &parsed.diagnostics;
    if d.is_clean() {
        return;
    }
    for name in &d.unrecognized {
        warn!("{}: unrecognized campaign {:?}", path.display(), name);
    }
    if d.incomplete_blocks > 0 {
        warn!("{}: {} incomplete campaign blocks dropped", path.display(), d.incomplete_blocks);
    }
}

struct ImportCounts {
    reports: usize,
    campaigns: usize,
    unrecognized: usize,
    failed: usize,
}

impl ImportCounts {
    fn print(&self) {
        println!(
            "Saved {} reports, {} campaigns ({} unrecognized labels, {} files failed).",
            self.reports, self.campaigns, self.unrecognized, self.failed,
        );
    }
}

fn import_reports(
    conn: &rusqlite::Connection,
    files: &[PathBuf],
    variant: ReportVariant,
) -> anyhow::Result<ImportCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut counts = ImportCounts {
        reports: 0,
        campaigns: 0,
        unrecognized: 0,
        failed: 0,
    };

    for chunk in files.chunks(100) {
        let results: Vec<_> = chunk
            .par_iter()
            .map(|path| (path, read_report(path, variant)))
            .collect();

        let mut batch = Vec::new();
        for (path, result) in results {
            match result {
                Ok(parsed) => {
                    log_diagnostics(path, &parsed);
                    counts.campaigns += parsed.records.records.len();
                    counts.unrecognized += parsed.diagnostics.unrecognized.len();
                    let source = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string());
                    batch.push((source, parsed));
                }
                Err(e) => {
                    warn!("{:#}", e);
                    counts.failed += 1;
                }
            }
        }

        counts.reports += db::save_reports(conn, &batch)?;
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn opt(v: Option<rust_decimal::Decimal>) -> String {
    v.map(|d| d.to_string()).unwrap_or_else(|| "-".into())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
