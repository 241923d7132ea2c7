use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use super::tokens::classify_line;
use crate::report::OverallTotals;

static WEEK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)WK\s+(\d+)").unwrap());
static ROAS_SENTENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Week\s+\d+.*?drove\s+a\s+(\d+\.?\d*)x\s+ROAS").unwrap()
});
static ROAS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(\d+\.?\d*)x\s+ROAS").unwrap());

const TOTAL_MARKER: &str = "TOTAL";
const ADJUSTED_MARKER: &str = "Total (minus credit + lag revenue)";
pub const UNKNOWN_WEEK: &str = "Unknown";

/// `WK 37` anywhere in the text, first match wins.
pub fn extract_week(text: &str) -> String {
    WEEK_RE
        .captures(text)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| UNKNOWN_WEEK.to_string())
}

/// "Week 37 drove a 3.24x ROAS", falling back to any "<n>x ROAS".
pub fn extract_overall_roas(text: &str) -> Option<Decimal> {
    ROAS_SENTENCE_RE
        .captures(text)
        .or_else(|| ROAS_RE.captures(text))
        .and_then(|caps| Decimal::from_str(&caps[1]).ok())
}

/// Scan for the TOTAL and adjusted blocks, each followed by spend, revenue
/// and ratio on the next three lines. A later block only overwrites the
/// fields it actually parsed.
pub fn extract_totals(text: &str) -> OverallTotals {
    let lines: Vec<&str> = text.lines().collect();
    let mut totals = OverallTotals::default();

    for (i, line) in lines.iter().enumerate() {
        let line = line.trim();

        if line == TOTAL_MARKER {
            let t = read_triplet(&lines, i);
            totals.total_spend = t.spend.or(totals.total_spend);
            totals.total_revenue = t.revenue.or(totals.total_revenue);
            totals.total_ratio = t.ratio.or(totals.total_ratio);
        }

        if line.contains(ADJUSTED_MARKER) {
            let t = read_triplet(&lines, i);
            totals.adjusted_spend = t.spend.or(totals.adjusted_spend);
            totals.adjusted_revenue = t.revenue.or(totals.adjusted_revenue);
            totals.adjusted_ratio = t.ratio.or(totals.adjusted_ratio);
        }
    }

    totals
}

struct Triplet {
    spend: Option<Decimal>,
    revenue: Option<Decimal>,
    ratio: Option<Decimal>,
}

fn read_triplet(lines: &[&str], marker: usize) -> Triplet {
    let at = |offset: usize| lines.get(marker + offset).map(|l| classify_line(l));
    Triplet {
        spend: at(1).and_then(|m| m.currency()),
        revenue: at(2).and_then(|m| m.currency()),
        ratio: at(3).and_then(|m| m.ratio()),
    }
}
