use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?\d+(?:\.\d+)?$").unwrap());
static RATIO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.\d+$").unwrap());

/// One line of report text, tagged with what it looks like.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricLine {
    Currency(Decimal),
    Ratio(Decimal),
    Literal(String),
    Blank,
}

impl MetricLine {
    pub fn currency(&self) -> Option<Decimal> {
        match self {
            MetricLine::Currency(v) => Some(*v),
            _ => None,
        }
    }

    pub fn ratio(&self) -> Option<Decimal> {
        match self {
            MetricLine::Ratio(v) => Some(*v),
            _ => None,
        }
    }
}

/// Classify a single line. Numeric-looking text that fails to convert
/// comes back as `Literal`, so callers only ever see well-formed values.
pub fn classify_line(line: &str) -> MetricLine {
    let line = line.trim();
    if line.is_empty() {
        return MetricLine::Blank;
    }

    // ── $12,345.67 ──
    if let Some(amount) = line.strip_prefix('$') {
        return match parse_amount(amount) {
            Some(v) => MetricLine::Currency(v),
            None => MetricLine::Literal(line.to_string()),
        };
    }

    // ── 3.25 (fraction required) ──
    if RATIO_RE.is_match(line) {
        if let Ok(v) = Decimal::from_str(line) {
            return MetricLine::Ratio(v);
        }
    }

    MetricLine::Literal(line.to_string())
}

fn parse_amount(amount: &str) -> Option<Decimal> {
    let cleaned = amount.replace(',', "");
    let cleaned = cleaned.trim();
    if !AMOUNT_RE.is_match(cleaned) {
        return None;
    }
    Decimal::from_str(cleaned).ok()
}
