pub mod campaigns;
pub mod sections;
pub mod tokens;
pub mod totals;

use serde::Deserialize;
use thiserror::Error;

use crate::report::{Diagnostics, RecordSet};

/// Which metric columns the campaign table carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ReportVariant {
    /// Spend, revenue, ROAS per campaign.
    #[default]
    Full,
    /// Spend and ROAS only.
    SpendOnly,
}

impl ReportVariant {
    pub fn requires_revenue(self) -> bool {
        matches!(self, ReportVariant::Full)
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("report is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReport {
    pub records: RecordSet,
    pub diagnostics: Diagnostics,
}

/// Independent passes over the same text: campaign table, totals blocks,
/// week / overall ROAS markers. Never fails; missing structure shows up as
/// empty or `None` fields.
pub fn parse_report(text: &str, variant: ReportVariant) -> ParsedReport {
    let scan = sections::scan_campaigns(text, variant);

    ParsedReport {
        records: RecordSet {
            week: totals::extract_week(text),
            overall_roas: totals::extract_overall_roas(text),
            overall: totals::extract_totals(text),
            records: scan.records,
        },
        diagnostics: scan.diagnostics,
    }
}

pub fn parse_bytes(bytes: &[u8], variant: ReportVariant) -> Result<ParsedReport, ParseError> {
    let text = std::str::from_utf8(bytes)?;
    Ok(parse_report(text, variant))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::*;
    use crate::parser::campaigns::CanonicalCampaign;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.txt", name)).unwrap()
    }

    #[test]
    fn end_to_end_single_campaign() {
        let text = "Campaign Name\nEVRGN_US_NAT_PROS_2024\n$12,345.67\n$45,678.90\n3.25\n\
                    TOTAL\n$12,345.67\n$45,678.90\n3.25";
        let parsed = parse_report(text, ReportVariant::Full);
        let set = &parsed.records;

        assert_eq!(set.records.len(), 1);
        let r = &set.records[0];
        assert_eq!(r.canonical.as_str(), "US Evergreen Prospecting (Lowest Cost)");
        assert_eq!(r.spend, dec("12345.67"));
        assert_eq!(r.revenue, Some(dec("45678.90")));
        assert_eq!(r.ratio, dec("3.25"));
        assert_eq!(set.overall.total_spend, Some(dec("12345.67")));
        assert_eq!(set.overall.total_ratio, Some(dec("3.25")));
        assert_eq!(set.week, "Unknown");
    }

    #[test]
    fn idempotent() {
        let text = fixture("week_37");
        let a = parse_report(&text, ReportVariant::Full);
        let b = parse_report(&text, ReportVariant::Full);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a.records).unwrap(),
            serde_json::to_string(&b.records).unwrap()
        );
    }

    #[test]
    fn empty_input() {
        let parsed = parse_report("", ReportVariant::Full);
        assert!(parsed.records.records.is_empty());
        assert_eq!(parsed.records.week, "Unknown");
        assert_eq!(parsed.records.overall_roas, None);
        assert!(parsed.diagnostics.is_clean());
    }

    #[test]
    fn rejects_invalid_utf8() {
        let err = parse_bytes(&[0x57, 0x4b, 0xff, 0xfe], ReportVariant::Full).unwrap_err();
        assert!(matches!(err, ParseError::InvalidUtf8(_)));
        assert!(parse_bytes(b"WK 3", ReportVariant::Full).is_ok());
    }

    #[test]
    fn week_37_fixture() {
        let parsed = parse_report(&fixture("week_37"), ReportVariant::Full);
        let set = &parsed.records;

        assert_eq!(set.week, "37");
        assert_eq!(set.overall_roas, Some(dec("3.24")));

        let got: Vec<CanonicalCampaign> = set.records.iter().map(|r| r.canonical).collect();
        assert_eq!(
            got,
            vec![
                CanonicalCampaign::UsSmartProspecting,
                CanonicalCampaign::UsProspectingCostCap,
                CanonicalCampaign::UsRetargeting,
                CanonicalCampaign::CanadaSmartProspecting,
                CanonicalCampaign::CanadaRetargeting,
                CanonicalCampaign::UsCnsSmart,
                CanonicalCampaign::CanadaCnsManual,
            ]
        );
        assert_eq!(set.records[0].ad_group.as_deref(), Some("US_NAT_BROAD_ALL"));
        assert_eq!(set.records[0].spend, dec("52310.44"));
        assert_eq!(set.records[0].ratio, dec("3.28"));
        assert_eq!(parsed.diagnostics.unrecognized, vec!["EVRGN_BRAND_AWARENESS_VIDEO".to_string()]);
        assert_eq!(parsed.diagnostics.incomplete_blocks, 0);

        assert_eq!(set.overall.total_spend, Some(dec("106142.29")));
        assert_eq!(set.overall.total_revenue, Some(dec("342662.34")));
        assert_eq!(set.overall.total_ratio, Some(dec("3.23")));
        assert_eq!(set.overall.adjusted_spend, Some(dec("104900.00")));
        assert_eq!(set.overall.adjusted_revenue, Some(dec("339876.00")));
        assert_eq!(set.overall.adjusted_ratio, Some(dec("3.24")));
    }

    #[test]
    fn spend_only_fixture() {
        let parsed = parse_report(&fixture("week_38_spend_only"), ReportVariant::SpendOnly);
        let set = &parsed.records;

        assert_eq!(set.week, "38");
        assert_eq!(set.overall_roas, None);
        assert_eq!(set.records.len(), 2);
        assert_eq!(set.records[0].canonical, CanonicalCampaign::UsProspecting);
        assert_eq!(set.records[0].spend, dec("8000"));
        assert_eq!(set.records[1].canonical, CanonicalCampaign::CanadaProspecting);
        assert!(set.records.iter().all(|r| r.revenue.is_none()));
        assert_eq!(parsed.diagnostics.incomplete_blocks, 1);
        assert_eq!(set.overall.total_spend, Some(dec("14500.50")));
        assert_eq!(set.overall.total_revenue, None);
    }

    #[test]
    fn spend_only_text_under_full_variant_drops_everything() {
        let parsed = parse_report(&fixture("week_38_spend_only"), ReportVariant::Full);
        assert!(parsed.records.records.is_empty());
        assert_eq!(parsed.diagnostics.incomplete_blocks, 3);
    }
}
