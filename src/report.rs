use rust_decimal::Decimal;
use serde::Serialize;

use crate::parser::campaigns::CanonicalCampaign;

/// One finalized campaign line from the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignRecord {
    pub canonical: CanonicalCampaign,
    pub raw_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad_group: Option<String>,
    pub spend: Decimal,
    pub revenue: Option<Decimal>,
    pub ratio: Decimal,
}

/// Grand total and adjusted (minus credit + lag revenue) blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverallTotals {
    pub total_spend: Option<Decimal>,
    pub total_revenue: Option<Decimal>,
    pub total_ratio: Option<Decimal>,
    pub adjusted_spend: Option<Decimal>,
    pub adjusted_revenue: Option<Decimal>,
    pub adjusted_ratio: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSet {
    pub week: String,
    pub overall_roas: Option<Decimal>,
    pub overall: OverallTotals,
    pub records: Vec<CampaignRecord>,
}

impl RecordSet {
    pub fn find(&self, campaign: CanonicalCampaign) -> Option<&CampaignRecord> {
        self.records.iter().find(|r| r.canonical == campaign)
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            week: self.week.clone(),
            overall_roas: self.overall_roas,
            campaigns: self
                .records
                .iter()
                .map(|r| CampaignSummary {
                    name: r.canonical.as_str().to_string(),
                    roas: r.ratio,
                    spend: Some(r.spend),
                    revenue: r.revenue,
                })
                .collect(),
            total_campaigns: self.records.len(),
        }
    }
}

/// What the parser threw away, for the caller to report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Raw names of complete blocks that matched no canonical campaign.
    pub unrecognized: Vec<String>,
    /// Blocks dropped before all required fields were seen.
    pub incomplete_blocks: usize,
}

impl Diagnostics {
    pub fn is_clean(&self) -> bool {
        self.unrecognized.is_empty() && self.incomplete_blocks == 0
    }
}

/// Serialized hand-off shape consumed by the sinks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub week: String,
    pub overall_roas: Option<Decimal>,
    pub campaigns: Vec<CampaignSummary>,
    pub total_campaigns: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignSummary {
    pub name: String,
    pub roas: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spend: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue: Option<Decimal>,
}
