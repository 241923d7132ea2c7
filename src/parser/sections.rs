use rust_decimal::Decimal;
use tracing::debug;

use super::campaigns;
use super::tokens::{classify_line, MetricLine};
use super::ReportVariant;
use crate::report::{CampaignRecord, Diagnostics};

const SECTION_HEADER: &str = "Campaign Name";
const SECTION_END: &str = "TOTAL";
const VENDOR_MARKER: &str = "EVRGN";
const AD_GROUP_MARKERS: &[&str] = &["US_NAT", "CA_NAT"];

/// A campaign block being filled in, line by line.
#[derive(Debug)]
struct CampaignBlock {
    raw_name: String,
    ad_group: Option<String>,
    spend: Option<Decimal>,
    revenue: Option<Decimal>,
}

impl CampaignBlock {
    fn new(raw_name: &str) -> Self {
        CampaignBlock {
            raw_name: raw_name.to_string(),
            ad_group: None,
            spend: None,
            revenue: None,
        }
    }

    /// Amounts fill spend, then revenue; anything after that is ignored.
    fn accept_amount(&mut self, amount: Decimal, variant: ReportVariant) {
        if self.spend.is_none() {
            self.spend = Some(amount);
        } else if variant.requires_revenue() && self.revenue.is_none() {
            self.revenue = Some(amount);
        }
    }

    fn accept_literal(&mut self, text: &str) {
        if self.ad_group.is_none() && AD_GROUP_MARKERS.iter().any(|m| text.contains(m)) {
            self.ad_group = Some(text.to_string());
        }
    }

    /// Close the block with its ratio. `Err` hands the block back when a
    /// required field never arrived.
    fn finish(self, ratio: Decimal, variant: ReportVariant) -> Result<CompleteBlock, CampaignBlock> {
        let revenue_ok = !variant.requires_revenue() || self.revenue.is_some();
        match self.spend {
            Some(spend) if revenue_ok => Ok(CompleteBlock {
                raw_name: self.raw_name,
                ad_group: self.ad_group,
                spend,
                revenue: self.revenue,
                ratio,
            }),
            _ => Err(self),
        }
    }
}

struct CompleteBlock {
    raw_name: String,
    ad_group: Option<String>,
    spend: Decimal,
    revenue: Option<Decimal>,
    ratio: Decimal,
}

#[derive(Debug)]
enum SectionState {
    Seeking,
    Open(Option<CampaignBlock>),
    Closed,
}

pub struct CampaignScan {
    pub records: Vec<CampaignRecord>,
    pub diagnostics: Diagnostics,
}

/// Walk the campaign table from the "Campaign Name" header to the first
/// TOTAL line, emitting one record per complete, classifiable block.
pub fn scan_campaigns(text: &str, variant: ReportVariant) -> CampaignScan {
    let mut scan = CampaignScan {
        records: Vec::new(),
        diagnostics: Diagnostics::default(),
    };
    let mut state = SectionState::Seeking;

    for line in text.lines() {
        if matches!(state, SectionState::Closed) {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        state = match state {
            SectionState::Seeking if line.contains(SECTION_HEADER) => SectionState::Open(None),
            SectionState::Seeking => SectionState::Seeking,
            SectionState::Open(block) => step(block, line, variant, &mut scan),
            SectionState::Closed => SectionState::Closed,
        };
    }

    // Text ran out before TOTAL
    if let SectionState::Open(Some(block)) = state {
        debug!(raw_name = %block.raw_name, "report ended inside a campaign block");
        scan.diagnostics.incomplete_blocks += 1;
    }

    scan
}

fn step(
    block: Option<CampaignBlock>,
    line: &str,
    variant: ReportVariant,
    scan: &mut CampaignScan,
) -> SectionState {
    // Repeated table header
    if line.contains(SECTION_HEADER) {
        return SectionState::Open(block);
    }

    if line.contains(SECTION_END) {
        if let Some(b) = block {
            debug!(raw_name = %b.raw_name, "campaign section closed inside a block");
            scan.diagnostics.incomplete_blocks += 1;
        }
        return SectionState::Closed;
    }

    let Some(mut block) = block else {
        if line.contains(VENDOR_MARKER) {
            return SectionState::Open(Some(CampaignBlock::new(line)));
        }
        return SectionState::Open(None);
    };

    match classify_line(line) {
        MetricLine::Currency(amount) => {
            block.accept_amount(amount, variant);
            SectionState::Open(Some(block))
        }
        MetricLine::Ratio(ratio) => {
            finalize(block, ratio, variant, scan);
            SectionState::Open(None)
        }
        MetricLine::Literal(text) => {
            block.accept_literal(&text);
            SectionState::Open(Some(block))
        }
        MetricLine::Blank => SectionState::Open(Some(block)),
    }
}

fn finalize(block: CampaignBlock, ratio: Decimal, variant: ReportVariant, scan: &mut CampaignScan) {
    let done = match block.finish(ratio, variant) {
        Ok(done) => done,
        Err(partial) => {
            debug!(raw_name = %partial.raw_name, "ratio reached before spend/revenue, block dropped");
            scan.diagnostics.incomplete_blocks += 1;
            return;
        }
    };

    match campaigns::classify(&done.raw_name) {
        Some(canonical) => scan.records.push(CampaignRecord {
            canonical,
            raw_name: done.raw_name,
            ad_group: done.ad_group,
            spend: done.spend,
            revenue: done.revenue,
            ratio: done.ratio,
        }),
        None => {
            debug!(raw_name = %done.raw_name, "no canonical campaign for label");
            scan.diagnostics.unrecognized.push(done.raw_name);
        }
    }
}
