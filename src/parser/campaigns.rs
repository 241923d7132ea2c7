use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// "US" as a standalone token: `(US)`, `_US_`, `US NAT`, but not `AUS` or `CAROUSEL`.
static US_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^A-Za-z0-9])US(?:[^A-Za-z0-9]|$)").unwrap());

const SMART_MARKER: &str = "SMART";
const CNS_MARKER: &str = "CNS";
const RETARGETING_MARKER: &str = "RTG";
const PROSPECTING_MARKERS: &[&str] = &["TOF", "PROS"];
const COST_CAP_MARKER: &str = "CC";

/// The fixed reporting taxonomy. Declaration order is the tracker's row order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum CanonicalCampaign {
    #[serde(rename = "US Evergreen Prospecting (Lowest Cost)")]
    UsProspecting,
    #[serde(rename = "S+ 2.0 US Evergreen Prospecting (Lowest Cost)")]
    UsSmartProspecting,
    #[serde(rename = "US Evergreen Prospecting (Cost Cap)")]
    UsProspectingCostCap,
    #[serde(rename = "US Evergreen Retargeting (Lowest Cost)")]
    UsRetargeting,
    #[serde(rename = "Canada Evergreen Prospecting (Lowest Cost)")]
    CanadaProspecting,
    #[serde(rename = "S+ 2.0 Canada Evergreen Prospecting (Lowest Cost)")]
    CanadaSmartProspecting,
    #[serde(rename = "Canada Evergreen Retargeting (Lowest Cost)")]
    CanadaRetargeting,
    #[serde(rename = "US CNS Manual (carousel ads only - Lowest Cost)")]
    UsCnsManual,
    #[serde(rename = "US CNS S+ 2.0 (carousel ads only - Lowest Cost)")]
    UsCnsSmart,
    #[serde(rename = "Canada CNS Manual (carousel ads only - Lowest Cost)")]
    CanadaCnsManual,
    #[serde(rename = "Canada CNS S+ 2.0 (carousel ads only - Lowest Cost)")]
    CanadaCnsSmart,
}

impl CanonicalCampaign {
    pub const ALL: [CanonicalCampaign; 11] = [
        CanonicalCampaign::UsProspecting,
        CanonicalCampaign::UsSmartProspecting,
        CanonicalCampaign::UsProspectingCostCap,
        CanonicalCampaign::UsRetargeting,
        CanonicalCampaign::CanadaProspecting,
        CanonicalCampaign::CanadaSmartProspecting,
        CanonicalCampaign::CanadaRetargeting,
        CanonicalCampaign::UsCnsManual,
        CanonicalCampaign::UsCnsSmart,
        CanonicalCampaign::CanadaCnsManual,
        CanonicalCampaign::CanadaCnsSmart,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalCampaign::UsProspecting => "US Evergreen Prospecting (Lowest Cost)",
            CanonicalCampaign::UsSmartProspecting => "S+ 2.0 US Evergreen Prospecting (Lowest Cost)",
            CanonicalCampaign::UsProspectingCostCap => "US Evergreen Prospecting (Cost Cap)",
            CanonicalCampaign::UsRetargeting => "US Evergreen Retargeting (Lowest Cost)",
            CanonicalCampaign::CanadaProspecting => "Canada Evergreen Prospecting (Lowest Cost)",
            CanonicalCampaign::CanadaSmartProspecting => {
                "S+ 2.0 Canada Evergreen Prospecting (Lowest Cost)"
            }
            CanonicalCampaign::CanadaRetargeting => "Canada Evergreen Retargeting (Lowest Cost)",
            CanonicalCampaign::UsCnsManual => "US CNS Manual (carousel ads only - Lowest Cost)",
            CanonicalCampaign::UsCnsSmart => "US CNS S+ 2.0 (carousel ads only - Lowest Cost)",
            CanonicalCampaign::CanadaCnsManual => {
                "Canada CNS Manual (carousel ads only - Lowest Cost)"
            }
            CanonicalCampaign::CanadaCnsSmart => {
                "Canada CNS S+ 2.0 (carousel ads only - Lowest Cost)"
            }
        }
    }
}

impl fmt::Display for CanonicalCampaign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Geography {
    Us,
    Canada,
}

impl Geography {
    // Anything without a US marker is treated as Canada.
    fn detect(label: &str) -> Self {
        if US_MARKER_RE.is_match(label) {
            Geography::Us
        } else {
            Geography::Canada
        }
    }
}

/// Map a vendor campaign label onto the taxonomy.
///
/// Rules are checked in a fixed order (CNS, retargeting, prospecting) since a
/// label can carry several keywords. `None` means the record must be dropped.
pub fn classify(label: &str) -> Option<CanonicalCampaign> {
    use CanonicalCampaign::*;

    if label.is_empty() {
        return None;
    }

    let geography = Geography::detect(label);
    let smart = label.contains(SMART_MARKER);

    if label.contains(CNS_MARKER) {
        return Some(match (geography, smart) {
            (Geography::Us, true) => UsCnsSmart,
            (Geography::Us, false) => UsCnsManual,
            (Geography::Canada, true) => CanadaCnsSmart,
            (Geography::Canada, false) => CanadaCnsManual,
        });
    }

    if label.contains(RETARGETING_MARKER) {
        return Some(match geography {
            Geography::Us => UsRetargeting,
            Geography::Canada => CanadaRetargeting,
        });
    }

    if PROSPECTING_MARKERS.iter().any(|m| label.contains(m)) {
        // Cost cap only exists as a US line item.
        if label.contains(COST_CAP_MARKER) {
            return Some(UsProspectingCostCap);
        }
        return Some(match (geography, smart) {
            (Geography::Us, true) => UsSmartProspecting,
            (Geography::Us, false) => UsProspecting,
            (Geography::Canada, true) => CanadaSmartProspecting,
            (Geography::Canada, false) => CanadaProspecting,
        });
    }

    None
}
