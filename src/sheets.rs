use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::report::RecordSet;
use crate::settings::SheetSettings;

static WEEK_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)week\s*(\d+)").unwrap());

const CAMPAIGN_ROW_KEYWORDS: &[&str] = &["evergreen", "prospecting", "retargeting", "cns", "s+"];
const MATCH_TERMS: &[&str] = &[
    "us",
    "canada",
    "evergreen",
    "prospecting",
    "retargeting",
    "cns",
    "s+",
    "cost cap",
    "lowest cost",
    "manual",
    "carousel",
];
const MATCH_THRESHOLD: f64 = 0.7;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("sheets are not configured (set sheets.spreadsheet_token, sheets.sheet_id, sheets.access_token)")]
    NotConfigured,
    #[error("sheet request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("sheet API error {code}: {msg}")]
    Api { code: i64, msg: String },
    #[error("no \"Week {0}\" column in the sheet header row")]
    WeekColumnMissing(String),
    #[error("nothing to write for week {0}")]
    NothingToUpdate(String),
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ValueRangeData {
    #[serde(rename = "valueRange")]
    value_range: ValueRange,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Where things live in the tracking sheet. Rows are 1-based.
#[derive(Debug, Default, PartialEq)]
pub struct SheetLayout {
    pub week_columns: HashMap<String, String>,
    pub campaign_rows: Vec<(String, usize)>,
    pub overall_roas_row: Option<usize>,
}

impl SheetLayout {
    pub fn from_values(values: &[Vec<Value>]) -> Self {
        let mut layout = SheetLayout::default();

        for (row_idx, row) in values.iter().enumerate() {
            if row.is_empty() {
                continue;
            }

            if row_idx == 0 {
                for (col_idx, cell) in row.iter().enumerate() {
                    if let Some(caps) = WEEK_HEADER_RE.captures(&cell_text(cell)) {
                        layout
                            .week_columns
                            .insert(caps[1].to_string(), column_letter(col_idx + 1));
                    }
                }
            }

            let first = cell_text(&row[0]).trim().to_string();
            let lower = first.to_lowercase();
            if lower.contains("overall") && lower.contains("roas") {
                layout.overall_roas_row = Some(row_idx + 1);
            }
            if CAMPAIGN_ROW_KEYWORDS.iter().any(|k| lower.contains(k)) {
                layout.campaign_rows.push((first, row_idx + 1));
            }
        }

        layout
    }

    /// Row whose label equals `name`, ignoring case.
    fn exact_row(&self, name: &str) -> Option<usize> {
        let wanted = name.trim().to_lowercase();
        self.campaign_rows
            .iter()
            .find(|(sheet_name, _)| sheet_name.trim().to_lowercase() == wanted)
            .map(|(_, row)| *row)
    }

    /// First row not in `taken` that fuzzily matches `name`.
    fn fuzzy_row(&self, name: &str, taken: &HashSet<usize>) -> Option<usize> {
        self.campaign_rows
            .iter()
            .find(|(sheet_name, row)| !taken.contains(row) && campaigns_match(name, sheet_name))
            .map(|(_, row)| *row)
    }
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 1 → A, 26 → Z, 27 → AA.
pub fn column_letter(mut col: usize) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        col -= 1;
        letters.push((b'A' + (col % 26) as u8) as char);
        col /= 26;
    }
    letters.iter().rev().collect()
}

/// `term` occurs in `text` with no letter or digit on either side.
fn has_term(text: &str, term: &str) -> bool {
    text.match_indices(term).any(|(i, _)| {
        let before = text[..i].chars().next_back();
        let after = text[i + term.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn region<'a>(terms: &[&'a str]) -> Option<&'a str> {
    ["canada", "us"].into_iter().find(|r| terms.contains(r))
}

/// Loose comparison of a canonical name against a sheet row label: equal
/// ignoring case, or same region and sharing at least 70% of the smaller
/// key-term set.
pub fn campaigns_match(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a == b {
        return true;
    }

    let a_terms: Vec<&str> = MATCH_TERMS.iter().copied().filter(|t| has_term(&a, t)).collect();
    let b_terms: Vec<&str> = MATCH_TERMS.iter().copied().filter(|t| has_term(&b, t)).collect();
    if a_terms.is_empty() || b_terms.is_empty() {
        return false;
    }
    if let (Some(ra), Some(rb)) = (region(&a_terms), region(&b_terms)) {
        if ra != rb {
            return false;
        }
    }

    let common = a_terms.iter().filter(|t| b_terms.contains(t)).count();
    let threshold = a_terms.len().min(b_terms.len()) as f64 * MATCH_THRESHOLD;
    common as f64 >= threshold
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellUpdate {
    pub cell: String,
    pub value: Decimal,
    pub label: String,
}

#[derive(Debug, PartialEq)]
pub struct UpdatePlan {
    pub week: String,
    pub week_column: String,
    pub updates: Vec<CellUpdate>,
    /// Records with no sheet row.
    pub unmatched: Vec<String>,
    /// Records whose row was already claimed by an earlier cell.
    pub conflicts: Vec<String>,
}

impl UpdatePlan {
    pub fn payload(&self, sheet_id: &str) -> Value {
        let ranges: Vec<Value> = self
            .updates
            .iter()
            .map(|u| json!({ "range": format!("{}!{}", sheet_id, u.cell), "values": [[u.value]] }))
            .collect();
        json!({ "valueRanges": ranges })
    }
}

/// Decide which cells receive which ROAS values for the report's week.
pub fn build_plan(layout: &SheetLayout, set: &RecordSet) -> Result<UpdatePlan, SheetError> {
    let week_column = layout
        .week_columns
        .get(&set.week)
        .cloned()
        .ok_or_else(|| SheetError::WeekColumnMissing(set.week.clone()))?;

    let mut updates = Vec::new();
    let mut unmatched = Vec::new();
    let mut conflicts = Vec::new();
    let mut taken = HashSet::new();

    if let (Some(row), Some(roas)) = (layout.overall_roas_row, set.overall_roas) {
        taken.insert(row);
        updates.push(CellUpdate {
            cell: format!("{}{}", week_column, row),
            value: roas,
            label: "Overall ROAS".to_string(),
        });
    }

    // Exact labels claim their rows before any fuzzy match runs
    let mut slots: Vec<Slot> = set
        .records
        .iter()
        .map(|r| match layout.exact_row(r.canonical.as_str()) {
            Some(row) if taken.insert(row) => Slot::Row(row),
            Some(_) => Slot::Conflict,
            None => Slot::Pending,
        })
        .collect();

    for (slot, record) in slots.iter_mut().zip(&set.records) {
        if matches!(slot, Slot::Pending) {
            if let Some(row) = layout.fuzzy_row(record.canonical.as_str(), &taken) {
                taken.insert(row);
                *slot = Slot::Row(row);
            }
        }
    }

    for (slot, record) in slots.into_iter().zip(&set.records) {
        let name = record.canonical.as_str().to_string();
        match slot {
            Slot::Row(row) => updates.push(CellUpdate {
                cell: format!("{}{}", week_column, row),
                value: record.ratio,
                label: name,
            }),
            Slot::Pending => unmatched.push(name),
            Slot::Conflict => conflicts.push(name),
        }
    }

    if updates.is_empty() {
        return Err(SheetError::NothingToUpdate(set.week.clone()));
    }

    Ok(UpdatePlan {
        week: set.week.clone(),
        week_column,
        updates,
        unmatched,
        conflicts,
    })
}

enum Slot {
    Row(usize),
    Pending,
    Conflict,
}

pub struct SheetClient {
    http: reqwest::Client,
    settings: SheetSettings,
}

impl SheetClient {
    pub fn new(settings: SheetSettings) -> Self {
        SheetClient {
            http: reqwest::Client::new(),
            settings,
        }
    }

    fn spreadsheet_url(&self) -> String {
        format!(
            "{}/sheets/v2/spreadsheets/{}",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.spreadsheet_token
        )
    }

    pub async fn fetch_layout(&self) -> Result<SheetLayout, SheetError> {
        let url = format!(
            "{}/values/{}!{}",
            self.spreadsheet_url(),
            self.settings.sheet_id,
            self.settings.scan_range
        );
        info!("Reading sheet layout: {}", url);

        let resp: ApiResponse<ValueRangeData> = self
            .http
            .get(&url)
            .bearer_auth(&self.settings.access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if resp.code != 0 {
            return Err(SheetError::Api { code: resp.code, msg: resp.msg });
        }

        let values = resp.data.map(|d| d.value_range.values).unwrap_or_default();
        let layout = SheetLayout::from_values(&values);
        debug!(
            campaign_rows = layout.campaign_rows.len(),
            week_columns = layout.week_columns.len(),
            overall_roas_row = ?layout.overall_roas_row,
            "sheet layout"
        );
        Ok(layout)
    }

    /// Send every cell of the plan in one batch update. Returns the cell count.
    pub async fn push(&self, plan: &UpdatePlan) -> Result<usize, SheetError> {
        let url = format!("{}/values_batch_update", self.spreadsheet_url());
        let resp: ApiResponse<Value> = self
            .http
            .put(&url)
            .bearer_auth(&self.settings.access_token)
            .json(&plan.payload(&self.settings.sheet_id))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if resp.code != 0 {
            return Err(SheetError::Api { code: resp.code, msg: resp.msg });
        }

        info!("Updated {} cells for week {}", plan.updates.len(), plan.week);
        Ok(plan.updates.len())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::parser::{parse_report, ReportVariant};

    fn tracker_values() -> Vec<Vec<Value>> {
        serde_json::from_value(json!([
            ["Campaign", "Week 35", "Week 36", "week 37"],
            ["Overall ROAS", 3.1, 2.9, null],
            [],
            ["S+ 2.0 US Evergreen Prospecting (Lowest Cost)", 3.0, 3.1],
            ["US Evergreen Prospecting (Lowest Cost)", 2.0, 2.2],
            ["US Evergreen Prospecting (Cost Cap)"],
            ["US Evergreen Retargeting (Lowest Cost)"],
            ["Canada Evergreen Retargeting (Lowest Cost)"],
            [null, "notes"],
            ["Lululemon CNS Carousel (US) S+"]
        ]))
        .unwrap()
    }

    fn week_37() -> RecordSet {
        let text = std::fs::read_to_string("tests/fixtures/week_37.txt").unwrap();
        parse_report(&text, ReportVariant::Full).records
    }

    #[test]
    fn column_letters() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(52), "AZ");
        assert_eq!(column_letter(703), "AAA");
    }

    #[test]
    fn layout_from_values() {
        let layout = SheetLayout::from_values(&tracker_values());
        assert_eq!(layout.week_columns.get("35").map(String::as_str), Some("B"));
        assert_eq!(layout.week_columns.get("37").map(String::as_str), Some("D"));
        assert_eq!(layout.overall_roas_row, Some(2));
        assert_eq!(layout.campaign_rows.len(), 6);
        assert_eq!(layout.campaign_rows[0].1, 4);
        assert_eq!(layout.campaign_rows[5], ("Lululemon CNS Carousel (US) S+".to_string(), 10));
    }

    #[test]
    fn fuzzy_matching() {
        assert!(campaigns_match("US Evergreen Retargeting (Lowest Cost)", " us evergreen retargeting (lowest cost) "));
        assert!(campaigns_match(
            "US CNS S+ 2.0 (carousel ads only - Lowest Cost)",
            "Lululemon CNS Carousel (US) S+"
        ));
        assert!(!campaigns_match("US Evergreen Retargeting (Lowest Cost)", "Notes"));
        assert!(!campaigns_match("Canada CNS Manual (carousel ads only - Lowest Cost)", "Evergreen Retargeting"));
    }

    #[test]
    fn us_is_a_whole_word() {
        assert!(has_term("lululemon cns carousel (us) s+", "us"));
        assert!(has_term("us evergreen", "us"));
        assert!(!has_term("canada cns manual (carousel ads only)", "us"));
        assert!(!campaigns_match(
            "Canada CNS Manual (carousel ads only - Lowest Cost)",
            "US CNS S+ 2.0 (carousel ads only - Lowest Cost)"
        ));
    }

    #[test]
    fn regions_never_cross() {
        assert!(!campaigns_match(
            "S+ 2.0 Canada Evergreen Prospecting (Lowest Cost)",
            "US Evergreen Prospecting (Lowest Cost)"
        ));
        assert!(campaigns_match("Canada Evergreen Retargeting (Lowest Cost)", "Evergreen Retargeting - Canada"));
    }

    #[test]
    fn exact_row_preferred_over_fuzzy() {
        let layout = SheetLayout::from_values(&tracker_values());
        let name = "US Evergreen Prospecting (Lowest Cost)";
        assert_eq!(layout.exact_row(name), Some(5));
        // The S+ row comes first and fuzzily matches too
        assert_eq!(layout.fuzzy_row(name, &HashSet::new()), Some(4));
        assert_eq!(layout.fuzzy_row(name, &HashSet::from([4])), Some(5));
        assert_eq!(layout.fuzzy_row(name, &HashSet::from([4, 5])), None);
    }

    fn assert_unique_cells(plan: &UpdatePlan) {
        let cells: HashSet<&str> = plan.updates.iter().map(|u| u.cell.as_str()).collect();
        assert_eq!(cells.len(), plan.updates.len(), "{:?}", plan.updates);
    }

    #[test]
    fn plan_for_week_37() {
        let layout = SheetLayout::from_values(&tracker_values());
        let plan = build_plan(&layout, &week_37()).unwrap();

        assert_eq!(plan.week_column, "D");
        assert_eq!(plan.updates[0].cell, "D2");
        assert_eq!(plan.updates[0].value, Decimal::from_str("3.24").unwrap());
        assert_eq!(plan.updates[1].cell, "D4");
        assert_eq!(plan.updates[1].value, Decimal::from_str("3.28").unwrap());
        assert_eq!(plan.updates[2].cell, "D6");
        assert_eq!(plan.updates[3].cell, "D7");
        assert!(plan
            .updates
            .iter()
            .any(|u| u.label == "US CNS S+ 2.0 (carousel ads only - Lowest Cost)" && u.cell == "D10"));
        assert_unique_cells(&plan);
        assert_eq!(
            plan.unmatched,
            vec![
                "S+ 2.0 Canada Evergreen Prospecting (Lowest Cost)".to_string(),
                "Canada CNS Manual (carousel ads only - Lowest Cost)".to_string(),
            ]
        );
        assert!(plan.conflicts.is_empty());
    }

    #[test]
    fn one_cell_per_sheet_row() {
        let values: Vec<Vec<Value>> = serde_json::from_value(json!([
            ["Campaign", "Week 37"],
            ["US CNS S+ 2.0 (carousel ads only - Lowest Cost)"]
        ]))
        .unwrap();
        let layout = SheetLayout::from_values(&values);
        let plan = build_plan(&layout, &week_37()).unwrap();

        assert_unique_cells(&plan);
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].cell, "B2");
        assert_eq!(plan.updates[0].label, "US CNS S+ 2.0 (carousel ads only - Lowest Cost)");
        assert!(plan.unmatched.contains(&"Canada CNS Manual (carousel ads only - Lowest Cost)".to_string()));
    }

    #[test]
    fn duplicate_campaign_is_a_conflict() {
        let layout = SheetLayout::from_values(&tracker_values());
        let mut set = week_37();
        let mut again = set.records[0].clone();
        again.ratio = Decimal::from_str("9.99").unwrap();
        set.records.push(again);

        let plan = build_plan(&layout, &set).unwrap();
        assert_unique_cells(&plan);
        let d4: Vec<_> = plan.updates.iter().filter(|u| u.cell == "D4").collect();
        assert_eq!(d4.len(), 1);
        assert_eq!(d4[0].value, Decimal::from_str("3.28").unwrap());
        assert_eq!(plan.conflicts, vec!["S+ 2.0 US Evergreen Prospecting (Lowest Cost)".to_string()]);
    }

    #[test]
    fn unmatched_campaigns_reported() {
        let values: Vec<Vec<Value>> = serde_json::from_value(json!([
            ["Campaign", "Week 37"],
            ["US Evergreen Retargeting (Lowest Cost)"]
        ]))
        .unwrap();
        let layout = SheetLayout::from_values(&values);
        let plan = build_plan(&layout, &week_37()).unwrap();

        assert!(plan
            .updates
            .iter()
            .any(|u| u.label == "US Evergreen Retargeting (Lowest Cost)" && u.cell == "B2"));
        assert_eq!(plan.updates.len(), 1);
        assert!(plan.unmatched.contains(&"US Evergreen Prospecting (Cost Cap)".to_string()));
        assert!(plan.unmatched.contains(&"Canada CNS Manual (carousel ads only - Lowest Cost)".to_string()));
        assert!(plan.unmatched.contains(&"US CNS S+ 2.0 (carousel ads only - Lowest Cost)".to_string()));
    }

    #[test]
    fn nothing_to_update() {
        let values: Vec<Vec<Value>> = serde_json::from_value(json!([["Campaign", "Week 37"]])).unwrap();
        let layout = SheetLayout::from_values(&values);
        assert!(matches!(
            build_plan(&layout, &week_37()),
            Err(SheetError::NothingToUpdate(_))
        ));
    }

    #[test]
    fn missing_week_column() {
        let layout = SheetLayout::from_values(&tracker_values());
        let mut set = week_37();
        set.week = "40".to_string();
        assert!(matches!(build_plan(&layout, &set), Err(SheetError::WeekColumnMissing(w)) if w == "40"));
    }

    #[test]
    fn payload_shape() {
        let plan = UpdatePlan {
            week: "37".to_string(),
            week_column: "D".to_string(),
            updates: vec![CellUpdate {
                cell: "D2".to_string(),
                value: Decimal::from_str("3.24").unwrap(),
                label: "Overall ROAS".to_string(),
            }],
            unmatched: Vec::new(),
            conflicts: Vec::new(),
        };
        let p = plan.payload("0b12ab");
        assert_eq!(p["valueRanges"][0]["range"], "0b12ab!D2");
        assert_eq!(p["valueRanges"][0]["values"][0][0].as_f64(), Some(3.24));
    }
}
