use std::path::PathBuf;

use anyhow::{Context, Result};
use config::Config;
use serde::Deserialize;

use crate::parser::ReportVariant;

const CONFIG_FILE: &str = "roas";
const ENV_PREFIX: &str = "ROAS";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub variant: ReportVariant,
    #[serde(default)]
    pub sheets: Option<SheetSettings>,
}

/// Remote sheet target. `access_token` is used as-is; obtaining or
/// refreshing it happens outside this tool.
#[derive(Clone, Deserialize)]
pub struct SheetSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub spreadsheet_token: String,
    pub sheet_id: String,
    pub access_token: String,
    #[serde(default = "default_scan_range")]
    pub scan_range: String,
}

impl std::fmt::Debug for SheetSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetSettings")
            .field("base_url", &self.base_url)
            .field("spreadsheet_token", &self.spreadsheet_token)
            .field("sheet_id", &self.sheet_id)
            .field("access_token", &"<redacted>")
            .field("scan_range", &self.scan_range)
            .finish()
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/roas.sqlite")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_base_url() -> String {
    "https://open.larksuite.com/open-apis".to_string()
}

fn default_scan_range() -> String {
    "A1:Z100".to_string()
}

impl Settings {
    /// `roas.toml` (optional), then `ROAS_*` env vars; nested keys use `__`,
    /// e.g. `ROAS_SHEETS__ACCESS_TOKEN`.
    pub fn load() -> Result<Self> {
        let cfg = Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to read settings")?;
        Self::from_config(cfg)
    }

    fn from_config(cfg: Config) -> Result<Self> {
        cfg.try_deserialize().context("Invalid settings")
    }
}
