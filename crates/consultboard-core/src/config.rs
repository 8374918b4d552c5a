//! Application settings loaded from `consultboard.toml`
//!
//! Every key is optional; a missing file yields the defaults.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up in the data directory when no explicit path is given
pub const SETTINGS_FILE: &str = "consultboard.toml";

/// How consultants type timesheet charges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimesheetInputMethod {
    /// Day fractions cycled through 0 / 0.25 / 0.5 / 0.75 / 1
    #[default]
    Cycle,
    /// Free keyboard input shown as hours:minutes
    Keyboard,
}

/// Web server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// Top-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// First month of the fiscal year (1-12)
    #[serde(default = "default_fiscal_year_month")]
    pub fiscal_year_month: u32,

    #[serde(default)]
    pub timesheet_input_method: TimesheetInputMethod,

    /// Hours in a worked day, used by the keyboard input format
    #[serde(default = "default_day_duration")]
    pub timesheet_day_duration: u32,

    /// VAT rate in percent applied to new bills
    #[serde(default = "default_vat")]
    pub default_vat: f64,

    /// Decimal separator used in CSV exports
    #[serde(default = "default_decimal_separator")]
    pub decimal_separator: String,

    /// Lifetime of the consultant similarity model
    #[serde(default = "default_similarity_ttl")]
    pub similarity_cache_ttl_secs: u64,

    #[serde(default)]
    pub web: WebSettings,
}

fn default_fiscal_year_month() -> u32 {
    4
}

fn default_day_duration() -> u32 {
    7
}

fn default_vat() -> f64 {
    20.0
}

fn default_decimal_separator() -> String {
    ",".to_string()
}

fn default_similarity_ttl() -> u64 {
    7 * 24 * 3600
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3333
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fiscal_year_month: default_fiscal_year_month(),
            timesheet_input_method: TimesheetInputMethod::default(),
            timesheet_day_duration: default_day_duration(),
            default_vat: default_vat(),
            decimal_separator: default_decimal_separator(),
            similarity_cache_ttl_secs: default_similarity_ttl(),
            web: WebSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file, returning defaults if the file does not exist
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(CoreError::FileRead {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        let settings: Settings = toml::from_str(&content).map_err(|e| CoreError::TomlParse {
            path: path.to_path_buf(),
            message: e.message().to_string(),
            source: e,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load `consultboard.toml` from the data directory
    pub fn load_from_dir(data_dir: &Path) -> Result<Self, CoreError> {
        Self::load(&data_dir.join(SETTINGS_FILE))
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if !(1..=12).contains(&self.fiscal_year_month) {
            return Err(CoreError::InvalidConfig {
                message: format!(
                    "fiscal_year_month must be between 1 and 12, got {}",
                    self.fiscal_year_month
                ),
            });
        }
        if self.timesheet_day_duration == 0 || self.timesheet_day_duration > 24 {
            return Err(CoreError::InvalidConfig {
                message: format!(
                    "timesheet_day_duration must be between 1 and 24, got {}",
                    self.timesheet_day_duration
                ),
            });
        }
        if self.default_vat < 0.0 {
            return Err(CoreError::InvalidConfig {
                message: "default_vat cannot be negative".to_string(),
            });
        }
        Ok(())
    }
}

/// `~/.consultboard`, when a home directory exists
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".consultboard"))
}
