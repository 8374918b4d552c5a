//! Table file parser with retry on parse failure
//!
//! Each table is a JSON array stored as `<table>.json` in the data directory.

use crate::error::{CoreError, LoadError, LoadReport};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Dataset tables, one file each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Subsidiaries,
    Profiles,
    Consultants,
    RateObjectives,
    Users,
    Leads,
    Missions,
    Timesheets,
    Staffings,
    FinancialConditions,
    Holidays,
    LunchTickets,
    Bills,
    Expenses,
}

impl Table {
    pub const ALL: [Table; 14] = [
        Table::Subsidiaries,
        Table::Profiles,
        Table::Consultants,
        Table::RateObjectives,
        Table::Users,
        Table::Leads,
        Table::Missions,
        Table::Timesheets,
        Table::Staffings,
        Table::FinancialConditions,
        Table::Holidays,
        Table::LunchTickets,
        Table::Bills,
        Table::Expenses,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Subsidiaries => "subsidiaries",
            Table::Profiles => "profiles",
            Table::Consultants => "consultants",
            Table::RateObjectives => "rate_objectives",
            Table::Users => "users",
            Table::Leads => "leads",
            Table::Missions => "missions",
            Table::Timesheets => "timesheets",
            Table::Staffings => "staffings",
            Table::FinancialConditions => "financial_conditions",
            Table::Holidays => "holidays",
            Table::LunchTickets => "lunch_tickets",
            Table::Bills => "bills",
            Table::Expenses => "expenses",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.name())
    }

    /// Table stored at `path`, if the file name is one of ours
    pub fn from_path(path: &Path) -> Option<Table> {
        let stem = path.file_stem()?.to_str()?;
        if path.extension()? != "json" {
            return None;
        }
        Table::ALL.into_iter().find(|t| t.name() == stem)
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Parser for table files
pub struct TableParser {
    /// Maximum retry attempts
    max_retries: u32,
    /// Delay between retries
    retry_delay: Duration,
}

impl Default for TableParser {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

impl TableParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Parse a table file with retry logic
    ///
    /// Retries on parse failure as the file might be mid-write by another process.
    pub async fn parse<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>, CoreError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(attempt, path = %path.display(), "Retrying table parse after delay");
                sleep(self.retry_delay).await;
            }

            match self.try_parse(path).await {
                Ok(rows) => return Ok(rows),
                Err(e @ CoreError::FileNotFound { .. }) => return Err(e),
                Err(e) => {
                    warn!(attempt, error = %e, "Table parse attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CoreError::FileNotFound {
            path: path.to_path_buf(),
        }))
    }

    /// Single parse attempt
    async fn try_parse<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>, CoreError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                CoreError::FileRead {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;

        serde_json::from_str(&content).map_err(|e| CoreError::JsonParse {
            path: path.to_path_buf(),
            message: e.to_string(),
            source: e,
        })
    }

    /// Parse with graceful degradation, recording errors in LoadReport
    ///
    /// A missing table is empty; a malformed one is recorded as an error and left empty.
    pub async fn parse_graceful<T: DeserializeOwned>(
        &self,
        data_dir: &Path,
        table: Table,
        report: &mut LoadReport,
    ) -> Vec<T> {
        let path = data_dir.join(table.file_name());
        match self.parse(&path).await {
            Ok(rows) => {
                report.tables_loaded += 1;
                report.records_loaded += rows.len();
                rows
            }
            Err(CoreError::FileNotFound { .. }) => {
                report.tables_missing += 1;
                report.add_warning(
                    table.name(),
                    format!("Table file not found: {}", path.display()),
                );
                Vec::new()
            }
            Err(e) => {
                report.tables_failed += 1;
                report.add_error(LoadError::from_core_error(table.name(), &e));
                Vec::new()
            }
        }
    }
}

/// Write a table atomically
///
/// Each call writes its own `.{table}.json.XXXXXX.tmp` sibling, then renames it
/// over the table file, so concurrent writers never share a temp path.
pub fn write_table<T: Serialize>(data_dir: &Path, table: Table, rows: &[T]) -> Result<(), CoreError> {
    let path = data_dir.join(table.file_name());
    let write_err = |source| CoreError::FileWrite {
        path: path.clone(),
        source,
    };

    let content = serde_json::to_string_pretty(rows).map_err(|e| CoreError::JsonParse {
        path: path.clone(),
        message: e.to_string(),
        source: e,
    })?;

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", table.file_name()))
        .suffix(".tmp")
        .tempfile_in(data_dir)
        .map_err(write_err)?;
    tmp.write_all(content.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(&path).map_err(|e| write_err(e.error))?;

    debug!(table = %table, rows = rows.len(), "Table written");
    Ok(())
}
