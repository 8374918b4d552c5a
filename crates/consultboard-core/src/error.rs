//! Error types for consultboard-core
//!
//! Provides a comprehensive error hierarchy with thiserror for graceful degradation.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for consultboard operations
#[derive(Error, Debug)]
pub enum CoreError {
    // ===================
    // IO Errors
    // ===================
    #[error("Failed to read file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    // ===================
    // Parse Errors
    // ===================
    #[error("Failed to parse JSON in {path}: {message}")]
    JsonParse {
        path: PathBuf,
        message: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse TOML in {path}: {message}")]
    TomlParse {
        path: PathBuf,
        message: String,
        #[source]
        source: toml::de::Error,
    },

    // ===================
    // Watch Errors
    // ===================
    #[error("File watcher error: {message}")]
    WatchError {
        message: String,
        #[source]
        source: Option<notify::Error>,
    },

    // ===================
    // Lookup Errors
    // ===================
    #[error("Consultant not found: {id}")]
    ConsultantNotFound { id: u64 },

    #[error("Mission not found: {id}")]
    MissionNotFound { id: u64 },

    #[error("Lead not found: {id}")]
    LeadNotFound { id: u64 },

    #[error("Bill not found: {id}")]
    BillNotFound { id: u64 },

    #[error("Expense not found: {id}")]
    ExpenseNotFound { id: u64 },

    #[error("User not found: {username}")]
    UserNotFound { username: String },

    // ===================
    // Business Rule Errors
    // ===================
    #[error("Permission denied for {username}: {action}")]
    PermissionDenied { username: String, action: String },

    #[error("Transition '{transition}' is not allowed from state {state}")]
    InvalidTransition { transition: String, state: String },

    #[error("Invalid timesheet: {message}")]
    TimesheetValidation { message: String },

    #[error("No productive consultant defined")]
    NoProductiveConsultant,

    #[error("Mission {id} has no lead")]
    MissionWithoutLead { id: u64 },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    // ===================
    // Config Errors
    // ===================
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // ===================
    // Store Errors
    // ===================
    #[error("Data store is read-only: {reason}")]
    ReadOnly { reason: String },
}

impl CoreError {
    pub fn permission_denied(username: impl Into<String>, action: impl Into<String>) -> Self {
        CoreError::PermissionDenied {
            username: username.into(),
            action: action.into(),
        }
    }

    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// True for lookup failures (mapped to "not found" by front ends)
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoreError::FileNotFound { .. }
                | CoreError::ConsultantNotFound { .. }
                | CoreError::MissionNotFound { .. }
                | CoreError::LeadNotFound { .. }
                | CoreError::BillNotFound { .. }
                | CoreError::ExpenseNotFound { .. }
                | CoreError::UserNotFound { .. }
        )
    }

    /// True for errors caused by caller input rather than the environment
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidTransition { .. }
                | CoreError::TimesheetValidation { .. }
                | CoreError::NoProductiveConsultant
                | CoreError::MissionWithoutLead { .. }
                | CoreError::InvalidValue { .. }
        )
    }
}

/// Severity level for errors during load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Non-critical, can continue with degraded functionality
    Warning,
    /// Significant but not fatal
    Error,
    /// Cannot continue
    Fatal,
}

/// Individual error entry in load report
#[derive(Debug, Clone)]
pub struct LoadError {
    pub source: String,
    pub message: String,
    pub severity: ErrorSeverity,
    /// Actionable suggestion for user (optional)
    pub suggestion: Option<String>,
}

impl LoadError {
    pub fn warning(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
            severity: ErrorSeverity::Warning,
            suggestion: None,
        }
    }

    pub fn error(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
            severity: ErrorSeverity::Error,
            suggestion: None,
        }
    }

    pub fn fatal(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
            severity: ErrorSeverity::Fatal,
            suggestion: None,
        }
    }

    /// Add an actionable suggestion to this error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Create user-friendly error from CoreError with context-aware suggestions
    pub fn from_core_error(source: impl Into<String>, error: &CoreError) -> Self {
        let source = source.into();
        let (message, suggestion) = match error {
            CoreError::FileNotFound { path } => (
                format!("File not found: {}", path.display()),
                Some(format!("Check if file exists: ls {}", path.display())),
            ),
            CoreError::FileRead { path, .. } => (
                format!("Cannot read file: {}", path.display()),
                Some(format!("Check permissions: chmod +r {}", path.display())),
            ),
            CoreError::DirectoryNotFound { path } => (
                format!("Directory not found: {}", path.display()),
                Some(format!("Create directory: mkdir -p {}", path.display())),
            ),
            CoreError::JsonParse { path, message, .. } => (
                format!("Invalid JSON in {}: {}", path.display(), message),
                Some("Validate JSON syntax with: jq . <file>".to_string()),
            ),
            CoreError::TomlParse { path, message, .. } => (
                format!("Invalid TOML in {}: {}", path.display(), message),
                Some("Check consultboard.toml keys against the documented settings".to_string()),
            ),
            _ => (error.to_string(), None),
        };

        Self {
            source,
            message,
            severity: ErrorSeverity::Error,
            suggestion,
        }
    }
}

/// Report of errors encountered during dataset loading
///
/// Enables graceful degradation by tracking partial failures
/// instead of failing completely on any error.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub errors: Vec<LoadError>,
    pub settings_loaded: bool,
    pub tables_loaded: usize,
    pub tables_missing: usize,
    pub tables_failed: usize,
    pub records_loaded: usize,
}

impl LoadReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: LoadError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, source: impl Into<String>, message: impl Into<String>) {
        self.errors.push(LoadError::warning(source, message));
    }

    pub fn add_fatal(&mut self, source: impl Into<String>, message: impl Into<String>) {
        self.errors.push(LoadError::fatal(source, message));
    }

    /// Returns true if there are any fatal errors
    pub fn has_fatal_errors(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.severity == ErrorSeverity::Fatal)
    }

    /// Returns true if there are any errors (including warnings)
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns only warnings
    pub fn warnings(&self) -> impl Iterator<Item = &LoadError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ErrorSeverity::Warning)
    }

    /// Returns count by severity
    pub fn error_count(&self) -> (usize, usize, usize) {
        let count = |severity| self.errors.iter().filter(|e| e.severity == severity).count();
        (
            count(ErrorSeverity::Warning),
            count(ErrorSeverity::Error),
            count(ErrorSeverity::Fatal),
        )
    }

    /// Merge another report into this one
    pub fn merge(&mut self, other: LoadReport) {
        self.errors.extend(other.errors);
        self.settings_loaded = self.settings_loaded || other.settings_loaded;
        self.tables_loaded += other.tables_loaded;
        self.tables_missing += other.tables_missing;
        self.tables_failed += other.tables_failed;
        self.records_loaded += other.records_loaded;
    }
}

/// Degraded state indicator for the data store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradedState {
    /// Everything loaded successfully
    Healthy,
    /// Some tables missing but functional
    PartialData {
        missing: Vec<String>,
        reason: String,
    },
    /// Read-only mode due to errors; mutations are refused
    ReadOnly { reason: String },
}

impl DegradedState {
    pub fn is_healthy(&self) -> bool {
        matches!(self, DegradedState::Healthy)
    }

    pub fn is_degraded(&self) -> bool {
        !self.is_healthy()
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, DegradedState::ReadOnly { .. })
    }
}
