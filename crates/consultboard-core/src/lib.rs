//! consultboard-core - Core library for consultboard
//!
//! Provides models, the dataset store and file watcher, and the billing,
//! staffing, expense and similarity computations of a consulting firm.

pub mod billing;
pub mod calendar;
pub mod config;
pub mod error;
pub mod event;
pub mod expense;
pub mod export;
pub mod models;
pub mod parsers;
pub mod people;
pub mod staffing;
pub mod store;
pub mod watcher;

#[cfg(test)]
mod fixtures;

pub use config::{default_data_dir, Settings, TimesheetInputMethod};
pub use error::{CoreError, DegradedState, LoadReport};
pub use event::{DataEvent, EventBus};
pub use export::{csv_string, export_to_json, write_csv_file};
pub use store::{DataStore, DataStoreConfig, MissionTotals, StoreSummary};
pub use watcher::{FileWatcher, WatcherConfig};
