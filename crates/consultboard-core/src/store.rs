//! Data store with DashMap + parking_lot::RwLock
//!
//! Reference tables live in one `parking_lot::RwLock<Dataset>`; bills and
//! expenses, written one at a time, live in DashMaps (per-entry locking).
//! Every mutation goes through the store so it can persist the touched tables,
//! invalidate caches and publish a [`DataEvent`].

use crate::billing::{create_client_bill_from_proportion, create_client_bill_from_timesheet};
use crate::config::Settings;
use crate::error::{CoreError, DegradedState, ErrorSeverity, LoadError, LoadReport};
use crate::event::{DataEvent, EventBus};
use crate::expense::{self, ExpensesDashboard, ReceiptInfo};
use crate::models::{
    BillId, ClientBill, Consultant, ConsultantId, ConsultantProfile, Dataset, Expense,
    ExpenseDraft, ExpenseId, Lead, LeadId, MarginMode, Mission, MissionId, Subsidiary, User,
};
use crate::parsers::{write_table, Table, TableParser};
use crate::people::{predict_similar_consultant, SimilarityModel};
use crate::staffing::{
    self, AutoStaffingMode, DeactivateOutcome, MassStaffingRequest, MissionAttribute,
    TimesheetInput, TimesheetSaveSummary,
};
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use moka::future::Cache;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the data store
#[derive(Debug, Clone)]
pub struct DataStoreConfig {
    /// Table parser retry count
    pub table_retry_count: u32,

    /// Table parser retry delay
    pub table_retry_delay: Duration,

    /// Maximum missions kept in the totals cache
    pub mission_totals_capacity: u64,

    /// Lifetime of cached mission totals; forecasts depend on the current day
    pub mission_totals_ttl: Duration,
}

impl Default for DataStoreConfig {
    fn default() -> Self {
        Self {
            table_retry_count: 3,
            table_retry_delay: Duration::from_millis(100),
            mission_totals_capacity: 10_000,
            mission_totals_ttl: Duration::from_secs(600),
        }
    }
}

/// Done and remaining work of a mission, amounts in k€
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MissionTotals {
    pub mission_id: MissionId,
    pub done_days: f64,
    pub done_k: f64,
    pub forecast_days: f64,
    pub forecast_k: f64,
    /// Target margin, fixed price missions only
    pub margin_k: f64,
}

/// Table sizes, for the CLI and health checks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub consultants: usize,
    pub leads: usize,
    pub missions: usize,
    pub timesheets: usize,
    pub staffings: usize,
    pub bills: usize,
    pub expenses: usize,
}

/// Tables parsed from disk, not yet visible to readers
#[derive(Default)]
struct Staged {
    dataset: Dataset,
    bills: Vec<ClientBill>,
    expenses: Vec<Expense>,
}

fn keyed<K: Ord, T>(rows: Vec<T>, key: impl Fn(&T) -> K) -> BTreeMap<K, T> {
    rows.into_iter().map(|row| (key(&row), row)).collect()
}

/// Move one table from `source` into `target`
fn take_table(target: &mut Dataset, source: &mut Dataset, table: Table) {
    use std::mem::swap;
    match table {
        Table::Subsidiaries => swap(&mut target.subsidiaries, &mut source.subsidiaries),
        Table::Profiles => swap(&mut target.profiles, &mut source.profiles),
        Table::Consultants => swap(&mut target.consultants, &mut source.consultants),
        Table::RateObjectives => swap(&mut target.rate_objectives, &mut source.rate_objectives),
        Table::Users => swap(&mut target.users, &mut source.users),
        Table::Leads => swap(&mut target.leads, &mut source.leads),
        Table::Missions => swap(&mut target.missions, &mut source.missions),
        Table::Timesheets => swap(&mut target.timesheets, &mut source.timesheets),
        Table::Staffings => swap(&mut target.staffings, &mut source.staffings),
        Table::FinancialConditions => {
            swap(&mut target.financial_conditions, &mut source.financial_conditions)
        }
        Table::Holidays => swap(&mut target.holidays, &mut source.holidays),
        Table::LunchTickets => swap(&mut target.lunch_tickets, &mut source.lunch_tickets),
        Table::Bills | Table::Expenses => {}
    }
}

/// Write one dataset table back to disk
fn write_dataset_table(data_dir: &Path, ds: &Dataset, table: Table) -> Result<(), CoreError> {
    match table {
        Table::Subsidiaries => write_table(data_dir, table, &ds.subsidiaries.values().collect::<Vec<_>>()),
        Table::Profiles => write_table(data_dir, table, &ds.profiles.values().collect::<Vec<_>>()),
        Table::Consultants => write_table(data_dir, table, &ds.consultants.values().collect::<Vec<_>>()),
        Table::RateObjectives => write_table(data_dir, table, &ds.rate_objectives),
        Table::Users => write_table(data_dir, table, &ds.users.values().collect::<Vec<_>>()),
        Table::Leads => write_table(data_dir, table, &ds.leads.values().collect::<Vec<_>>()),
        Table::Missions => write_table(data_dir, table, &ds.missions.values().collect::<Vec<_>>()),
        Table::Timesheets => write_table(data_dir, table, &ds.timesheets),
        Table::Staffings => write_table(data_dir, table, &ds.staffings),
        Table::FinancialConditions => write_table(data_dir, table, &ds.financial_conditions),
        Table::Holidays => write_table(data_dir, table, &ds.holidays),
        Table::LunchTickets => write_table(data_dir, table, &ds.lunch_tickets),
        Table::Bills | Table::Expenses => Ok(()),
    }
}

/// Write every dataset table, e.g. to seed a new data directory
pub fn write_dataset(data_dir: &Path, ds: &Dataset) -> Result<(), CoreError> {
    for table in Table::ALL {
        write_dataset_table(data_dir, ds, table)?;
    }
    Ok(())
}

/// Central data store for consultboard
///
/// Thread-safe access to the firm's data.
pub struct DataStore {
    /// Directory holding one JSON file per table
    data_dir: PathBuf,

    /// Settings file, `consultboard.toml` in the data directory by default
    config_path: Option<PathBuf>,

    config: DataStoreConfig,

    settings: RwLock<Settings>,

    /// Reference tables (frequent reads, rare writes)
    dataset: RwLock<Dataset>,

    bills: DashMap<BillId, Arc<ClientBill>>,

    expenses: DashMap<ExpenseId, Arc<Expense>>,

    /// Single entry: the fitted similarity model; rebuilt when the TTL setting changes
    similarity: RwLock<Cache<(), Arc<SimilarityModel>>>,

    mission_totals: Cache<MissionId, MissionTotals>,

    event_bus: EventBus,

    degraded_state: RwLock<DegradedState>,

    /// Held from reading a table to committing it, one per persisted group
    dataset_writes: Mutex<()>,
    bills_writes: Mutex<()>,
    expenses_writes: Mutex<()>,
}

impl DataStore {
    /// Create a new data store
    pub fn new(data_dir: PathBuf, config_path: Option<PathBuf>, config: DataStoreConfig) -> Self {
        let settings = Settings::default();
        let similarity = Self::similarity_cache(&settings);
        let mission_totals = Cache::builder()
            .max_capacity(config.mission_totals_capacity)
            .time_to_live(config.mission_totals_ttl)
            .build();

        Self {
            data_dir,
            config_path,
            config,
            settings: RwLock::new(settings),
            dataset: RwLock::new(Dataset::default()),
            bills: DashMap::new(),
            expenses: DashMap::new(),
            similarity: RwLock::new(similarity),
            mission_totals,
            event_bus: EventBus::default_capacity(),
            degraded_state: RwLock::new(DegradedState::Healthy),
            dataset_writes: Mutex::new(()),
            bills_writes: Mutex::new(()),
            expenses_writes: Mutex::new(()),
        }
    }

    /// Create with default configuration
    pub fn with_defaults(data_dir: PathBuf) -> Self {
        Self::new(data_dir, None, DataStoreConfig::default())
    }

    fn similarity_cache(settings: &Settings) -> Cache<(), Arc<SimilarityModel>> {
        Cache::builder()
            .max_capacity(1)
            .time_to_live(Duration::from_secs(settings.similarity_cache_ttl_secs))
            .build()
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the event bus for subscribing to updates
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Get current degraded state
    pub fn degraded_state(&self) -> DegradedState {
        self.degraded_state.read().clone()
    }

    fn parser(&self) -> TableParser {
        TableParser::new().with_retries(self.config.table_retry_count, self.config.table_retry_delay)
    }

    /// Initial load of all data with LoadReport for graceful degradation
    pub async fn initial_load(&self) -> LoadReport {
        let mut report = LoadReport::new();

        info!(data_dir = %self.data_dir.display(), "Starting initial data load");

        if !self.data_dir.is_dir() {
            report.add_error(
                LoadError::fatal(
                    "data_dir",
                    format!("Data directory not found: {}", self.data_dir.display()),
                )
                .with_suggestion("Pass --data-dir or set CONSULTBOARD_DATA_DIR"),
            );
        } else {
            self.load_settings(&mut report);

            let parser = self.parser();
            let mut staged = Staged::default();
            for table in Table::ALL {
                self.load_table(&parser, table, &mut staged, &mut report).await;
            }
            *self.dataset.write() = staged.dataset;
            self.replace_bills(staged.bills);
            self.replace_expenses(staged.expenses);
        }

        self.update_degraded_state(&report);
        self.event_bus.publish(DataEvent::LoadCompleted);

        info!(
            settings_loaded = report.settings_loaded,
            tables_loaded = report.tables_loaded,
            tables_missing = report.tables_missing,
            tables_failed = report.tables_failed,
            records = report.records_loaded,
            errors = report.errors.len(),
            "Initial load complete"
        );

        report
    }

    fn load_settings(&self, report: &mut LoadReport) {
        let path = self
            .config_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(crate::config::SETTINGS_FILE));
        match Settings::load(&path) {
            Ok(settings) => {
                debug!(path = %path.display(), "Settings loaded");
                if settings.similarity_cache_ttl_secs != self.settings.read().similarity_cache_ttl_secs {
                    *self.similarity.write() = Self::similarity_cache(&settings);
                }
                *self.settings.write() = settings;
                report.settings_loaded = true;
            }
            Err(e) => report.add_error(LoadError::from_core_error("settings", &e)),
        }
    }

    /// Parse one table into `staged`
    async fn load_table(
        &self,
        parser: &TableParser,
        table: Table,
        staged: &mut Staged,
        report: &mut LoadReport,
    ) {
        let dir = self.data_dir.as_path();
        let dataset = &mut staged.dataset;
        match table {
            Table::Subsidiaries => {
                dataset.subsidiaries = keyed(parser.parse_graceful(dir, table, report).await, |s: &Subsidiary| s.id)
            }
            Table::Profiles => {
                dataset.profiles = keyed(parser.parse_graceful(dir, table, report).await, |p: &ConsultantProfile| p.id)
            }
            Table::Consultants => {
                dataset.consultants = keyed(parser.parse_graceful(dir, table, report).await, |c: &Consultant| c.id)
            }
            Table::RateObjectives => {
                dataset.rate_objectives = parser.parse_graceful(dir, table, report).await
            }
            Table::Users => {
                dataset.users = keyed(parser.parse_graceful(dir, table, report).await, |u: &User| {
                    u.username.clone()
                })
            }
            Table::Leads => {
                dataset.leads = keyed(parser.parse_graceful(dir, table, report).await, |l: &Lead| l.id)
            }
            Table::Missions => {
                dataset.missions = keyed(parser.parse_graceful(dir, table, report).await, |m: &Mission| m.id)
            }
            Table::Timesheets => dataset.timesheets = parser.parse_graceful(dir, table, report).await,
            Table::Staffings => dataset.staffings = parser.parse_graceful(dir, table, report).await,
            Table::FinancialConditions => {
                dataset.financial_conditions = parser.parse_graceful(dir, table, report).await
            }
            Table::Holidays => dataset.holidays = parser.parse_graceful(dir, table, report).await,
            Table::LunchTickets => {
                dataset.lunch_tickets = parser.parse_graceful(dir, table, report).await
            }
            Table::Bills => staged.bills = parser.parse_graceful(dir, table, report).await,
            Table::Expenses => staged.expenses = parser.parse_graceful(dir, table, report).await,
        }
    }

    fn replace_bills(&self, bills: Vec<ClientBill>) {
        self.bills.clear();
        for bill in bills {
            self.bills.insert(bill.id, Arc::new(bill));
        }
        debug!(count = self.bills.len(), "Bills loaded");
    }

    fn replace_expenses(&self, expenses: Vec<Expense>) {
        self.expenses.clear();
        for expense in expenses {
            self.expenses.insert(expense.id, Arc::new(expense));
        }
        debug!(count = self.expenses.len(), "Expenses loaded");
    }

    /// Update degraded state based on load report
    ///
    /// A malformed table makes the store read-only: writing it back would
    /// replace the file with the empty table.
    fn update_degraded_state(&self, report: &LoadReport) {
        let mut state = self.degraded_state.write();

        if report.has_fatal_errors() {
            *state = DegradedState::ReadOnly {
                reason: "Fatal errors during load".to_string(),
            };
            return;
        }

        let tables = |severity: ErrorSeverity| -> Vec<String> {
            report
                .errors
                .iter()
                .filter(|e| e.severity == severity && e.source != "settings")
                .map(|e| e.source.clone())
                .collect()
        };

        let failed = tables(ErrorSeverity::Error);
        if !failed.is_empty() {
            *state = DegradedState::ReadOnly {
                reason: format!("Malformed tables: {}", failed.join(", ")),
            };
            return;
        }

        let missing = tables(ErrorSeverity::Warning);
        if missing.is_empty() {
            *state = DegradedState::Healthy;
        } else {
            *state = DegradedState::PartialData {
                reason: format!("Missing: {}", missing.join(", ")),
                missing,
            };
        }
    }

    // ===================
    // Read accessors
    // ===================

    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    /// Read access to the reference tables
    ///
    /// Do not hold the guard across an await point.
    pub fn dataset(&self) -> RwLockReadGuard<'_, Dataset> {
        self.dataset.read()
    }

    /// All bills, by id
    pub fn bills(&self) -> Vec<Arc<ClientBill>> {
        let mut bills: Vec<_> = self.bills.iter().map(|r| Arc::clone(r.value())).collect();
        bills.sort_by_key(|b| b.id);
        bills
    }

    pub fn bill(&self, id: BillId) -> Option<Arc<ClientBill>> {
        self.bills.get(&id).map(|r| Arc::clone(r.value()))
    }

    /// All expenses, by id
    pub fn expenses(&self) -> Vec<Arc<Expense>> {
        let mut expenses: Vec<_> = self.expenses.iter().map(|r| Arc::clone(r.value())).collect();
        expenses.sort_by_key(|e| e.id);
        expenses
    }

    pub fn expense(&self, id: ExpenseId) -> Option<Arc<Expense>> {
        self.expenses.get(&id).map(|r| Arc::clone(r.value()))
    }

    pub fn summary(&self) -> StoreSummary {
        let ds = self.dataset.read();
        StoreSummary {
            consultants: ds.consultants.len(),
            leads: ds.leads.len(),
            missions: ds.missions.len(),
            timesheets: ds.timesheets.len(),
            staffings: ds.staffings.len(),
            bills: self.bills.len(),
            expenses: self.expenses.len(),
        }
    }

    /// Done and forecasted work of a mission, cached until one of its inputs changes
    pub async fn mission_totals(
        &self,
        mission_id: MissionId,
        today: NaiveDate,
    ) -> Result<MissionTotals, CoreError> {
        if let Some(totals) = self.mission_totals.get(&mission_id).await {
            return Ok(totals);
        }
        let totals = {
            let ds = self.dataset.read();
            let mission = ds.mission(mission_id)?;
            let (done_days, done_k) = ds.done_work_k(mission);
            let (forecast_days, forecast_k) = ds.forecasted_work(mission, today);
            MissionTotals {
                mission_id,
                done_days,
                done_k,
                forecast_days,
                forecast_k,
                margin_k: ds.margin(mission, MarginMode::Target, today),
            }
        };
        self.mission_totals.insert(mission_id, totals).await;
        Ok(totals)
    }

    /// Similarity model, fitted off the executor on first use and kept for the configured TTL
    ///
    /// `None` while too few consultants are productive.
    pub async fn similarity_model(&self, today: NaiveDate) -> Option<Arc<SimilarityModel>> {
        let cache = self.similarity.read().clone();
        if let Some(model) = cache.get(&()).await {
            return Some(model);
        }
        let dataset = self.dataset.read().clone();
        cache
            .optionally_get_with((), async move {
                match tokio::task::spawn_blocking(move || SimilarityModel::fit(&dataset, today)).await {
                    Ok(model) => model.map(Arc::new),
                    Err(e) => {
                        warn!(error = %e, "Similarity model computation failed");
                        None
                    }
                }
            })
            .await
    }

    /// Consultants with the closest experience, nearest first
    pub async fn similar_consultants(
        &self,
        consultant_id: ConsultantId,
        today: NaiveDate,
    ) -> Result<Vec<ConsultantId>, CoreError> {
        self.dataset.read().consultant(consultant_id)?;
        let Some(model) = self.similarity_model(today).await else {
            return Ok(Vec::new());
        };
        let ds = self.dataset.read();
        predict_similar_consultant(&ds, &model, consultant_id, today)
    }

    // ===================
    // Update methods (called by watcher)
    // ===================

    /// Reload one table from disk (called on file change)
    ///
    /// A table that fails to parse keeps its previous content.
    pub async fn reload_table(&self, table: Table) {
        let mut report = LoadReport::new();
        let parser = self.parser();

        let mut staged = Staged::default();
        self.load_table(&parser, table, &mut staged, &mut report).await;
        if report.tables_failed > 0 {
            warn!(table = %table, "Table reload failed, keeping previous content");
            self.event_bus
                .publish(DataEvent::WatcherError(format!("Failed to reload {}", table)));
            return;
        }

        match table {
            Table::Bills => {
                let _writes = self.bills_writes.lock();
                self.replace_bills(staged.bills);
            }
            Table::Expenses => {
                let _writes = self.expenses_writes.lock();
                self.replace_expenses(staged.expenses);
            }
            _ => {
                let _writes = self.dataset_writes.lock();
                take_table(&mut self.dataset.write(), &mut staged.dataset, table);
            }
        }

        self.mission_totals.invalidate_all();
        self.similarity.read().invalidate_all();
        self.event_bus
            .publish(DataEvent::DatasetReloaded(table.name().to_string()));
        debug!(table = %table, "Table reloaded");
    }

    /// Reload settings (called when the settings file changes)
    pub fn reload_settings(&self) {
        let mut report = LoadReport::new();
        self.load_settings(&mut report);
        if report.settings_loaded {
            self.similarity.read().invalidate_all();
            self.event_bus
                .publish(DataEvent::DatasetReloaded("settings".to_string()));
        } else {
            warn!("Settings reload failed, keeping previous settings");
        }
    }

    // ===================
    // Mutations
    // ===================

    fn ensure_writable(&self) -> Result<(), CoreError> {
        match &*self.degraded_state.read() {
            DegradedState::ReadOnly { reason } => Err(CoreError::ReadOnly {
                reason: reason.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Apply `change` to a copy of the dataset, write the touched tables, then commit
    ///
    /// Readers never see a change that failed to reach the disk.
    fn mutate<T>(
        &self,
        tables: &[Table],
        change: impl FnOnce(&mut Dataset) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        self.ensure_writable()?;
        let _writes = self.dataset_writes.lock();
        let mut staged = self.dataset.read().clone();
        let result = change(&mut staged)?;
        for table in tables {
            write_dataset_table(&self.data_dir, &staged, *table)?;
        }
        *self.dataset.write() = staged;
        Ok(result)
    }

    pub async fn save_timesheet(
        &self,
        username: &str,
        consultant_id: ConsultantId,
        month: NaiveDate,
        input: &TimesheetInput,
        today: NaiveDate,
    ) -> Result<TimesheetSaveSummary, CoreError> {
        let summary = self.mutate(&[Table::Timesheets, Table::LunchTickets], |ds| {
            staffing::save_timesheet(ds, username, consultant_id, month, input, today)
        })?;

        let missions: BTreeSet<MissionId> = input.charges.iter().map(|c| c.mission_id).collect();
        for mission_id in missions {
            self.mission_totals.invalidate(&mission_id).await;
        }
        self.event_bus.publish(DataEvent::TimesheetSaved(
            consultant_id,
            month.format("%Y-%m").to_string(),
        ));
        Ok(summary)
    }

    pub async fn mass_staffing(
        &self,
        username: &str,
        request: &MassStaffingRequest,
        now: DateTime<Utc>,
    ) -> Result<usize, CoreError> {
        let written = self.mutate(&[Table::Staffings], |ds| {
            staffing::mass_staffing(ds, username, request, now)
        })?;
        for mission_id in &request.missions {
            self.mission_totals.invalidate(mission_id).await;
            self.event_bus.publish(DataEvent::StaffingUpdated(*mission_id));
        }
        Ok(written)
    }

    /// Set a sold or bought daily rate; returns the new rate
    pub async fn mission_consultant_rate(
        &self,
        username: &str,
        target: &str,
        value: &str,
    ) -> Result<f64, CoreError> {
        let (_, mission_id, _) = staffing::planning::parse_rate_target(target)?;
        let rate = self.mutate(&[Table::FinancialConditions], |ds| {
            staffing::mission_consultant_rate(ds, username, target, value)
        })?;
        self.mission_totals.invalidate(&mission_id).await;
        self.event_bus.publish(DataEvent::MissionUpdated(mission_id));
        Ok(rate)
    }

    /// Change a mission attribute; returns the label of the new value
    pub async fn mission_update(
        &self,
        username: &str,
        attribute: MissionAttribute,
        mission_id: MissionId,
        value: &str,
    ) -> Result<String, CoreError> {
        let label = self.mutate(&[Table::Missions], |ds| {
            staffing::mission_update(ds, username, attribute, mission_id, value)
        })?;
        self.mission_totals.invalidate(&mission_id).await;
        self.event_bus.publish(DataEvent::MissionUpdated(mission_id));
        Ok(label)
    }

    pub fn create_mission_from_lead(
        &self,
        username: &str,
        lead_id: LeadId,
        now: DateTime<Utc>,
    ) -> Result<MissionId, CoreError> {
        let mission_id = self.mutate(&[Table::Missions, Table::Staffings], |ds| {
            staffing::create_new_mission_from_lead(ds, username, lead_id, now)
        })?;
        self.event_bus.publish(DataEvent::MissionUpdated(mission_id));
        Ok(mission_id)
    }

    pub async fn deactivate_mission(&self, mission_id: MissionId) -> Result<DeactivateOutcome, CoreError> {
        let outcome = self.mutate(&[Table::Missions], |ds| {
            Ok(staffing::deactivate_mission(ds, mission_id))
        })?;
        if !outcome.error {
            self.mission_totals.invalidate(&mission_id).await;
            self.event_bus.publish(DataEvent::MissionUpdated(mission_id));
        }
        Ok(outcome)
    }

    pub async fn compute_automatic_staffing(
        &self,
        username: &str,
        mission_id: MissionId,
        mode: AutoStaffingMode,
        duration: u32,
        now: DateTime<Utc>,
    ) -> Result<usize, CoreError> {
        let written = self.mutate(&[Table::Staffings], |ds| {
            staffing::compute_automatic_staffing(ds, username, mission_id, mode, duration, now)
        })?;
        self.mission_totals.invalidate(&mission_id).await;
        self.event_bus.publish(DataEvent::StaffingUpdated(mission_id));
        Ok(written)
    }

    // ===================
    // Bills
    // ===================

    /// Build a bill under a fresh id, write the table, then publish the bill
    ///
    /// Id allocation, the write and the insert happen under one lock.
    fn store_bill(
        &self,
        build: impl FnOnce(BillId) -> Result<ClientBill, CoreError>,
    ) -> Result<Arc<ClientBill>, CoreError> {
        let _writes = self.bills_writes.lock();
        let id = self.bills.iter().map(|r| *r.key()).max().unwrap_or(0) + 1;
        let bill = Arc::new(build(id)?);

        let mut rows = self.bills();
        rows.retain(|b| b.id != bill.id);
        rows.push(Arc::clone(&bill));
        rows.sort_by_key(|b| b.id);
        write_table(&self.data_dir, Table::Bills, &rows)?;

        self.bills.insert(bill.id, Arc::clone(&bill));
        self.event_bus.publish(DataEvent::BillUpdated(bill.id));
        info!(bill = bill.id, lead = bill.lead_id, amount = ?bill.amount, "Bill saved");
        Ok(bill)
    }

    /// Draft bill with one line per consultant who worked on the mission that month
    pub fn create_bill_from_timesheet(
        &self,
        mission_id: MissionId,
        month: NaiveDate,
        today: NaiveDate,
    ) -> Result<Arc<ClientBill>, CoreError> {
        self.ensure_writable()?;
        let vat = self.settings.read().default_vat;
        self.store_bill(|id| {
            let ds = self.dataset.read();
            create_client_bill_from_timesheet(&ds, mission_id, month, id, vat, today)
        })
    }

    /// Draft bill for a share of a fixed price mission
    pub fn create_bill_from_proportion(
        &self,
        mission_id: MissionId,
        proportion: f64,
        today: NaiveDate,
    ) -> Result<Arc<ClientBill>, CoreError> {
        self.ensure_writable()?;
        let vat = self.settings.read().default_vat;
        self.store_bill(|id| {
            let ds = self.dataset.read();
            create_client_bill_from_proportion(&ds, mission_id, proportion, id, vat, today)
        })
    }

    // ===================
    // Expenses
    // ===================

    /// Build an expense (given the next free id), write the table, then publish it
    fn store_expense(
        &self,
        build: impl FnOnce(ExpenseId) -> Result<Expense, CoreError>,
    ) -> Result<Arc<Expense>, CoreError> {
        let _writes = self.expenses_writes.lock();
        let next_id = self.expenses.iter().map(|r| *r.key()).max().unwrap_or(0) + 1;
        let expense = Arc::new(build(next_id)?);

        let mut rows = self.expenses();
        rows.retain(|e| e.id != expense.id);
        rows.push(Arc::clone(&expense));
        rows.sort_by_key(|e| e.id);
        write_table(&self.data_dir, Table::Expenses, &rows)?;

        self.expenses.insert(expense.id, Arc::clone(&expense));
        self.event_bus.publish(DataEvent::ExpenseUpdated(expense.id));
        Ok(expense)
    }

    /// Close the workflow of expenses that ended long ago; returns how many
    pub fn prune_expenses(&self, today: NaiveDate) -> Result<usize, CoreError> {
        self.ensure_writable()?;
        let _writes = self.expenses_writes.lock();
        let mut rows = self.expenses();
        let ids = expense::expenses_to_prune(&rows, today);
        if ids.is_empty() {
            return Ok(0);
        }
        for row in rows.iter_mut().filter(|e| ids.contains(&e.id)) {
            let mut closed = row.as_ref().clone();
            closed.workflow_in_progress = false;
            *row = Arc::new(closed);
        }
        write_table(&self.data_dir, Table::Expenses, &rows)?;

        for row in rows.iter().filter(|e| ids.contains(&e.id)) {
            self.expenses.insert(row.id, Arc::clone(row));
        }
        debug!(count = ids.len(), "Expense workflows closed");
        Ok(ids.len())
    }

    /// Dashboard of the user, after closing stale workflows when writable
    pub fn expenses_dashboard(
        &self,
        username: &str,
        today: NaiveDate,
    ) -> Result<ExpensesDashboard, CoreError> {
        if !self.degraded_state.read().is_read_only() {
            self.prune_expenses(today)?;
        }
        let ds = self.dataset.read();
        expense::expenses_dashboard(&ds, &self.expenses(), username)
    }

    pub fn expenses_history(&self, username: &str) -> Result<Vec<Arc<Expense>>, CoreError> {
        let ds = self.dataset.read();
        expense::expenses_history(&ds, &self.expenses(), username)
    }

    pub fn mission_expenses(&self, mission_id: MissionId) -> Vec<Arc<Expense>> {
        let ds = self.dataset.read();
        expense::mission_expenses(&ds, &self.expenses(), mission_id)
    }

    /// Create an expense, or update `existing_id`
    pub fn submit_expense(
        &self,
        username: &str,
        draft: &ExpenseDraft,
        existing_id: Option<ExpenseId>,
        today: NaiveDate,
    ) -> Result<Arc<Expense>, CoreError> {
        self.ensure_writable()?;
        self.store_expense(|new_id| {
            let existing = match existing_id {
                Some(id) => Some(self.expense(id).ok_or(CoreError::ExpenseNotFound { id })?),
                None => None,
            };
            let ds = self.dataset.read();
            expense::submit_expense(&ds, username, draft, existing.as_deref(), new_id, today)
        })
    }

    pub fn update_expense_state(
        &self,
        username: &str,
        expense_id: ExpenseId,
        transition: &str,
        today: NaiveDate,
    ) -> Result<Arc<Expense>, CoreError> {
        self.ensure_writable()?;
        self.store_expense(|_| {
            let current = self
                .expense(expense_id)
                .ok_or(CoreError::ExpenseNotFound { id: expense_id })?;
            let ds = self.dataset.read();
            expense::update_expense_state(&ds, username, &current, transition, today)
        })
    }

    /// Receipt metadata with its absolute path
    pub fn expense_receipt(
        &self,
        username: &str,
        expense_id: ExpenseId,
    ) -> Result<Option<(PathBuf, ReceiptInfo)>, CoreError> {
        let expense = self
            .expense(expense_id)
            .ok_or(CoreError::ExpenseNotFound { id: expense_id })?;
        let ds = self.dataset.read();
        Ok(expense::expense_receipt(&ds, username, &expense)?
            .map(|info| (self.data_dir.join(&info.path), info)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{d, expense, sample_dataset, today};
    use crate::models::ExpenseState;
    use crate::staffing::TimesheetEntry;
    use tempfile::tempdir;

    async fn loaded_store(dir: &Path) -> DataStore {
        write_dataset(dir, &sample_dataset()).unwrap();
        let store = DataStore::with_defaults(dir.to_path_buf());
        store.initial_load().await;
        store
    }

    #[tokio::test]
    async fn test_data_store_creation() {
        let dir = tempdir().unwrap();
        let store = DataStore::with_defaults(dir.path().to_path_buf());

        assert_eq!(store.summary(), StoreSummary::default());
        assert!(store.degraded_state().is_healthy());
        assert_eq!(store.settings().fiscal_year_month, 4);
    }

    #[tokio::test]
    async fn test_initial_load_missing_dir() {
        let dir = tempdir().unwrap();
        let store = DataStore::with_defaults(dir.path().join("nonexistent"));

        let report = store.initial_load().await;

        assert!(report.has_fatal_errors());
        assert!(store.degraded_state().is_read_only());
        assert!(matches!(
            store.prune_expenses(today()),
            Err(CoreError::ReadOnly { .. })
        ));
    }

    #[tokio::test]
    async fn test_initial_load_with_data() {
        let dir = tempdir().unwrap();
        let store = loaded_store(dir.path()).await;

        let summary = store.summary();
        assert_eq!(summary.consultants, 5);
        assert_eq!(summary.missions, 5);
        assert_eq!(summary.bills, 0);
        // bills and expenses files are missing
        assert!(matches!(
            store.degraded_state(),
            DegradedState::PartialData { ref missing, .. } if missing.len() == 2
        ));
    }

    #[tokio::test]
    async fn test_malformed_table_is_read_only() {
        let dir = tempdir().unwrap();
        write_dataset(dir.path(), &sample_dataset()).unwrap();
        std::fs::write(dir.path().join("missions.json"), "[{\"id\": ").unwrap();

        let store = DataStore::new(
            dir.path().to_path_buf(),
            None,
            DataStoreConfig {
                table_retry_count: 0,
                ..DataStoreConfig::default()
            },
        );
        let report = store.initial_load().await;

        assert_eq!(report.tables_failed, 1);
        assert!(store.degraded_state().is_read_only());
        assert_eq!(store.summary().missions, 0);
    }

    #[tokio::test]
    async fn test_save_timesheet_persists_and_publishes() {
        let dir = tempdir().unwrap();
        let store = loaded_store(dir.path()).await;
        let mut rx = store.event_bus().subscribe();

        let input = TimesheetInput {
            charges: vec![TimesheetEntry {
                mission_id: 100,
                day: d(2024, 5, 13),
                charge: 1.0,
            }],
            lunch_tickets: None,
        };
        let before = store.mission_totals(100, today()).await.unwrap();
        store
            .save_timesheet("bdu", 2, d(2024, 5, 1), &input, today())
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, DataEvent::TimesheetSaved(2, ref month) if month == "2024-05"));

        let after = store.mission_totals(100, today()).await.unwrap();
        assert_eq!(after.done_days, before.done_days + 1.0);

        let reloaded = DataStore::with_defaults(dir.path().to_path_buf());
        reloaded.initial_load().await;
        assert_eq!(reloaded.summary().timesheets, store.summary().timesheets);
    }

    #[tokio::test]
    async fn test_bill_from_timesheet_gets_next_id() {
        let dir = tempdir().unwrap();
        let store = loaded_store(dir.path()).await;

        let first = store.create_bill_from_timesheet(101, d(2024, 5, 1), today()).unwrap();
        let second = store.create_bill_from_timesheet(101, d(2024, 5, 1), today()).unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.vat, 20.0);
        assert!(dir.path().join("bills.json").exists());
        assert!(store.bill(2).is_some());
    }

    #[tokio::test]
    async fn test_expense_lifecycle() {
        let dir = tempdir().unwrap();
        let store = loaded_store(dir.path()).await;

        let draft = ExpenseDraft {
            lead_id: Some(10),
            description: "Train to Lyon".to_string(),
            category: "transport".to_string(),
            amount: 120.0,
            chargeable: true,
            expense_date: d(2024, 5, 3),
            receipt: Some("receipts/train.pdf".to_string()),
        };
        let created = store.submit_expense("bdu", &draft, None, today()).unwrap();
        assert_eq!(created.id, 1);
        assert_eq!(created.state, ExpenseState::Requested);

        let validated = store
            .update_expense_state("ama", created.id, "validate", today())
            .unwrap();
        assert_eq!(validated.state, ExpenseState::ValidatedByManager);

        let (path, info) = store.expense_receipt("bdu", 1).unwrap().unwrap();
        assert_eq!(path, dir.path().join("receipts/train.pdf"));
        assert_eq!(info.content_type, "application/pdf");

        assert!(matches!(
            store.update_expense_state("ama", 42, "validate", today()),
            Err(CoreError::ExpenseNotFound { id: 42 })
        ));
    }

    #[tokio::test]
    async fn test_prune_closes_old_workflows() {
        let dir = tempdir().unwrap();
        let store = loaded_store(dir.path()).await;
        let mut paid = expense(7, "bdu", Some(10), ExpenseState::Paid);
        paid.update_date = d(2024, 3, 1);
        store.expenses.insert(7, Arc::new(paid));
        store
            .expenses
            .insert(8, Arc::new(expense(8, "bdu", None, ExpenseState::Requested)));

        assert_eq!(store.prune_expenses(today()).unwrap(), 1);
        assert!(!store.expense(7).unwrap().workflow_in_progress);
        assert!(store.expense(8).unwrap().workflow_in_progress);
        assert_eq!(store.prune_expenses(today()).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reload_table_keeps_previous_on_error() {
        let dir = tempdir().unwrap();
        let store = DataStore::new(
            dir.path().to_path_buf(),
            None,
            DataStoreConfig {
                table_retry_count: 0,
                ..DataStoreConfig::default()
            },
        );
        write_dataset(dir.path(), &sample_dataset()).unwrap();
        store.initial_load().await;
        let mut rx = store.event_bus().subscribe();

        std::fs::write(dir.path().join("holidays.json"), "not json").unwrap();
        store.reload_table(Table::Holidays).await;
        assert_eq!(store.dataset().holidays.len(), 2);
        assert!(matches!(rx.recv().await.unwrap(), DataEvent::WatcherError(_)));

        std::fs::write(dir.path().join("holidays.json"), "[]").unwrap();
        store.reload_table(Table::Holidays).await;
        assert!(store.dataset().holidays.is_empty());
        assert!(matches!(
            rx.recv().await.unwrap(),
            DataEvent::DatasetReloaded(ref t) if t == "holidays"
        ));
    }

    #[tokio::test]
    async fn test_similarity_needs_enough_consultants() {
        let dir = tempdir().unwrap();
        let store = loaded_store(dir.path()).await;

        assert!(store.similarity_model(today()).await.is_none());
        assert!(store.similar_consultants(2, today()).await.unwrap().is_empty());
        assert!(store.similar_consultants(42, today()).await.is_err());
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let dir = tempdir().unwrap();
        let store = DataStore::with_defaults(dir.path().to_path_buf());

        let mut rx = store.event_bus().subscribe();
        store.event_bus().publish(DataEvent::BillUpdated(3));

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, DataEvent::BillUpdated(3)));
    }
}
