//! Integration tests: data directory → DataStore → reports, mutations and exports

use chrono::NaiveDate;
use consultboard_core::export::export_all_timesheet_to_csv;
use consultboard_core::models::{ExpenseDraft, ExpenseState};
use consultboard_core::parsers::Table;
use consultboard_core::staffing::{self, MissionAttribute, PdcReviewParams};
use consultboard_core::{DataEvent, DataStore, FileWatcher, WatcherConfig};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn write(dir: &Path, table: &str, value: serde_json::Value) {
    std::fs::write(dir.join(format!("{table}.json")), value.to_string()).unwrap();
}

/// Two consultants on one time spent mission, a paymaster without consultant record
fn seed(dir: &Path) {
    write(dir, "subsidiaries", json!([{"id": 1, "name": "Alpha Conseil", "code": "A"}]));
    write(
        dir,
        "profiles",
        json!([{"id": 1, "name": "Junior", "level": 1}, {"id": 2, "name": "Manager", "level": 3}]),
    );
    write(
        dir,
        "consultants",
        json!([
            {"id": 1, "name": "Alice Martin", "trigramme": "AMA", "company_id": 1, "profil_id": 2},
            {"id": 2, "name": "Bob Durand", "trigramme": "BDU", "company_id": 1, "profil_id": 1,
             "manager_id": 1, "staffing_manager_id": 1}
        ]),
    );
    write(
        dir,
        "users",
        json!([
            {"username": "ama", "roles": ["expense manager"], "groups": ["expense_requester"],
             "permissions": ["staffing.change_mission"]},
            {"username": "bdu", "groups": ["expense_requester"]},
            {"username": "pay", "roles": ["expense paymaster"]}
        ]),
    );
    write(
        dir,
        "leads",
        json!([{"id": 10, "name": "ERP migration", "deal_id": "ACM01", "client_company": "Acme",
                "subsidiary_id": 1, "responsible_id": 1, "state": "WON", "sales": 60.0,
                "creation_date": "2024-01-10", "tags": ["erp"]}]),
    );
    write(
        dir,
        "missions",
        json!([{"id": 100, "lead_id": 10, "deal_id": "A", "description": "Build", "nature": "PROD",
                "billing_mode": "TIME_SPENT", "price": 60.0, "subsidiary_id": 1}]),
    );
    write(
        dir,
        "financial_conditions",
        json!([
            {"consultant_id": 1, "mission_id": 100, "daily_rate": 900.0},
            {"consultant_id": 2, "mission_id": 100, "daily_rate": 600.0}
        ]),
    );
    write(
        dir,
        "timesheets",
        json!([
            {"consultant_id": 1, "mission_id": 100, "working_date": "2024-05-02", "charge": 1.0},
            {"consultant_id": 2, "mission_id": 100, "working_date": "2024-05-02", "charge": 1.0},
            {"consultant_id": 2, "mission_id": 100, "working_date": "2024-05-03", "charge": 0.5}
        ]),
    );
    write(
        dir,
        "staffings",
        json!([{"consultant_id": 2, "mission_id": 100, "staffing_date": "2024-06-01", "charge": 10.0}]),
    );
    write(dir, "holidays", json!([{"day": "2024-05-01", "description": "Labour day"}]));
    write(dir, "bills", json!([]));
    write(dir, "expenses", json!([]));
    std::fs::write(dir.join("consultboard.toml"), "fiscal_year_month = 1\ndefault_vat = 10.0\n").unwrap();
}

async fn loaded_store(dir: &Path) -> DataStore {
    seed(dir);
    let store = DataStore::with_defaults(dir.to_path_buf());
    let report = store.initial_load().await;
    assert!(!report.has_fatal_errors());
    store
}

#[tokio::test]
async fn test_load_and_report() {
    let dir = TempDir::new().unwrap();
    let store = loaded_store(dir.path()).await;

    let summary = store.summary();
    assert_eq!(summary.consultants, 2);
    assert_eq!(summary.timesheets, 3);
    assert_eq!(store.settings().fiscal_year_month, 1);
    // rate objectives and lunch tickets are not provided
    assert!(store.degraded_state().is_degraded());
    assert!(!store.degraded_state().is_read_only());

    let ds = store.dataset();
    let review = staffing::pdc_review(&ds, &PdcReviewParams::default(), d(2024, 5, 15)).unwrap();
    assert!(!review.months.is_empty());
}

#[tokio::test]
async fn test_mutations_are_persisted() {
    let dir = TempDir::new().unwrap();
    let store = loaded_store(dir.path()).await;

    let label = store
        .mission_update("ama", MissionAttribute::Probability, 100, "75")
        .await
        .unwrap();
    assert_eq!(label, "High");

    let bill = store
        .create_bill_from_timesheet(100, d(2024, 5, 1), d(2024, 5, 31))
        .unwrap();
    assert_eq!(bill.vat, 10.0);
    // 900 + 1.5 * 600
    assert_eq!(bill.amount, Some(1800.0));

    let reloaded = DataStore::with_defaults(dir.path().to_path_buf());
    reloaded.initial_load().await;
    assert_eq!(reloaded.dataset().missions[&100].probability, 75);
    assert!(!reloaded.dataset().missions[&100].probability_auto);
    assert_eq!(reloaded.bills().len(), 1);
}

#[tokio::test]
async fn test_expense_workflow_through_store() {
    let dir = TempDir::new().unwrap();
    let store = loaded_store(dir.path()).await;
    let today = d(2024, 5, 15);

    let draft = ExpenseDraft {
        lead_id: Some(10),
        description: "Hotel".to_string(),
        category: "lodging".to_string(),
        amount: 180.0,
        chargeable: true,
        expense_date: d(2024, 5, 2),
        receipt: None,
    };
    let expense = store.submit_expense("bdu", &draft, None, today).unwrap();

    let dashboard = store.expenses_dashboard("ama", today).unwrap();
    assert_eq!(dashboard.managed_expenses.len(), 1);

    // owner cannot validate
    assert!(store
        .update_expense_state("bdu", expense.id, "validate", today)
        .is_err());
    store
        .update_expense_state("ama", expense.id, "validate", today)
        .unwrap();
    store
        .update_expense_state("pay", expense.id, "control", today)
        .unwrap();
    let paid = store
        .update_expense_state("pay", expense.id, "pay", today)
        .unwrap();
    assert_eq!(paid.state, ExpenseState::Paid);

    assert_eq!(store.mission_expenses(100).len(), 1);
    assert_eq!(store.expenses_history("pay").unwrap().len(), 1);
}

#[tokio::test]
async fn test_export_all_timesheet() {
    let dir = TempDir::new().unwrap();
    let store = loaded_store(dir.path()).await;
    let path = dir.path().join("exports/2024-05.csv");

    let sheet = staffing::all_timesheet(&store.dataset(), d(2024, 5, 1), None).unwrap();
    export_all_timesheet_to_csv(&sheet, ",", &path).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.starts_with('\u{feff}'));
    assert!(contents.contains("Bob Durand"));
    assert!(contents.contains("1,5"));
}

#[tokio::test]
async fn test_watcher_reloads_changed_table() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(loaded_store(dir.path()).await);
    let mut rx = store.event_bus().subscribe();

    let watcher = FileWatcher::start(Arc::clone(&store), None, WatcherConfig::default())
        .await
        .unwrap();
    write(
        dir.path(),
        Table::Holidays.name(),
        json!([{"day": "2024-05-01"}, {"day": "2024-05-08"}]),
    );

    let reloaded = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Ok(DataEvent::DatasetReloaded(table)) = rx.recv().await {
                if table == "holidays" {
                    break;
                }
            }
        }
    })
    .await;
    watcher.stop().await;

    assert!(reloaded.is_ok(), "no reload event received");
    assert_eq!(store.dataset().holidays.len(), 2);
}

#[tokio::test]
async fn test_malformed_bills_reload_keeps_bills() {
    let dir = TempDir::new().unwrap();
    let store = loaded_store(dir.path()).await;
    let mut rx = store.event_bus().subscribe();

    for _ in 0..2 {
        store
            .create_bill_from_timesheet(100, d(2024, 5, 1), d(2024, 5, 31))
            .unwrap();
    }
    std::fs::write(dir.path().join("bills.json"), r#"[{"id": 1,"#).unwrap();

    store.reload_table(Table::Bills).await;
    assert_eq!(store.bills().len(), 2);
    let mut watcher_error = false;
    while let Ok(event) = rx.try_recv() {
        watcher_error |= matches!(event, DataEvent::WatcherError(_));
    }
    assert!(watcher_error);

    let third = store
        .create_bill_from_timesheet(100, d(2024, 5, 1), d(2024, 5, 31))
        .unwrap();
    assert_eq!(third.id, 3);

    let on_disk: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("bills.json")).unwrap())
            .unwrap();
    assert_eq!(on_disk.len(), 3);
}

#[tokio::test]
async fn test_malformed_expenses_reload_keeps_expenses() {
    let dir = TempDir::new().unwrap();
    let store = loaded_store(dir.path()).await;
    let draft = ExpenseDraft {
        lead_id: Some(10),
        description: "Train".to_string(),
        category: "transport".to_string(),
        amount: 80.0,
        chargeable: false,
        expense_date: d(2024, 5, 2),
        receipt: None,
    };
    store.submit_expense("bdu", &draft, None, d(2024, 5, 15)).unwrap();
    std::fs::write(dir.path().join("expenses.json"), "[{").unwrap();

    store.reload_table(Table::Expenses).await;

    assert_eq!(store.expenses().len(), 1);
}

#[tokio::test]
async fn test_concurrent_bill_creation() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(loaded_store(dir.path()).await);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                store.create_bill_from_timesheet(100, d(2024, 5, 1), d(2024, 5, 31))
            })
        })
        .collect();
    let mut ids: Vec<u64> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap().id)
        .collect();
    ids.sort_unstable();

    assert_eq!(ids, (1..=16).collect::<Vec<u64>>());
    let on_disk: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("bills.json")).unwrap())
            .unwrap();
    assert_eq!(on_disk.len(), 16);
}

#[tokio::test]
async fn test_failed_write_leaves_memory_unchanged() {
    let dir = TempDir::new().unwrap();
    let store = loaded_store(dir.path()).await;

    // a directory in place of the table file makes the final rename fail
    std::fs::create_dir(dir.path().join("bills.json")).unwrap();
    assert!(store
        .create_bill_from_timesheet(100, d(2024, 5, 1), d(2024, 5, 31))
        .is_err());
    assert!(store.bills().is_empty());

    std::fs::remove_file(dir.path().join("missions.json")).unwrap();
    std::fs::create_dir(dir.path().join("missions.json")).unwrap();
    assert!(store
        .mission_update("ama", MissionAttribute::Probability, 100, "75")
        .await
        .is_err());
    assert_eq!(store.dataset().missions[&100].probability, 50);
}
