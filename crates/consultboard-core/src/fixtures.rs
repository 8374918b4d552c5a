//! Sample firm used by unit tests
//!
//! "Today" is 2024-05-15. Alpha Conseil (1) runs the missions, Beta Partners (2)
//! lends one consultant.

use crate::models::people::{features, perms, roles};
use crate::models::*;
use chrono::NaiveDate;

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

pub fn today() -> NaiveDate {
    d(2024, 5, 15)
}

fn consultant(
    id: u64,
    name: &str,
    trigramme: &str,
    company_id: u64,
    profil_id: u64,
    manager: Option<u64>,
) -> Consultant {
    Consultant {
        id,
        name: name.to_string(),
        trigramme: trigramme.to_string(),
        company_id,
        profil_id,
        manager_id: manager,
        staffing_manager_id: manager,
        productive: true,
        active: true,
        subcontractor: false,
    }
}

fn mission(
    id: u64,
    lead_id: Option<u64>,
    deal_id: &str,
    description: &str,
    nature: MissionNature,
    billing_mode: BillingMode,
    price: Option<f64>,
) -> Mission {
    Mission {
        id,
        lead_id,
        deal_id: deal_id.to_string(),
        description: description.to_string(),
        nature,
        billing_mode,
        probability: 100,
        probability_auto: true,
        price,
        active: true,
        subsidiary_id: 1,
        responsible_id: None,
    }
}

fn lead(id: u64, name: &str, deal_id: &str, company: &str, responsible: u64, tags: &[&str]) -> Lead {
    Lead {
        id,
        name: name.to_string(),
        deal_id: deal_id.to_string(),
        client_organisation: "IT".to_string(),
        client_company: company.to_string(),
        business_broker: None,
        subsidiary_id: 1,
        responsible_id: Some(responsible),
        state: LeadState::Won,
        sales: Some(80.0),
        creation_date: d(2024, 1, 10),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        staffing: vec![2],
    }
}

pub fn ts(consultant_id: u64, mission_id: u64, date: NaiveDate, charge: f64) -> Timesheet {
    Timesheet {
        consultant_id,
        mission_id,
        working_date: date,
        charge,
    }
}

pub fn staffing(consultant_id: u64, mission_id: u64, month: NaiveDate, charge: f64) -> Staffing {
    Staffing {
        consultant_id,
        mission_id,
        staffing_date: month,
        charge,
        comment: None,
        update_date: None,
        last_user: None,
    }
}

fn fc(consultant_id: u64, mission_id: u64, rate: f64, bought: Option<f64>) -> FinancialCondition {
    FinancialCondition {
        consultant_id,
        mission_id,
        daily_rate: rate,
        bought_daily_rate: bought,
    }
}

fn objective(consultant_id: u64, start: NaiveDate, rate: f64, rate_type: RateObjectiveType) -> RateObjective {
    RateObjective {
        consultant_id,
        start_date: start,
        rate,
        rate_type,
    }
}

fn user(username: &str) -> User {
    let mut user = User::new(username);
    user.groups.insert("expense_requester".to_string());
    user
}

pub fn sample_dataset() -> Dataset {
    let mut ds = Dataset::default();

    for (id, name) in [(1, "Alpha Conseil"), (2, "Beta Partners")] {
        ds.subsidiaries.insert(
            id,
            Subsidiary {
                id,
                name: name.to_string(),
                code: name[..1].to_string(),
            },
        );
    }
    for (id, name, level) in [(1, "Junior", 1), (2, "Senior", 2), (3, "Manager", 3)] {
        ds.profiles.insert(
            id,
            ConsultantProfile {
                id,
                name: name.to_string(),
                level,
            },
        );
    }

    let mut consultants = vec![
        consultant(1, "Alice Martin", "AMA", 1, 3, None),
        consultant(2, "Bob Durand", "BDU", 1, 1, Some(1)),
        consultant(3, "Chloe Petit", "CPE", 2, 2, Some(1)),
        consultant(4, "Sam Contract", "SCO", 1, 2, Some(1)),
        consultant(5, "Dan Admin", "DAD", 1, 1, None),
    ];
    consultants[3].subcontractor = true;
    consultants[4].productive = false;
    for c in consultants {
        ds.consultants.insert(c.id, c);
    }

    let mut ama = user("ama");
    ama.roles.insert(roles::EXPENSE_MANAGER.to_string());
    ama.features.insert(features::TIMESHEET_SUBCONTRACTOR.to_string());
    let mut dad = user("dad");
    dad.roles.insert(roles::EXPENSE_PAYMASTER.to_string());
    for perm in [
        perms::ADD_TIMESHEET,
        perms::CHANGE_TIMESHEET,
        perms::DELETE_TIMESHEET,
        perms::ADD_FINANCIAL_CONDITION,
        perms::CHANGE_FINANCIAL_CONDITION,
    ] {
        dad.permissions.insert(perm.to_string());
    }
    for u in [ama, user("bdu"), user("cpe"), user("sco"), dad] {
        ds.users.insert(u.username.clone(), u);
    }

    ds.leads.insert(10, lead(10, "ERP migration", "ACM01", "Acme", 1, &["erp", "sap"]));
    ds.leads.insert(11, lead(11, "Data platform", "GLX02", "Globex", 2, &["data"]));

    let mut phase2 = mission(102, Some(11), "B", "Phase 2", MissionNature::Prod, BillingMode::TimeSpent, None);
    phase2.probability = 50;
    for m in [
        mission(100, Some(10), "A", "Build", MissionNature::Prod, BillingMode::FixedPrice, Some(30.0)),
        mission(101, Some(11), "A", "Run", MissionNature::Prod, BillingMode::TimeSpent, Some(50.0)),
        phase2,
        mission(200, None, "HOL", "Holidays", MissionNature::Holidays, BillingMode::TimeSpent, None),
        mission(201, None, "INT", "Internal", MissionNature::NonProd, BillingMode::TimeSpent, None),
    ] {
        ds.missions.insert(m.id, m);
    }
    if let Some(m) = ds.missions.get_mut(&100) {
        m.responsible_id = Some(1);
    }

    ds.financial_conditions = vec![
        fc(1, 100, 1000.0, None),
        fc(2, 100, 600.0, None),
        fc(3, 100, 700.0, None),
        fc(4, 101, 800.0, Some(500.0)),
        fc(2, 101, 650.0, None),
    ];

    ds.rate_objectives = vec![
        objective(1, d(2024, 1, 1), 900.0, RateObjectiveType::DailyRate),
        objective(1, d(2024, 1, 1), 80.0, RateObjectiveType::ProdRate),
        objective(2, d(2024, 1, 1), 550.0, RateObjectiveType::DailyRate),
        objective(2, d(2024, 1, 1), 90.0, RateObjectiveType::ProdRate),
        objective(2, d(2024, 4, 1), 600.0, RateObjectiveType::DailyRate),
    ];

    ds.holidays = vec![
        Holiday {
            day: d(2024, 5, 1),
            description: "Labour day".to_string(),
        },
        Holiday {
            day: d(2024, 5, 8),
            description: "Victory day".to_string(),
        },
    ];

    let mut timesheets: Vec<Timesheet> = (2..=5).map(|day| ts(2, 100, d(2024, 4, day), 1.0)).collect();
    timesheets.extend([
        ts(1, 100, d(2024, 5, 2), 1.0),
        ts(1, 100, d(2024, 5, 3), 1.0),
        ts(2, 100, d(2024, 5, 2), 1.0),
        ts(2, 100, d(2024, 5, 3), 0.5),
        ts(2, 201, d(2024, 5, 3), 0.5),
        ts(3, 100, d(2024, 5, 6), 1.0),
        ts(4, 101, d(2024, 5, 6), 1.0),
        ts(4, 101, d(2024, 5, 7), 1.0),
        ts(2, 200, d(2024, 5, 10), 1.0),
    ]);
    ds.timesheets = timesheets;

    ds.staffings = vec![
        staffing(2, 100, d(2024, 5, 1), 5.0),
        staffing(2, 100, d(2024, 6, 1), 10.0),
        staffing(1, 100, d(2024, 6, 1), 2.0),
        staffing(4, 101, d(2024, 5, 1), 10.0),
        staffing(2, 102, d(2024, 6, 1), 4.0),
        staffing(2, 200, d(2024, 6, 1), 1.0),
        staffing(2, 201, d(2024, 5, 1), 2.0),
    ];

    ds.lunch_tickets = vec![LunchTicket {
        consultant_id: 2,
        lunch_date: d(2024, 5, 3),
        no_ticket: true,
    }];

    ds
}

pub fn expense(id: u64, user: &str, lead_id: Option<u64>, state: ExpenseState) -> Expense {
    Expense {
        id,
        user: user.to_string(),
        lead_id,
        description: format!("Expense {id}"),
        category: "travel".to_string(),
        amount: 100.0,
        chargeable: lead_id.is_some(),
        creation_date: d(2024, 5, 4),
        expense_date: d(2024, 5, 3),
        update_date: d(2024, 5, 4),
        receipt: None,
        workflow_in_progress: true,
        state,
    }
}
