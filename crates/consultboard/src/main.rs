//! consultboard - staffing, billing and expenses of a consulting firm

mod cli;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use consultboard_core::billing::{self, bill_pdf_filename, BillingControlFilter};
use consultboard_core::error::LoadReport;
use consultboard_core::export::{
    export_all_timesheet_to_csv, export_detailed_timesheet_to_csv,
    export_mission_timesheet_to_csv, export_to_json,
};
use consultboard_core::models::{ConsultantId, MissionId, SubsidiaryId};
use consultboard_core::staffing::{self, PdcReviewParams, Projection};
use consultboard_core::{default_data_dir, DataStore, DataStoreConfig, FileWatcher, WatcherConfig};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "consultboard=info,consultboard_core=info,consultboard_web=info";

#[derive(Parser)]
#[command(
    name = "consultboard",
    version,
    about = "Staffing, timesheets, billing and expenses of a consulting firm",
    long_about = "Loads the JSON tables of a data directory and serves them over HTTP,\n\
                  or prints forecast, production and billing reports.\n\
                  \n\
                  Examples:\n\
                    consultboard web --port 8080                 # API server with live reload\n\
                    consultboard stats                           # Table sizes and load warnings\n\
                    consultboard pdc-review --months 6           # Forecast of the next 6 months\n\
                    consultboard export-timesheet all 2024-05 may.csv\n\
                  \n\
                  Environment Variables:\n\
                    CONSULTBOARD_DATA_DIR            # Data directory (default: ~/.consultboard)\n\
                    CONSULTBOARD_CONFIG              # Settings file (default: <data dir>/consultboard.toml)\n\
                    CONSULTBOARD_FORMAT              # Force output format: json|table\n\
                    CONSULTBOARD_NO_COLOR            # Disable ANSI colors (log-friendly)\n\
                    RUST_LOG                         # Log filter"
)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,

    /// Directory holding the JSON tables
    #[arg(long, global = true, env = "CONSULTBOARD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Settings file
    #[arg(long, global = true, env = "CONSULTBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Force output format (json|table)
    #[arg(long, global = true, env = "CONSULTBOARD_FORMAT", value_parser = ["json", "table"])]
    format: Option<String>,

    /// Disable ANSI colors (log-friendly)
    #[arg(long, global = true, env = "CONSULTBOARD_NO_COLOR")]
    no_color: bool,

    /// Debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum TimesheetExport {
    /// Days per consultant and mission
    All,
    /// One line per consultant, mission and month with amounts
    Detailed,
}

#[derive(Subcommand)]
enum Mode {
    /// Run the HTTP API with live reload of the data directory
    Web {
        /// Port (default from settings)
        #[arg(long)]
        port: Option<u16>,
        /// Bind address (default from settings)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print table sizes and load warnings
    Stats,
    /// Forecast of productive consultants (plan de charge)
    PdcReview {
        /// First month, YYYY-MM (default: current month)
        #[arg(long)]
        start: Option<String>,
        /// Number of months
        #[arg(long)]
        months: Option<u32>,
        /// How unsigned missions count: none|balanced|full
        #[arg(long, default_value = "balanced", value_parser = ["none", "balanced", "full"])]
        projection: String,
        /// Staffing manager whose team is shown
        #[arg(long)]
        team: Option<ConsultantId>,
        #[arg(long)]
        subsidiary: Option<SubsidiaryId>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Turnover against forecast per consultant
    ProdReport {
        /// Last month, YYYY-MM (default: current month)
        #[arg(long)]
        end: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Done and forecasted days of a mission
    MissionTimesheet {
        id: MissionId,
        /// Write the report as CSV instead of printing it
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Export a month of timesheets as CSV
    ExportTimesheet {
        #[arg(value_enum)]
        kind: TimesheetExport,
        /// YYYY-MM
        month: String,
        path: PathBuf,
    },
    /// Due and billed amounts per lead, consultant and month
    BillingControl {
        /// Write the rows as JSON to this file
        #[arg(long)]
        json: Option<PathBuf>,
        #[arg(long)]
        subsidiary: Option<SubsidiaryId>,
        /// Only leads with an active mission
        #[arg(long)]
        active: bool,
    },
    /// Create a draft bill from a month of timesheets
    BillFromTimesheet {
        mission: MissionId,
        /// YYYY-MM
        month: String,
    },
    /// Consultants with the closest experience
    Similar { consultant: ConsultantId },
}

/// Store location and output flags shared by all commands
struct Opts {
    data_dir: PathBuf,
    config: Option<PathBuf>,
    json: bool,
    no_color: bool,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let data_dir = cli
        .data_dir
        .or_else(default_data_dir)
        .context("Could not determine the data directory")?;
    let ctx = Opts {
        data_dir,
        config: cli.config,
        json: cli.format.as_deref() == Some("json"),
        no_color: cli.no_color,
    };

    match cli.mode {
        Mode::Web { port, bind } => run_web(&ctx, bind, port).await,
        Mode::Stats => run_stats(&ctx).await,
        Mode::PdcReview {
            start,
            months,
            projection,
            team,
            subsidiary,
            json,
        } => {
            let params = PdcReviewParams {
                start: start.as_deref().map(cli::parse_month_arg).transpose()?,
                n_month: months,
                projection: Projection::parse(&projection).unwrap_or_default(),
                team,
                subsidiary,
                ..Default::default()
            };
            run_pdc_review(&ctx, params, json).await
        }
        Mode::ProdReport { end, json } => run_prod_report(&ctx, end, json).await,
        Mode::MissionTimesheet { id, csv } => run_mission_timesheet(&ctx, id, csv).await,
        Mode::ExportTimesheet { kind, month, path } => {
            run_export_timesheet(&ctx, kind, &month, path).await
        }
        Mode::BillingControl {
            json,
            subsidiary,
            active,
        } => {
            let filter = BillingControlFilter {
                subsidiary,
                only_active: active,
                ..Default::default()
            };
            run_billing_control(&ctx, filter, json).await
        }
        Mode::BillFromTimesheet { mission, month } => {
            run_bill_from_timesheet(&ctx, mission, &month).await
        }
        Mode::Similar { consultant } => run_similar(&ctx, consultant).await,
    }
}

fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
    }
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Load the data directory, failing on fatal load errors
async fn load_store(ctx: &Opts, quiet: bool) -> Result<(Arc<DataStore>, LoadReport)> {
    let start = Instant::now();
    let progress = (!quiet).then(spinner);
    if let Some(p) = &progress {
        p.set_message(format!("Loading {}...", ctx.data_dir.display()));
    }

    let store = Arc::new(DataStore::new(
        ctx.data_dir.clone(),
        ctx.config.clone(),
        DataStoreConfig::default(),
    ));
    let report = store.initial_load().await;

    if report.has_fatal_errors() {
        if let Some(p) = progress {
            p.finish_and_clear();
        }
        let details: Vec<String> = report
            .errors
            .iter()
            .map(|e| match &e.suggestion {
                Some(hint) => format!("  - {}: {} ({})", e.source, e.message, hint),
                None => format!("  - {}: {}", e.source, e.message),
            })
            .collect();
        bail!("Fatal errors during data load:\n{}", details.join("\n"));
    }

    if let Some(p) = progress {
        p.finish_with_message(format!(
            "✓ Loaded {} tables in {:.2}s",
            report.tables_loaded,
            start.elapsed().as_secs_f64()
        ));
    }
    let state = store.degraded_state();
    if state.is_read_only() {
        eprintln!("⚠ Data store is read-only: some tables could not be parsed");
    }
    Ok((store, report))
}

async fn run_web(ctx: &Opts, bind: Option<String>, port: Option<u16>) -> Result<()> {
    let (store, _report) = load_store(ctx, false).await?;

    let settings = store.settings();
    let bind = bind.unwrap_or(settings.web.bind);
    let port = port.unwrap_or(settings.web.port);

    let _watcher = FileWatcher::start(Arc::clone(&store), ctx.config.clone(), WatcherConfig::default())
        .await
        .context("Failed to start file watcher")?;

    println!("\n🌐 API: http://{bind}:{port}/api/*");
    consultboard_web::run(store, &bind, port).await
}

async fn run_stats(ctx: &Opts) -> Result<()> {
    let (store, report) = load_store(ctx, ctx.json).await?;
    println!("{}", cli::format_summary(&store.summary(), &report, ctx.json));
    Ok(())
}

async fn run_pdc_review(ctx: &Opts, params: PdcReviewParams, json: bool) -> Result<()> {
    let json = json || ctx.json;
    let (store, _) = load_store(ctx, json).await?;
    let today = Local::now().date_naive();

    let review = staffing::pdc_review(&store.dataset(), &params, today)?;
    println!("{}", cli::format_pdc_review(&review, json, ctx.no_color));
    Ok(())
}

async fn run_prod_report(ctx: &Opts, end: Option<String>, json: bool) -> Result<()> {
    let json = json || ctx.json;
    let end = end.as_deref().map(cli::parse_month_arg).transpose()?;
    let (store, _) = load_store(ctx, json).await?;
    let today = Local::now().date_naive();

    let report = staffing::prod_report(&store.dataset(), end, None, None, today);
    println!("{}", cli::format_prod_report(&report, json, ctx.no_color));
    Ok(())
}

async fn run_mission_timesheet(ctx: &Opts, id: MissionId, csv: Option<PathBuf>) -> Result<()> {
    let (store, _) = load_store(ctx, ctx.json).await?;
    let separator = store.settings().decimal_separator;
    let ds = store.dataset();

    if let Some(path) = csv {
        export_mission_timesheet_to_csv(&ds, id, &separator, &path)?;
        println!("✓ Written {}", path.display());
        return Ok(());
    }

    if ctx.json {
        let today = Local::now().date_naive();
        let timesheet = staffing::mission_timesheet(&ds, id, today)?;
        println!("{}", cli::to_json(&timesheet));
    } else {
        let rows = staffing::timesheet_report_data(&ds, id, None, None, false, &separator)?;
        println!("{}", cli::format_rows(&rows, ctx.no_color));
    }
    Ok(())
}

async fn run_export_timesheet(
    ctx: &Opts,
    kind: TimesheetExport,
    month: &str,
    path: PathBuf,
) -> Result<()> {
    let month = cli::parse_month_arg(month)?;
    let (store, _) = load_store(ctx, false).await?;
    let separator = store.settings().decimal_separator;
    let ds = store.dataset();

    match kind {
        TimesheetExport::All => {
            let Some(sheet) = staffing::all_timesheet(&ds, month, None) else {
                bail!("No timesheet recorded for {}", month.format("%Y-%m"));
            };
            export_all_timesheet_to_csv(&sheet, &separator, &path)?;
        }
        TimesheetExport::Detailed => {
            let lines = staffing::detailed_timesheet(&ds, month);
            export_detailed_timesheet_to_csv(&lines, &separator, &path)?;
        }
    }
    println!("✓ Written {}", path.display());
    Ok(())
}

async fn run_billing_control(
    ctx: &Opts,
    filter: BillingControlFilter,
    json_path: Option<PathBuf>,
) -> Result<()> {
    let (store, _) = load_store(ctx, ctx.json).await?;
    let bills = store.bills();
    let expenses = store.expenses();
    let rows =
        billing::client_billing_control_pivotable_data(&store.dataset(), &bills, &expenses, &filter);

    if let Some(path) = json_path {
        export_to_json(&rows, &path)?;
        println!("✓ Written {} rows to {}", rows.len(), path.display());
        return Ok(());
    }
    println!("{}", cli::format_billing_control(&rows, ctx.json, ctx.no_color));
    Ok(())
}

async fn run_bill_from_timesheet(ctx: &Opts, mission: MissionId, month: &str) -> Result<()> {
    let month = cli::parse_month_arg(month)?;
    let (store, _) = load_store(ctx, ctx.json).await?;
    let today = Local::now().date_naive();

    let bill = store.create_bill_from_timesheet(mission, month, today)?;
    let ds = store.dataset();
    let pdf = bill_pdf_filename(&ds, &bill);
    println!("{}", cli::format_bill(&ds, &bill, &pdf, ctx.json));
    Ok(())
}

async fn run_similar(ctx: &Opts, consultant: ConsultantId) -> Result<()> {
    let (store, _) = load_store(ctx, ctx.json).await?;
    let today = Local::now().date_naive();

    let spinner = (!ctx.json).then(spinner);
    if let Some(s) = &spinner {
        s.set_message("Fitting similarity model...");
    }
    let ids = store.similar_consultants(consultant, today).await?;
    if let Some(s) = spinner {
        s.finish_and_clear();
    }

    let ds = store.dataset();
    let consultants: Vec<_> = ids.iter().filter_map(|id| ds.consultant(*id).ok()).collect();
    println!("{}", cli::format_consultants(&consultants, ctx.json, ctx.no_color));
    Ok(())
}
