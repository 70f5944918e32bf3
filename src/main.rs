use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

// Use library instead of local modules
use expense_dashboard::{
    aggregate, export_report, format_amount,
    import::read_table,
    normalize_table, parse_date, Bucket, CanonicalField, DashboardView, ExpenseRecord,
    ExpenseStore, Filter, GroupBy, Settings, CATEGORY_CHOICES,
};

#[derive(Parser)]
#[command(name = "expense-dashboard", version, about = "Site expense tracking: entry, import, dashboard")]
struct Cli {
    /// Settings file (defaults to ./expense-dashboard.toml when present).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Backing CSV file; overrides `data_file` from the settings.
    #[arg(long, global = true, value_name = "PATH")]
    data: Option<PathBuf>,

    /// Write debug logs to the temp dir (the TUI otherwise logs nothing).
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Open the terminal UI (default)
    Ui,

    /// Record one expense
    Add {
        /// Expense date; today when omitted
        #[arg(long)]
        date: Option<String>,

        #[arg(long)]
        amount: String,

        #[arg(long, default_value = "Other",
              value_parser = clap::builder::PossibleValuesParser::new(CATEGORY_CHOICES))]
        category: String,

        #[arg(long)]
        supervisor: Option<String>,

        #[arg(long)]
        site: Option<String>,

        #[arg(long, default_value = "")]
        summary: String,
    },

    /// Normalize a CSV/TSV/spreadsheet and preview it
    Import {
        file: PathBuf,

        /// Append the cleaned rows to the store
        #[arg(long)]
        commit: bool,
    },

    /// KPIs, a breakdown and spike alerts for the filtered data
    Dashboard {
        #[command(flatten)]
        filter: FilterArgs,

        #[arg(long, default_value = "category")]
        group_by: GroupBy,
    },

    /// Print every stored expense
    Table,

    /// Write the filtered records as a report CSV
    Export {
        /// Report path; defaults to `report_file` from the settings
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Delete every stored expense
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// First day to include
    #[arg(long, value_name = "DATE")]
    from: Option<String>,

    /// Last day to include
    #[arg(long, value_name = "DATE")]
    to: Option<String>,

    /// Only these sites (repeatable)
    #[arg(long = "site", value_name = "SITE")]
    sites: Vec<String>,

    /// Only these supervisors (repeatable)
    #[arg(long = "supervisor", value_name = "NAME")]
    supervisors: Vec<String>,
}

impl FilterArgs {
    /// Start from the full span of `records`, then narrow.
    fn to_filter(&self, records: &[ExpenseRecord]) -> Result<Filter> {
        let mut filter = Filter::spanning(records);

        if let Some(from) = &self.from {
            filter.start = Some(cli_date(from)?);
        }
        if let Some(to) = &self.to {
            filter.end = Some(cli_date(to)?);
        }
        if !self.sites.is_empty() {
            filter = filter.with_sites(self.sites.iter().cloned());
        }
        if !self.supervisors.is_empty() {
            filter = filter.with_supervisors(self.supervisors.iter().cloned());
        }

        Ok(filter)
    }
}

fn cli_date(raw: &str) -> Result<NaiveDate> {
    parse_date(raw).with_context(|| format!("'{}' is not a recognised date", raw))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(data) = cli.data {
        settings = settings.with_data_file(data);
    }

    let command = cli.command.unwrap_or(Command::Ui);
    init_logging(matches!(command, Command::Ui), cli.debug)?;

    match command {
        Command::Ui => run_ui_mode(settings),
        Command::Add { date, amount, category, supervisor, site, summary } => {
            let record = new_entry(date, &amount, category, supervisor, site, &summary)?;
            run_add(&settings, record)
        }
        Command::Import { file, commit } => run_import(&settings, &file, commit),
        Command::Dashboard { filter, group_by } => run_dashboard(&settings, &filter, group_by),
        Command::Table => run_table(&settings),
        Command::Export { out, filter } => run_export(&settings, out, &filter),
        Command::Clear { yes } => run_clear(&settings, yes),
    }
}

/// Subcommands log warnings to stderr; the TUI owns the terminal, so it only
/// logs to a file and only with `--debug`.
fn init_logging(tui: bool, debug: bool) -> Result<()> {
    let filter = |default: &str| {
        tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default))
    };

    if debug {
        let path = std::env::temp_dir().join("expense-dashboard-debug.log");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .with_env_filter(filter("debug"))
            .init();
        tracing::info!("debug log started, tail -f {}", path.display());
    } else if !tui {
        tracing_subscriber::fmt()
            .with_writer(io::stderr)
            .with_env_filter(filter("warn"))
            .init();
    }

    Ok(())
}

/// Date defaults to today; blank supervisor or site keep `Unknown`.
fn new_entry(
    date: Option<String>,
    amount: &str,
    category: String,
    supervisor: Option<String>,
    site: Option<String>,
    summary: &str,
) -> Result<ExpenseRecord> {
    let date = date.unwrap_or_else(|| chrono::Local::now().date_naive().to_string());

    Ok(ExpenseRecord::from_input(&date, amount)?
        .with_category(category)
        .with_entered_labels(supervisor.as_deref(), site.as_deref())
        .with_summary(summary.trim()))
}

fn run_add(settings: &Settings, record: ExpenseRecord) -> Result<()> {
    let mut store = ExpenseStore::load(&settings.data_file);
    let amount = format_amount(&settings.currency_symbol, record.amount);
    let date = record.date;
    store.append(record)?;

    println!("✅ Expense saved successfully: {} on {}", amount, date);
    println!("   {} records in {}", store.len(), store.path().display());
    Ok(())
}

fn run_import(settings: &Settings, file: &std::path::Path, commit: bool) -> Result<()> {
    println!("📂 Reading {}...", file.display());
    let table = read_table(file)?;
    let normalized = normalize_table(&table);

    println!("\n🔎 Column mapping");
    for field in CanonicalField::ALL {
        match normalized.mapping.source_header(field, table.headers()) {
            Some(header) => println!("   {:<11} ← \"{}\"", field.name(), header),
            None => match field.fallback() {
                Some(fallback) => println!("   {:<11} ← (not found, using \"{}\")", field.name(), fallback),
                None => println!("   {:<11} ← (not found)", field.name()),
            },
        }
    }

    println!("\n📊 Cleaned data preview ({})", normalized.summary());
    print_records(&normalized.records, &settings.currency_symbol);

    if !commit {
        println!("\nRe-run with --commit to add these rows to the dashboard.");
        return Ok(());
    }

    let mut store = ExpenseStore::load(&settings.data_file);
    let added = store.append_batch(normalized.records)?;
    println!("\n✅ File imported successfully: {} records added ({} total)", added, store.len());
    Ok(())
}

fn run_dashboard(settings: &Settings, args: &FilterArgs, group_by: GroupBy) -> Result<()> {
    let store = ExpenseStore::load(&settings.data_file);
    if store.is_empty() {
        println!("No data available");
        return Ok(());
    }

    let filter = args.to_filter(store.records())?;
    let view = DashboardView::build(store.records(), &filter, settings.spike_multiplier);
    let symbol = settings.currency_symbol.as_str();

    println!("📈 Expense Analytics");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if let (Some(start), Some(end)) = (filter.start, filter.end) {
        println!("   {} → {}", start, end);
    }
    println!("   Total Spend:  {}", format_amount(symbol, view.kpis.total_spend));
    println!("   Records:      {}", view.kpis.records);
    println!("   Sites:        {}", view.kpis.sites);
    println!("   Supervisors:  {}", view.kpis.supervisors);

    println!("\n{}-wise spend", group_by.name());
    print_buckets(&aggregate(&view.records, group_by), symbol);

    println!("\n🚨 Expense alerts");
    if view.spikes.is_empty() {
        println!("   No abnormal expenses detected");
    } else {
        println!(
            "   {} high expense entries (> {})",
            view.spikes.len(),
            format_amount(symbol, view.spike_threshold.unwrap_or_default())
        );
        print_records(&view.spikes, symbol);
    }

    Ok(())
}

fn run_table(settings: &Settings) -> Result<()> {
    let store = ExpenseStore::load(&settings.data_file);
    if store.is_empty() {
        println!("No records found in {}", store.path().display());
        return Ok(());
    }

    print_records(store.records(), &settings.currency_symbol);
    println!("\n{} records", store.len());
    Ok(())
}

fn run_export(settings: &Settings, out: Option<PathBuf>, args: &FilterArgs) -> Result<()> {
    let store = ExpenseStore::load(&settings.data_file);
    let filter = args.to_filter(store.records())?;
    let records = filter.apply(store.records());

    let path = out.unwrap_or_else(|| settings.report_file.clone());
    export_report(&path, &records)?;

    println!("📥 Report with {} records written to {}", records.len(), path.display());
    Ok(())
}

fn run_clear(settings: &Settings, yes: bool) -> Result<()> {
    let mut store = ExpenseStore::load(&settings.data_file);

    if !yes {
        print!("Delete all {} records in {}? Type 'yes' to confirm: ", store.len(), store.path().display());
        io::stdout().flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        if answer.trim() != "yes" {
            println!("Cancelled.");
            return Ok(());
        }
    }

    store.clear()?;
    println!("🗑️  All data cleared");
    Ok(())
}

fn print_records(records: &[ExpenseRecord], symbol: &str) {
    println!(
        "   {:<10}  {:>16}  {:<10}  {:<16}  {:<16}  {}",
        "Date", "Amount", "Category", "Supervisor", "Site", "Summary"
    );
    for r in records {
        println!(
            "   {:<10}  {:>16}  {:<10}  {:<16}  {:<16}  {}",
            r.date.to_string(),
            format_amount(symbol, r.amount),
            r.category,
            r.supervisor,
            r.site,
            r.summary
        );
    }
}

fn print_buckets(buckets: &[Bucket], symbol: &str) {
    for b in buckets {
        println!("   {:<24} {:>4} × {:>18}", b.key, b.count, format_amount(symbol, b.total));
    }
}

#[cfg(feature = "tui")]
fn run_ui_mode(settings: Settings) -> Result<()> {
    use expense_dashboard::ui;

    let mut app = ui::App::new(settings);
    ui::run_ui(&mut app)?;

    println!("✅ UI closed");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_settings: Settings) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use a subcommand, e.g. `expense-dashboard dashboard`");
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_add(args: &[&str]) -> ExpenseRecord {
        let mut argv = vec!["expense-dashboard", "add"];
        argv.extend_from_slice(args);

        match Cli::try_parse_from(argv).unwrap().command {
            Some(Command::Add { date, amount, category, supervisor, site, summary }) => {
                new_entry(date, &amount, category, supervisor, site, &summary).unwrap()
            }
            _ => panic!("expected the add subcommand"),
        }
    }

    #[test]
    fn test_add_blank_labels_keep_unknown() {
        let record = parse_add(&[
            "--date", "2024-01-05", "--amount", "10", "--supervisor", "", "--site", "  ",
        ]);

        assert_eq!(record.supervisor, "Unknown");
        assert_eq!(record.site, "Unknown");
        assert_eq!(record.category, "Other");
        assert_eq!(record.amount, 10.0);
    }

    #[test]
    fn test_add_trims_typed_labels() {
        let record = parse_add(&[
            "--date", "2024-01-05", "--amount", "10", "--category", "Fuel",
            "--supervisor", " Asha ", "--site", "Depot ",
        ]);

        assert_eq!(record.supervisor, "Asha");
        assert_eq!(record.site, "Depot");
        assert_eq!(record.category, "Fuel");
    }

    #[test]
    fn test_add_rejects_unknown_category() {
        let result = Cli::try_parse_from([
            "expense-dashboard", "add", "--amount", "1", "--category", "Snacks",
        ]);
        assert!(result.is_err());
    }
}
