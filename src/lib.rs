// Expense Dashboard - Core Library
// Exposes all modules for use in the CLI, the TUI, the API server and tests

pub mod config;
pub mod dashboard;
pub mod error;
pub mod import;
pub mod normalizer;
pub mod record;
pub mod store;

// Only compiled when the TUI feature is enabled
#[cfg(feature = "tui")]
pub mod ui;

// Re-export commonly used types
pub use config::Settings;
pub use dashboard::{
    aggregate, detect_spikes, distinct_sites, distinct_supervisors, format_amount, mean_amount,
    Bucket, DashboardView, Filter, GroupBy, Kpis, DEFAULT_SPIKE_MULTIPLIER,
};
pub use error::{EntryError, ImportError};
pub use import::{get_reader, import_bytes, import_file, ImportFormat, TableReader};
pub use normalizer::{
    normalize, normalize_table, parse_amount, parse_date, CanonicalField, ColumnMapping,
    Normalized, Table, ALIAS_TABLE,
};
pub use record::{ExpenseRecord, CATEGORY_CHOICES, STORE_COLUMNS};
pub use store::{export_report, records_to_csv, ExpenseStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
