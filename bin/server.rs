// Expense Dashboard - Web Server
// JSON API over the same CSV store the CLI and TUI use

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clap::Parser;
use expense_dashboard::{
    import_bytes, parse_date, records_to_csv, Bucket, DashboardView, ExpenseRecord, ExpenseStore,
    Filter, Kpis, Settings, CATEGORY_CHOICES,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "expense-server", version, about = "JSON API for the expense dashboard")]
struct ServerCli {
    /// Settings file (defaults to ./expense-dashboard.toml when present).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    settings: Arc<Settings>,
    /// Serializes read-modify-write cycles on the backing file.
    write_lock: Arc<Mutex<()>>,
}

impl AppState {
    fn load_store(&self) -> ExpenseStore {
        ExpenseStore::load(&self.settings.data_file)
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message.into()),
        }
    }
}

fn fail(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::error(message))).into_response()
}

/// Expense response (snake_case for API clients)
#[derive(Serialize, Deserialize)]
struct ExpenseResponse {
    date: String,
    category: String,
    amount: f64,
    supervisor: String,
    site: String,
    summary: String,
}

impl From<ExpenseRecord> for ExpenseResponse {
    fn from(r: ExpenseRecord) -> Self {
        Self {
            date: r.date.format("%Y-%m-%d").to_string(),
            category: r.category,
            amount: r.amount,
            supervisor: r.supervisor,
            site: r.site,
            summary: r.summary,
        }
    }
}

fn to_responses(records: Vec<ExpenseRecord>) -> Vec<ExpenseResponse> {
    records.into_iter().map(Into::into).collect()
}

/// Body of POST /api/expenses
#[derive(Deserialize)]
struct NewExpense {
    date: String,
    amount: f64,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    supervisor: Option<String>,
    #[serde(default)]
    site: Option<String>,
    #[serde(default)]
    summary: String,
}

impl NewExpense {
    fn into_record(self) -> Result<ExpenseRecord, String> {
        let date = parse_date(&self.date)
            .ok_or_else(|| format!("'{}' is not a recognised date", self.date))?;
        let mut record = ExpenseRecord::new(date, self.amount)
            .map_err(|e| e.to_string())?
            .with_summary(self.summary);

        if let Some(category) = self.category {
            if !CATEGORY_CHOICES.contains(&category.as_str()) {
                return Err(format!(
                    "Unknown category '{}' (expected one of {})",
                    category,
                    CATEGORY_CHOICES.join(", ")
                ));
            }
            record = record.with_category(category);
        }
        Ok(record.with_entered_labels(self.supervisor.as_deref(), self.site.as_deref()))
    }
}

#[derive(Deserialize)]
struct UploadQuery {
    filename: String,
    #[serde(default)]
    commit: bool,
}

#[derive(Serialize)]
struct UploadResponse {
    input_rows: usize,
    dropped_rows: usize,
    summary: String,
    committed: bool,
    added: usize,
    preview: Vec<ExpenseResponse>,
}

/// Query string shared by /api/dashboard and /api/report.
///
/// `site` and `supervisor` are comma-separated; absent or blank means all.
#[derive(Deserialize, Default)]
struct FilterQuery {
    start: Option<String>,
    end: Option<String>,
    site: Option<String>,
    supervisor: Option<String>,
}

impl FilterQuery {
    fn to_filter(&self, records: &[ExpenseRecord]) -> Result<Filter, String> {
        let mut filter = Filter::spanning(records);

        if let Some(start) = self.start.as_deref().filter(|s| !s.trim().is_empty()) {
            filter.start = Some(parse_date(start).ok_or_else(|| format!("Invalid start date '{}'", start))?);
        }
        if let Some(end) = self.end.as_deref().filter(|s| !s.trim().is_empty()) {
            filter.end = Some(parse_date(end).ok_or_else(|| format!("Invalid end date '{}'", end))?);
        }
        if let Some(sites) = split_list(self.site.as_deref()) {
            filter = filter.with_sites(sites);
        }
        if let Some(supervisors) = split_list(self.supervisor.as_deref()) {
            filter = filter.with_supervisors(supervisors);
        }

        Ok(filter)
    }
}

fn split_list(raw: Option<&str>) -> Option<Vec<String>> {
    let items: Vec<String> = raw?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

#[derive(Serialize)]
struct DashboardResponse {
    start: Option<String>,
    end: Option<String>,
    kpis: Kpis,
    trend: Vec<Bucket>,
    by_category: Vec<Bucket>,
    by_site: Vec<Bucket>,
    by_supervisor: Vec<Bucket>,
    spike_threshold: Option<f64>,
    spikes: Vec<ExpenseResponse>,
}

impl From<DashboardView> for DashboardResponse {
    fn from(view: DashboardView) -> Self {
        Self {
            start: view.filter.start.map(|d| d.to_string()),
            end: view.filter.end.map(|d| d.to_string()),
            kpis: view.kpis,
            trend: view.trend,
            by_category: view.by_category,
            by_site: view.by_site,
            by_supervisor: view.by_supervisor,
            spike_threshold: view.spike_threshold,
            spikes: to_responses(view.spikes),
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/expenses - All stored expenses
async fn list_expenses(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.load_store();
    Json(ApiResponse::ok(to_responses(store.records().to_vec())))
}

/// POST /api/expenses - Manual entry
async fn add_expense(State(state): State<AppState>, Json(body): Json<NewExpense>) -> Response {
    let record = match body.into_record() {
        Ok(r) => r,
        Err(message) => return fail(StatusCode::BAD_REQUEST, message),
    };

    let _guard = state.write_lock.lock().await;
    let mut store = state.load_store();

    match store.append(record.clone()) {
        Ok(()) => (StatusCode::CREATED, Json(ApiResponse::ok(ExpenseResponse::from(record)))).into_response(),
        Err(e) => {
            error!("Error saving expense: {:#}", e);
            fail(StatusCode::INTERNAL_SERVER_ERROR, "Could not save expense")
        }
    }
}

/// DELETE /api/expenses - Clear all data
async fn clear_expenses(State(state): State<AppState>) -> Response {
    let _guard = state.write_lock.lock().await;
    let mut store = state.load_store();
    let removed = store.len();

    match store.clear() {
        Ok(()) => Json(ApiResponse::ok(removed)).into_response(),
        Err(e) => {
            error!("Error clearing store: {:#}", e);
            fail(StatusCode::INTERNAL_SERVER_ERROR, "Could not clear data")
        }
    }
}

/// POST /api/upload?filename=..&commit=.. - Normalize an uploaded file
async fn upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Response {
    let normalized = match import_bytes(&query.filename, &body) {
        Ok(n) => n,
        Err(e) => return fail(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let summary = normalized.summary();
    let input_rows = normalized.input_rows;
    let dropped_rows = normalized.dropped_rows;

    let added = if query.commit {
        let _guard = state.write_lock.lock().await;
        let mut store = state.load_store();
        match store.append_batch(normalized.records.clone()) {
            Ok(added) => added,
            Err(e) => {
                error!("Error committing upload {}: {:#}", query.filename, e);
                return fail(StatusCode::INTERNAL_SERVER_ERROR, "Could not save the uploaded rows");
            }
        }
    } else {
        0
    };

    Json(ApiResponse::ok(UploadResponse {
        input_rows,
        dropped_rows,
        summary,
        committed: query.commit,
        added,
        preview: to_responses(normalized.records),
    }))
    .into_response()
}

/// GET /api/dashboard - KPIs, breakdowns and spike alerts
async fn dashboard(State(state): State<AppState>, Query(query): Query<FilterQuery>) -> Response {
    let store = state.load_store();
    if store.is_empty() {
        return fail(StatusCode::NOT_FOUND, "No data available");
    }

    let filter = match query.to_filter(store.records()) {
        Ok(f) => f,
        Err(message) => return fail(StatusCode::BAD_REQUEST, message),
    };

    let view = DashboardView::build(store.records(), &filter, state.settings.spike_multiplier);
    Json(ApiResponse::ok(DashboardResponse::from(view))).into_response()
}

/// GET /api/report - Filtered records as a CSV download
async fn report(State(state): State<AppState>, Query(query): Query<FilterQuery>) -> Response {
    let store = state.load_store();
    let filter = match query.to_filter(store.records()) {
        Ok(f) => f,
        Err(message) => return fail(StatusCode::BAD_REQUEST, message),
    };

    let file_name = state
        .settings
        .report_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "expense_report.csv".to_string());

    match records_to_csv(&filter.apply(store.records())) {
        Ok(csv) => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", file_name)),
            ],
            csv,
        )
            .into_response(),
        Err(e) => {
            error!("Error rendering report: {:#}", e);
            fail(StatusCode::INTERNAL_SERVER_ERROR, "Could not render report")
        }
    }
}

// ============================================================================
// Main Server
// ============================================================================

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route(
            "/expenses",
            get(list_expenses).post(add_expense).delete(clear_expenses),
        )
        .route("/upload", post(upload))
        .route("/dashboard", get(dashboard))
        .route("/report", get(report))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = ServerCli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    info!(data_file = %settings.data_file.display(), "using expense store");

    let bind = settings.server.bind.clone();
    let state = AppState {
        settings: Arc::new(settings),
        write_lock: Arc::new(Mutex::new(())),
    };

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("server running on http://{}", bind);
    info!("API: http://{}/api/expenses", bind);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn create_test_records() -> Vec<ExpenseRecord> {
        vec![
            ExpenseRecord::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 10.0)
                .unwrap()
                .with_site("Depot")
                .with_supervisor("Asha"),
            ExpenseRecord::new(NaiveDate::from_ymd_opt(2024, 1, 9).unwrap(), 20.0)
                .unwrap()
                .with_site("Yard")
                .with_supervisor("Ravi"),
        ]
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(None), None);
        assert_eq!(split_list(Some(" , ")), None);
        assert_eq!(
            split_list(Some("Depot, Yard")),
            Some(vec!["Depot".to_string(), "Yard".to_string()])
        );
    }

    #[test]
    fn test_empty_query_spans_everything() {
        let records = create_test_records();

        let filter = FilterQuery::default().to_filter(&records).unwrap();

        assert_eq!(filter.start, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(filter.end, NaiveDate::from_ymd_opt(2024, 1, 9));
        assert_eq!(filter.apply(&records).len(), 2);
    }

    #[test]
    fn test_query_narrows() {
        let records = create_test_records();
        let query = FilterQuery {
            site: Some("Yard".to_string()),
            ..Default::default()
        };

        let filtered = query.to_filter(&records).unwrap().apply(&records);

        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].supervisor, "Ravi");
    }

    #[test]
    fn test_bad_date_is_rejected() {
        let query = FilterQuery {
            start: Some("someday".to_string()),
            ..Default::default()
        };

        assert!(query.to_filter(&create_test_records()).is_err());
    }

    #[test]
    fn test_new_expense_validation() {
        let ok = NewExpense {
            date: "2024-03-01".to_string(),
            amount: 12.0,
            category: Some("Fuel".to_string()),
            supervisor: Some("  ".to_string()),
            site: None,
            summary: "diesel".to_string(),
        }
        .into_record()
        .unwrap();
        assert_eq!(ok.category, "Fuel");
        assert_eq!(ok.supervisor, "Unknown");

        let negative = NewExpense {
            date: "2024-03-01".to_string(),
            amount: -1.0,
            category: None,
            supervisor: None,
            site: None,
            summary: String::new(),
        };
        assert!(negative.into_record().is_err());

        let bad_category = NewExpense {
            date: "2024-03-01".to_string(),
            amount: 1.0,
            category: Some("Snacks".to_string()),
            supervisor: None,
            site: None,
            summary: String::new(),
        };
        assert!(bad_category.into_record().is_err());
    }
}
