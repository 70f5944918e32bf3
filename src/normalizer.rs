// 🧹 Column Normalizer
// Maps an uploaded table with arbitrary headers onto the canonical expense shape.
//
// Resolution policy: for each canonical field, scan its alias list in declared
// order and take the first alias present among the lower-cased input headers.
// Date and Amount have no fallback; a row missing either one is dropped.

use crate::record::{ExpenseRecord, DEFAULT_CATEGORY, DEFAULT_SITE, DEFAULT_SUPERVISOR};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use tracing::debug;

// ============================================================================
// INPUT TABLE
// ============================================================================

/// A header row plus string cells, as read from any uploaded file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Table {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Builder: append a row
    pub fn with_row<I, S>(mut self, row: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push_row(row);
        self
    }

    pub fn push_row<I, S>(&mut self, row: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// ALIAS TABLE (static configuration)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalField {
    Date,
    Amount,
    Category,
    Supervisor,
    Site,
    Summary,
}

impl CanonicalField {
    /// Output column order of a normalized table.
    pub const ALL: [CanonicalField; 6] = [
        CanonicalField::Date,
        CanonicalField::Amount,
        CanonicalField::Category,
        CanonicalField::Supervisor,
        CanonicalField::Site,
        CanonicalField::Summary,
    ];

    pub fn name(&self) -> &'static str {
        self.spec().name
    }

    pub fn aliases(&self) -> &'static [&'static str] {
        self.spec().aliases
    }

    /// Value substituted when no alias matches. `None` for required fields.
    pub fn fallback(&self) -> Option<&'static str> {
        self.spec().fallback
    }

    fn spec(&self) -> &'static FieldSpec {
        &ALIAS_TABLE[*self as usize]
    }
}

/// One row of the alias table.
#[derive(Debug)]
pub struct FieldSpec {
    pub field: CanonicalField,
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub fallback: Option<&'static str>,
}

/// Field → ordered aliases. Indexed by `CanonicalField as usize`.
pub static ALIAS_TABLE: [FieldSpec; 6] = [
    FieldSpec {
        field: CanonicalField::Date,
        name: "Date",
        aliases: &["date", "day", "purchase date", "entry date"],
        fallback: None,
    },
    FieldSpec {
        field: CanonicalField::Amount,
        name: "Amount",
        aliases: &["amount", "price", "cost", "expense"],
        fallback: None,
    },
    FieldSpec {
        field: CanonicalField::Category,
        name: "Category",
        aliases: &["category", "type", "label"],
        fallback: Some(DEFAULT_CATEGORY),
    },
    FieldSpec {
        field: CanonicalField::Supervisor,
        name: "Supervisor",
        aliases: &["supervisor", "manager", "incharge"],
        fallback: Some(DEFAULT_SUPERVISOR),
    },
    FieldSpec {
        field: CanonicalField::Site,
        name: "Site",
        aliases: &["site", "location", "project"],
        fallback: Some(DEFAULT_SITE),
    },
    FieldSpec {
        field: CanonicalField::Summary,
        name: "Summary",
        aliases: &["summary", "description", "details", "remark", "note"],
        fallback: Some(""),
    },
];

// ============================================================================
// COLUMN RESOLUTION
// ============================================================================

/// Which input column (if any) feeds each canonical field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    columns: [Option<usize>; 6],
}

impl ColumnMapping {
    /// Resolve every canonical field against a header row.
    ///
    /// Headers are compared trimmed and lower-cased. When two headers collide
    /// after lower-casing, the first one wins.
    pub fn resolve(headers: &[String]) -> Self {
        let mut lookup: HashMap<String, usize> = HashMap::with_capacity(headers.len());
        for (idx, h) in headers.iter().enumerate() {
            lookup.entry(h.trim().to_lowercase()).or_insert(idx);
        }

        let mut mapping = ColumnMapping::default();
        for spec in ALIAS_TABLE.iter() {
            mapping.columns[spec.field as usize] = spec
                .aliases
                .iter()
                .find_map(|alias| lookup.get(*alias).copied());
        }
        mapping
    }

    pub fn column(&self, field: CanonicalField) -> Option<usize> {
        self.columns[field as usize]
    }

    /// Name of the input header that was picked for `field`.
    pub fn source_header<'a>(&self, field: CanonicalField, headers: &'a [String]) -> Option<&'a str> {
        self.column(field)
            .and_then(|idx| headers.get(idx))
            .map(String::as_str)
    }
}

// ============================================================================
// PERMISSIVE VALUE PARSING
// ============================================================================

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d.%m.%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%d-%b-%Y",
    "%b %d %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%B %d, %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Parse a date in any of the common layouts. Unparseable input is `None`.
///
/// Slash dates are read month-first (`01/05/2024` is January 5th).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
    {
        return Some(date);
    }

    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        return Some(dt.date());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }

    // Compact form: 20240105
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(s, "%Y%m%d").ok();
    }

    None
}

/// Parse an amount. Non-numeric, non-finite and negative values are `None`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().parse().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value)
    } else {
        None
    }
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Output of [`normalize_table`]: the surviving records plus what happened.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub records: Vec<ExpenseRecord>,
    pub mapping: ColumnMapping,
    pub input_rows: usize,
    pub dropped_rows: usize,
}

impl Normalized {
    pub fn summary(&self) -> String {
        format!(
            "{} of {} rows kept, {} dropped (missing date or amount)",
            self.records.len(),
            self.input_rows,
            self.dropped_rows
        )
    }
}

/// Normalize an arbitrary table into canonical expense records.
///
/// Never fails; the worst case is an empty result.
pub fn normalize(table: &Table) -> Vec<ExpenseRecord> {
    normalize_table(table).records
}

/// Same as [`normalize`], keeping the column mapping and drop count.
pub fn normalize_table(table: &Table) -> Normalized {
    let mapping = ColumnMapping::resolve(table.headers());

    let mut records = Vec::with_capacity(table.len());
    let mut dropped_rows = 0;

    for (idx, row) in table.rows().iter().enumerate() {
        let cell = |field: CanonicalField| {
            mapping
                .column(field)
                .map(|col| row.get(col).map(String::as_str).unwrap_or(""))
        };

        let date = cell(CanonicalField::Date).and_then(parse_date);
        let amount = cell(CanonicalField::Amount).and_then(parse_amount);

        let (date, amount) = match (date, amount) {
            (Some(d), Some(a)) => (d, a),
            _ => {
                debug!(row = idx + 2, "dropping row without a valid date or amount");
                dropped_rows += 1;
                continue;
            }
        };

        let text = |field: CanonicalField| {
            match cell(field) {
                Some(value) => value.trim().to_string(),
                None => field.fallback().unwrap_or_default().to_string(),
            }
        };

        records.push(ExpenseRecord {
            date,
            category: text(CanonicalField::Category),
            amount,
            supervisor: text(CanonicalField::Supervisor),
            site: text(CanonicalField::Site),
            summary: text(CanonicalField::Summary),
        });
    }

    Normalized {
        records,
        mapping,
        input_rows: table.len(),
        dropped_rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_alias_table_is_indexed_by_field() {
        for (idx, spec) in ALIAS_TABLE.iter().enumerate() {
            assert_eq!(spec.field as usize, idx);
            assert_eq!(CanonicalField::ALL[idx], spec.field);
        }
        assert_eq!(CanonicalField::Summary.aliases().len(), 5);
        assert_eq!(CanonicalField::Date.fallback(), None);
        assert_eq!(CanonicalField::Site.fallback(), Some("Unknown"));
    }

    #[test]
    fn test_purchase_date_cost_remark() {
        let table = Table::new(["Purchase Date", "Cost", "Remark"])
            .with_row(["2024-01-05", "250", "lunch"]);

        let records = normalize(&table);

        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.date, date(2024, 1, 5));
        assert_eq!(r.amount, 250.0);
        assert_eq!(r.category, "Other");
        assert_eq!(r.supervisor, "Unknown");
        assert_eq!(r.site, "Unknown");
        assert_eq!(r.summary, "lunch");
    }

    #[test]
    fn test_canonical_table_is_unchanged() {
        let table = Table::new(["Date", "Category", "Amount", "Supervisor", "Site", "Summary"])
            .with_row(["2024-02-01", "Fuel", "1200.5", "Ravi", "Plant A", "diesel"])
            .with_row(["2024-02-02", "Food", "80", "Meena", "Plant B", ""]);

        let records = normalize(&table);

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            ExpenseRecord {
                date: date(2024, 2, 1),
                category: "Fuel".to_string(),
                amount: 1200.5,
                supervisor: "Ravi".to_string(),
                site: "Plant A".to_string(),
                summary: "diesel".to_string(),
            }
        );
        assert_eq!(records[1].summary, "");
        assert_eq!(records[1].site, "Plant B");
    }

    #[test]
    fn test_only_date_and_amount_get_defaults() {
        let table = Table::new(["date", "amount"]).with_row(["2024-05-01", "10"]);

        let r = &normalize(&table)[0];

        assert_eq!(r.category, "Other");
        assert_eq!(r.supervisor, "Unknown");
        assert_eq!(r.site, "Unknown");
        assert_eq!(r.summary, "");
    }

    #[test]
    fn test_alias_priority_prefers_amount_over_cost() {
        let table = Table::new(["Cost", "Date", "Amount"]).with_row(["999", "2024-01-01", "5"]);

        let normalized = normalize_table(&table);

        assert_eq!(normalized.records[0].amount, 5.0);
        assert_eq!(
            normalized
                .mapping
                .source_header(CanonicalField::Amount, table.headers()),
            Some("Amount")
        );
    }

    #[test]
    fn test_duplicate_header_first_column_wins() {
        let table = Table::new(["Amount", "Date", "amount"]).with_row(["1", "2024-01-01", "2"]);

        let normalized = normalize_table(&table);

        assert_eq!(normalized.records[0].amount, 1.0);
        assert_eq!(normalized.mapping.column(CanonicalField::Amount), Some(0));
    }

    #[test]
    fn test_headers_match_case_insensitively() {
        let table = Table::new(["ENTRY DATE", "Expense", "LOCATION", "InCharge", "Type", "Details"])
            .with_row(["2024-07-04", "42", "Dock 3", "Priya", "Bills", "power"]);

        let r = &normalize(&table)[0];

        assert_eq!(r.site, "Dock 3");
        assert_eq!(r.supervisor, "Priya");
        assert_eq!(r.category, "Bills");
        assert_eq!(r.summary, "power");
    }

    #[test]
    fn test_rows_with_missing_date_or_amount_are_dropped() {
        let table = Table::new(["Date", "Amount"])
            .with_row(["2024-01-01", "10"])
            .with_row(["not a date", "10"])
            .with_row(["2024-01-03", "abc"])
            .with_row(["", ""])
            .with_row(["2024-01-05", "-3"]);

        let normalized = normalize_table(&table);

        assert_eq!(normalized.input_rows, 5);
        assert_eq!(normalized.records.len(), 1);
        assert_eq!(normalized.dropped_rows, 4);
        assert!(normalized.summary().starts_with("1 of 5 rows kept"));
    }

    #[test]
    fn test_missing_amount_column_drops_everything() {
        let table = Table::new(["Date", "Category"])
            .with_row(["2024-01-01", "Food"])
            .with_row(["2024-01-02", "Fuel"]);

        assert!(normalize(&table).is_empty());
    }

    #[test]
    fn test_short_rows_do_not_panic() {
        let table = Table::new(["Date", "Amount", "Site"])
            .with_row(["2024-01-01", "10"])
            .with_row(["2024-01-02"]);

        let records = normalize(&table);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].site, "");
    }

    #[test]
    fn test_empty_table() {
        assert!(normalize(&Table::default()).is_empty());
    }

    #[test]
    fn test_surviving_rows_never_exceed_input() {
        let table = Table::new(["day", "price"])
            .with_row(["2024-01-01", "1"])
            .with_row(["01/02/2024", "2.5"])
            .with_row(["garbage", "3"]);

        let normalized = normalize_table(&table);

        assert!(normalized.records.len() <= table.len());
        assert_eq!(normalized.records.len() + normalized.dropped_rows, table.len());
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = date(2024, 1, 5);
        for input in [
            "2024-01-05",
            "2024/01/05",
            "01/05/2024",
            "05.01.2024",
            "5 Jan 2024",
            "Jan 5, 2024",
            "January 5 2024",
            "2024-01-05 13:45:00",
            "2024-01-05T13:45:00",
            "2024-01-05T13:45:00+05:30",
            "20240105",
        ] {
            assert_eq!(parse_date(input), Some(expected), "input: {}", input);
        }

        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("2024-13-45"), None);
        assert_eq!(parse_date("250"), None);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("250"), Some(250.0));
        assert_eq!(parse_amount(" 12.75 "), Some(12.75));
        assert_eq!(parse_amount("0"), Some(0.0));
        assert_eq!(parse_amount("1e3"), Some(1000.0));
        assert_eq!(parse_amount("-5"), None);
        assert_eq!(parse_amount("NaN"), None);
        assert_eq!(parse_amount("inf"), None);
        assert_eq!(parse_amount("₹100"), None);
        assert_eq!(parse_amount(""), None);
    }
}
