// 🧾 Expense Record - the only domain entity
// Every stored row, every import and every report uses this shape.

use crate::error::EntryError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// CANONICAL SHAPE
// ============================================================================

/// Header row of the backing file and of exported reports.
pub const STORE_COLUMNS: [&str; 6] = ["Date", "Category", "Amount", "Supervisor", "Site", "Summary"];

/// Categories offered by the manual entry form.
pub const CATEGORY_CHOICES: [&str; 6] = ["Food", "Travel", "Fuel", "Shopping", "Bills", "Other"];

pub const DEFAULT_CATEGORY: &str = "Other";
pub const DEFAULT_SUPERVISOR: &str = "Unknown";
pub const DEFAULT_SITE: &str = "Unknown";

/// One expense.
///
/// Field order matches [`STORE_COLUMNS`], which is also the serialized column
/// order of the backing file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    #[serde(rename = "Date", with = "iso_date")]
    pub date: NaiveDate,

    #[serde(rename = "Category", default = "default_category")]
    pub category: String,

    #[serde(rename = "Amount")]
    pub amount: f64,

    #[serde(rename = "Supervisor", default = "default_supervisor")]
    pub supervisor: String,

    #[serde(rename = "Site", default = "default_site")]
    pub site: String,

    #[serde(rename = "Summary", default)]
    pub summary: String,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn default_supervisor() -> String {
    DEFAULT_SUPERVISOR.to_string()
}

fn default_site() -> String {
    DEFAULT_SITE.to_string()
}

impl ExpenseRecord {
    /// Create a record with the fallback labels for every free-text field.
    ///
    /// Fails when the amount is negative or not finite.
    pub fn new(date: NaiveDate, amount: f64) -> Result<Self, EntryError> {
        validate_amount(amount)?;

        Ok(ExpenseRecord {
            date,
            category: default_category(),
            amount,
            supervisor: default_supervisor(),
            site: default_site(),
            summary: String::new(),
        })
    }

    /// Build a record from raw form input (date text and amount text).
    ///
    /// The date accepts anything the import normalizer accepts; the amount
    /// must be a plain non-negative number.
    pub fn from_input(date: &str, amount: &str) -> Result<Self, EntryError> {
        let parsed_date = crate::normalizer::parse_date(date)
            .ok_or_else(|| EntryError::InvalidDate(date.trim().to_string()))?;

        let parsed_amount: f64 = amount
            .trim()
            .parse()
            .map_err(|_| EntryError::InvalidAmount(amount.trim().to_string()))?;

        ExpenseRecord::new(parsed_date, parsed_amount)
    }

    /// Builder: set category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Builder: set supervisor
    pub fn with_supervisor(mut self, supervisor: impl Into<String>) -> Self {
        self.supervisor = supervisor.into();
        self
    }

    /// Builder: set site
    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = site.into();
        self
    }

    /// Builder: apply hand-typed supervisor and site.
    ///
    /// Values are trimmed; a missing or blank value keeps the current label
    /// (`Unknown` on a fresh record).
    pub fn with_entered_labels(mut self, supervisor: Option<&str>, site: Option<&str>) -> Self {
        if let Some(supervisor) = supervisor.map(str::trim).filter(|s| !s.is_empty()) {
            self.supervisor = supervisor.to_string();
        }
        if let Some(site) = site.map(str::trim).filter(|s| !s.is_empty()) {
            self.site = site.to_string();
        }
        self
    }

    /// Builder: set summary
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// True when the record satisfies the admission rule of the store.
    pub fn is_admissible(&self) -> bool {
        validate_amount(self.amount).is_ok()
    }
}

fn validate_amount(amount: f64) -> Result<(), EntryError> {
    if !amount.is_finite() {
        return Err(EntryError::NonFiniteAmount);
    }
    if amount < 0.0 {
        return Err(EntryError::NegativeAmount(amount));
    }
    Ok(())
}

// ============================================================================
// DATE CODEC
// ============================================================================

/// Dates are written as `YYYY-MM-DD` and read back permissively, so files
/// that carry a time component (`2024-01-05 00:00:00`) still load.
pub mod iso_date {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        crate::normalizer::parse_date(&raw)
            .ok_or_else(|| de::Error::custom(format!("unrecognised date '{}'", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_new_uses_fallback_labels() {
        let record = ExpenseRecord::new(date(2024, 1, 5), 250.0).unwrap();

        assert_eq!(record.category, "Other");
        assert_eq!(record.supervisor, "Unknown");
        assert_eq!(record.site, "Unknown");
        assert_eq!(record.summary, "");
    }

    #[test]
    fn test_new_rejects_negative_amount() {
        let err = ExpenseRecord::new(date(2024, 1, 5), -1.0).unwrap_err();
        assert_eq!(err, EntryError::NegativeAmount(-1.0));
    }

    #[test]
    fn test_new_rejects_non_finite_amount() {
        assert_eq!(
            ExpenseRecord::new(date(2024, 1, 5), f64::NAN).unwrap_err(),
            EntryError::NonFiniteAmount
        );
        assert_eq!(
            ExpenseRecord::new(date(2024, 1, 5), f64::INFINITY).unwrap_err(),
            EntryError::NonFiniteAmount
        );
    }

    #[test]
    fn test_from_input() {
        let record = ExpenseRecord::from_input(" 2024-03-09 ", "12.5")
            .unwrap()
            .with_category("Fuel")
            .with_site("North Yard");

        assert_eq!(record.date, date(2024, 3, 9));
        assert_eq!(record.amount, 12.5);
        assert_eq!(record.category, "Fuel");
        assert_eq!(record.site, "North Yard");
    }

    #[test]
    fn test_from_input_errors() {
        assert_eq!(
            ExpenseRecord::from_input("yesterday", "10").unwrap_err(),
            EntryError::InvalidDate("yesterday".to_string())
        );
        assert_eq!(
            ExpenseRecord::from_input("2024-01-01", "ten").unwrap_err(),
            EntryError::InvalidAmount("ten".to_string())
        );
    }

    #[test]
    fn test_entered_labels_trim_and_keep_fallback() {
        let blank = ExpenseRecord::new(date(2024, 1, 5), 10.0)
            .unwrap()
            .with_entered_labels(Some(""), Some("   "));
        assert_eq!(blank.supervisor, "Unknown");
        assert_eq!(blank.site, "Unknown");

        let missing = ExpenseRecord::new(date(2024, 1, 5), 10.0)
            .unwrap()
            .with_entered_labels(None, None);
        assert_eq!(missing.supervisor, "Unknown");
        assert_eq!(missing.site, "Unknown");

        let typed = ExpenseRecord::new(date(2024, 1, 5), 10.0)
            .unwrap()
            .with_entered_labels(Some("  Asha "), Some("Depot\t"));
        assert_eq!(typed.supervisor, "Asha");
        assert_eq!(typed.site, "Depot");
    }

    #[test]
    fn test_csv_header_order_matches_store_columns() {
        let record = ExpenseRecord::new(date(2024, 1, 5), 250.0)
            .unwrap()
            .with_summary("lunch");

        let mut wtr = csv::Writer::from_writer(vec![]);
        wtr.serialize(&record).unwrap();
        let text = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
        let mut lines = text.lines();

        assert_eq!(lines.next(), Some(STORE_COLUMNS.join(",").as_str()));
        assert_eq!(lines.next(), Some("2024-01-05,Other,250.0,Unknown,Unknown,lunch"));
    }

    #[test]
    fn test_deserialize_accepts_timestamp_dates() {
        let data = "Date,Category,Amount,Supervisor,Site,Summary\n\
                    2024-01-05 00:00:00,Food,99.5,Asha,Depot,tea\n";
        let mut rdr = csv::Reader::from_reader(data.as_bytes());
        let record: ExpenseRecord = rdr.deserialize().next().unwrap().unwrap();

        assert_eq!(record.date, date(2024, 1, 5));
        assert_eq!(record.amount, 99.5);
        assert_eq!(record.supervisor, "Asha");
    }
}
