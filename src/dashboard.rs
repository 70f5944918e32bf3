// 📈 Dashboard - filters, group-and-sum breakdowns, KPIs and spike alerts

use crate::record::ExpenseRecord;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::str::FromStr;

/// An expense is a spike when it exceeds this multiple of the filtered mean.
pub const DEFAULT_SPIKE_MULTIPLIER: f64 = 2.0;

// ============================================================================
// FILTER
// ============================================================================

/// Date range plus inclusion sets for site and supervisor.
///
/// `None` means "no restriction". An empty set matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Filter {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub sites: Option<BTreeSet<String>>,
    pub supervisors: Option<BTreeSet<String>>,
}

impl Filter {
    /// No restriction at all.
    pub fn all() -> Self {
        Filter::default()
    }

    /// The dashboard's starting filter: the full date span of `records`
    /// and every site and supervisor that appears in them.
    pub fn spanning(records: &[ExpenseRecord]) -> Self {
        let (start, end) = match date_bounds(records) {
            Some((s, e)) => (Some(s), Some(e)),
            None => (None, None),
        };

        Filter {
            start,
            end,
            sites: Some(distinct_sites(records).into_iter().collect()),
            supervisors: Some(distinct_supervisors(records).into_iter().collect()),
        }
    }

    /// Builder: inclusive date range
    pub fn with_range(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Builder: restrict to these sites
    pub fn with_sites<I, S>(mut self, sites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sites = Some(sites.into_iter().map(Into::into).collect());
        self
    }

    /// Builder: restrict to these supervisors
    pub fn with_supervisors<I, S>(mut self, supervisors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supervisors = Some(supervisors.into_iter().map(Into::into).collect());
        self
    }

    pub fn matches(&self, record: &ExpenseRecord) -> bool {
        if let Some(start) = self.start {
            if record.date < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if record.date > end {
                return false;
            }
        }
        if let Some(sites) = &self.sites {
            if !sites.contains(&record.site) {
                return false;
            }
        }
        if let Some(supervisors) = &self.supervisors {
            if !supervisors.contains(&record.supervisor) {
                return false;
            }
        }
        true
    }

    /// Matching records, in store order.
    pub fn apply(&self, records: &[ExpenseRecord]) -> Vec<ExpenseRecord> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

pub fn date_bounds(records: &[ExpenseRecord]) -> Option<(NaiveDate, NaiveDate)> {
    let min = records.iter().map(|r| r.date).min()?;
    let max = records.iter().map(|r| r.date).max()?;
    Some((min, max))
}

/// Sites in order of first appearance.
pub fn distinct_sites(records: &[ExpenseRecord]) -> Vec<String> {
    distinct(records.iter().map(|r| r.site.as_str()))
}

/// Supervisors in order of first appearance.
pub fn distinct_supervisors(records: &[ExpenseRecord]) -> Vec<String> {
    distinct(records.iter().map(|r| r.supervisor.as_str()))
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .filter(|v| seen.insert(*v))
        .map(str::to_string)
        .collect()
}

// ============================================================================
// GROUP AND SUM
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    Date,
    Category,
    Site,
    Supervisor,
}

impl GroupBy {
    pub fn name(&self) -> &str {
        match self {
            GroupBy::Date => "Date",
            GroupBy::Category => "Category",
            GroupBy::Site => "Site",
            GroupBy::Supervisor => "Supervisor",
        }
    }

    fn key(&self, record: &ExpenseRecord) -> String {
        match self {
            GroupBy::Date => record.date.format("%Y-%m-%d").to_string(),
            GroupBy::Category => record.category.clone(),
            GroupBy::Site => record.site.clone(),
            GroupBy::Supervisor => record.supervisor.clone(),
        }
    }
}

impl FromStr for GroupBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "date" => Ok(GroupBy::Date),
            "category" => Ok(GroupBy::Category),
            "site" => Ok(GroupBy::Site),
            "supervisor" => Ok(GroupBy::Supervisor),
            other => Err(format!(
                "unknown grouping '{}' (expected date, category, site or supervisor)",
                other
            )),
        }
    }
}

/// Sum of amounts for one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub key: String,
    pub total: f64,
    pub count: usize,
}

/// Sum `amount` per group, ordered by key (dates ascend chronologically).
pub fn aggregate(records: &[ExpenseRecord], by: GroupBy) -> Vec<Bucket> {
    let mut groups: BTreeMap<String, (f64, usize)> = BTreeMap::new();

    for record in records {
        let entry = groups.entry(by.key(record)).or_insert((0.0, 0));
        entry.0 += record.amount;
        entry.1 += 1;
    }

    groups
        .into_iter()
        .map(|(key, (total, count))| Bucket { key, total, count })
        .collect()
}

// ============================================================================
// KPIs
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Kpis {
    pub total_spend: f64,
    pub records: usize,
    pub sites: usize,
    pub supervisors: usize,
}

impl Kpis {
    pub fn compute(records: &[ExpenseRecord]) -> Self {
        Kpis {
            total_spend: records.iter().map(|r| r.amount).sum(),
            records: records.len(),
            sites: distinct_sites(records).len(),
            supervisors: distinct_supervisors(records).len(),
        }
    }
}

// ============================================================================
// SPIKE DETECTION
// ============================================================================

pub fn mean_amount(records: &[ExpenseRecord]) -> Option<f64> {
    if records.is_empty() {
        return None;
    }
    let total: f64 = records.iter().map(|r| r.amount).sum();
    Some(total / records.len() as f64)
}

/// Records whose amount exceeds `multiplier` times the mean of `records`.
///
/// An empty set or a zero mean yields no spikes.
pub fn detect_spikes(records: &[ExpenseRecord], multiplier: f64) -> Vec<ExpenseRecord> {
    let threshold = match mean_amount(records) {
        Some(mean) => mean * multiplier,
        None => return Vec::new(),
    };

    records
        .iter()
        .filter(|r| r.amount > threshold)
        .cloned()
        .collect()
}

// ============================================================================
// FULL VIEW
// ============================================================================

/// Everything the dashboard page shows for one filter.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub filter: Filter,
    pub kpis: Kpis,
    pub trend: Vec<Bucket>,
    pub by_category: Vec<Bucket>,
    pub by_site: Vec<Bucket>,
    pub by_supervisor: Vec<Bucket>,
    pub spike_threshold: Option<f64>,
    pub spikes: Vec<ExpenseRecord>,
    pub records: Vec<ExpenseRecord>,
}

impl DashboardView {
    pub fn build(all: &[ExpenseRecord], filter: &Filter, spike_multiplier: f64) -> Self {
        let records = filter.apply(all);

        DashboardView {
            filter: filter.clone(),
            kpis: Kpis::compute(&records),
            trend: aggregate(&records, GroupBy::Date),
            by_category: aggregate(&records, GroupBy::Category),
            by_site: aggregate(&records, GroupBy::Site),
            by_supervisor: aggregate(&records, GroupBy::Supervisor),
            spike_threshold: mean_amount(&records).map(|m| m * spike_multiplier),
            spikes: detect_spikes(&records, spike_multiplier),
            records,
        }
    }
}

// ============================================================================
// FORMATTING
// ============================================================================

/// `1234567.5` → `"₹ 1,234,567.50"` (symbol omitted when empty).
pub fn format_amount(symbol: &str, amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if amount < 0.0 { "-" } else { "" };
    if symbol.is_empty() {
        format!("{}{}.{}", sign, grouped, frac_part)
    } else {
        format!("{}{} {}.{}", sign, symbol, grouped, frac_part)
    }
}
