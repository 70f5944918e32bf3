// 💾 Expense Store - flat CSV file, fully rewritten after every mutation
//
// The file is the only source of truth between sessions. There is no locking:
// two processes saving at once can overwrite each other.

use crate::record::{ExpenseRecord, STORE_COLUMNS};
use anyhow::{Context, Result};
use csv::WriterBuilder;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct ExpenseStore {
    path: PathBuf,
    records: Vec<ExpenseRecord>,
}

impl ExpenseStore {
    /// Load the store backing `path`.
    ///
    /// A missing or unreadable file yields an empty store; this never fails.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let records = if !path.exists() {
            debug!(path = %path.display(), "no backing file yet, starting empty");
            Vec::new()
        } else {
            match read_records(&path) {
                Ok(records) => records,
                Err(e) => {
                    warn!(path = %path.display(), "could not read backing file, starting empty: {:#}", e);
                    Vec::new()
                }
            }
        };

        debug!(path = %path.display(), count = records.len(), "store loaded");
        ExpenseStore { path, records }
    }

    /// An empty store that will write to `path` on the next mutation.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        ExpenseStore {
            path: path.into(),
            records: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[ExpenseRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Overwrite the backing file with the current records.
    pub fn save(&self) -> Result<()> {
        let file = File::create(&self.path)
            .with_context(|| format!("Failed to create {}", self.path.display()))?;
        write_records(file, &self.records)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        debug!(path = %self.path.display(), count = self.records.len(), "store saved");
        Ok(())
    }

    /// Append one record and persist.
    pub fn append(&mut self, record: ExpenseRecord) -> Result<()> {
        self.append_batch(vec![record]).map(|_| ())
    }

    /// Append a batch (e.g. a normalized upload) and persist.
    ///
    /// Records that are not admissible are skipped. If the save fails the
    /// in-memory store is rolled back, so the mutation is all-or-nothing.
    pub fn append_batch(&mut self, records: Vec<ExpenseRecord>) -> Result<usize> {
        let before = self.records.len();

        self.records
            .extend(records.into_iter().filter(ExpenseRecord::is_admissible));
        let added = self.records.len() - before;

        if let Err(e) = self.save() {
            self.records.truncate(before);
            return Err(e);
        }

        info!(added, total = self.records.len(), "expenses appended");
        Ok(added)
    }

    /// Drop every record and persist an empty file (header row only).
    pub fn clear(&mut self) -> Result<()> {
        let previous = std::mem::take(&mut self.records);

        if let Err(e) = self.save() {
            self.records = previous;
            return Err(e);
        }

        info!(removed = previous.len(), "store cleared");
        Ok(())
    }
}

// ============================================================================
// CSV I/O
// ============================================================================

/// Read the backing file. Rows that fail to decode are skipped with a warning.
pub fn read_records(path: &Path) -> Result<Vec<ExpenseRecord>> {
    let mut rdr = csv::Reader::from_path(path).context("Failed to open expense file")?;

    let headers = rdr.headers().context("Failed to read header row")?.clone();
    for required in ["Date", "Amount"] {
        if !headers.iter().any(|h| h == required) {
            anyhow::bail!("Header row is missing the '{}' column", required);
        }
    }

    let mut records = Vec::new();
    for (idx, result) in rdr.deserialize::<ExpenseRecord>().enumerate() {
        match result {
            Ok(record) if record.is_admissible() => records.push(record),
            Ok(record) => {
                warn!(line = idx + 2, amount = record.amount, "skipping stored row with invalid amount");
            }
            Err(e) => {
                warn!(line = idx + 2, "skipping unreadable stored row: {}", e);
            }
        }
    }

    Ok(records)
}

/// Write records with the six-column header. The header is written even when
/// `records` is empty.
pub fn write_records<W: Write>(writer: W, records: &[ExpenseRecord]) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(writer);

    wtr.write_record(STORE_COLUMNS)?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;

    Ok(())
}

/// Render records as report CSV text.
pub fn records_to_csv(records: &[ExpenseRecord]) -> Result<String> {
    let mut buf = Vec::new();
    write_records(&mut buf, records)?;
    Ok(String::from_utf8(buf)?)
}

/// Write a report file (same shape as the backing file).
pub fn export_report(path: &Path, records: &[ExpenseRecord]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create report {}", path.display()))?;
    write_records(file, records)?;

    info!(path = %path.display(), count = records.len(), "report exported");
    Ok(())
}
