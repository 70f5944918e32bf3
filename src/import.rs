// 📤 Bulk Import
// Reads an uploaded file (delimited text or spreadsheet) into a Table and
// normalizes it. Nothing here touches the store; committing is the caller's call.

use crate::error::ImportError;
use crate::normalizer::{normalize_table, Normalized, Table};
use calamine::{open_workbook_auto_from_rs, Data, DataType, Reader};
use csv::{ReaderBuilder, Trim};
use std::io::Cursor;
use std::path::Path;
use tracing::info;

// ============================================================================
// FORMAT DETECTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Csv,
    Tsv,
    Spreadsheet,
}

impl ImportFormat {
    /// Pick a format from the file extension (case-insensitive).
    pub fn from_file_name(name: &str) -> Result<Self, ImportError> {
        let extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "csv" => Ok(ImportFormat::Csv),
            "tsv" | "txt" => Ok(ImportFormat::Tsv),
            "xlsx" | "xlsm" | "xls" | "ods" => Ok(ImportFormat::Spreadsheet),
            _ => Err(ImportError::UnsupportedFormat(name.to_string())),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ImportFormat::Csv => "CSV",
            ImportFormat::Tsv => "Tab-separated text",
            ImportFormat::Spreadsheet => "Spreadsheet",
        }
    }
}

// ============================================================================
// READERS
// ============================================================================

/// Turns the raw bytes of an upload into a header row plus string cells.
pub trait TableReader {
    fn read(&self, bytes: &[u8]) -> Result<Table, ImportError>;

    fn format(&self) -> ImportFormat;
}

/// Comma or tab separated text, first line is the header row.
pub struct DelimitedReader {
    delimiter: u8,
}

impl DelimitedReader {
    pub fn new(delimiter: u8) -> Self {
        DelimitedReader { delimiter }
    }
}

impl TableReader for DelimitedReader {
    fn read(&self, bytes: &[u8]) -> Result<Table, ImportError> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(bytes);

        let headers = rdr
            .headers()?
            .iter()
            .enumerate()
            .map(|(idx, h)| {
                if idx == 0 {
                    h.trim_start_matches('\u{feff}').to_string()
                } else {
                    h.to_string()
                }
            })
            .collect::<Vec<_>>();

        let mut table = Table::new(headers);
        for result in rdr.records() {
            let record = result?;
            table.push_row(record.iter());
        }

        Ok(table)
    }

    fn format(&self) -> ImportFormat {
        if self.delimiter == b'\t' {
            ImportFormat::Tsv
        } else {
            ImportFormat::Csv
        }
    }
}

/// First worksheet of an xlsx/xls/ods workbook, first row is the header row.
pub struct SpreadsheetReader;

impl TableReader for SpreadsheetReader {
    fn read(&self, bytes: &[u8]) -> Result<Table, ImportError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or(ImportError::EmptyWorkbook)??;

        let mut rows = range.rows();
        let headers = match rows.next() {
            Some(row) => row.iter().map(cell_text).collect::<Vec<_>>(),
            None => return Ok(Table::default()),
        };

        let mut table = Table::new(headers);
        for row in rows {
            table.push_row(row.iter().map(cell_text));
        }

        Ok(table)
    }

    fn format(&self) -> ImportFormat {
        ImportFormat::Spreadsheet
    }
}

/// Render a spreadsheet cell as the text the normalizer expects.
///
/// Date cells become `YYYY-MM-DD`; numbers keep their shortest decimal form.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) => s.trim().to_string(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::DateTime(_) => cell
            .as_date()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        other => other.to_string(),
    }
}

/// Factory: reader for a detected format
pub fn get_reader(format: ImportFormat) -> Box<dyn TableReader> {
    match format {
        ImportFormat::Csv => Box::new(DelimitedReader::new(b',')),
        ImportFormat::Tsv => Box::new(DelimitedReader::new(b'\t')),
        ImportFormat::Spreadsheet => Box::new(SpreadsheetReader),
    }
}

// ============================================================================
// ENTRY POINTS
// ============================================================================

/// Read an upload held in memory. `file_name` only drives format detection.
pub fn read_table_from_bytes(file_name: &str, bytes: &[u8]) -> Result<Table, ImportError> {
    let format = ImportFormat::from_file_name(file_name)?;
    get_reader(format).read(bytes)
}

/// Read an upload from disk.
pub fn read_table(path: &Path) -> Result<Table, ImportError> {
    let name = path.to_string_lossy();
    let format = ImportFormat::from_file_name(&name)?;
    let bytes = std::fs::read(path)?;
    get_reader(format).read(&bytes)
}

/// Read and normalize an upload held in memory.
pub fn import_bytes(file_name: &str, bytes: &[u8]) -> Result<Normalized, ImportError> {
    let table = read_table_from_bytes(file_name, bytes)?;
    let normalized = normalize_table(&table);
    info!(file = file_name, "{}", normalized.summary());
    Ok(normalized)
}

/// Read and normalize an upload from disk.
pub fn import_file(path: &Path) -> Result<Normalized, ImportError> {
    let table = read_table(path)?;
    let normalized = normalize_table(&table);
    info!(file = %path.display(), "{}", normalized.summary());
    Ok(normalized)
}
