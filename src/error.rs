// ⚠️ Error types shared by the import pipeline and manual entry

use thiserror::Error;

/// Why an uploaded file could not be turned into a table.
///
/// The `Display` text is shown to the user as-is; the upload is discarded.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Unsupported file type '{0}': upload a .csv, .tsv, .txt, .xlsx, .xls or .ods file")]
    UnsupportedFormat(String),

    #[error("Could not read the uploaded file: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Could not parse the uploaded file as delimited text: {source}")]
    Csv {
        #[from]
        source: csv::Error,
    },

    #[error("Could not read the uploaded spreadsheet: {0}")]
    Spreadsheet(String),

    #[error("The uploaded workbook has no worksheets")]
    EmptyWorkbook,
}

impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::Spreadsheet(err.to_string())
    }
}

/// Rejection reasons for a manually entered expense.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EntryError {
    #[error("'{0}' is not a recognised date")]
    InvalidDate(String),

    #[error("'{0}' is not a number")]
    InvalidAmount(String),

    #[error("Amount must not be negative (got {0})")]
    NegativeAmount(f64),

    #[error("Amount must be a finite number")]
    NonFiniteAmount,
}
