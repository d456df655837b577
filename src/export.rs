use csv::{QuoteStyle, Terminator, WriterBuilder};
use serde_json::Value;
use thiserror::Error;

use crate::extraction::{ExtractionResult, Table};
use crate::models::{TABLE_CSV_FILENAME, TEXT_COLUMN, TEXT_CSV_FILENAME};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("nothing has been extracted yet")]
    NothingExtracted,

    #[error("no data: the extracted table has no rows or columns")]
    NoData,

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid utf-8 csv output: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvExport {
    pub filename: &'static str,
    pub content: String,
}

/// Display text of a single cell; missing and `null` cells are empty.
#[must_use]
pub fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// Row-major cell text, one entry per header in header order.
#[must_use]
pub fn render_grid(table: &Table) -> Vec<Vec<String>> {
    table
        .rows
        .iter()
        .map(|row| {
            table
                .headers
                .iter()
                .map(|header| cell_text(row.get(header)))
                .collect()
        })
        .collect()
}

pub fn table_to_csv(table: &Table) -> Result<String, ExportError> {
    // `[{}]` has rows but nothing to put in them.
    if table.is_empty() || table.headers.is_empty() {
        return Err(ExportError::NoData);
    }

    write_records(&table.headers, &render_grid(table))
}

pub fn text_to_csv(value: &str) -> Result<String, ExportError> {
    if value.trim().is_empty() {
        return Err(ExportError::NoData);
    }

    write_records(&[TEXT_COLUMN.to_string()], &[vec![value.to_string()]])
}

pub fn export_csv(result: &ExtractionResult) -> Result<CsvExport, ExportError> {
    match result {
        ExtractionResult::Table(table) => Ok(CsvExport {
            filename: TABLE_CSV_FILENAME,
            content: table_to_csv(table)?,
        }),
        ExtractionResult::Text { value } => Ok(CsvExport {
            filename: TEXT_CSV_FILENAME,
            content: text_to_csv(value)?,
        }),
    }
}

/// What "copy to clipboard" puts on the clipboard: the raw output, verbatim.
#[must_use]
pub fn clipboard_text(raw: &str) -> Option<&str> {
    if raw.trim().is_empty() {
        None
    } else {
        Some(raw)
    }
}

fn write_records(headers: &[String], rows: &[Vec<String>]) -> Result<String, ExportError> {
    let mut writer = WriterBuilder::new()
        .delimiter(b',')
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::<u8>::new());
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;

    let bytes = writer
        .into_inner()
        .map_err(|error| ExportError::Csv(error.into_error().into()))?;
    let mut csv =
        String::from_utf8(bytes).map_err(|error| ExportError::Encoding(error.to_string()))?;

    // The writer terminates every record; the exported file does not end with one.
    if csv.ends_with('\n') {
        csv.pop();
    }
    Ok(csv)
}
