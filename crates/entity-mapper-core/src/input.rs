//! Loads identifier pairs from spreadsheets and delimited text files.

use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use tracing::{debug, info};

use crate::error::{MapperError, Result};

const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// One identifier pair from the input file. Blank cells are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputRow {
    pub primary_id: Option<String>,
    pub secondary_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputTable {
    pub headers: Vec<String>,
    pub rows: Vec<InputRow>,
}

impl InputTable {
    /// Builds a table from a header row and raw cell rows. Columns past the
    /// second are ignored.
    pub fn from_cells(
        path: &Path,
        headers: Vec<String>,
        cells: Vec<Vec<Option<String>>>,
    ) -> Result<Self> {
        if headers.len() < 2 {
            return Err(MapperError::InputFormat {
                path: path.to_path_buf(),
                found: headers.len(),
            });
        }

        let rows = cells
            .into_iter()
            .filter(|row| row.iter().any(Option::is_some))
            .map(|mut row| {
                row.truncate(2);
                let mut values = row.into_iter();
                InputRow {
                    primary_id: values.next().flatten(),
                    secondary_id: values.next().flatten(),
                }
            })
            .collect();

        Ok(Self { headers, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn primary_ids(&self) -> Vec<&str> {
        self.rows
            .iter()
            .filter_map(|row| row.primary_id.as_deref())
            .collect()
    }

    pub fn secondary_ids(&self) -> Vec<&str> {
        self.rows
            .iter()
            .filter_map(|row| row.secondary_id.as_deref())
            .collect()
    }
}

/// Loads the identifier pairs from a spreadsheet or delimited text file.
/// The first row is the header.
pub fn load_input(path: &Path) -> Result<InputTable> {
    info!(path = %path.display(), "loading input file");

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let table = match extension.as_str() {
        "csv" => read_delimited(path, b',')?,
        "tsv" => read_delimited(path, b'\t')?,
        ext if SPREADSHEET_EXTENSIONS.contains(&ext) => read_spreadsheet(path)?,
        other => {
            return Err(read_error(
                path,
                format!("unsupported input extension '{other}'"),
            ))
        }
    };

    info!(
        columns = ?table.headers,
        rows = table.len(),
        "input file loaded"
    );
    Ok(table)
}

fn read_error(path: &Path, message: impl Into<String>) -> MapperError {
    MapperError::InputRead {
        path: PathBuf::from(path),
        message: message.into(),
    }
}

fn non_blank(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn read_delimited(path: &Path, delimiter: u8) -> Result<InputTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|err| read_error(path, err.to_string()))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| read_error(path, err.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut cells = Vec::new();
    for (line_index, record) in reader.records().enumerate() {
        let record =
            record.map_err(|err| read_error(path, format!("row {}: {err}", line_index + 1)))?;
        cells.push(record.iter().map(non_blank).collect());
    }

    InputTable::from_cells(path, headers, cells)
}

fn read_spreadsheet(path: &Path) -> Result<InputTable> {
    let mut workbook = open_workbook_auto(path).map_err(|err| read_error(path, err.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| read_error(path, "workbook has no worksheets"))?
        .map_err(|err| read_error(path, err.to_string()))?;

    debug!(height = range.height(), width = range.width(), "read worksheet range");

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .map(|row| {
            row.iter()
                .map(|cell| spreadsheet_cell(cell).unwrap_or_default())
                .collect()
        })
        .unwrap_or_default();

    let cells = rows
        .map(|row| row.iter().map(spreadsheet_cell).collect())
        .collect();

    InputTable::from_cells(path, headers, cells)
}

fn spreadsheet_cell(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(text) => non_blank(text),
        Data::Int(value) => Some(value.to_string()),
        Data::Float(value) => Some(format_number(*value)),
        Data::Bool(value) => Some(value.to_string()),
        other => non_blank(&other.to_string()),
    }
}

/// Integral floats lose their fractional part so `7.0` reads as `7`.
fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
