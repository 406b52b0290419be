//! Loading report workbooks into a simple typed table.
//!
//! The report API exports spreadsheets whose cells are mostly text, so cell
//! types are inferred from content: numbers and timestamps written as text
//! come back as [`Cell::Number`] and [`Cell::DateTime`].

use std::{fmt::Display, io::Cursor};

use calamine::{Data, Reader as _, Xlsx};
use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::debug;

/// Timestamp layouts that show up in exported reports. The first one matches
/// the `%E.%m.%Y_%H:%M:%S` time format requested in the report templates.
const DATETIME_FORMATS: &[&str] =
    &["%d.%m.%Y %H:%M:%S", "%d.%m.%Y %H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Debug, Error)]
pub enum TableError {
    #[error("sheet \"{sheet}\" not found in workbook (available: {})", available.join(", "))]
    SheetNotFound { sheet: String, available: Vec<String> },
    #[error("could not parse workbook: {0}")]
    Parse(String),
    #[error("column \"{0}\" is missing")]
    MissingColumn(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Cell {
    /// Infers the type of a textual cell.
    pub fn infer(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            return Cell::Empty;
        }
        if let Some(number) = text.parse::<f64>().ok().filter(|n| n.is_finite()) {
            return Cell::Number(number);
        }
        if let Some(datetime) = parse_datetime(text) {
            return Cell::DateTime(datetime);
        }
        Cell::Text(text.to_owned())
    }

    /// Reads the cell as a number. Text with a trailing unit, like "42.5 km",
    /// yields its leading number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => s.split_whitespace().next().and_then(|first| first.parse().ok()),
            Cell::Empty | Cell::DateTime(_) => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Cell::DateTime(dt) => Some(*dt),
            Cell::Text(s) => parse_datetime(s),
            Cell::Empty | Cell::Number(_) => None,
        }
    }

    pub fn as_text(&self) -> String {
        self.to_string()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Number(n) => write!(f, "{n}"),
            Cell::Text(s) => write!(f, "{s}"),
            Cell::DateTime(dt) => write!(f, "{}", dt.format("%d.%m.%Y %H:%M:%S")),
        }
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%d.%m.%Y")
                .ok()
                .map(|date| date.and_time(chrono::NaiveTime::MIN))
        })
}

/// A sheet with a header row and typed cells. Every row has exactly as many
/// cells as there are columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Empty);
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize, TableError> {
        self.column(name).ok_or_else(|| TableError::MissingColumn(name.to_owned()))
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        let column = self.column(column)?;
        self.rows.get(row).and_then(|row| row.get(column))
    }

    pub fn retain_rows(&mut self, keep: impl FnMut(&Vec<Cell>) -> bool) {
        self.rows.retain(keep);
    }
}

/// Parses a workbook held in memory and loads the named sheet. The first row
/// of the sheet is the header.
pub fn load_sheet(bytes: &[u8], sheet_name: &str) -> Result<Table, TableError> {
    let mut workbook = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| TableError::Parse(e.to_string()))?;

    let available = workbook.sheet_names();
    if !available.iter().any(|name| name == sheet_name) {
        return Err(TableError::SheetNotFound { sheet: sheet_name.to_owned(), available });
    }

    let range = workbook
        .worksheet_range(sheet_name)
        .map_err(|e| TableError::Parse(e.to_string()))?;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        debug!("sheet \"{}\" is empty", sheet_name);
        return Ok(Table::default());
    };
    let mut table = Table::new(header.iter().map(|cell| cell.to_string().trim().to_owned()).collect());
    for row in rows {
        let cells: Vec<Cell> = row.iter().map(convert_cell).collect();
        if cells.iter().all(Cell::is_empty) {
            continue;
        }
        table.push_row(cells);
    }
    debug!("loaded {} rows from sheet \"{}\"", table.len(), sheet_name);
    Ok(table)
}

fn convert_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::String(s) => Cell::infer(s),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(datetime) if !dt.is_duration() => Cell::DateTime(datetime),
            _ => Cell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => Cell::infer(s),
        Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Text(e.to_string()),
    }
}
