//! Spreadsheet files
//!
//! The first row of the first worksheet is the header. Numeric operations
//! only look at the first column; other columns are carried along.

use super::partition::split_even;
use super::CodecError;
use crate::normalize::{canonical_phone, digit_token};
use calamine::{open_workbook, Data, Reader, Xlsx};
use rust_xlsxwriter::Workbook;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    /// Text form used for matching; integral numbers print without a fraction.
    pub fn as_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => n.to_string(),
            Cell::Bool(b) => b.to_string(),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            #[allow(clippy::cast_precision_loss)]
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::Bool(b) => Cell::Bool(*b),
            other => Cell::Text(other.to_string()),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub header: Vec<Cell>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Text of each row's first cell; missing cells read as empty.
    pub fn first_column(&self) -> impl Iterator<Item = String> + '_ {
        self.rows
            .iter()
            .map(|row| row.first().map(Cell::as_text).unwrap_or_default())
    }

    /// Canonical numbers from the first column, invalid cells dropped.
    pub fn numbers(&self) -> Vec<String> {
        self.first_column()
            .filter_map(|cell| canonical_phone(&cell))
            .collect()
    }

    pub fn count_digit_tokens(&self) -> usize {
        self.first_column()
            .filter(|cell| digit_token(cell).is_some())
            .count()
    }

    /// Drop rows whose first cell contains any of `needles`. Returns how many
    /// rows were removed.
    pub fn remove_matching(&mut self, needles: &[String]) -> usize {
        let needles: Vec<&str> = needles
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .collect();
        let before = self.rows.len();
        self.rows.retain(|row| {
            let first = row.first().map(Cell::as_text).unwrap_or_default();
            !needles.iter().any(|needle| first.contains(needle))
        });
        before - self.rows.len()
    }

    /// Keep the first row for each distinct first-column value. Returns
    /// whether anything was removed.
    pub fn dedupe_first_column(&mut self) -> bool {
        let before = self.rows.len();
        let mut seen = HashSet::new();
        self.rows.retain(|row| {
            let key = row.first().map(Cell::as_text).unwrap_or_default();
            seen.insert(key)
        });
        self.rows.len() < before
    }

    /// Alignment key of every column. A non-empty header names its column;
    /// blank headers become `Unnamed: {i}` and repeats get a `.{k}` suffix,
    /// so no two columns of one table share a key.
    fn column_keys(&self) -> Vec<String> {
        let width = self
            .rows
            .iter()
            .map(Vec::len)
            .chain([self.header.len()])
            .max()
            .unwrap_or(0);
        let mut taken = HashSet::new();
        (0..width)
            .map(|i| {
                let name = self.header.get(i).map(Cell::as_text).unwrap_or_default();
                let base = match name.trim() {
                    "" => format!("Unnamed: {i}"),
                    trimmed => trimmed.to_string(),
                };
                let mut key = base.clone();
                let mut k = 0;
                while !taken.insert(key.clone()) {
                    k += 1;
                    key = format!("{base}.{k}");
                }
                key
            })
            .collect()
    }

    /// Stack tables row-wise. Columns line up by key (see `column_keys`); a
    /// column missing from one table is left empty in its rows.
    pub fn concat(tables: &[Table]) -> Table {
        let mut keys: Vec<String> = Vec::new();
        let mut header: Vec<Cell> = Vec::new();
        let mut positions: Vec<Vec<usize>> = Vec::with_capacity(tables.len());
        for table in tables {
            let mut table_positions = Vec::new();
            for (i, key) in table.column_keys().into_iter().enumerate() {
                let pos = match keys.iter().position(|k| *k == key) {
                    Some(pos) => pos,
                    None => {
                        keys.push(key);
                        header.push(table.header.get(i).cloned().unwrap_or(Cell::Empty));
                        keys.len() - 1
                    }
                };
                table_positions.push(pos);
            }
            positions.push(table_positions);
        }

        let mut rows = Vec::new();
        for (table, positions) in tables.iter().zip(&positions) {
            for row in &table.rows {
                let mut merged = vec![Cell::Empty; header.len()];
                for (cell, &pos) in row.iter().zip(positions) {
                    merged[pos] = cell.clone();
                }
                rows.push(merged);
            }
        }
        Table { header, rows }
    }

    /// Split rows into `parts` contiguous tables sharing this header.
    pub fn split(&self, parts: usize) -> Vec<Table> {
        split_even(&self.rows, parts)
            .into_iter()
            .map(|rows| Table {
                header: self.header.clone(),
                rows: rows.to_vec(),
            })
            .collect()
    }

    fn read_sync(path: &Path) -> Result<Table, CodecError> {
        let mut workbook: Xlsx<_> = open_workbook(path)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or(CodecError::NoWorksheet)??;
        let mut rows = range
            .rows()
            .map(|row| row.iter().map(Cell::from).collect::<Vec<_>>());
        let header = rows.next().unwrap_or_default();
        Ok(Table {
            header,
            rows: rows.collect(),
        })
    }

    fn write_sync(&self, path: &Path) -> Result<(), CodecError> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (r, row) in std::iter::once(&self.header).chain(&self.rows).enumerate() {
            let r = u32::try_from(r).map_err(|_| CodecError::TooLarge)?;
            for (c, cell) in row.iter().enumerate() {
                let c = u16::try_from(c).map_err(|_| CodecError::TooLarge)?;
                match cell {
                    Cell::Empty => {}
                    Cell::Text(s) => {
                        sheet.write_string(r, c, s)?;
                    }
                    Cell::Number(n) => {
                        sheet.write_number(r, c, *n)?;
                    }
                    Cell::Bool(b) => {
                        sheet.write_boolean(r, c, *b)?;
                    }
                }
            }
        }
        workbook.save(path)?;
        Ok(())
    }

    /// Read the first worksheet. Parsing runs on the blocking pool.
    pub async fn read(path: &Path) -> Result<Table, CodecError> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::read_sync(&path)).await?
    }

    pub async fn write(self, path: &Path) -> Result<(), CodecError> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || self.write_sync(&path)).await?
    }
}
