//! Tabular results
//!
//! A `Table` is a header row plus rows of text cells. It backs `to_table` output
//! and tabular cache entries, and reads/writes tab-delimited text.

use serde_json::{Map, Value};

/// Column names plus string rows, every row as wide as the header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    /// Header row
    pub columns: Vec<String>,
    /// Data rows
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Creates an empty table with the given header
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Number of data rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no data rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends a row, padding or truncating it to the header width
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.columns.len(), String::new());
        self.rows.push(row);
    }

    /// Builds a table from JSON records
    ///
    /// Columns are the union of object keys in first-seen order. Non-object
    /// records land in a `value` column.
    pub fn from_records(records: &[Value]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            match record {
                Value::Object(map) => {
                    for key in map.keys() {
                        if !columns.contains(key) {
                            columns.push(key.clone());
                        }
                    }
                }
                _ => {
                    if !columns.iter().any(|c| c == "value") {
                        columns.push("value".to_string());
                    }
                }
            }
        }

        let mut table = Table::new(columns);
        for record in records {
            let row = table
                .columns
                .iter()
                .map(|column| match record {
                    Value::Object(map) => map.get(column).map(cell_text).unwrap_or_default(),
                    other if column == "value" => cell_text(other),
                    _ => String::new(),
                })
                .collect();
            table.rows.push(row);
        }
        table
    }

    /// Converts each row into a JSON object of string cells
    pub fn to_records(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let map: Map<String, Value> = self
                    .columns
                    .iter()
                    .zip(row.iter())
                    .map(|(column, cell)| (column.clone(), Value::String(cell.clone())))
                    .collect();
                Value::Object(map)
            })
            .collect()
    }

    /// Inserts a column at `index`, one value per existing row
    pub fn insert_column(&mut self, index: usize, name: &str, values: Vec<String>) {
        let index = index.min(self.columns.len());
        self.columns.insert(index, name.to_string());
        let mut values = values.into_iter();
        for row in &mut self.rows {
            row.insert(index, values.next().unwrap_or_default());
        }
    }

    /// Appends another table, widening the header with any new columns
    pub fn concat(&mut self, other: &Table) {
        let mut positions = Vec::with_capacity(other.columns.len());
        for column in &other.columns {
            match self.columns.iter().position(|c| c == column) {
                Some(pos) => positions.push(pos),
                None => {
                    self.columns.push(column.clone());
                    for row in &mut self.rows {
                        row.push(String::new());
                    }
                    positions.push(self.columns.len() - 1);
                }
            }
        }

        for row in &other.rows {
            let mut widened = vec![String::new(); self.columns.len()];
            for (cell, &pos) in row.iter().zip(positions.iter()) {
                widened[pos] = cell.clone();
            }
            self.rows.push(widened);
        }
    }

    /// Renders the table as tab-delimited text with a header row
    pub fn to_tsv(&self) -> Result<String, csv::Error> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        let bytes = writer.into_inner().map_err(|e| e.into_error())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Parses tab-delimited text whose first line is the header
    pub fn from_tsv(text: &str) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let columns: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        let mut table = Table::new(columns);
        for record in reader.records() {
            let record = record?;
            table.push_row(record.iter().map(String::from).collect());
        }
        Ok(table)
    }
}

/// Text form of a JSON value for a table cell
///
/// Strings are written bare, null is empty, everything else is compact JSON.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
