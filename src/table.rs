use crate::error::{PipelineError, Result, Stage};
use csv::{ReaderBuilder, WriterBuilder};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::Path;

/// Parse a numeric cell, accepting "NaN"/"NA" as missing (NaN).
pub fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.eq_ignore_ascii_case("nan") || trimmed == "NA" {
        Some(f64::NAN)
    } else {
        trimmed.parse::<f64>().ok()
    }
}

/// How a delimited table is read from disk.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Field delimiter (tab by default)
    pub delimiter: u8,
    /// Quote character; `None` disables quoting entirely
    pub quote: Option<u8>,
    /// Identifier column whose values must be unique
    pub id_column: Option<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: b'\t',
            quote: None,
            id_column: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Text,
}

/// Wide observation table: one row per observation, raw string cells.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ObservationTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for h in &headers {
            if !seen.insert(h.as_str()) {
                return Err(PipelineError::invalid(
                    Stage::Load,
                    format!("duplicate column name '{}'", h),
                ));
            }
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != headers.len() {
                return Err(PipelineError::invalid(
                    Stage::Load,
                    format!(
                        "row {} has {} field(s), header has {}",
                        i + 1,
                        row.len(),
                        headers.len()
                    ),
                ));
            }
        }
        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    /// Index of a named column, reported against `stage` when missing.
    pub fn column_index(&self, name: &str, stage: Stage) -> Result<usize> {
        self.headers.iter().position(|h| h == name).ok_or_else(|| {
            PipelineError::invalid(stage, format!("column '{}' not found", name))
        })
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        &self.rows[row][col]
    }

    pub fn column(&self, name: &str, stage: Stage) -> Result<Vec<&str>> {
        let idx = self.column_index(name, stage)?;
        Ok(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }

    /// Parse a column as numbers. Unparseable cells are an error; NaN is kept.
    pub fn numeric_column(&self, name: &str, stage: Stage) -> Result<Vec<f64>> {
        let idx = self.column_index(name, stage)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(i, r)| {
                parse_number(&r[idx]).ok_or_else(|| {
                    PipelineError::invalid(
                        stage,
                        format!(
                            "row {}, column '{}': '{}' is not a number",
                            i + 1,
                            name,
                            r[idx]
                        ),
                    )
                })
            })
            .collect()
    }

    pub fn column_kind(&self, name: &str, stage: Stage) -> Result<ColumnKind> {
        let idx = self.column_index(name, stage)?;
        let numeric = self.rows.iter().all(|r| parse_number(&r[idx]).is_some());
        Ok(if numeric {
            ColumnKind::Numeric
        } else {
            ColumnKind::Text
        })
    }

    /// Numeric columns in header order, skipping `exclude`.
    pub fn numeric_columns(&self, exclude: &[&str]) -> Vec<String> {
        self.headers
            .iter()
            .filter(|h| !exclude.contains(&h.as_str()))
            .filter(|h| {
                matches!(
                    self.column_kind(h, Stage::Load),
                    Ok(ColumnKind::Numeric)
                )
            })
            .cloned()
            .collect()
    }

    /// Verify that `name` holds unique values.
    pub fn ensure_unique(&self, name: &str, stage: Stage) -> Result<()> {
        let values = self.column(name, stage)?;
        let mut seen = HashSet::new();
        for (i, v) in values.iter().enumerate() {
            if !seen.insert(*v) {
                return Err(PipelineError::invalid(
                    stage,
                    format!("row {}: duplicate identifier '{}' in column '{}'", i + 1, v, name),
                ));
            }
        }
        Ok(())
    }

    /// New table with rows taken in `order`; `order` must be a permutation.
    pub fn reorder(&self, order: &[usize]) -> Result<Self> {
        let mut seen = vec![false; self.rows.len()];
        if order.len() != self.rows.len() {
            return Err(PipelineError::invalid(
                Stage::Cluster,
                format!(
                    "row order has {} entries for {} rows",
                    order.len(),
                    self.rows.len()
                ),
            ));
        }
        for &i in order {
            if i >= self.rows.len() || std::mem::replace(&mut seen[i], true) {
                return Err(PipelineError::invalid(
                    Stage::Cluster,
                    format!("row order is not a permutation (index {})", i),
                ));
            }
        }
        Ok(Self {
            headers: self.headers.clone(),
            rows: order.iter().map(|&i| self.rows[i].clone()).collect(),
        })
    }

    /// New table with an extra column appended.
    pub fn with_column(&self, name: &str, values: Vec<String>, stage: Stage) -> Result<Self> {
        if self.has_column(name) {
            return Err(PipelineError::schema(
                stage,
                format!("column '{}' already exists", name),
            ));
        }
        if values.len() != self.rows.len() {
            return Err(PipelineError::schema(
                stage,
                format!(
                    "column '{}' has {} value(s) for {} rows",
                    name,
                    values.len(),
                    self.rows.len()
                ),
            ));
        }
        let mut headers = self.headers.clone();
        headers.push(name.to_string());
        let rows = self
            .rows
            .iter()
            .zip(values)
            .map(|(r, v)| {
                let mut r = r.clone();
                r.push(v);
                r
            })
            .collect();
        Ok(Self { headers, rows })
    }
}

/// Read a delimited table with a header row from any reader.
pub fn read_table<R: Read>(reader: R, options: &LoadOptions) -> Result<ObservationTable> {
    let mut builder = ReaderBuilder::new();
    builder.delimiter(options.delimiter).has_headers(true);
    match options.quote {
        Some(q) => {
            builder.quote(q);
        }
        None => {
            builder.quoting(false);
        }
    }
    let mut reader = builder.from_reader(reader);

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|f| f.to_string()).collect());
    }

    let table = ObservationTable::new(headers, rows)?;
    if let Some(id) = &options.id_column {
        table.ensure_unique(id, Stage::Load)?;
    }
    Ok(table)
}

pub fn load_table(path: &Path, options: &LoadOptions) -> Result<ObservationTable> {
    let file = File::open(path)?;
    read_table(file, options)
}

/// Write a table with its header row, quoting only when needed.
pub fn write_table(table: &ObservationTable, path: &Path, delimiter: u8) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(BufWriter::new(file));
    writer.write_record(table.headers())?;
    for row in table.rows() {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}
