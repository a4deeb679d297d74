use crate::error::{PipelineError, Result, Stage};
use crate::table::{parse_number, ColumnKind, ObservationTable};
use crate::template::{escape_attr, Template};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Explicit total order over category labels (e.g. timepoints).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryOrder {
    levels: Vec<String>,
}

impl CategoryOrder {
    pub fn new<S: Into<String>>(levels: impl IntoIterator<Item = S>) -> Result<Self> {
        let levels: Vec<String> = levels.into_iter().map(Into::into).collect();
        if levels.is_empty() {
            return Err(PipelineError::schema(Stage::Reshape, "category order is empty"));
        }
        let mut seen = HashSet::new();
        for level in &levels {
            if !seen.insert(level.as_str()) {
                return Err(PipelineError::schema(
                    Stage::Reshape,
                    format!("category '{}' appears twice in the order", level),
                ));
            }
        }
        Ok(Self { levels })
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn rank(&self, label: &str) -> Option<usize> {
        self.levels.iter().position(|l| l == label)
    }

    pub fn label(&self, rank: usize) -> &str {
        &self.levels[rank]
    }

    pub fn reversed(&self) -> Self {
        Self {
            levels: self.levels.iter().rev().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            Value::Text(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LongRow {
    /// Values of the id columns, in `LongTable::id_columns` order
    pub ids: Vec<String>,
    /// Rank in the table's category order
    pub category: usize,
    pub value: Value,
    pub tooltip: Option<String>,
}

/// One row per (observation, category), emitted category block by
/// category block; source row order is kept inside each block.
#[derive(Debug, Clone, PartialEq)]
pub struct LongTable {
    id_columns: Vec<String>,
    categories: CategoryOrder,
    rows: Vec<LongRow>,
}

/// Record handed to a renderer for one heatmap cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellRecord {
    pub row_id: String,
    pub category: String,
    pub category_rank: usize,
    pub value: Value,
    pub tooltip: String,
    pub action: String,
}

impl LongTable {
    pub fn id_columns(&self) -> &[String] {
        &self.id_columns
    }

    pub fn categories(&self) -> &CategoryOrder {
        &self.categories
    }

    pub fn rows(&self) -> &[LongRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row ids (first id column) in source order, without repeats.
    pub fn row_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .map(|r| r.ids[0].as_str())
            .filter(|id| seen.insert(*id))
            .collect()
    }

    fn id_index(&self, name: &str) -> Result<usize> {
        self.id_columns.iter().position(|c| c == name).ok_or_else(|| {
            PipelineError::schema(
                Stage::Reshape,
                format!("'{}' is not an id column of the long table", name),
            )
        })
    }

    /// Fill tooltips from `template`. Placeholders may name any id column,
    /// `category` or `value`. Results are attribute-escaped.
    pub fn with_tooltips(&self, template: &Template) -> Result<Self> {
        let mut known: Vec<&str> = self.id_columns.iter().map(|c| c.as_str()).collect();
        known.extend(["category", "value"]);
        template.check_fields(&known, Stage::Reshape)?;

        let mut rows = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let value = row.value.to_string();
            let category = self.categories.label(row.category);
            let lookup = |name: &str| match name {
                "category" => Some(category),
                "value" => Some(value.as_str()),
                _ => self
                    .id_columns
                    .iter()
                    .position(|c| c == name)
                    .map(|i| row.ids[i].as_str()),
            };
            let tooltip = template.render(lookup).map_err(|field| {
                PipelineError::schema(Stage::Reshape, format!("no value for tooltip field '{}'", field))
            })?;
            rows.push(LongRow {
                tooltip: Some(escape_attr(&tooltip)),
                ..row.clone()
            });
        }
        Ok(Self {
            id_columns: self.id_columns.clone(),
            categories: self.categories.clone(),
            rows,
        })
    }

    /// Renderer-facing records; the first id column is the row id.
    pub fn cell_records(&self, action_column: &str) -> Result<Vec<CellRecord>> {
        let action_idx = self.id_index(action_column)?;
        Ok(self
            .rows
            .iter()
            .map(|row| {
                let category = self.categories.label(row.category).to_string();
                let tooltip = row.tooltip.clone().unwrap_or_else(|| {
                    escape_attr(&format!("{} | {}: {}", row.ids[0], category, row.value))
                });
                CellRecord {
                    row_id: row.ids[0].clone(),
                    category,
                    category_rank: row.category,
                    value: row.value.clone(),
                    tooltip,
                    action: row.ids[action_idx].clone(),
                }
            })
            .collect())
    }
}

/// Pivot `value_columns` into (category, value) pairs, repeating `id_columns`.
pub fn to_long(
    table: &ObservationTable,
    id_columns: &[String],
    value_columns: &[String],
    category_order: &CategoryOrder,
) -> Result<LongTable> {
    let index_of = |name: &str| {
        table.headers().iter().position(|h| h == name).ok_or_else(|| {
            PipelineError::schema(Stage::Reshape, format!("column '{}' not found", name))
        })
    };
    if id_columns.is_empty() {
        return Err(PipelineError::schema(Stage::Reshape, "no id columns given"));
    }
    if value_columns.is_empty() {
        return Err(PipelineError::schema(Stage::Reshape, "no value columns given"));
    }
    let id_idx = id_columns
        .iter()
        .map(|c| index_of(c.as_str()))
        .collect::<Result<Vec<_>>>()?;

    let mut kind = None;
    let mut value_set = HashSet::new();
    for name in value_columns {
        index_of(name.as_str())?;
        if id_columns.contains(name) {
            return Err(PipelineError::schema(
                Stage::Reshape,
                format!("column '{}' is both an id and a value column", name),
            ));
        }
        if !value_set.insert(name.as_str()) {
            return Err(PipelineError::schema(
                Stage::Reshape,
                format!("value column '{}' listed twice", name),
            ));
        }
        let this = table.column_kind(name, Stage::Reshape)?;
        match kind {
            None => kind = Some((name, this)),
            Some((first, k)) if k != this => {
                return Err(PipelineError::schema(
                    Stage::Reshape,
                    format!(
                        "value columns mix types: '{}' is {:?}, '{}' is {:?}",
                        first, k, name, this
                    ),
                ));
            }
            Some(_) => {}
        }
    }
    let numeric = matches!(kind, Some((_, ColumnKind::Numeric)));

    let order_set: HashSet<&str> = category_order.levels().iter().map(|l| l.as_str()).collect();
    if order_set != value_set {
        return Err(PipelineError::schema(
            Stage::Reshape,
            format!(
                "category order {:?} does not match value columns {:?}",
                category_order.levels(),
                value_columns
            ),
        ));
    }

    // The first id column is the row id renderers key cells by.
    let mut seen = HashSet::new();
    for (row, cells) in table.rows().iter().enumerate() {
        let row_id = cells[id_idx[0]].as_str();
        if !seen.insert(row_id) {
            return Err(PipelineError::schema(
                Stage::Reshape,
                format!(
                    "row {}: duplicated row id '{}' in column '{}'",
                    row + 1,
                    row_id,
                    id_columns[0]
                ),
            ));
        }
    }

    let mut rows = Vec::with_capacity(table.n_rows() * value_columns.len());
    for (rank, level) in category_order.levels().iter().enumerate() {
        let col = index_of(level.as_str())?;
        for cells in table.rows() {
            let raw = &cells[col];
            let value = if numeric {
                Value::Number(parse_number(raw).unwrap_or(f64::NAN))
            } else {
                Value::Text(raw.clone())
            };
            rows.push(LongRow {
                ids: id_idx.iter().map(|&i| cells[i].clone()).collect(),
                category: rank,
                value,
                tooltip: None,
            });
        }
    }

    Ok(LongTable {
        id_columns: id_columns.to_vec(),
        categories: category_order.clone(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn wide() -> ObservationTable {
        ObservationTable::new(
            strings(&["event", "action", "t0", "t1", "t2"]),
            vec![
                strings(&["E2", "go:E2", "3", "4", "9"]),
                strings(&["E1", "go:E1", "1", "2", "8"]),
            ],
        )
        .unwrap()
    }

    fn order(levels: &[&str]) -> CategoryOrder {
        CategoryOrder::new(levels.iter().copied()).unwrap()
    }

    #[test]
    fn emits_category_blocks_in_given_order() {
        let long = to_long(
            &wide(),
            &strings(&["event", "action"]),
            &strings(&["t0", "t1", "t2"]),
            &order(&["t2", "t0", "t1"]),
        )
        .unwrap();
        assert_eq!(long.len(), 6);
        let seq: Vec<(String, &str)> = long
            .rows()
            .iter()
            .map(|r| (r.ids[0].clone(), long.categories().label(r.category)))
            .collect();
        assert_eq!(
            seq,
            vec![
                ("E2".to_string(), "t2"),
                ("E1".to_string(), "t2"),
                ("E2".to_string(), "t0"),
                ("E1".to_string(), "t0"),
                ("E2".to_string(), "t1"),
                ("E1".to_string(), "t1"),
            ]
        );
        assert_eq!(long.rows()[0].value, Value::Number(9.0));
        assert_eq!(long.row_ids(), vec!["E2", "E1"]);
    }

    #[test]
    fn mixed_value_types_are_rejected() {
        let table = ObservationTable::new(
            strings(&["event", "t0", "label"]),
            vec![strings(&["E1", "1", "high"])],
        )
        .unwrap();
        let err = to_long(
            &table,
            &strings(&["event"]),
            &strings(&["t0", "label"]),
            &order(&["t0", "label"]),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { stage: Stage::Reshape, .. }));
    }

    #[test]
    fn text_values_are_kept_as_text() {
        let table = ObservationTable::new(
            strings(&["event", "a", "b"]),
            vec![strings(&["E1", "x", "y"])],
        )
        .unwrap();
        let long = to_long(&table, &strings(&["event"]), &strings(&["a", "b"]), &order(&["b", "a"])).unwrap();
        assert_eq!(long.rows()[0].value, Value::Text("y".to_string()));
    }

    #[test]
    fn duplicated_ids_are_rejected() {
        let table = ObservationTable::new(
            strings(&["event", "t0"]),
            vec![strings(&["E1", "1"]), strings(&["E1", "2"])],
        )
        .unwrap();
        let err = to_long(&table, &strings(&["event"]), &strings(&["t0"]), &order(&["t0"])).unwrap_err();
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn row_id_must_be_unique_even_when_other_ids_differ() {
        let table = ObservationTable::new(
            strings(&["id", "locus", "t0"]),
            vec![
                strings(&["E1", "chr1:1-2", "1"]),
                strings(&["E1", "chr2:3-4", "9"]),
            ],
        )
        .unwrap();
        let err = to_long(&table, &strings(&["id", "locus"]), &strings(&["t0"]), &order(&["t0"])).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { stage: Stage::Reshape, .. }));
        assert!(err.to_string().contains("row 2"));
        assert!(err.to_string().contains("'E1'"));
    }

    #[test]
    fn category_order_must_cover_value_columns() {
        let err = to_long(
            &wide(),
            &strings(&["event"]),
            &strings(&["t0", "t1"]),
            &order(&["t0", "t2"]),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
        assert!(CategoryOrder::new(["t0", "t0"]).is_err());
        assert!(CategoryOrder::new(Vec::<String>::new()).is_err());
    }

    #[test]
    fn tooltips_and_cell_records() {
        let long = to_long(
            &wide(),
            &strings(&["event", "action"]),
            &strings(&["t0", "t1", "t2"]),
            &order(&["t0", "t1", "t2"]),
        )
        .unwrap();

        let plain = long.cell_records("action").unwrap();
        assert_eq!(plain[0].tooltip, "E2 | t0: 3");

        let tip = Template::parse("<b>{event}</b> {category}={value}").unwrap();
        let long = long.with_tooltips(&tip).unwrap();
        let records = long.cell_records("action").unwrap();
        assert_eq!(records.len(), 6);
        assert_eq!(records[1].row_id, "E1");
        assert_eq!(records[1].action, "go:E1");
        assert_eq!(records[1].tooltip, "&lt;b&gt;E1&lt;/b&gt; t0=1");
        assert_eq!(records[5].category, "t2");
        assert_eq!(records[5].category_rank, 2);

        assert!(long.cell_records("missing").is_err());
        let bad = Template::parse("{gene}").unwrap();
        assert!(long.with_tooltips(&bad).is_err());
    }
}
