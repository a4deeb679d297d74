use crate::error::{PipelineError, Result, Stage};
use crate::table::ObservationTable;
use crate::template::{escape_attr, unescape_attr, Template};
use std::collections::{HashMap, HashSet};

/// Name of the column holding the synthesized action string.
pub const ACTION_COLUMN: &str = "action";

/// Split on `delimiter` into exactly `fields.len()` pieces.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitRule {
    pub delimiter: String,
    pub fields: Vec<String>,
}

/// Ordered split rules. The first rule splits the descriptor; each later
/// rule splits the last field produced by the rule before it, which is
/// then intermediate and not emitted.
///
/// `chr1:100-200` with `[(":", [chrom, rest]), ("-", [start, end])]`
/// yields `chrom=chr1, start=100, end=200`.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitSpec {
    rules: Vec<SplitRule>,
}

#[derive(Debug, Clone, PartialEq)]
struct SplitFailure {
    delimiter: String,
    expected: usize,
    found: usize,
}

impl SplitSpec {
    pub fn new(rules: Vec<SplitRule>) -> Result<Self> {
        if rules.is_empty() {
            return Err(PipelineError::invalid(Stage::Annotate, "split spec has no rules"));
        }
        for rule in &rules {
            if rule.delimiter.is_empty() {
                return Err(PipelineError::invalid(Stage::Annotate, "split delimiter is empty"));
            }
            if rule.fields.len() < 2 {
                return Err(PipelineError::invalid(
                    Stage::Annotate,
                    format!("split on '{}' needs at least two fields", rule.delimiter),
                ));
            }
        }
        let spec = Self { rules };
        let mut seen = HashSet::new();
        for field in spec.components() {
            if !seen.insert(field) {
                return Err(PipelineError::invalid(
                    Stage::Annotate,
                    format!("split field '{}' is produced twice", field),
                ));
            }
        }
        Ok(spec)
    }

    /// Parse rules written as `DELIM=field,field[,...]`, e.g. `:=chrom,rest`.
    pub fn parse<S: AsRef<str>>(rules: &[S]) -> Result<Self> {
        let parsed = rules
            .iter()
            .map(|r| {
                let r = r.as_ref();
                let (delimiter, fields) = r.rsplit_once('=').ok_or_else(|| {
                    PipelineError::invalid(
                        Stage::Annotate,
                        format!("split rule '{}' must look like DELIM=field,field", r),
                    )
                })?;
                Ok(SplitRule {
                    delimiter: delimiter.to_string(),
                    fields: fields.split(',').map(|f| f.trim().to_string()).collect(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(parsed)
    }

    pub fn rules(&self) -> &[SplitRule] {
        &self.rules
    }

    /// Emitted field names, in order.
    pub fn components(&self) -> Vec<&str> {
        let last = self.rules.len() - 1;
        self.rules
            .iter()
            .enumerate()
            .flat_map(|(k, rule)| {
                let keep = if k == last {
                    rule.fields.len()
                } else {
                    rule.fields.len() - 1
                };
                rule.fields[..keep].iter().map(|f| f.as_str())
            })
            .collect()
    }

    fn split(&self, value: &str) -> std::result::Result<Vec<String>, SplitFailure> {
        let last = self.rules.len() - 1;
        let mut out = Vec::new();
        let mut current = value.to_string();
        for (k, rule) in self.rules.iter().enumerate() {
            let pieces: Vec<&str> = current.split(rule.delimiter.as_str()).collect();
            if pieces.len() != rule.fields.len() {
                return Err(SplitFailure {
                    delimiter: rule.delimiter.clone(),
                    expected: rule.fields.len() - 1,
                    found: pieces.len() - 1,
                });
            }
            if k == last {
                out.extend(pieces.iter().map(|p| p.to_string()));
            } else {
                out.extend(pieces[..pieces.len() - 1].iter().map(|p| p.to_string()));
                current = pieces[pieces.len() - 1].to_string();
            }
        }
        Ok(out)
    }

    /// Rebuild a descriptor from its component values (inverse of splitting).
    pub fn join(&self, values: &HashMap<String, String>) -> Option<String> {
        let mut inner: Option<String> = None;
        for rule in self.rules.iter().rev() {
            let last = rule.fields.len() - 1;
            let mut pieces = Vec::with_capacity(rule.fields.len());
            for (i, field) in rule.fields.iter().enumerate() {
                if i == last {
                    if let Some(joined) = inner.take() {
                        pieces.push(joined);
                        continue;
                    }
                }
                pieces.push(values.get(field)?.clone());
            }
            inner = Some(pieces.join(&rule.delimiter));
        }
        inner
    }
}

/// Observation table plus component columns and the action column.
#[derive(Debug, Clone)]
pub struct AnnotatedTable {
    pub table: ObservationTable,
    pub components: Vec<String>,
    pub action_column: String,
}

/// Split `descriptor_column` per `split` and render `link` for every row.
///
/// Placeholders resolve against the split components first, then the
/// table's own columns. Malformed rows are reported by their `id_column` value.
pub fn annotate(
    table: &ObservationTable,
    id_column: &str,
    descriptor_column: &str,
    split: &SplitSpec,
    link: &Template,
) -> Result<AnnotatedTable> {
    let id_idx = table.column_index(id_column, Stage::Annotate)?;
    let descriptor_idx = table.column_index(descriptor_column, Stage::Annotate)?;
    let components = split.components();
    for name in components.iter().copied().chain(std::iter::once(ACTION_COLUMN)) {
        if table.has_column(name) {
            return Err(PipelineError::schema(
                Stage::Annotate,
                format!("derived column '{}' collides with an existing column", name),
            ));
        }
    }
    let mut known: Vec<&str> = components.clone();
    known.extend(table.headers().iter().map(|h| h.as_str()));
    link.check_fields(&known, Stage::Annotate)?;

    let mut component_values: Vec<Vec<String>> = vec![Vec::with_capacity(table.n_rows()); components.len()];
    let mut actions = Vec::with_capacity(table.n_rows());
    for (row, cells) in table.rows().iter().enumerate() {
        let descriptor = &cells[descriptor_idx];
        let pieces = split.split(descriptor).map_err(|f| PipelineError::MalformedDescriptor {
            row: row + 1,
            id: cells[id_idx].clone(),
            value: descriptor.clone(),
            delimiter: f.delimiter,
            expected: f.expected,
            found: f.found,
        })?;

        let lookup = |name: &str| {
            components
                .iter()
                .position(|c| *c == name)
                .map(|i| pieces[i].as_str())
                .or_else(|| {
                    table
                        .headers()
                        .iter()
                        .position(|h| h == name)
                        .map(|i| cells[i].as_str())
                })
        };
        let action = link.render(lookup).map_err(|field| {
            PipelineError::invalid(
                Stage::Annotate,
                format!("row {}: no value for template field '{}'", row + 1, field),
            )
        })?;
        actions.push(escape_attr(&action));

        for (values, piece) in component_values.iter_mut().zip(&pieces) {
            values.push(piece.clone());
        }
    }

    let mut annotated = table.clone();
    for (name, values) in components.iter().zip(component_values) {
        annotated = annotated.with_column(name, values, Stage::Annotate)?;
    }
    annotated = annotated.with_column(ACTION_COLUMN, actions, Stage::Annotate)?;

    Ok(AnnotatedTable {
        table: annotated,
        components: components.iter().map(|c| c.to_string()).collect(),
        action_column: ACTION_COLUMN.to_string(),
    })
}

/// Recover the original descriptor from an escaped action string.
/// Needs a template that mentions every split component.
pub fn recover_descriptor(split: &SplitSpec, link: &Template, action: &str) -> Option<String> {
    let values = link.extract(&unescape_attr(action))?;
    split.join(&values)
}
