use crate::cluster::{DistanceMetric, Linkage};
use crate::dendrogram::DendrogramOptions;
use crate::error::{PipelineError, Result, Stage};
use crate::table::LoadOptions;
use ::config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Dendrogram placement as read from configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DendrogramConfig {
    pub enabled: bool,
    pub offset: f64,
    pub padding: f64,
    pub shrink_exponent: f64,
}

impl Default for DendrogramConfig {
    fn default() -> Self {
        let defaults = DendrogramOptions::default();
        Self {
            enabled: true,
            offset: defaults.offset,
            padding: defaults.padding,
            shrink_exponent: defaults.shrink_exponent,
        }
    }
}

/// Pipeline settings. Read from an optional TOML file, then `HEATLINK_*`
/// environment variables; command line flags are applied on top.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Field delimiter of the input table
    pub delimiter: char,
    /// Quote character; unset disables quoting
    pub quote: Option<char>,
    pub id_column: String,
    /// Composite position column, e.g. `chr1:100-200`
    pub descriptor_column: String,
    /// Measurement columns; empty means every numeric column
    pub value_columns: Vec<String>,
    /// Category display order; empty means `value_columns` order
    pub category_order: Vec<String>,
    /// Split rules, `DELIM=field,field`
    pub split: Vec<String>,
    pub link_template: String,
    /// Tooltip template; unset gives `{<id>} {category}: {value}`
    pub tooltip_template: Option<String>,
    pub metric: String,
    pub linkage: String,
    pub dendrogram: DendrogramConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            delimiter: '\t',
            quote: None,
            id_column: "id".to_string(),
            descriptor_column: "locus".to_string(),
            value_columns: Vec::new(),
            category_order: Vec::new(),
            split: vec![":=chrom,rest".to_string(), "-=start,end".to_string()],
            link_template:
                "https://genome.ucsc.edu/cgi-bin/hgTracks?db=hg38&position={chrom}:{start}-{end}"
                    .to_string(),
            tooltip_template: None,
            metric: "euclidean".to_string(),
            linkage: "ward".to_string(),
            dendrogram: DendrogramConfig::default(),
        }
    }
}

fn single_byte(c: char, what: &str) -> Result<u8> {
    if c.is_ascii() {
        Ok(c as u8)
    } else {
        Err(PipelineError::invalid(
            Stage::Load,
            format!("{} must be a single ASCII character, got '{}'", what, c),
        ))
    }
}

impl PipelineConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(
            Environment::with_prefix("HEATLINK")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("value_columns")
                .with_list_parse_key("category_order")
                .with_list_parse_key("split")
                .try_parsing(true),
        );
        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn load_options(&self) -> Result<LoadOptions> {
        Ok(LoadOptions {
            delimiter: single_byte(self.delimiter, "delimiter")?,
            quote: self.quote.map(|q| single_byte(q, "quote")).transpose()?,
            id_column: Some(self.id_column.clone()),
        })
    }

    pub fn metric(&self) -> Result<DistanceMetric> {
        self.metric
            .parse()
            .map_err(|e: String| PipelineError::invalid(Stage::Cluster, e))
    }

    pub fn linkage(&self) -> Result<Linkage> {
        self.linkage
            .parse()
            .map_err(|e: String| PipelineError::invalid(Stage::Cluster, e))
    }

    pub fn dendrogram_options(&self, axis_length: usize) -> DendrogramOptions {
        DendrogramOptions {
            axis_length,
            offset: self.dendrogram.offset,
            padding: self.dendrogram.padding,
            shrink_exponent: self.dendrogram.shrink_exponent,
        }
    }

    pub fn tooltip_template(&self) -> String {
        self.tooltip_template
            .clone()
            .unwrap_or_else(|| format!("{{{}}} {{category}}: {{value}}", self.id_column))
    }
}
