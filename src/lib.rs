//! Turn a wide observation matrix into the data behind a clickable,
//! clustered heatmap: hierarchical row order, dendrogram segments,
//! per-row links and a long cell table.

pub mod annotate;
pub mod cluster;
pub mod config;
pub mod dendrogram;
pub mod error;
pub mod logger;
pub mod pipeline;
pub mod render;
pub mod reshape;
pub mod table;
pub mod template;

pub use annotate::{annotate, recover_descriptor, AnnotatedTable, SplitRule, SplitSpec, ACTION_COLUMN};
pub use cluster::{cluster, ClusteringResult, DistanceMatrix, DistanceMetric, Linkage, Merge, Node};
pub use crate::config::PipelineConfig;
pub use dendrogram::{map_dendrogram, DendrogramOptions, Segment, SegmentSet};
pub use error::{PipelineError, Stage};
pub use logger::{format_time_used, Logger};
pub use pipeline::{run, PipelineOutput};
pub use render::{HeatmapPlot, ImageFormat, JsonPayload, Renderer};
pub use reshape::{to_long, CategoryOrder, CellRecord, LongTable, Value};
pub use table::{load_table, read_table, write_table, LoadOptions, ObservationTable};
pub use template::{escape_attr, unescape_attr, Template};

/// Crate version, recorded in run logs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
