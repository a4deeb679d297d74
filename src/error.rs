use std::fmt;
use thiserror::Error;

/// Pipeline stage that detected a violated precondition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Cluster,
    Dendrogram,
    Annotate,
    Reshape,
    Render,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Cluster => "cluster",
            Stage::Dendrogram => "dendrogram",
            Stage::Annotate => "annotate",
            Stage::Reshape => "reshape",
            Stage::Render => "render",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("[{stage}] invalid input: {detail}")]
    InvalidInput { stage: Stage, detail: String },
    #[error("[{stage}] insufficient data: {rows} row(s), at least {required} required")]
    InsufficientData {
        stage: Stage,
        rows: usize,
        required: usize,
    },
    #[error(
        "[annotate] malformed descriptor '{value}' at row {row} (id '{id}'): expected {expected} '{delimiter}' delimiter(s), found {found}"
    )]
    MalformedDescriptor {
        row: usize,
        id: String,
        value: String,
        delimiter: String,
        expected: usize,
        found: usize,
    },
    #[error("[{stage}] schema mismatch: {detail}")]
    SchemaMismatch { stage: Stage, detail: String },
    #[error("[render] {0}")]
    Render(String),
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to read delimited table: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to parse configuration: {0}")]
    Config(#[from] ::config::ConfigError),
    #[error("invalid template pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("failed to serialize render payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn invalid(stage: Stage, detail: impl Into<String>) -> Self {
        PipelineError::InvalidInput {
            stage,
            detail: detail.into(),
        }
    }

    pub fn schema(stage: Stage, detail: impl Into<String>) -> Self {
        PipelineError::SchemaMismatch {
            stage,
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
