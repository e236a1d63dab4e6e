use std::path::PathBuf;

/// Fatal failures of a graph build.
///
/// Data-quality problems (non-finite feature cells, unknown label codes) are
/// never reported here; loaders repair them in place and count them in their
/// stats. An unavailable optional relation is not an error either, see
/// [`crate::ingest::edges::RelationOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing required source `{source_name}` (expected at {path})")]
    MissingRequiredSource { source_name: String, path: PathBuf },

    #[error("schema mismatch in `{source_name}`: expected column `{column}`")]
    SchemaMismatch { source_name: String, column: String },

    #[error("malformed record in `{source_name}` at line {line}: {detail}")]
    MalformedRecord {
        source_name: String,
        line: u64,
        detail: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("graph integrity violated: {0}")]
    Integrity(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("csv error in `{source_name}`: {error}")]
    Csv {
        source_name: String,
        #[source]
        error: csv::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("artifact encoding failed: {0}")]
    Encode(#[from] bincode::Error),
}

impl BuildError {
    pub(crate) fn missing(source_name: &str, path: impl Into<PathBuf>) -> Self {
        Self::MissingRequiredSource {
            source_name: source_name.to_string(),
            path: path.into(),
        }
    }

    pub(crate) fn schema(source_name: &str, column: &str) -> Self {
        Self::SchemaMismatch {
            source_name: source_name.to_string(),
            column: column.to_string(),
        }
    }

    pub(crate) fn csv(source_name: &str, error: csv::Error) -> Self {
        Self::Csv {
            source_name: source_name.to_string(),
            error,
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
