//! Analytics error types.

use thiserror::Error;

/// Analytics errors.
#[derive(Error, Debug)]
pub enum AnalyticsError {
    /// DuckDB error
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Compute session could not be opened
    #[error("Connection to '{master}' failed: {source}")]
    Connection {
        /// Master address
        master: String,
        /// Engine error
        #[source]
        source: duckdb::Error,
    },

    /// Input table is not present in the session
    #[error("Table '{0}' does not exist")]
    MissingTable(String),

    /// Column referenced by a plan is not part of its input
    #[error("Table '{table}' has no column '{column}'")]
    SchemaMismatch {
        /// Table the plan reads from
        table: String,
        /// Missing column
        column: String,
    },

    /// Degenerate partition request
    #[error("Invalid partition: {0}")]
    InvalidPartition(String),

    /// Regression could not be fitted
    #[error("Model fit failed: {0}")]
    Fit(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Domain validation error
    #[error(transparent)]
    Domain(#[from] flight_domain::DomainError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure tagged with the pipeline stage that raised it
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        /// Stage name
        stage: &'static str,
        /// Error raised by the stage
        #[source]
        source: Box<AnalyticsError>,
    },
}

impl AnalyticsError {
    /// Innermost error, skipping stage tags.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Attach a stage name to a failing result.
pub trait StageContext<T> {
    /// Wrap the error as [`AnalyticsError::Stage`].
    fn stage(self, stage: &'static str) -> Result<T>;
}

impl<T> StageContext<T> for Result<T> {
    fn stage(self, stage: &'static str) -> Result<T> {
        self.map_err(|source| AnalyticsError::Stage {
            stage,
            source: Box::new(source),
        })
    }
}

/// Result type for analytics operations.
pub type Result<T> = std::result::Result<T, AnalyticsError>;
