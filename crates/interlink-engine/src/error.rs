use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// An instruction lacks an operand its command requires, or its measure
    /// expression does not name exactly two property paths.
    #[error("invalid {command} instruction at position {position}: {message}")]
    InvalidInstruction {
        command: &'static str,
        position: usize,
        message: String,
    },

    /// A composite plan whose sub-plans cannot be combined.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// The filtering instruction of a composite plan lacks an operand.
    #[error("invalid composite filter: {0}")]
    InvalidFilter(String),

    /// Failure inside an atomic mapper (e.g. the remote data source). Fatal
    /// for the plan being executed.
    #[error("data access failed while running `{measure}`: {source}")]
    DataAccess {
        measure: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Spec(#[from] interlink_dsl::SpecParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
