use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide error type with miette diagnostics.
///
/// Stage-local errors (per-file I/O during scan or indicate) are
/// recoverable and reported on the results channel or logged; database
/// errors are fatal to a pipeline run and cancel it.
#[derive(Error, Debug, Diagnostic)]
pub enum AppError {
    /// The shared cancellation token fired. Propagated unchanged so
    /// callers can tell a shutdown apart from a real failure.
    #[error("operation cancelled")]
    #[diagnostic(code(uniquefile::cancelled))]
    Cancelled,

    #[error("I/O error: {message}")]
    #[diagnostic(code(uniquefile::io_error))]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    /// An indication buffer whose tail is not a whole entry. Never
    /// produced by this crate's writers; surfaces only when parsing
    /// external input.
    #[error("malformed indication buffer at offset {offset}")]
    #[diagnostic(code(uniquefile::malformed_indication))]
    MalformedIndication { offset: usize },

    #[error("cannot compare values of key {key:?}")]
    #[diagnostic(
        code(uniquefile::cannot_compare),
        help("the length comparator only understands the \"length\" key")
    )]
    CannotCompare { key: Vec<u8> },

    #[error("indicator has been closed")]
    #[diagnostic(code(uniquefile::indicator_closed))]
    IndicatorClosed,

    #[error("empty indication in query expression")]
    #[diagnostic(
        code(uniquefile::empty_indication),
        help("a query leaf must carry at least one (key, value) entry")
    )]
    EmptyIndication,

    #[error("unsupported query expression: {0}")]
    #[diagnostic(
        code(uniquefile::unsupported_expression),
        help("query trees must be strictly binary AND/OR over indication leaves")
    )]
    UnsupportedExpression(String),

    #[error("database error: {0}")]
    #[diagnostic(code(uniquefile::database_error))]
    Database(#[from] sqlx::Error),

    #[error("invalid URI {uri:?}: {message}")]
    #[diagnostic(code(uniquefile::invalid_uri))]
    InvalidUri { uri: String, message: String },

    #[error("indication key is not storable as 16-character text: {key:?}")]
    #[diagnostic(code(uniquefile::invalid_key))]
    InvalidKey { key: Vec<u8> },

    #[error("configuration error: {0}")]
    #[diagnostic(code(uniquefile::config_error))]
    Config(String),

    /// Errors from multiple fan-out lanes of a composite run. Each
    /// lane's failure is kept; none shadows another.
    #[error("{} indicator lane(s) failed", errors.len())]
    #[diagnostic(code(uniquefile::aggregate))]
    Aggregate {
        #[related]
        errors: Vec<AppError>,
    },
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn io(message: impl Into<String>, path: Option<PathBuf>) -> Self {
        AppError::Io {
            message: message.into(),
            path,
            source: None,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        AppError::Config(message.into())
    }

    pub fn unsupported_expression(message: impl Into<String>) -> Self {
        AppError::UnsupportedExpression(message.into())
    }

    /// Fold a list of lane errors into a single result. Empty list is
    /// `Ok`; a single error keeps its original kind instead of being
    /// wrapped.
    pub fn aggregate(mut errors: Vec<AppError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(AppError::Aggregate { errors }),
        }
    }

    /// True when this error (or any aggregated lane error) is the
    /// cancellation sentinel.
    pub fn is_cancelled(&self) -> bool {
        match self {
            AppError::Cancelled => true,
            AppError::Aggregate { errors } => errors.iter().any(AppError::is_cancelled),
            _ => false,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}
