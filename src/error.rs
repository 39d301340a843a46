use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while normalizing metadata, compiling constraints or
/// reading plugin indexes.
///
/// None of these are fatal to a query: the registry absorbs them into a
/// smaller result set and logs a diagnostic.
#[derive(Debug, Error)]
pub enum FinderError {
    /// Required identity fields are missing from a metadata blob.
    #[error("Malformed plugin metadata: {0}")]
    MalformedMetadata(String),

    /// The constraint text could not be parsed.
    #[error("Constraint syntax error at position {position}: {message}")]
    ConstraintSyntax {
        /// Byte offset of the offending token.
        position: usize,
        message: String,
    },

    /// A plugin index file exists but could not be decoded.
    #[error("Failed to parse plugin index at {path}: {message}")]
    IndexParse { path: PathBuf, message: String },

    /// A comparison was attempted between incompatible value types.
    #[error("Type mismatch: cannot compare {left} with {right}")]
    TypeMismatch {
        left: &'static str,
        right: &'static str,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type FinderResult<T> = Result<T, FinderError>;
