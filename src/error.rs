//! Error type shared by the catalog, analyzer, rewrite rules and lineage engine.
//!
//! Every failure aborts the current request. The message text is user-visible and
//! stable, so variants carry the final message rather than structured fields.

use sqlparser::parser::ParserError;

/// Result type for rewrite operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Tag of an [`Error`], independent of its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotFound,
    AmbiguousReference,
    InvalidRelationshipUsage,
    Cycle,
    UnsupportedConstruct,
    MalformedInput,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::AmbiguousReference => "AMBIGUOUS_REFERENCE",
            ErrorCode::InvalidRelationshipUsage => "INVALID_RELATIONSHIP_USAGE",
            ErrorCode::Cycle => "CYCLE",
            ErrorCode::UnsupportedConstruct => "UNSUPPORTED_CONSTRUCT",
            ErrorCode::MalformedInput => "MALFORMED_INPUT",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged error surfaced by every public operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A model, relationship, metric, time grain or column is missing from the catalog.
    #[error("{0}")]
    NotFound(String),

    /// An identifier matched more than one field in the active scope.
    #[error("{0}")]
    AmbiguousReference(String),

    /// A relationship or window column was used where its cardinality or type is not allowed.
    #[error("{0}")]
    InvalidRelationshipUsage(String),

    /// Lineage resolution revisited a field already on the resolution path.
    #[error("{0}")]
    Cycle(String),

    /// The analyzer has no handling for a construct.
    #[error("{0}")]
    UnsupportedConstruct(String),

    /// Structurally invalid input: bad definitions, arity mismatches, unparsable SQL.
    #[error("{0}")]
    MalformedInput(String),
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::AmbiguousReference(_) => ErrorCode::AmbiguousReference,
            Error::InvalidRelationshipUsage(_) => ErrorCode::InvalidRelationshipUsage,
            Error::Cycle(_) => ErrorCode::Cycle,
            Error::UnsupportedConstruct(_) => ErrorCode::UnsupportedConstruct,
            Error::MalformedInput(_) => ErrorCode::MalformedInput,
        }
    }

    /// The human-readable message, without the tag.
    pub fn message(&self) -> &str {
        match self {
            Error::NotFound(m)
            | Error::AmbiguousReference(m)
            | Error::InvalidRelationshipUsage(m)
            | Error::Cycle(m)
            | Error::UnsupportedConstruct(m)
            | Error::MalformedInput(m) => m,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Error::MalformedInput(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::UnsupportedConstruct(message.into())
    }

    pub fn invalid_relationship(message: impl Into<String>) -> Self {
        Error::InvalidRelationshipUsage(message.into())
    }

    pub fn ambiguous(column: &str) -> Self {
        Error::AmbiguousReference(format!("Column '{}' is ambiguous", column))
    }

    pub fn cycle(entity: &str, field: &str) -> Self {
        Error::Cycle(format!("found cycle in {}.{}", entity, field))
    }
}

impl From<ParserError> for Error {
    fn from(err: ParserError) -> Self {
        Error::MalformedInput(format!("SQL parse error: {}", err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::MalformedInput(format!("invalid manifest: {}", err))
    }
}
