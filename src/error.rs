//! Error types for parsing, serialization, and schema ingestion.
//!
//! Only failures that prevent an operation from producing a result live
//! here. Recoverable problems (bad lines, invalid payloads, cardinality
//! violations) are reported through [`crate::Diagnostics`] and processing
//! continues.

use thiserror::Error;

/// Fatal error while parsing GEDC text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The input contained no parseable line at all.
    #[error("input contains no GEDC lines")]
    EmptyInput,
}

/// Fatal error while serializing a forest to GEDC text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    /// The dialect's line length cannot carry a CONC continuation line.
    #[error("line length {len} is too small to wrap a level-{level} line with CONC")]
    LineLengthTooSmall { len: usize, level: usize },
}

/// Fatal error while ingesting schema JSON.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The schema JSON did not match the expected registry layout.
    #[error("schema JSON does not match the registry layout: {0}")]
    Layout(String),

    /// A cardinality string was not of the form `{m:n}`.
    #[error("invalid cardinality {text:?}")]
    InvalidCardinality { text: String },
}

/// Fatal error while reading a JSON-encoded forest or dataset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JsonError {
    /// A node or member had the wrong JSON type.
    #[error("expected {expected} at {path}")]
    UnexpectedShape {
        expected: &'static str,
        path: String,
    },

    /// A required member was absent.
    #[error("missing member {member:?} at {path}")]
    MissingMember { member: &'static str, path: String },
}
