//! Error types for BPSV parsing

use thiserror::Error;

/// Result type for BPSV operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing a BPSV document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The document contains no lines at all
    #[error("Document is empty")]
    EmptyDocument,

    /// The first non-comment line is not a typed header
    #[error("Missing header line")]
    MissingHeader,

    /// The header line could not be parsed
    #[error("Invalid header format: {reason}")]
    InvalidHeader { reason: String },

    /// A field type specification like `STRING:0` could not be parsed
    #[error("Invalid field type: {spec}")]
    InvalidFieldType { spec: String },

    /// The same field name appears twice in the header
    #[error("Duplicate field name: {field}")]
    DuplicateField { field: String },

    /// A data row has a different number of fields than the header
    #[error("Row {row} has {actual} fields, schema has {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// A field value does not match its declared type
    #[error("Invalid value for field '{field}' of type {field_type}: {value}")]
    InvalidValue {
        field: String,
        field_type: String,
        value: String,
    },

    /// A `## seqn` line could not be parsed
    #[error("Invalid sequence number: {line}")]
    InvalidSequenceNumber { line: String },
}
