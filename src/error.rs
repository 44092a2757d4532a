//! Error types for xmlmodel
//!
//! This module defines all error types used throughout the library.
//! Errors fall into a few categories: schema configuration mistakes
//! (raised while types are registered), attribute decoding failures,
//! structural misuse of a document, and document I/O problems.
//!
//! An unresolved or dangling reference is never an error; reference
//! getters return `Ok(None)` or an empty collection instead.

use std::fmt;
use thiserror::Error;

/// Result type alias using xmlmodel Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for xmlmodel operations
#[derive(Error, Debug)]
pub enum Error {
    /// Schema author mistake detected at registration time
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Malformed attribute value for the declared value type
    #[error("decoding error: {0}")]
    Decode(#[from] DecodeError),

    /// Document mutation not permitted by the declared schema
    #[error("structure error: {0}")]
    Structure(#[from] StructureError),

    /// Access through a façade whose node has been removed
    #[error("stale element: {0}")]
    StaleElement(String),

    /// Namespace error
    #[error("namespace error: {0}")]
    Namespace(String),

    /// Name error (invalid XML name)
    #[error("name error: {0}")]
    Name(String),

    /// Limit exceeded error
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// XML parsing or writing error
    #[error("XML error: {0}")]
    Xml(String),
}

impl Error {
    /// Check if this is a schema configuration error
    pub fn is_schema(&self) -> bool {
        matches!(self, Error::Schema(_))
    }

    /// Check if this is an attribute decoding error
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode(_))
    }

    /// Check if this is a structural misuse error
    pub fn is_structure(&self) -> bool {
        matches!(self, Error::Structure(_))
    }
}

/// Schema configuration error with context
#[derive(Debug, Clone)]
pub struct SchemaError {
    /// Error message
    pub message: String,
    /// Name of the type being registered
    pub type_name: Option<String>,
    /// Name of the declaration (attribute, child, reference) at fault
    pub declaration: Option<String>,
}

impl SchemaError {
    /// Create a new schema error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            type_name: None,
            declaration: None,
        }
    }

    /// Set the type being registered
    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// Set the offending declaration
    pub fn with_declaration(mut self, declaration: impl Into<String>) -> Self {
        self.declaration = Some(declaration.into());
        self
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(ref type_name) = self.type_name {
            write!(f, " (type '{}'", type_name)?;
            if let Some(ref decl) = self.declaration {
                write!(f, ", declaration '{}'", decl)?;
            }
            write!(f, ")")?;
        } else if let Some(ref decl) = self.declaration {
            write!(f, " (declaration '{}')", decl)?;
        }

        Ok(())
    }
}

impl std::error::Error for SchemaError {}

/// Attribute value that could not be decoded into its declared type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("attribute '{attribute}' has value '{value}' which is not a valid {expected}")]
pub struct DecodeError {
    /// Attribute name
    pub attribute: String,
    /// Raw attribute value
    pub value: String,
    /// Expected value type
    pub expected: String,
}

impl DecodeError {
    /// Create a new decoding error
    pub fn new(
        attribute: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }
}

/// Structural misuse of a document
#[derive(Debug, Clone)]
pub struct StructureError {
    /// Error message
    pub message: String,
    /// Type the caller attempted to use
    pub attempted: Option<String>,
    /// Types the schema permits at this position
    pub permitted: Vec<String>,
}

impl StructureError {
    /// Create a new structure error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            attempted: None,
            permitted: Vec::new(),
        }
    }

    /// Set the attempted type
    pub fn with_attempted(mut self, attempted: impl Into<String>) -> Self {
        self.attempted = Some(attempted.into());
        self
    }

    /// Set the permitted types
    pub fn with_permitted<I, S>(mut self, permitted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permitted = permitted.into_iter().map(Into::into).collect();
        self
    }
}

impl fmt::Display for StructureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(ref attempted) = self.attempted {
            write!(f, "; attempted '{}'", attempted)?;
        }

        if !self.permitted.is_empty() {
            write!(f, "; permitted: {}", self.permitted.join(", "))?;
        }

        Ok(())
    }
}

impl std::error::Error for StructureError {}
