//! Resource limits for document parsing
//!
//! Parsing untrusted process models must not be able to exhaust memory,
//! so the document parser checks every structural dimension against a
//! `Limits` value before it grows the tree.

use crate::error::{Error, Result};

/// Limits applied while a document is parsed into the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum element nesting depth
    pub max_xml_depth: usize,

    /// Maximum XML input size in bytes
    pub max_xml_size: usize,

    /// Maximum number of attributes per element
    pub max_attributes: usize,

    /// Maximum number of namespace declarations per element
    pub max_namespaces: usize,

    /// Maximum number of elements in one document
    pub max_elements: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_xml_depth: 1000,
            max_xml_size: 100 * 1024 * 1024, // 100 MB
            max_attributes: 1000,
            max_namespaces: 1000,
            max_elements: 1_000_000,
        }
    }
}

impl Limits {
    /// Tighter bounds for documents from untrusted sources
    pub fn strict() -> Self {
        Self {
            max_xml_depth: 100,
            max_xml_size: 10 * 1024 * 1024, // 10 MB
            max_attributes: 100,
            max_namespaces: 100,
            max_elements: 100_000,
        }
    }

    /// Loose bounds for large generated process collections
    pub fn permissive() -> Self {
        Self {
            max_xml_depth: 10_000,
            max_xml_size: 1024 * 1024 * 1024, // 1 GB
            max_attributes: 10_000,
            max_namespaces: 10_000,
            max_elements: 50_000_000,
        }
    }

    /// Nesting depth of the element being opened
    pub fn check_xml_depth(&self, depth: usize) -> Result<()> {
        check("element depth", depth, self.max_xml_depth)
    }

    /// Raw input length in bytes
    pub fn check_xml_size(&self, size: usize) -> Result<()> {
        check("input size in bytes", size, self.max_xml_size)
    }

    /// Attributes on one start tag, declarations excluded
    pub fn check_attributes(&self, count: usize) -> Result<()> {
        check("attribute count", count, self.max_attributes)
    }

    /// `xmlns` declarations on one start tag
    pub fn check_namespaces(&self, count: usize) -> Result<()> {
        check("namespace declaration count", count, self.max_namespaces)
    }

    /// Live elements in the document so far
    pub fn check_elements(&self, count: usize) -> Result<()> {
        check("element count", count, self.max_elements)
    }
}

fn check(what: &str, value: usize, max: usize) -> Result<()> {
    if value > max {
        Err(Error::LimitExceeded(format!(
            "{} {} exceeds maximum {}",
            what, value, max
        )))
    } else {
        Ok(())
    }
}
