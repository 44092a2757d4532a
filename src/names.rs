//! Lexical names and reference identifiers
//!
//! Type, attribute and element names handed to the model builder must be
//! NCNames. Stored reference identifiers are either a bare id or
//! `prefix:id`, and list-valued attributes hold several of them separated
//! by whitespace or commas.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

static NCNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Z_a-z\u{C0}-\u{D6}\u{D8}-\u{F6}\u{F8}-\u{2FF}\u{370}-\u{37D}\u{37F}-\u{1FFF}][A-Z_a-z\u{C0}-\u{D6}\u{D8}-\u{F6}\u{F8}-\u{2FF}\u{370}-\u{37D}\u{37F}-\u{1FFF}\-\.0-9\u{B7}]*$",
    )
    .unwrap()
});

/// Check if a string is a valid NCName (non-colonized name)
pub fn is_valid_ncname(name: &str) -> bool {
    NCNAME.is_match(name)
}

/// Check if a string is an NCName optionally preceded by an NCName prefix
pub fn is_valid_qname(name: &str) -> bool {
    match split_qname(name) {
        (Some(prefix), local) => is_valid_ncname(prefix) && is_valid_ncname(local),
        (None, local) => is_valid_ncname(local),
    }
}

/// Reject anything that is not an NCName
pub fn validate_ncname(name: &str) -> Result<()> {
    if is_valid_ncname(name) {
        Ok(())
    } else {
        Err(Error::Name(format!("Invalid NCName: '{}'", name)))
    }
}

/// Split `prefix:local` at the first colon
pub fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

/// Swap the local part of an identifier, keeping its prefix
pub fn with_local_part(identifier: &str, local: &str) -> String {
    match split_qname(identifier) {
        (Some(prefix), _) => format!("{}:{}", prefix, local),
        (None, _) => local.to_string(),
    }
}

/// Tokens of a whitespace or comma separated identifier list
pub fn split_identifier_list(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
}

/// Write identifiers back as a single-space separated list
pub fn join_identifier_list<I, S>(tokens: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut value = String::new();
    for token in tokens {
        if !value.is_empty() {
            value.push(' ');
        }
        value.push_str(token.as_ref());
    }
    value
}
