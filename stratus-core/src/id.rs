//! Composite resource identifiers
//!
//! Some objects have no single id of their own (a route is its table plus a
//! destination). Their identifier joins the parts with a separator.

use thiserror::Error;

pub const DEFAULT_SEPARATOR: &str = ",";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("unexpected format for ID parts ({parts:?}), the following id parts indexes are blank ({blank:?})")]
    BlankParts { parts: Vec<String>, blank: Vec<usize> },

    #[error("unexpected format for ID ({id}), expected {expected} parts separated by '{separator}'")]
    WrongPartCount {
        id: String,
        expected: usize,
        separator: String,
    },
}

/// Join `parts` into one identifier
pub fn create_resource_id(parts: &[&str], separator: &str) -> Result<String, IdError> {
    let blank: Vec<usize> = parts
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_empty())
        .map(|(i, _)| i)
        .collect();
    if !blank.is_empty() {
        return Err(IdError::BlankParts {
            parts: parts.iter().map(|p| p.to_string()).collect(),
            blank,
        });
    }
    Ok(parts.join(separator))
}

/// Split `id` into exactly `expected` non-empty parts
pub fn parse_resource_id(
    id: &str,
    expected: usize,
    separator: &str,
) -> Result<Vec<String>, IdError> {
    let parts: Vec<&str> = id.split(separator).collect();
    if parts.len() != expected || parts.iter().any(|p| p.is_empty()) {
        return Err(IdError::WrongPartCount {
            id: id.to_string(),
            expected,
            separator: separator.to_string(),
        });
    }
    Ok(parts.into_iter().map(String::from).collect())
}
