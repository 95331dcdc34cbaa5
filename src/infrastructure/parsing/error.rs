//! Error types for HTML extraction
//!
//! A parse error aborts extraction of the offending document only. Misses on
//! optional fields are recovered locally by the parsers (logged, field left
//! empty) and never reach these types.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ParseError {
    #[error("required field '{field}' not found in document")]
    MissingRequiredField {
        field: String,
        context: Option<String>,
    },

    #[error("malformed section '{section}': {reason}")]
    MalformedSection { section: String, reason: String },
}

impl ParseError {
    pub fn missing_required_field(field: &str, context: Option<&str>) -> Self {
        Self::MissingRequiredField {
            field: field.to_string(),
            context: context.map(|s| s.to_string()),
        }
    }

    pub fn malformed_section(section: &str, reason: &str) -> Self {
        Self::MalformedSection {
            section: section.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True when the error names a missing required anchor field.
    pub fn is_missing_required_field(&self) -> bool {
        matches!(self, Self::MissingRequiredField { .. })
    }
}

pub type ParseResult<T> = Result<T, ParseError>;
