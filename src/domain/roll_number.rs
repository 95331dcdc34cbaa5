//! Roll number normalization
//!
//! The source system identifies a property by a 19-digit roll number split
//! into six segments (`12-34-567-890-12345-0000`). Input files and the pages
//! themselves render roll numbers with inconsistent punctuation and,
//! occasionally, a truncated digit count; everything downstream works with
//! the canonical dashed form produced here.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Total digits in a full roll number.
pub const ROLL_NUMBER_DIGITS: usize = 19;

/// Segment widths of the dashed form, in order.
const SEGMENT_WIDTHS: [usize; 6] = [2, 2, 3, 3, 5, 4];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RollNumberError {
    #[error("roll number '{0}' contains no digits")]
    Empty(String),
}

/// A normalized roll number: exactly [`ROLL_NUMBER_DIGITS`] digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RollNumber {
    digits: String,
}

impl RollNumber {
    /// Normalize a free-form roll number string.
    ///
    /// Non-digit characters are stripped. A wrong digit count is tolerated
    /// the way the source system's own entry form tolerates it: too long is
    /// truncated, too short is right-padded with zeros. Both cases are
    /// logged since they usually indicate a malformed input row.
    pub fn parse(raw: &str) -> Result<Self, RollNumberError> {
        let digit_re = Regex::new(r"\D").expect("static regex");
        let mut digits = digit_re.replace_all(raw, "").to_string();

        if digits.is_empty() {
            return Err(RollNumberError::Empty(raw.to_string()));
        }

        if digits.len() != ROLL_NUMBER_DIGITS {
            warn!(
                "roll number '{}' has {} digits, expected {}",
                raw,
                digits.len(),
                ROLL_NUMBER_DIGITS
            );
            if digits.len() > ROLL_NUMBER_DIGITS {
                digits.truncate(ROLL_NUMBER_DIGITS);
            } else {
                while digits.len() < ROLL_NUMBER_DIGITS {
                    digits.push('0');
                }
            }
        }

        Ok(Self { digits })
    }

    /// The 19 raw digits, used in URL templates.
    pub fn digits(&self) -> &str {
        &self.digits
    }

    /// The six dashed segments, used by the canonical form.
    pub fn segments(&self) -> [&str; 6] {
        let mut out = [""; 6];
        let mut start = 0;
        for (i, width) in SEGMENT_WIDTHS.iter().enumerate() {
            out[i] = &self.digits[start..start + width];
            start += width;
        }
        out
    }

    /// Canonical dashed form, the natural key stored for a property.
    pub fn dashed(&self) -> String {
        self.segments().join("-")
    }
}

impl fmt::Display for RollNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dashed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_strips_punctuation() {
        let roll = RollNumber::parse("12-34-567-890-12345-0000").unwrap();
        assert_eq!(roll.digits(), "1234567890123450000");
        assert_eq!(roll.dashed(), "12-34-567-890-12345-0000");
    }

    #[test]
    fn parse_pads_short_input_with_zeros() {
        let roll = RollNumber::parse("1904-123-456-78900").unwrap();
        assert_eq!(roll.digits(), "1904123456789000000");
        assert_eq!(roll.dashed(), "19-04-123-456-78900-0000");
    }

    #[test]
    fn parse_truncates_long_input() {
        let roll = RollNumber::parse("12345678901234567890123").unwrap();
        assert_eq!(roll.digits().len(), ROLL_NUMBER_DIGITS);
    }

    #[test]
    fn parse_rejects_digitless_input() {
        assert!(matches!(
            RollNumber::parse("n/a"),
            Err(RollNumberError::Empty(_))
        ));
    }

    #[test]
    fn segments_have_expected_widths() {
        let roll = RollNumber::parse("1234567890123450000").unwrap();
        assert_eq!(roll.segments(), ["12", "34", "567", "890", "12345", "0000"]);
    }
}
