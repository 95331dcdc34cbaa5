//! Roll number input
//!
//! Reads the one-column roll number CSV and resolves each entry to a listing
//! URL. This is the mechanical edge of the system; the pipeline itself only
//! ever sees `{roll_number, url}` pairs.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::application::pipeline::RollNumberTarget;
use crate::domain::RollNumber;

/// Placeholder replaced by the 19 roll number digits in the URL template.
const ROLL_PLACEHOLDER: &str = "{roll}";

/// Load and normalize roll numbers from a one-column CSV file.
///
/// A header line is tolerated, blank lines are skipped, and duplicates are
/// dropped while preserving first-seen order. Rows that normalize to nothing
/// are logged and skipped rather than failing the load.
pub async fn load_roll_numbers(path: &Path) -> Result<Vec<RollNumber>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading roll number file {}", path.display()))?;

    let mut seen = HashSet::new();
    let mut rolls = Vec::new();

    for (line_number, line) in raw.lines().enumerate() {
        let value = line.split(',').next().unwrap_or("").trim().trim_matches('"');
        if value.is_empty() {
            continue;
        }
        // Header row: no digits at all.
        if line_number == 0 && !value.chars().any(|c| c.is_ascii_digit()) {
            continue;
        }

        match RollNumber::parse(value) {
            Ok(roll) => {
                if seen.insert(roll.digits().to_string()) {
                    rolls.push(roll);
                }
            }
            Err(e) => warn!("line {}: skipping roll number: {}", line_number + 1, e),
        }
    }

    info!("loaded {} roll number(s) from {}", rolls.len(), path.display());
    Ok(rolls)
}

/// Resolve roll numbers against the listing URL template.
///
/// The template's `{roll}` placeholder is replaced with the 19 digits; a
/// template without the placeholder gets the digits appended, which covers
/// the plain `...?RollNo=` query form.
pub fn resolve_targets(url_template: &str, rolls: &[RollNumber]) -> Vec<RollNumberTarget> {
    rolls
        .iter()
        .map(|roll| {
            let url = if url_template.contains(ROLL_PLACEHOLDER) {
                url_template.replace(ROLL_PLACEHOLDER, roll.digits())
            } else {
                format!("{}{}", url_template, roll.digits())
            };
            RollNumberTarget {
                roll_number: roll.dashed(),
                url,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_dedupes_and_normalizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rolls.csv");
        tokio::fs::write(
            &path,
            "roll_number\n19-04-123-456-78900-0000\n1904123456789000000\n\nnot-a-roll\n",
        )
        .await
        .unwrap();

        let rolls = load_roll_numbers(&path).await.unwrap();
        assert_eq!(rolls.len(), 1);
        assert_eq!(rolls[0].dashed(), "19-04-123-456-78900-0000");
    }

    #[test]
    fn template_placeholder_is_substituted() {
        let rolls = vec![RollNumber::parse("1904123456789000000").unwrap()];
        let targets = resolve_targets("https://x.test/a.aspx?RollNo={roll}&go=1", &rolls);
        assert_eq!(
            targets[0].url,
            "https://x.test/a.aspx?RollNo=1904123456789000000&go=1"
        );
        assert_eq!(targets[0].roll_number, "19-04-123-456-78900-0000");
    }

    #[test]
    fn template_without_placeholder_appends_digits() {
        let rolls = vec![RollNumber::parse("1904123456789000000").unwrap()];
        let targets = resolve_targets("https://x.test/a.aspx?RollNo=", &rolls);
        assert!(targets[0].url.ends_with("RollNo=1904123456789000000"));
    }
}
