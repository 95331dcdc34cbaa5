//! Domain records for properties, appeals and their extracted detail data
//!
//! These are plain value objects: everything is fully materialized when it
//! leaves the persistence layer, and everything is serializable so aggregates
//! can be dumped to JSON between pipeline stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordered label -> value mapping extracted from a labeled section of a page.
///
/// Keeps document order, rejects duplicate labels (first sighting wins) and
/// never drops an unrecognized label: callers that care about the versioned
/// label set use [`FieldMap::extras`] to split known from unknown entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from (label, value) pairs, keeping the first value for a
    /// repeated label.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let mut map = Self::new();
        for (label, value) in pairs {
            map.insert(label.into(), value.into());
        }
        map
    }

    /// Insert a labeled value. Returns false (and keeps the existing entry)
    /// when the label is already present.
    pub fn insert(&mut self, label: String, value: String) -> bool {
        if self.get(&label).is_some() {
            return false;
        }
        self.entries.push((label, value));
        true
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(l, v)| (l.as_str(), v.as_str()))
    }

    /// Entries whose label is not part of the given recognized set, in
    /// document order.
    pub fn extras<'a>(&'a self, recognized: &[&str]) -> Vec<(&'a str, &'a str)> {
        self.iter()
            .filter(|(label, _)| !recognized.contains(label))
            .collect()
    }
}

/// Versioned sets of recognized section labels as shown by the source system.
///
/// Unknown labels are still extracted and stored; these lists only document
/// which labels the current extraction was written against.
pub mod labels {
    /// Property-information section, v1.
    pub const PROPERTY_INFORMATION_V1: &[&str] = &[
        "Property Roll Number",
        "Location & Property Description",
        "Municipality",
        "Property Classification",
        "NBHD",
    ];

    /// Appellant-information section, v1.
    pub const APPELLANT_INFORMATION_V1: &[&str] = &[
        "Name1",
        "Name2",
        "Name of Representative",
        "Filing Date",
        "Tax Date",
        "Section",
        "Reason for Appeal",
        "Status",
        "Decision Number",
        "Decision Mailing Date",
        "Decision(s)",
    ];
}

/// Property facts extracted from a listing page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyRecord {
    /// Canonical dashed roll number, the property's natural key.
    pub roll_number: String,
    pub address: Option<String>,
    pub municipality: Option<String>,
    pub description: Option<String>,
    /// Free-form assessment facts (classification, neighbourhood, ...).
    pub assessment: FieldMap,
}

/// One appeal row from the listing page's appeals table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppealSummary {
    /// The appeal's natural key.
    pub appeal_number: String,
    pub appellant: Option<String>,
    pub representative: Option<String>,
    pub status: Option<String>,
    pub appeal_type: Option<String>,
    pub tax_year: Option<String>,
    pub hearing_date: Option<String>,
    /// Absolute URL of the appeal's detail page, when the row carried a link.
    pub detail_url: Option<String>,
}

/// A person or firm acting on an appeal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepresentativeRecord {
    pub name: String,
    pub role: String,
}

/// One hearing row from a detail page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HearingRecord {
    pub hearing_date: Option<String>,
    pub location: Option<String>,
    pub status: Option<String>,
}

/// Everything extracted from one appeal detail page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppealDetailRecord {
    pub appeal_number: String,
    pub property_information: FieldMap,
    pub appellant_information: FieldMap,
    pub representatives: Vec<RepresentativeRecord>,
    pub hearings: Vec<HearingRecord>,
}

/// An appeal as aggregated by the pipeline: the listing row plus, when detail
/// fetching is enabled and succeeded, the parsed detail page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppealEntry {
    pub summary: AppealSummary,
    pub detail: Option<AppealDetailRecord>,
    /// Cause of the detail fetch/parse failure, when one was recorded. The
    /// appeal is still persisted without detail.
    pub detail_failure: Option<String>,
}

/// The full tree produced by one pipeline run for one roll number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResult {
    pub roll_number: String,
    pub source_url: String,
    pub property: PropertyRecord,
    pub appeals: Vec<AppealEntry>,
    pub fetched_at: DateTime<Utc>,
}

impl AggregateResult {
    /// Appeals whose detail stage failed (the appeal itself was kept).
    pub fn partial_detail_count(&self) -> usize {
        self.appeals
            .iter()
            .filter(|a| a.detail_failure.is_some())
            .count()
    }
}

/// Fully materialized property row returned by repository queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredProperty {
    pub roll_number: String,
    pub address: Option<String>,
    pub municipality: Option<String>,
    pub description: Option<String>,
    pub assessment: FieldMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fully materialized appeal row returned by repository queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAppeal {
    pub appeal_number: String,
    pub roll_number: String,
    pub appellant: Option<String>,
    pub status: Option<String>,
    pub appeal_type: Option<String>,
    pub filing_date: Option<String>,
    pub tax_date: Option<String>,
    pub reason: Option<String>,
    pub decision_number: Option<String>,
    pub decision_mailing_date: Option<String>,
    pub decisions: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_map_keeps_document_order() {
        let mut map = FieldMap::new();
        map.insert("Municipality".into(), "Toronto".into());
        map.insert("NBHD".into(), "042".into());

        let order: Vec<&str> = map.iter().map(|(l, _)| l).collect();
        assert_eq!(order, vec!["Municipality", "NBHD"]);
    }

    #[test]
    fn field_map_first_value_wins_for_duplicate_label() {
        let mut map = FieldMap::new();
        assert!(map.insert("Status".into(), "Scheduled".into()));
        assert!(!map.insert("Status".into(), "Closed".into()));
        assert_eq!(map.get("Status"), Some("Scheduled"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn field_map_extras_split_off_unrecognized_labels() {
        let map = FieldMap::from_pairs(vec![
            ("Municipality", "Ottawa"),
            ("Zoning Note", "R2"),
        ]);
        let extras = map.extras(labels::PROPERTY_INFORMATION_V1);
        assert_eq!(extras, vec![("Zoning Note", "R2")]);
    }

    #[test]
    fn field_map_round_trips_through_json() {
        let map = FieldMap::from_pairs(vec![("Name", "Jane Doe"), ("Section", "33")]);
        let json = serde_json::to_string(&map).unwrap();
        let back: FieldMap = serde_json::from_str(&json).unwrap();
        assert_eq!(map, back);
    }
}
