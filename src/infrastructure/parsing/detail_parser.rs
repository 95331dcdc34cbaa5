//! Appeal detail page extractor
//!
//! Parses one appeal's detail page into its two labeled sections
//! (property information, appellant information) plus representative and
//! hearing entries. Operates purely on already-fetched content.
//!
//! Section discovery is structural: a heading naming the section marks its
//! container, and every `label: value` sibling pair inside the container is
//! collected in document order. Pages without section headings fall back to a
//! document-wide scan classified against the recognized label sets.

use anyhow::Result;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::domain::{
    labels, AppealDetailRecord, FieldMap, HearingRecord, RepresentativeRecord,
};

use super::context::DetailParseContext;
use super::error::ParseResult;
use super::helpers;

/// Default role recorded for a representative named without one.
const DEFAULT_REPRESENTATIVE_ROLE: &str = "Representative";

/// Parser for appeal detail pages.
pub struct DetailParser {
    pair_selector: Selector,
    heading_selector: Selector,
    table_selectors: Vec<Selector>,
    row_selector: Selector,
    header_cell_selector: Selector,
    cell_selector: Selector,
}

impl DetailParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pair_selector: Selector::parse("div, td, th, span, dt, label")
                .map_err(|e| anyhow::anyhow!("pair selector: {e}"))?,
            heading_selector: Selector::parse("h1, h2, h3, h4, h5, legend, caption")
                .map_err(|e| anyhow::anyhow!("heading selector: {e}"))?,
            table_selectors: helpers::compile_selectors(&["table.table", "table"])?,
            row_selector: Selector::parse("tr")
                .map_err(|e| anyhow::anyhow!("row selector: {e}"))?,
            header_cell_selector: Selector::parse("th")
                .map_err(|e| anyhow::anyhow!("header selector: {e}"))?,
            cell_selector: Selector::parse("td, th")
                .map_err(|e| anyhow::anyhow!("cell selector: {e}"))?,
        })
    }

    /// Extract the detail record. A section with no extractable fields is an
    /// empty mapping; a malformed representative or hearing row is skipped
    /// with a warning. Nothing short of unreadable input fails the record.
    pub fn parse(&self, html: &str, context: &DetailParseContext) -> ParseResult<AppealDetailRecord> {
        let document = Html::parse_document(html);
        let root = document.root_element();

        let (property_information, appellant_information) = self.extract_sections(root);
        let representatives = self.extract_representatives(root, &appellant_information);
        let hearings = self.extract_hearings(root, &context.appeal_number);

        debug!(
            "detail for appeal {}: {} property field(s), {} appellant field(s), {} representative(s), {} hearing(s)",
            context.appeal_number,
            property_information.len(),
            appellant_information.len(),
            representatives.len(),
            hearings.len()
        );

        Ok(AppealDetailRecord {
            appeal_number: context.appeal_number.clone(),
            property_information,
            appellant_information,
            representatives,
            hearings,
        })
    }

    fn extract_sections(&self, root: ElementRef<'_>) -> (FieldMap, FieldMap) {
        let property_section = self.section_root(root, "property information");
        let appellant_section = self.section_root(root, "appellant information");

        match (property_section, appellant_section) {
            (Some(prop), Some(appl)) => (self.collect_pairs(prop), self.collect_pairs(appl)),
            (Some(prop), None) => {
                let mut appellant = FieldMap::new();
                self.classified_scan(root, &mut FieldMap::new(), &mut appellant);
                (self.collect_pairs(prop), appellant)
            }
            (None, Some(appl)) => {
                let mut property = FieldMap::new();
                self.classified_scan(root, &mut property, &mut FieldMap::new());
                (property, self.collect_pairs(appl))
            }
            (None, None) => {
                let mut property = FieldMap::new();
                let mut appellant = FieldMap::new();
                self.classified_scan(root, &mut property, &mut appellant);
                (property, appellant)
            }
        }
    }

    /// Container of the heading whose text names the wanted section.
    fn section_root<'a>(&self, root: ElementRef<'a>, needle: &str) -> Option<ElementRef<'a>> {
        for heading in root.select(&self.heading_selector) {
            let text = helpers::normalize_label(&helpers::element_text(heading));
            if text.contains(needle) {
                if let Some(parent) = heading.parent().and_then(ElementRef::wrap) {
                    return Some(parent);
                }
            }
        }
        None
    }

    /// All `label: value` sibling pairs under `scope`, in document order.
    fn collect_pairs(&self, scope: ElementRef<'_>) -> FieldMap {
        let mut map = FieldMap::new();
        for el in scope.select(&self.pair_selector) {
            let Some((label, value)) = self.pair_at(el) else {
                continue;
            };
            if !map.insert(label.clone(), value) {
                debug!("label '{}' repeated within section, keeping first value", label);
            }
        }
        map
    }

    /// Document-wide fallback for pages without section headings: recognized
    /// labels go to their section, everything else is preserved with the
    /// appellant information (the bulk of a detail page).
    fn classified_scan(
        &self,
        root: ElementRef<'_>,
        property: &mut FieldMap,
        appellant: &mut FieldMap,
    ) {
        for el in root.select(&self.pair_selector) {
            let Some((label, value)) = self.pair_at(el) else {
                continue;
            };
            if labels::PROPERTY_INFORMATION_V1.contains(&label.as_str()) {
                property.insert(label, value);
            } else {
                appellant.insert(label, value);
            }
        }
    }

    /// Read `el` as the label half of a pair. The value is the next sibling
    /// element's text; a label with no value still yields the field, empty.
    fn pair_at(&self, el: ElementRef<'_>) -> Option<(String, String)> {
        let own = helpers::own_text(el);
        if !own.ends_with(':') {
            return None;
        }
        let label = own.trim_end_matches(':').trim().to_string();
        if label.is_empty() {
            return None;
        }
        let value = helpers::next_element_text(el).unwrap_or_default();
        Some((label, value))
    }

    fn extract_representatives(
        &self,
        root: ElementRef<'_>,
        appellant_information: &FieldMap,
    ) -> Vec<RepresentativeRecord> {
        let mut representatives: Vec<RepresentativeRecord> = Vec::new();

        if let Some(name) = appellant_information.get("Name of Representative") {
            if !name.is_empty() {
                representatives.push(RepresentativeRecord {
                    name: name.to_string(),
                    role: DEFAULT_REPRESENTATIVE_ROLE.to_string(),
                });
            }
        }

        if let Some((table, headers)) = self.find_table(root, &["role"], &["name"]) {
            let name_col = helpers::find_column(&headers, &["name"]);
            let role_col = helpers::find_column(&headers, &["role"]);

            for (index, row) in self.data_rows(table).into_iter().enumerate() {
                let cells: Vec<ElementRef<'_>> = row.select(&self.cell_selector).collect();
                if cells.is_empty() {
                    continue;
                }
                let Some(name) = helpers::cell_text(&cells, name_col) else {
                    warn!("representative row {} has no name, skipping", index);
                    continue;
                };
                let role = helpers::cell_text(&cells, role_col)
                    .unwrap_or_else(|| DEFAULT_REPRESENTATIVE_ROLE.to_string());
                let record = RepresentativeRecord { name, role };
                if !representatives.contains(&record) {
                    representatives.push(record);
                }
            }
        }

        representatives
    }

    fn extract_hearings(&self, root: ElementRef<'_>, appeal_number: &str) -> Vec<HearingRecord> {
        let Some((table, headers)) = self.find_table(root, &["hearing"], &[]) else {
            return Vec::new();
        };

        let date_col = helpers::find_column(&headers, &["date"]);
        let location_col = helpers::find_column(&headers, &["location", "venue"]);
        let status_col = helpers::find_column(&headers, &["status", "outcome"]);

        let mut hearings = Vec::new();
        for (index, row) in self.data_rows(table).into_iter().enumerate() {
            let cells: Vec<ElementRef<'_>> = row.select(&self.cell_selector).collect();
            if cells.is_empty() {
                continue;
            }

            let hearing_date = helpers::cell_text(&cells, date_col);
            let location = helpers::cell_text(&cells, location_col);
            let status = helpers::cell_text(&cells, status_col);

            // Each row is independently fallible: a row identifying neither a
            // date nor a location cannot be keyed and is dropped, not fatal.
            if hearing_date.is_none() && location.is_none() {
                warn!(
                    "hearing row {} for appeal {} is malformed, skipping",
                    index, appeal_number
                );
                continue;
            }

            hearings.push(HearingRecord {
                hearing_date,
                location,
                status,
            });
        }

        hearings
    }

    /// First table whose header names all of `required` and any of `extra`.
    fn find_table<'a>(
        &self,
        root: ElementRef<'a>,
        required: &[&str],
        also_required: &[&str],
    ) -> Option<(ElementRef<'a>, Vec<String>)> {
        for selector in &self.table_selectors {
            for table in root.select(selector) {
                let headers = helpers::header_cells(
                    table,
                    &self.row_selector,
                    &self.header_cell_selector,
                    &self.cell_selector,
                );
                let primary = helpers::find_column(&headers, required).is_some();
                let secondary = also_required.is_empty()
                    || helpers::find_column(&headers, also_required).is_some();
                if primary && secondary {
                    return Some((table, headers));
                }
            }
        }
        None
    }

    fn data_rows<'a>(&self, table: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        let rows: Vec<ElementRef<'a>> = table.select(&self.row_selector).collect();
        let has_th_header = rows
            .iter()
            .any(|row| row.select(&self.header_cell_selector).next().is_some());

        if has_th_header {
            rows.into_iter()
                .filter(|row| row.select(&self.header_cell_selector).next().is_none())
                .collect()
        } else {
            rows.into_iter().skip(1).collect()
        }
    }
}
