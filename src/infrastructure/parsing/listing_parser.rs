//! Listing page extractor
//!
//! Parses a property's appeals listing page into the property facts shown at
//! the top of the page and one summary record per row of the appeals table.
//! Anchored on structure (labeled sibling pairs, header-named table columns)
//! rather than fixed positions, so minor markup drift does not break it.

use std::collections::HashSet;

use anyhow::Result;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::domain::{AppealSummary, FieldMap, PropertyRecord, RollNumber};

use super::context::ParseContext;
use super::error::{ParseError, ParseResult};
use super::helpers;

/// Everything extracted from one listing page.
#[derive(Debug, Clone)]
pub struct ListingPage {
    pub property: PropertyRecord,
    pub appeals: Vec<AppealSummary>,
}

/// Parser for property/appeals listing pages.
pub struct ListingParser {
    label_selectors: Vec<Selector>,
    table_selectors: Vec<Selector>,
    link_selectors: Vec<Selector>,
    row_selector: Selector,
    header_cell_selector: Selector,
    cell_selector: Selector,
}

impl ListingParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            label_selectors: helpers::compile_selectors(&["div", "td", "th", "span", "label"])?,
            table_selectors: helpers::compile_selectors(&["table.table", "table"])?,
            link_selectors: helpers::compile_selectors(&[
                r#"a[href*="ComplaintDetail"]"#,
                "a[href]",
            ])?,
            row_selector: Selector::parse("tr")
                .map_err(|e| anyhow::anyhow!("row selector: {e}"))?,
            header_cell_selector: Selector::parse("th")
                .map_err(|e| anyhow::anyhow!("header selector: {e}"))?,
            cell_selector: Selector::parse("td, th")
                .map_err(|e| anyhow::anyhow!("cell selector: {e}"))?,
        })
    }

    /// Extract the property record and the ordered appeal summaries.
    ///
    /// Only the two anchor fields are hard requirements: a missing roll
    /// number, or an appeal row without an appeal number, fails the document
    /// with [`ParseError::MissingRequiredField`]. Every other miss degrades
    /// to an empty value.
    pub fn parse(&self, html: &str, context: &ParseContext) -> ParseResult<ListingPage> {
        let document = Html::parse_document(html);
        let root = document.root_element();

        let property = self.extract_property(root, context)?;
        let appeals = self.extract_appeals(root, context)?;

        debug!(
            "listing for roll {} yielded {} appeal(s)",
            property.roll_number,
            appeals.len()
        );

        Ok(ListingPage { property, appeals })
    }

    fn extract_property(
        &self,
        root: ElementRef<'_>,
        context: &ParseContext,
    ) -> ParseResult<PropertyRecord> {
        let raw_roll = self
            .labeled(root, "Roll Number")
            .or_else(|| self.labeled(root, "Property Roll Number"))
            .ok_or_else(|| {
                ParseError::missing_required_field("roll_number", context.roll_number.as_deref())
            })?;

        let roll_number = RollNumber::parse(&raw_roll)
            .map_err(|_| {
                ParseError::missing_required_field("roll_number", Some(raw_roll.as_str()))
            })?
            .dashed();

        let mut assessment = FieldMap::new();
        for label in ["Property Classification", "NBHD"] {
            if let Some(value) = self.labeled(root, label) {
                assessment.insert(label.to_string(), value);
            }
        }

        Ok(PropertyRecord {
            roll_number,
            address: self.labeled(root, "Property Address"),
            municipality: self.labeled(root, "Municipality"),
            description: self.labeled(root, "Location & Property Description"),
            assessment,
        })
    }

    fn extract_appeals(
        &self,
        root: ElementRef<'_>,
        context: &ParseContext,
    ) -> ParseResult<Vec<AppealSummary>> {
        let Some((table, headers)) = self.find_appeals_table(root) else {
            debug!("no appeals table found, property has no appeals");
            return Ok(Vec::new());
        };

        let appeal_col = helpers::find_column(&headers, &["appeal"]);
        let appellant_col = helpers::find_column(&headers, &["appellant"]);
        let representative_col = helpers::find_column(&headers, &["representative", "agent"]);
        let status_col = helpers::find_column(&headers, &["status"]);
        let type_col = helpers::find_column(&headers, &["section", "type"]);
        let tax_col = helpers::find_column(&headers, &["tax"]);
        let hearing_col = helpers::find_column(&headers, &["hearing"]);

        let mut appeals = Vec::new();
        let mut seen = HashSet::new();

        for (index, row) in self.data_rows(table).into_iter().enumerate() {
            let cells: Vec<ElementRef<'_>> = row.select(&self.cell_selector).collect();
            if cells.is_empty() {
                continue;
            }

            let appeal_number = self
                .appeal_number_from_row(row, &cells, appeal_col)
                .ok_or_else(|| {
                    ParseError::missing_required_field(
                        "appeal_number",
                        Some(&format!("appeals table row {index}")),
                    )
                })?;

            if !seen.insert(appeal_number.clone()) {
                warn!("duplicate appeal number '{}' in listing, skipping row", appeal_number);
                continue;
            }

            appeals.push(AppealSummary {
                appeal_number,
                appellant: helpers::cell_text(&cells, appellant_col),
                representative: helpers::cell_text(&cells, representative_col),
                status: helpers::cell_text(&cells, status_col),
                appeal_type: helpers::cell_text(&cells, type_col),
                tax_year: helpers::cell_text(&cells, tax_col),
                hearing_date: helpers::cell_text(&cells, hearing_col),
                detail_url: self.detail_url_from_row(row, &context.base_url),
            });
        }

        Ok(appeals)
    }

    /// First table whose header row names an appeal column.
    fn find_appeals_table<'a>(
        &self,
        root: ElementRef<'a>,
    ) -> Option<(ElementRef<'a>, Vec<String>)> {
        for selector in &self.table_selectors {
            for table in root.select(selector) {
                let headers = helpers::header_cells(
                    table,
                    &self.row_selector,
                    &self.header_cell_selector,
                    &self.cell_selector,
                );
                if helpers::find_column(&headers, &["appeal"]).is_some() {
                    return Some((table, headers));
                }
            }
        }
        None
    }

    /// Rows below the header: every non-`th` row when the table has a proper
    /// header row, everything after the first row otherwise.
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

    /// Appeal number from the link text in the appeal column, falling back to
    /// the cell's plain text.
    fn appeal_number_from_row(
        &self,
        row: ElementRef<'_>,
        cells: &[ElementRef<'_>],
        appeal_col: Option<usize>,
    ) -> Option<String> {
        if let Some(col) = appeal_col {
            if let Some(cell) = cells.get(col) {
                for selector in &self.link_selectors {
                    if let Some(link) = cell.select(selector).next() {
                        let text = helpers::element_text(link);
                        if !text.is_empty() {
                            return Some(text);
                        }
                    }
                }
                let text = helpers::element_text(*cell);
                if !text.is_empty() {
                    return Some(text);
                }
            }
            return None;
        }

        // No appeal column in the header: best effort via the row's detail
        // link text.
        for selector in &self.link_selectors {
            if let Some(link) = row.select(selector).next() {
                let text = helpers::element_text(link);
                if !text.is_empty() {
                    return Some(text);
                }
            }
        }
        None
    }

    fn detail_url_from_row(&self, row: ElementRef<'_>, base_url: &str) -> Option<String> {
        for selector in &self.link_selectors {
            if let Some(link) = row.select(selector).next() {
                if let Some(href) = link.value().attr("href") {
                    return resolve_href(href, base_url);
                }
            }
        }
        None
    }

    fn labeled(&self, root: ElementRef<'_>, label: &str) -> Option<String> {
        helpers::labeled_value(root, &self.label_selectors, label)
    }
}

fn resolve_href(href: &str, base_url: &str) -> Option<String> {
    match Url::parse(base_url).and_then(|base| base.join(href)) {
        Ok(resolved) => Some(resolved.to_string()),
        Err(e) => {
            warn!("cannot resolve detail link '{}' against '{}': {}", href, base_url, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING_FIXTURE: &str = r#"
        <html><head><title>E-Services - Appeals</title></head><body>
        <div class="row">
          <div class="col-md-3">Roll Number:</div>
          <div class="col-md-3">1904-123-456-78900</div>
        </div>
        <div class="row">
          <div class="col-md-3">Location &amp; Property Description:</div>
          <div class="col-md-3">123 MAIN ST PLAN 456 LOT 7</div>
        </div>
        <div class="row">
          <div class="col-md-3">Municipality:</div>
          <div class="col-md-3">City of Toronto</div>
        </div>
        <div class="row">
          <div class="col-md-3">Property Classification:</div>
          <div class="col-md-3">Residential</div>
        </div>
        <table class="table">
          <tr>
            <th>AppealNo</th><th>Appellant</th><th>Representative</th>
            <th>Section</th><th>Tax Year</th><th>Hearing Date</th><th>Status</th>
          </tr>
          <tr>
            <td><a href="ComplaintDetail.aspx?id=101">ARB-2021-0001</a></td>
            <td>JANE DOE</td><td>ACME TAX AGENTS</td>
            <td>33</td><td>2021</td><td>2021-10-05</td><td>Scheduled</td>
          </tr>
          <tr>
            <td><a href="ComplaintDetail.aspx?id=102">ARB-2021-0002</a></td>
            <td>JOHN ROE</td><td></td>
            <td>40</td><td>2021</td><td></td><td>Closed</td>
          </tr>
          <tr>
            <td><a href="ComplaintDetail.aspx?id=103">ARB-2022-0117</a></td>
            <td>JANE DOE</td><td>ACME TAX AGENTS</td>
            <td>33</td><td>2022</td><td></td><td>Open</td>
          </tr>
        </table>
        </body></html>
    "#;

    fn context() -> ParseContext {
        ParseContext::new("https://arb.example.test/eservice/Complaints.aspx")
    }

    #[test]
    fn parses_property_and_appeals_in_document_order() {
        let parser = ListingParser::new().unwrap();
        let page = parser.parse(LISTING_FIXTURE, &context()).unwrap();

        assert_eq!(page.property.roll_number, "19-04-123-456-78900-0000");
        assert_eq!(
            page.property.description.as_deref(),
            Some("123 MAIN ST PLAN 456 LOT 7")
        );
        assert_eq!(page.property.municipality.as_deref(), Some("City of Toronto"));
        assert_eq!(
            page.property.assessment.get("Property Classification"),
            Some("Residential")
        );

        let numbers: Vec<&str> = page
            .appeals
            .iter()
            .map(|a| a.appeal_number.as_str())
            .collect();
        assert_eq!(numbers, vec!["ARB-2021-0001", "ARB-2021-0002", "ARB-2022-0117"]);

        let first = &page.appeals[0];
        assert_eq!(first.appellant.as_deref(), Some("JANE DOE"));
        assert_eq!(first.status.as_deref(), Some("Scheduled"));
        assert_eq!(
            first.detail_url.as_deref(),
            Some("https://arb.example.test/eservice/ComplaintDetail.aspx?id=101")
        );

        // Empty optional cells degrade to None, not failures.
        assert_eq!(page.appeals[1].representative, None);
        assert_eq!(page.appeals[1].hearing_date, None);
    }

    #[test]
    fn missing_roll_number_is_a_required_field_error() {
        let html = r#"<html><body><table class="table">
            <tr><th>AppealNo</th></tr>
            <tr><td>ARB-2021-0001</td></tr>
        </table></body></html>"#;

        let parser = ListingParser::new().unwrap();
        let err = parser.parse(html, &context()).unwrap_err();
        assert!(err.is_missing_required_field());
    }

    #[test]
    fn appeal_row_without_number_is_a_required_field_error() {
        let html = r#"<html><body>
            <div>Roll Number:</div><div>1904-123-456-78900</div>
            <table class="table">
              <tr><th>AppealNo</th><th>Status</th></tr>
              <tr><td></td><td>Open</td></tr>
            </table>
        </body></html>"#;

        let parser = ListingParser::new().unwrap();
        let err = parser.parse(html, &context()).unwrap_err();
        assert!(err.is_missing_required_field());
    }

    #[test]
    fn listing_without_appeals_table_yields_empty_list() {
        let html = r#"<html><body>
            <div>Roll Number:</div><div>1904-123-456-78900</div>
        </body></html>"#;

        let parser = ListingParser::new().unwrap();
        let page = parser.parse(html, &context()).unwrap();
        assert!(page.appeals.is_empty());
    }

    #[test]
    fn duplicate_appeal_rows_are_collapsed() {
        let html = r#"<html><body>
            <div>Roll Number:</div><div>1904-123-456-78900</div>
            <table class="table">
              <tr><th>AppealNo</th></tr>
              <tr><td>ARB-2021-0001</td></tr>
              <tr><td>ARB-2021-0001</td></tr>
            </table>
        </body></html>"#;

        let parser = ListingParser::new().unwrap();
        let page = parser.parse(html, &context()).unwrap();
        assert_eq!(page.appeals.len(), 1);
    }
}
