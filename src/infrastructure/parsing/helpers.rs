//! Shared DOM utilities for the extractors
//!
//! The source system renders most facts as label/value pairs in sibling
//! elements (`<div>Municipality:</div><div>Toronto</div>`) and the rest as
//! header-driven tables. These helpers implement both shapes structurally so
//! the extractors stay free of positional indices.

use anyhow::Result;
use scraper::{ElementRef, Selector};
use tracing::{debug, warn};

/// Compile a list of selector strings, tolerating individually broken ones.
/// Fails only when nothing compiled at all.
pub(crate) fn compile_selectors(selector_strings: &[&str]) -> Result<Vec<Selector>> {
    let mut selectors = Vec::new();
    let mut errors = Vec::new();

    for selector_str in selector_strings {
        match Selector::parse(selector_str) {
            Ok(selector) => selectors.push(selector),
            Err(e) => {
                warn!("failed to compile selector '{}': {}", selector_str, e);
                errors.push(format!("'{}': {}", selector_str, e));
            }
        }
    }

    if selectors.is_empty() {
        return Err(anyhow::anyhow!(
            "no valid selectors compiled: {}",
            errors.join(", ")
        ));
    }

    Ok(selectors)
}

/// Whitespace-collapsed text content of an element and its descendants.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    collapse_ws(&el.text().collect::<String>())
}

/// Text of the element's direct text children only, so a container holding
/// both a label and its value does not read as the label.
pub(crate) fn own_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
    collapse_ws(&out)
}

/// Text of the next sibling element carrying any text.
pub(crate) fn next_element_text(el: ElementRef<'_>) -> Option<String> {
    let mut node = el.next_sibling();
    while let Some(n) = node {
        if let Some(sibling) = ElementRef::wrap(n) {
            let text = element_text(sibling);
            if !text.is_empty() {
                return Some(text);
            }
        }
        node = n.next_sibling();
    }
    None
}

/// Find the value paired with a label anywhere under `root`.
///
/// A label matches on normalized text (case- and colon-insensitive). When the
/// document carries the label more than once the first occurrence wins and
/// the ambiguity is logged rather than treated as a failure.
pub(crate) fn labeled_value(
    root: ElementRef<'_>,
    selectors: &[Selector],
    label: &str,
) -> Option<String> {
    let needle = normalize_label(label);
    let mut found: Vec<String> = Vec::new();

    for selector in selectors {
        for el in root.select(selector) {
            if normalize_label(&own_text(el)) == needle {
                if let Some(value) = next_element_text(el) {
                    found.push(value);
                }
            }
        }
        if !found.is_empty() {
            break;
        }
    }

    if found.len() > 1 {
        debug!(
            "label '{}' matched {} nodes, taking the first",
            label,
            found.len()
        );
    }
    found.into_iter().next()
}

/// Lowercased label text with the trailing colon and surrounding whitespace
/// removed.
pub(crate) fn normalize_label(s: &str) -> String {
    collapse_ws(s)
        .trim_end_matches(':')
        .trim()
        .to_ascii_lowercase()
}

pub(crate) fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized header cell texts of a table's header row (the first row
/// containing `th` cells, else the first row).
pub(crate) fn header_cells(
    table: ElementRef<'_>,
    row_selector: &Selector,
    header_cell_selector: &Selector,
    cell_selector: &Selector,
) -> Vec<String> {
    for row in table.select(row_selector) {
        let ths: Vec<String> = row
            .select(header_cell_selector)
            .map(element_text)
            .collect();
        if !ths.is_empty() {
            return ths.into_iter().map(|t| normalize_label(&t)).collect();
        }
    }

    table
        .select(row_selector)
        .next()
        .map(|row| {
            row.select(cell_selector)
                .map(|c| normalize_label(&element_text(c)))
                .collect()
        })
        .unwrap_or_default()
}

/// Index of the first header whose text contains any of the keywords.
pub(crate) fn find_column(headers: &[String], keywords: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| keywords.iter().any(|k| h.contains(k)))
}

/// Text of the cell at `index`, empty cells treated as absent.
pub(crate) fn cell_text(cells: &[ElementRef<'_>], index: Option<usize>) -> Option<String> {
    let index = index?;
    let text = element_text(*cells.get(index)?);
    if text.is_empty() { None } else { Some(text) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn labeled_value_reads_sibling_column() {
        let html = Html::parse_document(
            r#"<div class="row">
                 <div class="col-md-3">Roll Number:</div>
                 <div class="col-md-3">19-04-123-456-78900-0000</div>
               </div>"#,
        );
        let selectors = compile_selectors(&["div"]).unwrap();
        let value = labeled_value(html.root_element(), &selectors, "Roll Number");
        assert_eq!(value.as_deref(), Some("19-04-123-456-78900-0000"));
    }

    #[test]
    fn labeled_value_skips_container_holding_both() {
        // The outer div's full text starts with the label but its own text
        // nodes are empty, so it must not shadow the inner label div.
        let html = Html::parse_document(
            r#"<div><div>Municipality:</div><div>Ottawa</div></div>"#,
        );
        let selectors = compile_selectors(&["div"]).unwrap();
        let value = labeled_value(html.root_element(), &selectors, "Municipality:");
        assert_eq!(value.as_deref(), Some("Ottawa"));
    }

    #[test]
    fn labeled_value_missing_label_is_none() {
        let html = Html::parse_document("<div>Status:</div><div>Open</div>");
        let selectors = compile_selectors(&["div"]).unwrap();
        assert!(labeled_value(html.root_element(), &selectors, "Municipality").is_none());
    }

    #[test]
    fn header_cells_prefer_th_row() {
        let html = Html::parse_document(
            r#"<table>
                 <tr><th>AppealNo</th><th>Status</th></tr>
                 <tr><td>ARB-1</td><td>Open</td></tr>
               </table>"#,
        );
        let table_sel = Selector::parse("table").unwrap();
        let row_sel = Selector::parse("tr").unwrap();
        let th_sel = Selector::parse("th").unwrap();
        let td_sel = Selector::parse("td, th").unwrap();
        let table = html.select(&table_sel).next().unwrap();
        let headers = header_cells(table, &row_sel, &th_sel, &td_sel);
        assert_eq!(headers, vec!["appealno", "status"]);
        assert_eq!(find_column(&headers, &["appeal"]), Some(0));
    }

    #[test]
    fn compile_selectors_tolerates_broken_entries() {
        let selectors = compile_selectors(&[":::nonsense", "div"]).unwrap();
        assert_eq!(selectors.len(), 1);
    }
}
