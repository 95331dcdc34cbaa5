//! Parsing contexts carried alongside the raw HTML
//!
//! The extractors themselves never touch the network; a context tells them
//! where the document came from so relative links can be resolved and log
//! lines can name their source.

/// Context for parsing a property's appeals listing page.
#[derive(Debug, Clone)]
pub struct ParseContext {
    /// URL the listing was fetched from; base for resolving detail links.
    pub base_url: String,

    /// Roll number the caller asked for, used only for log provenance.
    pub roll_number: Option<String>,
}

impl ParseContext {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            roll_number: None,
        }
    }

    pub fn with_roll_number(mut self, roll_number: impl Into<String>) -> Self {
        self.roll_number = Some(roll_number.into());
        self
    }
}

/// Context for parsing a single appeal's detail page.
#[derive(Debug, Clone)]
pub struct DetailParseContext {
    /// Appeal number the detail page was discovered under.
    pub appeal_number: String,

    /// URL the detail page was fetched from.
    pub url: String,
}

impl DetailParseContext {
    pub fn new(appeal_number: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            appeal_number: appeal_number.into(),
            url: url.into(),
        }
    }
}
