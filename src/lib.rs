//! arb-crawler - assessment appeal e-status crawler
//!
//! Fetches a property's appeals listing page for each roll number, follows
//! the discovered appeal detail pages, extracts the hierarchical
//! property/appeal/appellant/hearing records and persists them idempotently
//! into SQLite.

pub mod application;
pub mod domain;
pub mod infrastructure;
