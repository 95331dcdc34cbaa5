//! Infrastructure layer: HTTP fetching, HTML extraction, configuration and
//! SQLite persistence.

pub mod config;
pub mod database_connection;
pub mod fetcher;
pub mod parsing;
pub mod repository;

pub use config::{AppConfig, DatabaseConfig, FetchConfig, PipelineSettings};
pub use database_connection::DatabaseConnection;
pub use fetcher::{FetchError, FetchTransport, Fetcher, RawContent, TransportError};
pub use repository::{AppealRepository, StoreError, StoreReport};
