//! Persistence layer for appeal aggregates
//!
//! Maps one roll number's aggregate onto the normalized schema with upsert
//! semantics keyed by natural identifiers: properties by roll number, appeals
//! by appeal number, representatives by (name, role), hearings by their
//! (appeal, date, location) signature. All writes for an aggregate happen in
//! one transaction; a failed write rolls the whole aggregate back.
//!
//! Query methods return plain, fully materialized records. No live handle
//! ever escapes a transaction scope.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{
    AggregateResult, AppealEntry, FieldMap, HearingRecord, PropertyRecord, RepresentativeRecord,
    StoredAppeal, StoredProperty,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("constraint violation: {message}")]
    ConstraintViolation { message: String },

    #[error("database connection lost: {message}")]
    ConnectionLost { message: String },

    #[error("database error: {message}")]
    Query { message: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => match db.kind() {
                sqlx::error::ErrorKind::UniqueViolation
                | sqlx::error::ErrorKind::ForeignKeyViolation
                | sqlx::error::ErrorKind::NotNullViolation
                | sqlx::error::ErrorKind::CheckViolation => Self::ConstraintViolation {
                    message: db.message().to_string(),
                },
                _ => Self::Query {
                    message: err.to_string(),
                },
            },
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Self::ConnectionLost {
                    message: err.to_string(),
                }
            }
            _ => Self::Query {
                message: err.to_string(),
            },
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db)
            if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
    )
}

/// A detail-stage failure carried through to the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailFailure {
    pub appeal_number: String,
    pub cause: String,
}

/// Created/updated counts for one stored aggregate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreReport {
    pub roll_number: String,
    pub properties_created: u32,
    pub properties_updated: u32,
    pub appeals_created: u32,
    pub appeals_updated: u32,
    pub details_created: u32,
    pub details_updated: u32,
    pub representatives_created: u32,
    pub representative_links_created: u32,
    pub hearings_created: u32,
    pub hearings_updated: u32,
    pub detail_failures: Vec<DetailFailure>,
}

/// Row counts across the schema, for summaries and tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableCounts {
    pub properties: i64,
    pub appeals: i64,
    pub appeal_details: i64,
    pub representatives: i64,
    pub representative_links: i64,
    pub hearings: i64,
}

/// Repository over the appeals schema.
#[derive(Clone)]
pub struct AppealRepository {
    pool: Arc<SqlitePool>,
}

impl AppealRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Persist one roll number's aggregate atomically.
    pub async fn store_aggregate(
        &self,
        aggregate: &AggregateResult,
    ) -> Result<StoreReport, StoreError> {
        let mut report = StoreReport {
            roll_number: aggregate.roll_number.clone(),
            ..StoreReport::default()
        };

        let mut tx = self.pool.begin().await?;

        upsert_property(&mut tx, &aggregate.property, &mut report).await?;

        for entry in &aggregate.appeals {
            upsert_appeal(&mut tx, &aggregate.property.roll_number, entry, &mut report).await?;

            if let Some(detail) = &entry.detail {
                upsert_detail(
                    &mut tx,
                    &entry.summary.appeal_number,
                    &detail.property_information,
                    &detail.appellant_information,
                    &mut report,
                )
                .await?;

                for representative in &detail.representatives {
                    link_representative(
                        &mut tx,
                        &entry.summary.appeal_number,
                        representative,
                        &mut report,
                    )
                    .await?;
                }

                for hearing in &detail.hearings {
                    upsert_hearing(&mut tx, &entry.summary.appeal_number, hearing, &mut report)
                        .await?;
                }
            }

            if let Some(cause) = &entry.detail_failure {
                report.detail_failures.push(DetailFailure {
                    appeal_number: entry.summary.appeal_number.clone(),
                    cause: cause.clone(),
                });
            }
        }

        tx.commit().await?;

        info!(
            "stored aggregate for roll {}: {} appeal(s), {} detail failure(s)",
            report.roll_number,
            aggregate.appeals.len(),
            report.detail_failures.len()
        );

        Ok(report)
    }

    /// Materialized property row by roll number.
    pub async fn get_property(
        &self,
        roll_number: &str,
    ) -> Result<Option<StoredProperty>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT roll_number, address, municipality, description, assessment,
                   created_at, updated_at
            FROM properties WHERE roll_number = ?
            "#,
        )
        .bind(roll_number)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|row| StoredProperty {
            roll_number: row.get("roll_number"),
            address: row.get("address"),
            municipality: row.get("municipality"),
            description: row.get("description"),
            assessment: decode_field_map(row.get("assessment")),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    /// Materialized appeal rows for a property, in appeal-number order.
    pub async fn get_appeals_for_property(
        &self,
        roll_number: &str,
    ) -> Result<Vec<StoredAppeal>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT appeal_number, roll_number, appellant, status, appeal_type,
                   filing_date, tax_date, reason, decision_number,
                   decision_mailing_date, decisions, created_at, updated_at
            FROM appeals WHERE roll_number = ? ORDER BY appeal_number
            "#,
        )
        .bind(roll_number)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| StoredAppeal {
                appeal_number: row.get("appeal_number"),
                roll_number: row.get("roll_number"),
                appellant: row.get("appellant"),
                status: row.get("status"),
                appeal_type: row.get("appeal_type"),
                filing_date: row.get("filing_date"),
                tax_date: row.get("tax_date"),
                reason: row.get("reason"),
                decision_number: row.get("decision_number"),
                decision_mailing_date: row.get("decision_mailing_date"),
                decisions: row.get("decisions"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    /// Stored sections for an appeal, when a detail was ever persisted.
    pub async fn get_detail_sections(
        &self,
        appeal_number: &str,
    ) -> Result<Option<(FieldMap, FieldMap)>, StoreError> {
        let row = sqlx::query(
            "SELECT property_information, appellant_information FROM appeal_details WHERE appeal_number = ?",
        )
        .bind(appeal_number)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|row| {
            (
                decode_field_map(row.get("property_information")),
                decode_field_map(row.get("appellant_information")),
            )
        }))
    }

    pub async fn counts(&self) -> Result<TableCounts, StoreError> {
        let count = |sql: &'static str| async move {
            let row = sqlx::query(sql).fetch_one(&*self.pool).await?;
            Ok::<i64, sqlx::Error>(row.get::<i64, _>(0))
        };

        Ok(TableCounts {
            properties: count("SELECT COUNT(*) FROM properties").await?,
            appeals: count("SELECT COUNT(*) FROM appeals").await?,
            appeal_details: count("SELECT COUNT(*) FROM appeal_details").await?,
            representatives: count("SELECT COUNT(*) FROM representatives").await?,
            representative_links: count("SELECT COUNT(*) FROM appeal_representatives").await?,
            hearings: count("SELECT COUNT(*) FROM hearings").await?,
        })
    }
}

async fn upsert_property(
    tx: &mut Transaction<'_, Sqlite>,
    property: &PropertyRecord,
    report: &mut StoreReport,
) -> Result<(), StoreError> {
    let now = Utc::now();
    let assessment = encode_field_map(&property.assessment)?;

    let existing = sqlx::query("SELECT roll_number FROM properties WHERE roll_number = ?")
        .bind(&property.roll_number)
        .fetch_optional(&mut **tx)
        .await?;

    if existing.is_some() {
        sqlx::query(
            r#"
            UPDATE properties SET
                address = ?, municipality = ?, description = ?, assessment = ?,
                updated_at = ?
            WHERE roll_number = ?
            "#,
        )
        .bind(&property.address)
        .bind(&property.municipality)
        .bind(&property.description)
        .bind(&assessment)
        .bind(now)
        .bind(&property.roll_number)
        .execute(&mut **tx)
        .await?;
        report.properties_updated += 1;
    } else {
        sqlx::query(
            r#"
            INSERT INTO properties
                (roll_number, address, municipality, description, assessment,
                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&property.roll_number)
        .bind(&property.address)
        .bind(&property.municipality)
        .bind(&property.description)
        .bind(&assessment)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await?;
        report.properties_created += 1;
    }

    Ok(())
}

async fn upsert_appeal(
    tx: &mut Transaction<'_, Sqlite>,
    roll_number: &str,
    entry: &AppealEntry,
    report: &mut StoreReport,
) -> Result<(), StoreError> {
    let now = Utc::now();
    let summary = &entry.summary;

    // Filing/decision facts only appear on the detail page; they update with
    // COALESCE so a later listing-only run does not blank them out.
    let appellant_info = entry.detail.as_ref().map(|d| &d.appellant_information);
    let field = |label: &str| {
        appellant_info
            .and_then(|m| m.get(label))
            .map(|v| v.to_string())
    };
    let filing_date = field("Filing Date");
    let tax_date = field("Tax Date");
    let reason = field("Reason for Appeal");
    let decision_number = field("Decision Number");
    let decision_mailing_date = field("Decision Mailing Date");
    let decisions = field("Decision(s)");

    let existing = sqlx::query("SELECT appeal_number FROM appeals WHERE appeal_number = ?")
        .bind(&summary.appeal_number)
        .fetch_optional(&mut **tx)
        .await?;

    if existing.is_some() {
        sqlx::query(
            r#"
            UPDATE appeals SET
                roll_number = ?,
                appellant = COALESCE(?, appellant),
                status = COALESCE(?, status),
                appeal_type = COALESCE(?, appeal_type),
                filing_date = COALESCE(?, filing_date),
                tax_date = COALESCE(?, tax_date),
                reason = COALESCE(?, reason),
                decision_number = COALESCE(?, decision_number),
                decision_mailing_date = COALESCE(?, decision_mailing_date),
                decisions = COALESCE(?, decisions),
                updated_at = ?
            WHERE appeal_number = ?
            "#,
        )
        .bind(roll_number)
        .bind(&summary.appellant)
        .bind(&summary.status)
        .bind(&summary.appeal_type)
        .bind(&filing_date)
        .bind(&tax_date)
        .bind(&reason)
        .bind(&decision_number)
        .bind(&decision_mailing_date)
        .bind(&decisions)
        .bind(now)
        .bind(&summary.appeal_number)
        .execute(&mut **tx)
        .await?;
        report.appeals_updated += 1;
    } else {
        sqlx::query(
            r#"
            INSERT INTO appeals
                (appeal_number, roll_number, appellant, status, appeal_type,
                 filing_date, tax_date, reason, decision_number,
                 decision_mailing_date, decisions, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&summary.appeal_number)
        .bind(roll_number)
        .bind(&summary.appellant)
        .bind(&summary.status)
        .bind(&summary.appeal_type)
        .bind(&filing_date)
        .bind(&tax_date)
        .bind(&reason)
        .bind(&decision_number)
        .bind(&decision_mailing_date)
        .bind(&decisions)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await?;
        report.appeals_created += 1;
    }

    Ok(())
}

async fn upsert_detail(
    tx: &mut Transaction<'_, Sqlite>,
    appeal_number: &str,
    property_information: &FieldMap,
    appellant_information: &FieldMap,
    report: &mut StoreReport,
) -> Result<(), StoreError> {
    let now = Utc::now();
    let property_json = encode_field_map(property_information)?;
    let appellant_json = encode_field_map(appellant_information)?;

    let existing = sqlx::query("SELECT appeal_number FROM appeal_details WHERE appeal_number = ?")
        .bind(appeal_number)
        .fetch_optional(&mut **tx)
        .await?;

    if existing.is_some() {
        sqlx::query(
            r#"
            UPDATE appeal_details SET
                property_information = ?, appellant_information = ?, updated_at = ?
            WHERE appeal_number = ?
            "#,
        )
        .bind(&property_json)
        .bind(&appellant_json)
        .bind(now)
        .bind(appeal_number)
        .execute(&mut **tx)
        .await?;
        report.details_updated += 1;
    } else {
        sqlx::query(
            r#"
            INSERT INTO appeal_details
                (appeal_number, property_information, appellant_information,
                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(appeal_number)
        .bind(&property_json)
        .bind(&appellant_json)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await?;
        report.details_created += 1;
    }

    Ok(())
}

/// Resolve the representative by natural key, creating it if absent, then
/// ensure the appeal link exists. Re-inserting an existing link is a no-op.
async fn link_representative(
    tx: &mut Transaction<'_, Sqlite>,
    appeal_number: &str,
    representative: &RepresentativeRecord,
    report: &mut StoreReport,
) -> Result<(), StoreError> {
    let representative_id = resolve_representative(tx, representative, report).await?;

    let result = sqlx::query(
        "INSERT OR IGNORE INTO appeal_representatives (appeal_number, representative_id) VALUES (?, ?)",
    )
    .bind(appeal_number)
    .bind(representative_id)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() > 0 {
        report.representative_links_created += 1;
    }

    Ok(())
}

async fn resolve_representative(
    tx: &mut Transaction<'_, Sqlite>,
    representative: &RepresentativeRecord,
    report: &mut StoreReport,
) -> Result<i64, StoreError> {
    let select =
        "SELECT id FROM representatives WHERE name = ? AND role = ?";

    if let Some(row) = sqlx::query(select)
        .bind(&representative.name)
        .bind(&representative.role)
        .fetch_optional(&mut **tx)
        .await?
    {
        return Ok(row.get::<i64, _>("id"));
    }

    let inserted = sqlx::query(
        "INSERT INTO representatives (name, role, created_at) VALUES (?, ?, ?)",
    )
    .bind(&representative.name)
    .bind(&representative.role)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await;

    match inserted {
        Ok(result) => {
            report.representatives_created += 1;
            Ok(result.last_insert_rowid())
        }
        // Lost a race on the (name, role) unique constraint to a concurrent
        // aggregate: one bounded re-resolve, last write wins.
        Err(e) if is_unique_violation(&e) => {
            debug!(
                "representative ({}, {}) created concurrently, re-resolving",
                representative.name, representative.role
            );
            let row = sqlx::query(select)
                .bind(&representative.name)
                .bind(&representative.role)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or_else(|| StoreError::ConstraintViolation {
                    message: format!(
                        "representative ({}, {}) vanished after unique violation",
                        representative.name, representative.role
                    ),
                })?;
            Ok(row.get::<i64, _>("id"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Append-or-update by the hearing's natural signature.
async fn upsert_hearing(
    tx: &mut Transaction<'_, Sqlite>,
    appeal_number: &str,
    hearing: &HearingRecord,
    report: &mut StoreReport,
) -> Result<(), StoreError> {
    let now = Utc::now();
    let hearing_date = hearing.hearing_date.clone().unwrap_or_default();
    let location = hearing.location.clone().unwrap_or_default();

    let existing = sqlx::query(
        "SELECT id FROM hearings WHERE appeal_number = ? AND hearing_date = ? AND location = ?",
    )
    .bind(appeal_number)
    .bind(&hearing_date)
    .bind(&location)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(row) = existing {
        sqlx::query("UPDATE hearings SET status = ?, updated_at = ? WHERE id = ?")
            .bind(&hearing.status)
            .bind(now)
            .bind(row.get::<i64, _>("id"))
            .execute(&mut **tx)
            .await?;
        report.hearings_updated += 1;
    } else {
        sqlx::query(
            r#"
            INSERT INTO hearings
                (appeal_number, hearing_date, location, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(appeal_number)
        .bind(&hearing_date)
        .bind(&location)
        .bind(&hearing.status)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await?;
        report.hearings_created += 1;
    }

    Ok(())
}

fn encode_field_map(map: &FieldMap) -> Result<String, StoreError> {
    serde_json::to_string(map).map_err(|e| StoreError::Query {
        message: format!("encoding field map: {e}"),
    })
}

fn decode_field_map(raw: String) -> FieldMap {
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!("stored field map is unreadable, treating as empty: {}", e);
        FieldMap::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AppealDetailRecord, AppealSummary};
    use crate::infrastructure::config::DatabaseConfig;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use tempfile::TempDir;

    async fn test_repository() -> (TempDir, AppealRepository) {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            url: format!("sqlite:{}", dir.path().join("test.db").display()),
            max_connections: 5,
        };
        let db = DatabaseConnection::new(&config).await.unwrap();
        db.migrate().await.unwrap();
        (dir, AppealRepository::new(db.pool().clone()))
    }

    fn sample_detail(appeal_number: &str) -> AppealDetailRecord {
        AppealDetailRecord {
            appeal_number: appeal_number.to_string(),
            property_information: FieldMap::from_pairs(vec![
                ("Municipality", "City of Toronto"),
            ]),
            appellant_information: FieldMap::from_pairs(vec![
                ("Name", "Jane Doe"),
                ("Filing Date", "2021-03-31"),
            ]),
            representatives: vec![RepresentativeRecord {
                name: "ACME TAX AGENTS".to_string(),
                role: "Agent".to_string(),
            }],
            hearings: vec![HearingRecord {
                hearing_date: Some("2021-10-05".to_string()),
                location: Some("Toronto Hearing Room 2".to_string()),
                status: Some("Scheduled".to_string()),
            }],
        }
    }

    fn sample_aggregate() -> AggregateResult {
        let appeal = AppealEntry {
            summary: AppealSummary {
                appeal_number: "ARB-2021-0001".to_string(),
                appellant: Some("JANE DOE".to_string()),
                representative: Some("ACME TAX AGENTS".to_string()),
                status: Some("Scheduled".to_string()),
                appeal_type: Some("33".to_string()),
                tax_year: Some("2021".to_string()),
                hearing_date: Some("2021-10-05".to_string()),
                detail_url: None,
            },
            detail: Some(sample_detail("ARB-2021-0001")),
            detail_failure: None,
        };

        AggregateResult {
            roll_number: "19-04-123-456-78900-0000".to_string(),
            source_url: "https://arb.example.test/listing".to_string(),
            property: PropertyRecord {
                roll_number: "19-04-123-456-78900-0000".to_string(),
                address: None,
                municipality: Some("City of Toronto".to_string()),
                description: Some("123 MAIN ST".to_string()),
                assessment: FieldMap::from_pairs(vec![("NBHD", "042")]),
            },
            appeals: vec![appeal],
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn storing_twice_is_idempotent() {
        let (_dir, repo) = test_repository().await;
        let aggregate = sample_aggregate();

        let first = repo.store_aggregate(&aggregate).await.unwrap();
        assert_eq!(first.properties_created, 1);
        assert_eq!(first.appeals_created, 1);
        assert_eq!(first.details_created, 1);
        assert_eq!(first.representatives_created, 1);
        assert_eq!(first.representative_links_created, 1);
        assert_eq!(first.hearings_created, 1);

        let second = repo.store_aggregate(&aggregate).await.unwrap();
        assert_eq!(second.properties_created, 0);
        assert_eq!(second.properties_updated, 1);
        assert_eq!(second.appeals_created, 0);
        assert_eq!(second.appeals_updated, 1);
        assert_eq!(second.representatives_created, 0);
        assert_eq!(second.representative_links_created, 0);
        assert_eq!(second.hearings_created, 0);
        assert_eq!(second.hearings_updated, 1);

        let counts = repo.counts().await.unwrap();
        assert_eq!(counts.properties, 1);
        assert_eq!(counts.appeals, 1);
        assert_eq!(counts.appeal_details, 1);
        assert_eq!(counts.representatives, 1);
        assert_eq!(counts.representative_links, 1);
        assert_eq!(counts.hearings, 1);
    }

    #[tokio::test]
    async fn shared_representative_is_resolved_not_duplicated() {
        let (_dir, repo) = test_repository().await;

        let mut aggregate = sample_aggregate();
        let mut second_appeal = aggregate.appeals[0].clone();
        second_appeal.summary.appeal_number = "ARB-2022-0117".to_string();
        second_appeal.detail = Some(sample_detail("ARB-2022-0117"));
        aggregate.appeals.push(second_appeal);

        let report = repo.store_aggregate(&aggregate).await.unwrap();
        assert_eq!(report.representatives_created, 1);
        assert_eq!(report.representative_links_created, 2);

        let counts = repo.counts().await.unwrap();
        assert_eq!(counts.representatives, 1);
        assert_eq!(counts.representative_links, 2);
    }

    #[tokio::test]
    async fn hearing_signature_match_updates_status() {
        let (_dir, repo) = test_repository().await;

        let mut aggregate = sample_aggregate();
        repo.store_aggregate(&aggregate).await.unwrap();

        // Same (appeal, date, location) signature with a new status.
        if let Some(detail) = &mut aggregate.appeals[0].detail {
            detail.hearings[0].status = Some("Completed".to_string());
            // A genuinely new hearing appends.
            detail.hearings.push(HearingRecord {
                hearing_date: Some("2022-01-17".to_string()),
                location: Some("Video Conference".to_string()),
                status: None,
            });
        }

        let report = repo.store_aggregate(&aggregate).await.unwrap();
        assert_eq!(report.hearings_updated, 1);
        assert_eq!(report.hearings_created, 1);

        let counts = repo.counts().await.unwrap();
        assert_eq!(counts.hearings, 2);
    }

    #[tokio::test]
    async fn appeal_without_detail_commits_and_failure_is_reported() {
        let (_dir, repo) = test_repository().await;

        let mut aggregate = sample_aggregate();
        aggregate.appeals[0].detail = None;
        aggregate.appeals[0].detail_failure =
            Some("transient failure after 4 attempt(s): HTTP status 503".to_string());

        let report = repo.store_aggregate(&aggregate).await.unwrap();
        assert_eq!(report.appeals_created, 1);
        assert_eq!(report.details_created, 0);
        assert_eq!(report.detail_failures.len(), 1);
        assert_eq!(report.detail_failures[0].appeal_number, "ARB-2021-0001");

        let counts = repo.counts().await.unwrap();
        assert_eq!(counts.appeals, 1);
        assert_eq!(counts.appeal_details, 0);
    }

    #[tokio::test]
    async fn listing_only_rerun_keeps_detail_derived_columns() {
        let (_dir, repo) = test_repository().await;

        let mut aggregate = sample_aggregate();
        repo.store_aggregate(&aggregate).await.unwrap();

        // Re-ingest the same appeal without detail, as a details-off run does.
        aggregate.appeals[0].detail = None;
        repo.store_aggregate(&aggregate).await.unwrap();

        let appeals = repo
            .get_appeals_for_property("19-04-123-456-78900-0000")
            .await
            .unwrap();
        assert_eq!(appeals.len(), 1);
        assert_eq!(appeals[0].filing_date.as_deref(), Some("2021-03-31"));
    }

    #[tokio::test]
    async fn query_methods_return_materialized_records() {
        let (_dir, repo) = test_repository().await;
        repo.store_aggregate(&sample_aggregate()).await.unwrap();

        let property = repo
            .get_property("19-04-123-456-78900-0000")
            .await
            .unwrap()
            .expect("property stored");
        assert_eq!(property.municipality.as_deref(), Some("City of Toronto"));
        assert_eq!(property.assessment.get("NBHD"), Some("042"));

        let sections = repo
            .get_detail_sections("ARB-2021-0001")
            .await
            .unwrap()
            .expect("detail stored");
        assert_eq!(sections.1.get("Name"), Some("Jane Doe"));
    }
}
