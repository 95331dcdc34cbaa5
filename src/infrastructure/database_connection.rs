// Database connection and pool management
// Handles SQLite connections using sqlx and owns the schema migration.

use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::infrastructure::config::DatabaseConfig;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let db_path = config
            .url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:");

        // SQLite will not create missing parent directories itself.
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // foreign_keys is per-connection, so it has to be set through the
        // connect options rather than a one-off PRAGMA on the pool.
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_properties_sql = r#"
            CREATE TABLE IF NOT EXISTS properties (
                roll_number TEXT PRIMARY KEY,
                address TEXT,
                municipality TEXT,
                description TEXT,
                assessment TEXT NOT NULL DEFAULT '[]',
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_appeals_sql = r#"
            CREATE TABLE IF NOT EXISTS appeals (
                appeal_number TEXT PRIMARY KEY,
                roll_number TEXT NOT NULL,
                appellant TEXT,
                status TEXT,
                appeal_type TEXT,
                filing_date TEXT,
                tax_date TEXT,
                reason TEXT,
                decision_number TEXT,
                decision_mailing_date TEXT,
                decisions TEXT,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (roll_number) REFERENCES properties (roll_number)
            )
        "#;

        let create_appeal_details_sql = r#"
            CREATE TABLE IF NOT EXISTS appeal_details (
                appeal_number TEXT PRIMARY KEY,
                property_information TEXT NOT NULL DEFAULT '[]',
                appellant_information TEXT NOT NULL DEFAULT '[]',
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (appeal_number) REFERENCES appeals (appeal_number)
            )
        "#;

        let create_representatives_sql = r#"
            CREATE TABLE IF NOT EXISTS representatives (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (name, role)
            )
        "#;

        let create_appeal_representatives_sql = r#"
            CREATE TABLE IF NOT EXISTS appeal_representatives (
                appeal_number TEXT NOT NULL,
                representative_id INTEGER NOT NULL,
                PRIMARY KEY (appeal_number, representative_id),
                FOREIGN KEY (appeal_number) REFERENCES appeals (appeal_number),
                FOREIGN KEY (representative_id) REFERENCES representatives (id)
            )
        "#;

        // hearing_date and location default to '' rather than NULL so the
        // natural-signature uniqueness holds for partially described rows.
        let create_hearings_sql = r#"
            CREATE TABLE IF NOT EXISTS hearings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                appeal_number TEXT NOT NULL,
                hearing_date TEXT NOT NULL DEFAULT '',
                location TEXT NOT NULL DEFAULT '',
                status TEXT,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (appeal_number, hearing_date, location),
                FOREIGN KEY (appeal_number) REFERENCES appeals (appeal_number)
            )
        "#;

        let create_indexes_sql = r#"
            CREATE INDEX IF NOT EXISTS idx_appeals_roll_number ON appeals (roll_number);
            CREATE INDEX IF NOT EXISTS idx_hearings_appeal_number ON hearings (appeal_number);
            CREATE INDEX IF NOT EXISTS idx_appeal_reps_representative
                ON appeal_representatives (representative_id);
        "#;

        sqlx::query(create_properties_sql).execute(&self.pool).await?;
        sqlx::query(create_appeals_sql).execute(&self.pool).await?;
        sqlx::query(create_appeal_details_sql)
            .execute(&self.pool)
            .await?;
        sqlx::query(create_representatives_sql)
            .execute(&self.pool)
            .await?;
        sqlx::query(create_appeal_representatives_sql)
            .execute(&self.pool)
            .await?;
        sqlx::query(create_hearings_sql).execute(&self.pool).await?;
        sqlx::query(create_indexes_sql).execute(&self.pool).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn connects_and_migrates() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("test.db");
        let config = DatabaseConfig {
            url: format!("sqlite:{}", db_path.display()),
            max_connections: 2,
        };

        let db = DatabaseConnection::new(&config).await?;
        db.migrate().await?;

        let row = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type='table' AND name='appeals'",
        )
        .fetch_optional(db.pool())
        .await?;
        assert!(row.is_some());

        // Migration is re-runnable.
        db.migrate().await?;
        Ok(())
    }
}
