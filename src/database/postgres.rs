use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::types::Json;
use tokio_postgres::NoTls;
use async_trait::async_trait;
use uuid::Uuid;
use chrono::Utc;
use log::{info, error};

use super::models::{RecordUpdate, UserAttemptRecord};
use super::{RecordStore, Result, StoreError};
use crate::config::DatabaseSettings;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS user_records (
    user_key   TEXT PRIMARY KEY,
    doc        JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE TABLE IF NOT EXISTS documents_log (
    id         UUID PRIMARY KEY,
    collection TEXT NOT NULL,
    entry      JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);
"#;

/// PostgreSQL-backed document store: one JSONB document per user plus an
/// append-only log table shared by all collections.
#[derive(Debug)]
pub struct PostgresRecordStore {
    pool: Pool,
}

impl PostgresRecordStore {
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        info!(
            "Connecting to database: {}@{}:{}/{}",
            settings.user, settings.host, settings.port, settings.dbname
        );

        let mut cfg = Config::new();
        cfg.host = Some(settings.host.clone());
        cfg.port = Some(settings.port);
        cfg.dbname = Some(settings.dbname.clone());
        cfg.user = Some(settings.user.clone());
        cfg.password = Some(settings.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::ConnectionFailed(format!("Pool creation failed: {}", e)))?;

        let client = pool
            .get()
            .await
            .map_err(|e| StoreError::ConnectionFailed(format!("Connection test failed: {}", e)))?;

        client.batch_execute(SCHEMA).await.map_err(|e| {
            error!("Failed to prepare schema: {}", e);
            StoreError::QueryFailed(format!("Schema setup failed: {}", e))
        })?;

        info!("Database connection established successfully");
        Ok(Self { pool })
    }

    async fn client(&self) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn get(&self, user_key: &str) -> Result<Option<UserAttemptRecord>> {
        let client = self.client().await?;

        let row = client
            .query_opt("SELECT doc FROM user_records WHERE user_key = $1", &[&user_key])
            .await
            .map_err(|e| {
                error!("Failed to fetch record {}: {}", user_key, e);
                StoreError::QueryFailed(e.to_string())
            })?;

        match row {
            Some(row) => {
                let Json(record) = row
                    .try_get::<_, Json<UserAttemptRecord>>(0)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn create(&self, user_key: &str, record: &UserAttemptRecord) -> Result<()> {
        let client = self.client().await?;

        client
            .execute(
                r#"
                INSERT INTO user_records (user_key, doc)
                VALUES ($1, $2)
                ON CONFLICT (user_key) DO NOTHING
                "#,
                &[&user_key, &Json(record)],
            )
            .await
            .map_err(|e| {
                error!("Failed to create record {}: {}", user_key, e);
                StoreError::QueryFailed(e.to_string())
            })?;

        info!("Created attempt record for {}", user_key);
        Ok(())
    }

    async fn update(&self, user_key: &str, update: &RecordUpdate) -> Result<()> {
        let client = self.client().await?;
        let patch = serde_json::to_value(update)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let rows_affected = client
            .execute(
                r#"
                UPDATE user_records
                SET doc = doc || $2::jsonb,
                    updated_at = now()
                WHERE user_key = $1
                "#,
                &[&user_key, &patch],
            )
            .await
            .map_err(|e| {
                error!("Failed to update record {}: {}", user_key, e);
                StoreError::QueryFailed(e.to_string())
            })?;

        if rows_affected == 0 {
            return Err(StoreError::RecordNotFound(user_key.to_string()));
        }

        Ok(())
    }

    async fn append_log(&self, collection: &str, entry: serde_json::Value) -> Result<()> {
        let client = self.client().await?;

        client
            .execute(
                r#"
                INSERT INTO documents_log (id, collection, entry, created_at)
                VALUES ($1, $2, $3, $4)
                "#,
                &[&Uuid::new_v4(), &collection, &entry, &Utc::now()],
            )
            .await
            .map_err(|e| {
                error!("Failed to append to {}: {}", collection, e);
                StoreError::QueryFailed(e.to_string())
            })?;

        Ok(())
    }
}
