use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::{debug, info};

use crate::config::PostgresConfig;
use crate::error::{PersistenceError, ServerError};
use crate::store::StoreGateway;
use crate::types::Record;

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS gps_data (
        id SERIAL PRIMARY KEY,
        device_id TEXT NOT NULL,
        latitude DOUBLE PRECISION NOT NULL,
        longitude DOUBLE PRECISION NOT NULL,
        speed DOUBLE PRECISION,
        heading DOUBLE PRECISION,
        timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )";

// Values arrive as text; the casts make Postgres reject non-numeric input
// instead of the client.
const INSERT_RECORD: &str = "
    INSERT INTO gps_data (device_id, latitude, longitude, speed, heading, timestamp)
    VALUES ($1, $2::TEXT::DOUBLE PRECISION, $3::TEXT::DOUBLE PRECISION,
            $4::TEXT::DOUBLE PRECISION, $5::TEXT::DOUBLE PRECISION, NOW())";

/// Store gateway backed by a pooled PostgreSQL connection set.
#[derive(Clone)]
pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    /// Build the pool. No connection is opened until first use.
    pub fn new(config: &PostgresConfig, default_pool_size: usize) -> Result<Self, ServerError> {
        let mut cfg = Config::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.dbname = Some(config.database.clone());
        cfg.user = Some(config.username.clone());
        cfg.password = Some(config.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig::new(
            config.max_pool_size.unwrap_or(default_pool_size).max(1),
        ));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|err| ServerError::Store(format!("failed to create pool: {err}")))?;

        Ok(Self { pool })
    }

    /// Verify connectivity with a trivial query.
    pub async fn ping(&self) -> Result<(), ServerError> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|err| ServerError::Store(format!("failed to connect: {err}")))?;
        client
            .execute("SELECT 1", &[])
            .await
            .map_err(|err| ServerError::Store(format!("ping failed: {err}")))?;
        debug!("postgres connection successful");
        Ok(())
    }

    /// Create the `gps_data` table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), ServerError> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|err| ServerError::Store(format!("failed to connect: {err}")))?;
        client
            .batch_execute(CREATE_TABLE)
            .await
            .map_err(|err| ServerError::Store(format!("failed to create table: {err}")))?;
        info!("table gps_data verified");
        Ok(())
    }
}

#[async_trait]
impl StoreGateway for PostgresStore {
    async fn store(&self, record: &Record) -> Result<(), PersistenceError> {
        let client = self.pool.get().await.map_err(|err| {
            PersistenceError::new(format!("failed to acquire database connection: {err}"))
        })?;

        client
            .execute(
                INSERT_RECORD,
                &[
                    &record.device_id(),
                    &record.latitude(),
                    &record.longitude(),
                    &record.speed(),
                    &record.heading(),
                ],
            )
            .await
            .map_err(|err| PersistenceError::new(format!("failed to insert record: {err}")))?;

        Ok(())
    }
}
