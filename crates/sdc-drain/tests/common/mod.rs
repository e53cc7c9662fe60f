//! Shared helpers for the drain integration tests
//!
//! - reading fixtures for every sensor kind
//! - in-memory drain setup
//! - a PostgreSQL container with migrations applied (needs Docker)
#![allow(dead_code)]

use anyhow::{Context, Result};
use sdc_common::RawReading;
use sdc_drain::drain::memory::{MemoryDestinationStore, MemoryStagingStore};
use sdc_drain::drain::{DestinationStore, DrainConfig, DrainOrchestrator, StagingStore};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::info;

// ============================================================================
// Fixtures
// ============================================================================

pub fn reading(kind: &str, timestamp: i64, payload: &str) -> RawReading {
    RawReading {
        device_id: 42,
        timestamp,
        sensor_kind: kind.to_string(),
        payload: payload.to_string(),
        priority: 1,
        synced: false,
        data_class: 0,
    }
}

pub fn gps(timestamp: i64) -> RawReading {
    reading(
        "GPS",
        timestamp,
        "<accuracy>8.0</accuracy><alt>96.5</alt><lat>50.3614</lat><lon>7.5582</lon><speed>0.75</speed>",
    )
}

/// GPS row without its `<alt>` tag
pub fn malformed_gps(timestamp: i64) -> RawReading {
    reading("GPS", timestamp, "<accuracy>8.0</accuracy><lat>50.3614</lat><lon>7.5582</lon>")
}

pub fn tag(timestamp: i64) -> RawReading {
    reading("Tags", timestamp, &format!("<txt>marker {timestamp}</txt>"))
}

pub fn wifi(timestamp: i64) -> RawReading {
    reading(
        "Wifi",
        timestamp,
        "<bssid>00:24:01:aa:bb:cc</bssid><ssid>eduroam</ssid><connected>true</connected><freq>2437</freq><sigLevel>-67</sigLevel>",
    )
}

/// One well-formed reading of every sensor kind
pub fn one_of_each_kind(timestamp: i64) -> Vec<RawReading> {
    vec![
        gps(timestamp),
        reading(
            "GSM",
            timestamp,
            r"<operator>Vodafone.de</operator><neighbors class=\'java.util.Vector\'>[]</neighbors><lac>31002</lac><cid>2301</cid><rssi>-81</rssi>",
        ),
        reading(
            "MagneticField",
            timestamp,
            "<fieldX>-20.25</fieldX><fieldY>4.5</fieldY><fieldZ>-38.0</fieldZ>",
        ),
        reading("Accelerometer", timestamp, "<accX>0.12</accX><accY>9.79</accY><accZ>0.31</accZ>"),
        wifi(timestamp),
        tag(timestamp),
        reading(
            "NetworkLocation",
            timestamp,
            "<accuracy>1200.0</accuracy><lat>50.36</lat><lon>7.56</lon>",
        ),
        reading(
            "Bluetooth",
            timestamp,
            "<adress>5C:F3:70:01:02:03</adress><class>PHONE</class><name>Nokia 6310i</name><rssi>-72</rssi>",
        ),
        reading(
            "Gyroscope",
            timestamp,
            "<angSpeedX>0.01</angSpeedX><angSpeedY>0.02</angSpeedY><angSpeedZ>-0.03</angSpeedZ>",
        ),
    ]
}

// ============================================================================
// In-memory drain
// ============================================================================

pub struct MemoryDrain {
    pub staging: Arc<MemoryStagingStore>,
    pub destination: Arc<MemoryDestinationStore>,
    pub orchestrator: Arc<DrainOrchestrator>,
}

impl MemoryDrain {
    pub fn new(rows: Vec<RawReading>, config: DrainConfig) -> Self {
        let staging = Arc::new(MemoryStagingStore::with_rows(rows));
        let destination = Arc::new(MemoryDestinationStore::new());

        let staging_store: Arc<dyn StagingStore> = staging.clone();
        let destination_store: Arc<dyn DestinationStore> = destination.clone();
        let orchestrator = Arc::new(DrainOrchestrator::new(staging_store, destination_store, config));

        Self {
            staging,
            destination,
            orchestrator,
        }
    }
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL container with migrations applied
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Stage rows the way devices upload them
    pub async fn stage(&self, rows: &[RawReading]) -> Result<()> {
        for row in rows {
            sqlx::query(
                "INSERT INTO samples (uuid, sensorid, ts, prio, synced, data, dataclass) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(row.device_id)
            .bind(&row.sensor_kind)
            .bind(row.timestamp)
            .bind(row.priority)
            .bind(row.synced)
            .bind(&row.payload)
            .bind(row.data_class)
            .execute(&self.pool)
            .await
            .context("Failed to stage reading")?;
        }
        Ok(())
    }

    pub async fn count(&self, table: &str) -> Result<i64> {
        let count = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count {table}"))?;
        Ok(count)
    }
}

/// Initialize test tracing; safe to call from every test
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,sdc_drain=debug,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}
