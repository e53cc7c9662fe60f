//! Postgres-backed stores

use async_trait::async_trait;
use sdc_common::{RawReading, SensorKind};
use sqlx::{query_builder::Separated, PgPool, Postgres, QueryBuilder};

use super::store::{DestinationStore, StagingStore};
use super::types::{Decimal, DecodedRecord, Measurement};
use crate::db::DbResult;

/// Postgres caps a statement at this many bind parameters
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Column count of the widest destination table (`wifi`)
pub const MAX_DESTINATION_COLUMNS: usize = 11;

#[derive(Debug, sqlx::FromRow)]
struct SampleRow {
    uuid: i32,
    sensorid: String,
    ts: i64,
    prio: i32,
    synced: bool,
    data: String,
    dataclass: i32,
}

impl From<SampleRow> for RawReading {
    fn from(row: SampleRow) -> Self {
        Self {
            device_id: row.uuid,
            timestamp: row.ts,
            sensor_kind: row.sensorid,
            payload: row.data,
            priority: row.prio,
            synced: row.synced,
            data_class: row.dataclass,
        }
    }
}

/// The `samples` staging table
#[derive(Debug, Clone)]
pub struct PgStagingStore {
    pool: PgPool,
}

impl PgStagingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StagingStore for PgStagingStore {
    async fn fetch_page(&self, offset: u64, limit: usize) -> DbResult<Vec<RawReading>> {
        let rows = sqlx::query_as::<_, SampleRow>(
            r#"
            SELECT uuid, sensorid, ts, prio, synced, data, dataclass
            FROM samples
            ORDER BY id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(RawReading::from).collect())
    }

    async fn truncate(&self) -> DbResult<()> {
        sqlx::query("TRUNCATE TABLE samples").execute(&self.pool).await?;
        Ok(())
    }

    async fn count(&self) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM samples")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

/// The per-kind destination tables
#[derive(Debug, Clone)]
pub struct PgDestinationStore {
    pool: PgPool,
}

impl PgDestinationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Kind-specific columns, between the leading `uuid, ts` and the trailing
/// `prio, synced, dataclass`
fn measurement_columns(kind: SensorKind) -> &'static str {
    match kind {
        SensorKind::Gps => "accuracy, alt, lat, lon, speed",
        SensorKind::Gsm => "operator, neighbors, lac, cid, rssi",
        SensorKind::MagneticField => "fieldx, fieldy, fieldz",
        SensorKind::Accelerometer => "accx, accy, accz",
        SensorKind::Wifi => "bssid, ssid, cap, connected, freq, siglevel",
        SensorKind::Tag => "txt",
        SensorKind::NetworkLocation => "accuracy, lat, lon",
        SensorKind::Bluetooth => "address, class, name, rssi",
        SensorKind::Gyroscope => "angspeedx, angspeedy, angspeedz",
    }
}

fn insert_prefix(kind: SensorKind) -> String {
    format!(
        "INSERT INTO {} (uuid, ts, {}, prio, synced, dataclass) ",
        kind.table(),
        measurement_columns(kind)
    )
}

fn bind_decimal<'args>(b: &mut Separated<'_, 'args, Postgres, &'static str>, value: &'args Decimal) {
    b.push_bind(value.as_str()).push_unseparated("::numeric");
}

fn bind_measurement<'args>(b: &mut Separated<'_, 'args, Postgres, &'static str>, m: &'args Measurement) {
    match m {
        Measurement::Gps {
            accuracy,
            altitude,
            latitude,
            longitude,
            speed,
        } => {
            for value in [accuracy, altitude, latitude, longitude, speed] {
                bind_decimal(b, value);
            }
        },
        Measurement::Gsm {
            operator,
            neighbors,
            lac,
            cid,
            rssi,
        } => {
            b.push_bind(operator.as_str()).push_bind(neighbors.as_str());
            for value in [lac, cid, rssi] {
                bind_decimal(b, value);
            }
        },
        Measurement::MagneticField { x, y, z }
        | Measurement::Accelerometer { x, y, z }
        | Measurement::Gyroscope { x, y, z } => {
            for value in [x, y, z] {
                bind_decimal(b, value);
            }
        },
        Measurement::Wifi {
            bssid,
            ssid,
            cap,
            connected,
            frequency,
            signal_level,
        } => {
            b.push_bind(bssid.as_str())
                .push_bind(ssid.as_str())
                .push_bind(cap.as_str())
                .push_bind(*connected);
            bind_decimal(b, frequency);
            bind_decimal(b, signal_level);
        },
        Measurement::Tag { text } => {
            b.push_bind(text.as_str());
        },
        Measurement::NetworkLocation {
            accuracy,
            latitude,
            longitude,
        } => {
            for value in [accuracy, latitude, longitude] {
                bind_decimal(b, value);
            }
        },
        Measurement::Bluetooth {
            address,
            class,
            name,
            rssi,
        } => {
            b.push_bind(address.as_str())
                .push_bind(class.as_str())
                .push_bind(name.as_str());
            bind_decimal(b, rssi);
        },
    }
}

#[async_trait]
impl DestinationStore for PgDestinationStore {
    async fn insert_batch(&self, kind: SensorKind, records: &[DecodedRecord]) -> DbResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(insert_prefix(kind));

        query_builder.push_values(records.iter(), |mut b, record| {
            b.push_bind(record.meta.device_id).push_bind(record.meta.timestamp);
            bind_measurement(&mut b, &record.measurement);
            b.push_bind(record.meta.priority)
                .push_bind(record.meta.synced)
                .push_bind(record.meta.data_class);
        });

        query_builder.build().execute(&self.pool).await?;
        Ok(())
    }
}
