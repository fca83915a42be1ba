//! SQLite Entity Store
//!
//! Implements EntityStore using SQLite for durable storage.
//! One table per entity type, created on first use. Rows are soft-deleted
//! by stamping `deleted_at`; such rows are invisible to every read.

use crate::domain::entities::{Customer, Dvd, DvdStatus, Entity, EntityBase, Rental};
use crate::domain::errors::ServiceError;
use crate::domain::ports::{EntityStore, StoreTx};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

const BASE_COLUMNS: [&str; 4] = ["id", "created_at", "updated_at", "deleted_at"];

/// Mapping between an entity type and its table.
pub trait SqliteRecord: Entity {
    const TABLE: &'static str;

    /// Entity-specific columns as (name, SQL type), after the base columns.
    const COLUMNS: &'static [(&'static str, &'static str)];

    /// Values for `COLUMNS`, in order.
    fn column_values(&self) -> Vec<Value>;

    /// Build the entity from a row whose entity columns start at `offset`.
    fn from_row(base: EntityBase, row: &Row<'_>, offset: usize) -> rusqlite::Result<Self>;
}

impl SqliteRecord for Customer {
    const TABLE: &'static str = "customers";
    const COLUMNS: &'static [(&'static str, &'static str)] =
        &[("name", "TEXT NOT NULL"), ("address", "TEXT NOT NULL")];

    fn column_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.name.clone()),
            Value::Text(self.address.clone()),
        ]
    }

    fn from_row(base: EntityBase, row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Customer {
            base,
            name: row.get(offset)?,
            address: row.get(offset + 1)?,
        })
    }
}

impl SqliteRecord for Dvd {
    const TABLE: &'static str = "dvds";
    const COLUMNS: &'static [(&'static str, &'static str)] =
        &[("name", "TEXT NOT NULL"), ("status", "INTEGER NOT NULL")];

    fn column_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.name.clone()),
            Value::Integer(self.status.code()),
        ]
    }

    fn from_row(base: EntityBase, row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        let code: i64 = row.get(offset + 1)?;
        let status = DvdStatus::from_code(code).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                offset + 1,
                Type::Integer,
                format!("unknown dvd status {}", code).into(),
            )
        })?;
        Ok(Dvd {
            base,
            name: row.get(offset)?,
            status,
        })
    }
}

impl SqliteRecord for Rental {
    const TABLE: &'static str = "rentals";
    const COLUMNS: &'static [(&'static str, &'static str)] = &[
        ("customer_id", "TEXT NOT NULL"),
        ("dvd_id", "TEXT NOT NULL"),
    ];

    fn column_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.customer_id.clone()),
            Value::Text(self.dvd_id.clone()),
        ]
    }

    fn from_row(base: EntityBase, row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Rental {
            base,
            customer_id: row.get(offset)?,
            dvd_id: row.get(offset + 1)?,
        })
    }
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_base(row: &Row<'_>) -> rusqlite::Result<EntityBase> {
    let deleted_raw: Option<String> = row.get(3)?;
    let deleted_at = match deleted_raw {
        Some(_) => Some(parse_ts(row, 3)?),
        None => None,
    };
    Ok(EntityBase {
        id: row.get(0)?,
        created_at: parse_ts(row, 1)?,
        updated_at: parse_ts(row, 2)?,
        deleted_at,
    })
}

fn row_to_entity<E: SqliteRecord>(row: &Row<'_>) -> rusqlite::Result<E> {
    let base = parse_base(row)?;
    E::from_row(base, row, BASE_COLUMNS.len())
}

fn all_columns<E: SqliteRecord>() -> Vec<&'static str> {
    BASE_COLUMNS
        .iter()
        .copied()
        .chain(E::COLUMNS.iter().map(|(name, _)| *name))
        .collect()
}

fn create_table_sql<E: SqliteRecord>() -> String {
    let extra: Vec<String> = E::COLUMNS
        .iter()
        .map(|(name, ty)| format!("{} {}", name, ty))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT,
            {}
        )",
        E::TABLE,
        extra.join(",\n            ")
    )
}

fn select_sql<E: SqliteRecord>() -> String {
    format!(
        "SELECT {} FROM {} WHERE id = ?1 AND deleted_at IS NULL",
        all_columns::<E>().join(", "),
        E::TABLE
    )
}

fn select_live<E: SqliteRecord>(conn: &Connection, id: &str) -> Result<Option<E>, ServiceError> {
    let found = conn
        .query_row(&select_sql::<E>(), [id], |row| row_to_entity::<E>(row))
        .optional()?;
    Ok(found)
}

/// Shared SQLite connection.
///
/// A single connection guarded by an async mutex; a transaction holds the
/// lock from `BEGIN` until commit, rollback or drop.
#[derive(Clone)]
pub struct SqliteDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDatabase {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ServiceError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, ServiceError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, ServiceError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

/// SQLite-backed entity store for one entity type.
pub struct SqliteEntityStore<E> {
    db: SqliteDatabase,
    _entity: PhantomData<fn() -> E>,
}

impl<E: SqliteRecord> SqliteEntityStore<E> {
    /// Create the store, creating its table if missing.
    pub async fn new(db: SqliteDatabase) -> Result<Self, ServiceError> {
        {
            let conn = db.conn.lock().await;
            conn.execute_batch(&create_table_sql::<E>())?;
        }
        tracing::debug!(table = E::TABLE, "sqlite table ready");
        Ok(Self {
            db,
            _entity: PhantomData,
        })
    }
}

#[async_trait]
impl<E: SqliteRecord> EntityStore<E> for SqliteEntityStore<E> {
    async fn begin(&self) -> Result<Box<dyn StoreTx<E>>, ServiceError> {
        let conn = self.db.conn.clone().lock_owned().await;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Box::new(SqliteTx {
            conn,
            finished: false,
            _entity: PhantomData,
        }))
    }

    async fn select(&self, id: &str) -> Result<Option<E>, ServiceError> {
        let conn = self.db.conn.lock().await;
        select_live::<E>(&conn, id)
    }
}

/// Open SQLite transaction holding the connection lock.
pub struct SqliteTx<E> {
    conn: OwnedMutexGuard<Connection>,
    finished: bool,
    _entity: PhantomData<fn() -> E>,
}

#[async_trait]
impl<E: SqliteRecord> StoreTx<E> for SqliteTx<E> {
    async fn insert(&mut self, entity: &E) -> Result<(), ServiceError> {
        let columns = all_columns::<E>();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            E::TABLE,
            columns.join(", "),
            placeholders.join(", ")
        );

        let base = entity.base();
        let mut values = vec![
            Value::Text(base.id.clone()),
            Value::Text(format_ts(&base.created_at)),
            Value::Text(format_ts(&base.updated_at)),
            base.deleted_at
                .as_ref()
                .map(|ts| Value::Text(format_ts(ts)))
                .unwrap_or(Value::Null),
        ];
        values.extend(entity.column_values());

        self.conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    async fn select(&mut self, id: &str) -> Result<Option<E>, ServiceError> {
        select_live::<E>(&self.conn, id)
    }

    async fn update(&mut self, entity: &E) -> Result<(), ServiceError> {
        let assignments: Vec<String> = E::COLUMNS
            .iter()
            .enumerate()
            .map(|(i, (name, _))| format!("{} = ?{}", name, i + 4))
            .collect();
        let sql = format!(
            "UPDATE {} SET created_at = ?2, updated_at = ?3, {} WHERE id = ?1 AND deleted_at IS NULL",
            E::TABLE,
            assignments.join(", ")
        );

        let base = entity.base();
        let mut values = vec![
            Value::Text(base.id.clone()),
            Value::Text(format_ts(&base.created_at)),
            Value::Text(format_ts(&base.updated_at)),
        ];
        values.extend(entity.column_values());

        let changed = self.conn.execute(&sql, params_from_iter(values))?;
        if changed == 0 {
            return Err(ServiceError::not_found(E::COLLECTION, entity.id()));
        }
        Ok(())
    }

    async fn delete(&mut self, entity: &E) -> Result<(), ServiceError> {
        let base = entity.base();
        let deleted_at = base.deleted_at.unwrap_or_else(Utc::now);
        let sql = format!(
            "UPDATE {} SET deleted_at = ?2, updated_at = ?3 WHERE id = ?1 AND deleted_at IS NULL",
            E::TABLE
        );

        let changed = self.conn.execute(
            &sql,
            rusqlite::params![base.id, format_ts(&deleted_at), format_ts(&base.updated_at)],
        )?;
        if changed == 0 {
            return Err(ServiceError::not_found(E::COLLECTION, entity.id()));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), ServiceError> {
        let mut tx = self;
        tx.finished = true;
        if let Err(e) = tx.conn.execute_batch("COMMIT") {
            // A failed COMMIT can leave the transaction open
            if let Err(rollback) = tx.conn.execute_batch("ROLLBACK") {
                tracing::warn!("rollback after failed commit failed: {}", rollback);
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), ServiceError> {
        let mut tx = self;
        tx.finished = true;
        tx.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl<E> Drop for SqliteTx<E> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::warn!("rollback of abandoned transaction failed: {}", e);
            }
        }
    }
}
