//! Open connection handles: one pooled backend per registered name.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ferry_core::{EngineKind, Row, SqlValue};
use futures_util::stream::{BoxStream, StreamExt, TryStreamExt};
use sqlx::mysql::MySqlPool;
use sqlx::postgres::PgPool;
use sqlx::query::Query;
use sqlx::sqlite::SqlitePool;
use sqlx::{Database, Encode, MySql, Postgres, Sqlite, Type};

use crate::decode;
use crate::dialect::Dialect;

const PG_COLUMN_TYPES: &str = "SELECT a.attname::text, format_type(a.atttypid, a.atttypmod)
     FROM pg_attribute a
     WHERE a.attrelid = CAST($1 AS regclass) AND a.attnum > 0 AND NOT a.attisdropped";

/// Rows decoded from a running query, pulled one at a time.
pub type RowStream<'a> = BoxStream<'a, Result<Row, sqlx::Error>>;

/// Engine-specific `sqlx` pool behind a [`LiveConnection`].
#[derive(Debug, Clone)]
pub(crate) enum PoolHandle {
    Postgres(PgPool),
    MySql(MySqlPool),
    Sqlite(SqlitePool),
}

/// Pool limits actually applied when the pool was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    pub max_idle: u32,
    pub max_open: u32,
    pub max_lifetime: Duration,
}

/// A named, pooled connection to one backend.
///
/// Shared as `Arc<LiveConnection>`; every query checks a connection out of
/// the pool for its own duration, so concurrent users never share a session.
#[derive(Debug)]
pub struct LiveConnection {
    name: String,
    kind: EngineKind,
    pool: PoolHandle,
    limits: PoolLimits,
}

impl LiveConnection {
    pub(crate) fn new(name: String, kind: EngineKind, pool: PoolHandle, limits: PoolLimits) -> Self {
        Self {
            name,
            kind,
            pool,
            limits,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn limits(&self) -> PoolLimits {
        self.limits
    }

    pub fn is_closed(&self) -> bool {
        match &self.pool {
            PoolHandle::Postgres(pool) => pool.is_closed(),
            PoolHandle::MySql(pool) => pool.is_closed(),
            PoolHandle::Sqlite(pool) => pool.is_closed(),
        }
    }

    /// Stream the rows of `sql`, decoding each into a [`Row`].
    ///
    /// Column names are resolved from the first row and shared by every row
    /// after it.
    pub fn fetch<'a>(&'a self, sql: &'a str, params: &'a [SqlValue]) -> RowStream<'a> {
        match &self.pool {
            PoolHandle::Postgres(pool) => {
                let mut columns = None;
                bind_params(sqlx::query::<Postgres>(sql), params)
                    .fetch(pool)
                    .map(move |row| decode::pg_row(&row?, &mut columns))
                    .boxed()
            }
            PoolHandle::MySql(pool) => {
                let mut columns = None;
                bind_params(sqlx::query::<MySql>(sql), params)
                    .fetch(pool)
                    .map(move |row| decode::mysql_row(&row?, &mut columns))
                    .boxed()
            }
            PoolHandle::Sqlite(pool) => {
                let mut columns = None;
                bind_params(sqlx::query::<Sqlite>(sql), params)
                    .fetch(pool)
                    .map(move |row| decode::sqlite_row(&row?, &mut columns))
                    .boxed()
            }
        }
    }

    pub async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, sqlx::Error> {
        self.fetch(sql, params).try_collect().await
    }

    /// First column of the first row, or `Null` when the query returns nothing.
    pub async fn fetch_scalar(&self, sql: &str) -> Result<SqlValue, sqlx::Error> {
        let no_params: [SqlValue; 0] = [];
        let mut rows = self.fetch(sql, &no_params);
        match rows.next().await {
            Some(row) => Ok(row?.values().first().cloned().unwrap_or(SqlValue::Null)),
            None => Ok(SqlValue::Null),
        }
    }

    /// Run a statement outside any explicit transaction; returns rows affected.
    pub async fn execute<'q>(
        &self,
        sql: &'q str,
        params: impl IntoIterator<Item = &'q SqlValue> + Send,
    ) -> Result<u64, sqlx::Error> {
        let affected = match &self.pool {
            PoolHandle::Postgres(pool) => bind_params(sqlx::query::<Postgres>(sql), params)
                .execute(pool)
                .await?
                .rows_affected(),
            PoolHandle::MySql(pool) => bind_params(sqlx::query::<MySql>(sql), params)
                .execute(pool)
                .await?
                .rows_affected(),
            PoolHandle::Sqlite(pool) => bind_params(sqlx::query::<Sqlite>(sql), params)
                .execute(pool)
                .await?
                .rows_affected(),
        };
        Ok(affected)
    }

    /// Declared type of each column of `table`, keyed by column name.
    ///
    /// Only Postgres refuses to coerce text parameters into typed columns, so
    /// only Postgres is asked; the other engines get an empty map.
    pub async fn column_types(&self, table: &str) -> Result<HashMap<String, String>, sqlx::Error> {
        if self.kind != EngineKind::Postgres {
            return Ok(HashMap::new());
        }
        let params = [SqlValue::Text(self.kind.quote_table(table))];
        let rows = self.fetch_all(PG_COLUMN_TYPES, &params).await?;
        Ok(rows
            .iter()
            .filter_map(|row| match row.values() {
                [SqlValue::Text(name), SqlValue::Text(ty)] => Some((name.clone(), ty.clone())),
                _ => None,
            })
            .collect())
    }

    pub async fn begin(&self) -> Result<LiveTransaction, sqlx::Error> {
        let tx = match &self.pool {
            PoolHandle::Postgres(pool) => LiveTransaction::Postgres(pool.begin().await?),
            PoolHandle::MySql(pool) => LiveTransaction::MySql(pool.begin().await?),
            PoolHandle::Sqlite(pool) => LiveTransaction::Sqlite(pool.begin().await?),
        };
        Ok(tx)
    }

    /// Round-trip `SELECT 1` through the pool.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        self.execute("SELECT 1", std::iter::empty()).await.map(|_| ())
    }

    /// Close the pool, waiting for checked-out connections to come back.
    pub async fn close(&self) {
        match &self.pool {
            PoolHandle::Postgres(pool) => pool.close().await,
            PoolHandle::MySql(pool) => pool.close().await,
            PoolHandle::Sqlite(pool) => pool.close().await,
        }
    }
}

/// An open transaction on one pooled connection.
///
/// Dropping it without [`commit`](Self::commit) rolls back.
pub enum LiveTransaction {
    Postgres(sqlx::Transaction<'static, Postgres>),
    MySql(sqlx::Transaction<'static, MySql>),
    Sqlite(sqlx::Transaction<'static, Sqlite>),
}

impl LiveTransaction {
    pub async fn execute<'q>(
        &mut self,
        sql: &'q str,
        params: impl IntoIterator<Item = &'q SqlValue> + Send,
    ) -> Result<u64, sqlx::Error> {
        let affected = match self {
            LiveTransaction::Postgres(tx) => bind_params(sqlx::query::<Postgres>(sql), params)
                .execute(&mut **tx)
                .await?
                .rows_affected(),
            LiveTransaction::MySql(tx) => bind_params(sqlx::query::<MySql>(sql), params)
                .execute(&mut **tx)
                .await?
                .rows_affected(),
            LiveTransaction::Sqlite(tx) => bind_params(sqlx::query::<Sqlite>(sql), params)
                .execute(&mut **tx)
                .await?
                .rows_affected(),
        };
        Ok(affected)
    }

    pub async fn commit(self) -> Result<(), sqlx::Error> {
        match self {
            LiveTransaction::Postgres(tx) => tx.commit().await,
            LiveTransaction::MySql(tx) => tx.commit().await,
            LiveTransaction::Sqlite(tx) => tx.commit().await,
        }
    }

    pub async fn rollback(self) -> Result<(), sqlx::Error> {
        match self {
            LiveTransaction::Postgres(tx) => tx.rollback().await,
            LiveTransaction::MySql(tx) => tx.rollback().await,
            LiveTransaction::Sqlite(tx) => tx.rollback().await,
        }
    }
}

/// Bind each value in order. `Null` binds as a nullable text parameter.
fn bind_params<'q, DB>(
    mut query: Query<'q, DB, <DB as Database>::Arguments<'q>>,
    params: impl IntoIterator<Item = &'q SqlValue>,
) -> Query<'q, DB, <DB as Database>::Arguments<'q>>
where
    DB: Database,
    bool: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    &'q str: Encode<'q, DB> + Type<DB>,
    &'q [u8]: Encode<'q, DB> + Type<DB>,
    DateTime<Utc>: Encode<'q, DB> + Type<DB>,
    Option<String>: Encode<'q, DB> + Type<DB>,
{
    for value in params {
        query = match value {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Integer(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Timestamp(v) => query.bind(*v),
            SqlValue::Binary(v) => query.bind(v.as_slice()),
        };
    }
    query
}
