//! Driver rows → [`SqlValue`]s.
//!
//! Each engine reports its own type names, so each gets its own mapping.
//! Types without a dedicated arm are read as text; a type that cannot be read
//! as text either surfaces as a decode error.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use ferry_core::{Row, SqlValue};
use rust_decimal::Decimal;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::types::{Oid, PgInterval};
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::types::{JsonValue, Uuid};
use sqlx::{Column, ColumnIndex, Row as _, TypeInfo, ValueRef};

/// Column names of a result set, resolved from its first row.
fn column_names<R: sqlx::Row>(row: &R) -> Arc<[String]> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

/// Upper-cased type name of the value at `index`, or `None` for SQL NULL.
fn value_type<R>(row: &R, index: usize) -> Result<Option<String>, sqlx::Error>
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
{
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(None);
    }
    Ok(Some(raw.type_info().name().to_ascii_uppercase()))
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn time_text(time: NaiveTime) -> String {
    time.format("%H:%M:%S%.f").to_string()
}

/// Postgres input syntax for an interval, exact to the microsecond.
fn interval_text(interval: &PgInterval) -> String {
    format!(
        "{} mons {} days {} microseconds",
        interval.months, interval.days, interval.microseconds
    )
}

fn out_of_range(err: std::num::TryFromIntError) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(err))
}

pub(crate) fn pg_row(row: &PgRow, columns: &mut Option<Arc<[String]>>) -> Result<Row, sqlx::Error> {
    let columns = columns.get_or_insert_with(|| column_names(row)).clone();
    let values = (0..row.len())
        .map(|i| pg_value(row, i))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Row::new(columns, values))
}

pub(crate) fn mysql_row(
    row: &MySqlRow,
    columns: &mut Option<Arc<[String]>>,
) -> Result<Row, sqlx::Error> {
    let columns = columns.get_or_insert_with(|| column_names(row)).clone();
    let values = (0..row.len())
        .map(|i| mysql_value(row, i))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Row::new(columns, values))
}

pub(crate) fn sqlite_row(
    row: &SqliteRow,
    columns: &mut Option<Arc<[String]>>,
) -> Result<Row, sqlx::Error> {
    let columns = columns.get_or_insert_with(|| column_names(row)).clone();
    let values = (0..row.len())
        .map(|i| sqlite_value(row, i))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Row::new(columns, values))
}

fn pg_value(row: &PgRow, index: usize) -> Result<SqlValue, sqlx::Error> {
    let Some(ty) = value_type(row, index)? else {
        return Ok(SqlValue::Null);
    };
    let value = match ty.as_str() {
        "BOOL" => SqlValue::Bool(row.try_get(index)?),
        "INT2" => SqlValue::Integer(row.try_get::<i16, _>(index)?.into()),
        "INT4" => SqlValue::Integer(row.try_get::<i32, _>(index)?.into()),
        "INT8" => SqlValue::Integer(row.try_get(index)?),
        "FLOAT4" => SqlValue::Float(row.try_get::<f32, _>(index)?.into()),
        "FLOAT8" => SqlValue::Float(row.try_get(index)?),
        // Kept as text so no precision is lost on the way through.
        "NUMERIC" => SqlValue::Text(row.try_get::<Decimal, _>(index)?.to_string()),
        "TIMESTAMPTZ" => SqlValue::Timestamp(row.try_get(index)?),
        "TIMESTAMP" => SqlValue::Timestamp(row.try_get::<NaiveDateTime, _>(index)?.and_utc()),
        "DATE" => SqlValue::Timestamp(midnight(row.try_get(index)?)),
        "BYTEA" => SqlValue::Binary(row.try_get(index)?),
        "OID" => SqlValue::Integer(row.try_get::<Oid, _>(index)?.0.into()),
        // Types with no native counterpart travel as their text form; the
        // insert casts them back to the target column's type.
        "UUID" => SqlValue::Text(row.try_get::<Uuid, _>(index)?.to_string()),
        "JSON" | "JSONB" => SqlValue::Text(row.try_get::<JsonValue, _>(index)?.to_string()),
        "TIME" => SqlValue::Text(time_text(row.try_get(index)?)),
        "INTERVAL" => SqlValue::Text(interval_text(&row.try_get(index)?)),
        "INET" | "CIDR" => SqlValue::Text(row.try_get::<IpNetwork, _>(index)?.to_string()),
        _ => SqlValue::Text(row.try_get(index)?),
    };
    Ok(value)
}

fn mysql_value(row: &MySqlRow, index: usize) -> Result<SqlValue, sqlx::Error> {
    let Some(ty) = value_type(row, index)? else {
        return Ok(SqlValue::Null);
    };
    let value = match ty.as_str() {
        "BOOLEAN" => SqlValue::Bool(row.try_get(index)?),
        t if t.ends_with("UNSIGNED") => {
            let v: u64 = row.try_get(index)?;
            SqlValue::Integer(i64::try_from(v).map_err(out_of_range)?)
        }
        "TINYINT" => SqlValue::Integer(row.try_get::<i8, _>(index)?.into()),
        "SMALLINT" => SqlValue::Integer(row.try_get::<i16, _>(index)?.into()),
        "MEDIUMINT" | "INT" => SqlValue::Integer(row.try_get::<i32, _>(index)?.into()),
        "BIGINT" => SqlValue::Integer(row.try_get(index)?),
        "FLOAT" => SqlValue::Float(row.try_get::<f32, _>(index)?.into()),
        "DOUBLE" => SqlValue::Float(row.try_get(index)?),
        "DECIMAL" => SqlValue::Text(row.try_get::<Decimal, _>(index)?.to_string()),
        "DATETIME" => SqlValue::Timestamp(row.try_get::<NaiveDateTime, _>(index)?.and_utc()),
        "TIMESTAMP" => SqlValue::Timestamp(row.try_get(index)?),
        "DATE" => SqlValue::Timestamp(midnight(row.try_get(index)?)),
        "TIME" => SqlValue::Text(time_text(row.try_get(index)?)),
        "JSON" => SqlValue::Text(row.try_get::<JsonValue, _>(index)?.to_string()),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            SqlValue::Binary(row.try_get(index)?)
        }
        _ => SqlValue::Text(row.try_get(index)?),
    };
    Ok(value)
}

// SQLite reports the storage class of each value, not the declared type.
fn sqlite_value(row: &SqliteRow, index: usize) -> Result<SqlValue, sqlx::Error> {
    let Some(ty) = value_type(row, index)? else {
        return Ok(SqlValue::Null);
    };
    let value = match ty.as_str() {
        "INTEGER" => SqlValue::Integer(row.try_get(index)?),
        "REAL" => SqlValue::Float(row.try_get(index)?),
        "BOOLEAN" => SqlValue::Bool(row.try_get(index)?),
        "BLOB" => SqlValue::Binary(row.try_get(index)?),
        _ => SqlValue::Text(row.try_get(index)?),
    };
    Ok(value)
}
