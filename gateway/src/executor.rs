//! Query executor.
//!
//! Runs one statement inside an explicit transaction and normalizes the
//! driver's result into [`ExecutionResult`]. Whether a statement returns
//! rows is decided from backend metadata, never from the SQL text.

use futures::TryStreamExt;
use serde_json::{json, Value};
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{Decimal, Uuid};
use sqlx::{Column, Connection, Database, Either, Executor, Row, TypeInfo, ValueRef};

use common::errors::{AppError, AppResult};
use common::models::{DbType, ExecutionResult, JsonRow};

use crate::dispatcher::LiveConnection;

/// What a statement produced.
#[derive(Debug, PartialEq)]
pub(crate) enum StatementOutcome {
    /// Row-returning statement, every row materialized.
    Rows(Vec<JsonRow>),
    /// Statement without a result set.
    Executed,
}

/// Executes `sql` on `live`.
///
/// Commits on success and rolls back on any error, so no statement is
/// partially applied. The connection stays open; closing it is the
/// caller's job.
pub async fn execute(live: &mut LiveConnection, sql: &str) -> AppResult<ExecutionResult> {
    let db_type = live.db_type();
    let closed = || AppError::Internal("connection already closed".into());

    let outcome = match db_type {
        DbType::Postgres => {
            let conn = live.postgres().ok_or_else(closed)?;
            run_in_transaction::<sqlx::Postgres, _>(conn, sql, pg_row_to_json).await?
        }
        DbType::MySQL => {
            let conn = live.mysql().ok_or_else(closed)?;
            run_in_transaction::<sqlx::MySql, _>(conn, sql, mysql_row_to_json).await?
        }
        DbType::Oracle => execute_oracle(live, sql).await?,
    };

    Ok(match outcome {
        StatementOutcome::Rows(rows) => {
            tracing::debug!(db_type = %db_type, row_count = rows.len(), "查询返回结果集");
            ExecutionResult::with_rows(db_type, rows)
        }
        StatementOutcome::Executed => {
            tracing::debug!(db_type = %db_type, "语句已执行");
            ExecutionResult::executed(db_type)
        }
    })
}

/// Classifies a driver error raised while running the caller's statement.
fn statement_error(err: sqlx::Error) -> AppError {
    match err {
        sqlx::Error::Io(e) => AppError::DatabaseConnection(e.to_string()),
        sqlx::Error::Tls(e) => AppError::DatabaseConnection(e.to_string()),
        sqlx::Error::ColumnDecode { index, source } => {
            AppError::Internal(format!("could not decode column {}: {}", index, source))
        }
        other => AppError::QueryFailed(other.to_string()),
    }
}

/// Transactional core shared by every `sqlx` backend.
pub(crate) async fn run_in_transaction<DB, F>(
    conn: &mut DB::Connection,
    sql: &str,
    convert: F,
) -> AppResult<StatementOutcome>
where
    DB: Database,
    for<'c> &'c mut DB::Connection: Executor<'c, Database = DB>,
    F: Fn(&DB::Row) -> Result<JsonRow, sqlx::Error>,
{
    // Prepared outside the transaction: a statement the backend cannot
    // prepare (e.g. several statements in one string) must not abort it.
    let declares_rows = match (&mut *conn).describe(sql).await {
        Ok(describe) => Some(!describe.columns().is_empty()),
        Err(e) => {
            tracing::debug!(error = %e, "无法获取语句元数据，按结果流判断");
            None
        }
    };

    let mut tx = conn.begin().await.map_err(statement_error)?;

    let fetched = async {
        let mut rows = Vec::new();
        let mut stream = (&mut *tx).fetch_many(sql);
        while let Some(item) = stream.try_next().await? {
            if let Either::Right(row) = item {
                rows.push(convert(&row)?);
            }
        }
        Ok::<_, sqlx::Error>(rows)
    }
    .await;

    match fetched {
        Ok(rows) => {
            tx.commit().await.map_err(statement_error)?;
            if declares_rows.unwrap_or(false) || !rows.is_empty() {
                Ok(StatementOutcome::Rows(rows))
            } else {
                Ok(StatementOutcome::Executed)
            }
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "回滚失败");
            }
            Err(statement_error(e))
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Text (or, failing that, hex) rendering of a value of unknown type.
fn fallback<R>(row: &R, idx: usize) -> Result<Value, sqlx::Error>
where
    R: Row,
    usize: sqlx::ColumnIndex<R>,
    for<'r> String: sqlx::Decode<'r, R::Database>,
    for<'r> Vec<u8>: sqlx::Decode<'r, R::Database>,
{
    match row.try_get_unchecked::<String, _>(idx) {
        Ok(text) => Ok(Value::String(text)),
        Err(_) => Ok(Value::String(hex(&row.try_get_unchecked::<Vec<u8>, _>(idx)?))),
    }
}

/// Converts a PostgreSQL row into a column-name → value mapping.
fn pg_row_to_json(row: &PgRow) -> Result<JsonRow, sqlx::Error> {
    let mut out = JsonRow::with_capacity(row.len());
    for column in row.columns() {
        let idx = column.ordinal();
        let value = if row.try_get_raw(idx)?.is_null() {
            Value::Null
        } else {
            match column.type_info().name() {
                "BOOL" => json!(row.try_get::<bool, _>(idx)?),
                "INT2" => json!(row.try_get::<i16, _>(idx)?),
                "INT4" => json!(row.try_get::<i32, _>(idx)?),
                "INT8" => json!(row.try_get::<i64, _>(idx)?),
                "FLOAT4" => json!(row.try_get::<f32, _>(idx)?),
                "FLOAT8" => json!(row.try_get::<f64, _>(idx)?),
                "NUMERIC" => Value::String(row.try_get::<Decimal, _>(idx)?.to_string()),
                "UUID" => Value::String(row.try_get::<Uuid, _>(idx)?.to_string()),
                "JSON" | "JSONB" => row.try_get::<Value, _>(idx)?,
                "TIMESTAMPTZ" => Value::String(row.try_get::<DateTime<Utc>, _>(idx)?.to_rfc3339()),
                "TIMESTAMP" => Value::String(
                    row.try_get::<NaiveDateTime, _>(idx)?
                        .format("%Y-%m-%dT%H:%M:%S%.f")
                        .to_string(),
                ),
                "DATE" => Value::String(row.try_get::<NaiveDate, _>(idx)?.to_string()),
                "TIME" => Value::String(row.try_get::<NaiveTime, _>(idx)?.to_string()),
                "BYTEA" => Value::String(hex(&row.try_get::<Vec<u8>, _>(idx)?)),
                _ => fallback(row, idx)?,
            }
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

/// Converts a MySQL row into a column-name → value mapping.
fn mysql_row_to_json(row: &MySqlRow) -> Result<JsonRow, sqlx::Error> {
    let mut out = JsonRow::with_capacity(row.len());
    for column in row.columns() {
        let idx = column.ordinal();
        let value = if row.try_get_raw(idx)?.is_null() {
            Value::Null
        } else {
            match column.type_info().name() {
                "BOOLEAN" => json!(row.try_get::<bool, _>(idx)?),
                "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
                    json!(row.try_get::<i64, _>(idx)?)
                }
                "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
                | "BIGINT UNSIGNED" => json!(row.try_get::<u64, _>(idx)?),
                "FLOAT" => json!(row.try_get::<f32, _>(idx)?),
                "DOUBLE" => json!(row.try_get::<f64, _>(idx)?),
                "DECIMAL" => Value::String(row.try_get::<Decimal, _>(idx)?.to_string()),
                "JSON" => row.try_get::<Value, _>(idx)?,
                "TIMESTAMP" => Value::String(row.try_get::<DateTime<Utc>, _>(idx)?.to_rfc3339()),
                "DATETIME" => Value::String(
                    row.try_get::<NaiveDateTime, _>(idx)?
                        .format("%Y-%m-%dT%H:%M:%S%.f")
                        .to_string(),
                ),
                "DATE" => Value::String(row.try_get::<NaiveDate, _>(idx)?.to_string()),
                "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => {
                    Value::String(hex(&row.try_get_unchecked::<Vec<u8>, _>(idx)?))
                }
                _ => fallback(row, idx)?,
            }
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

#[cfg(feature = "oracle")]
async fn execute_oracle(live: &mut LiveConnection, sql: &str) -> AppResult<StatementOutcome> {
    let conn = live
        .oracle()
        .ok_or_else(|| AppError::Internal("connection already closed".into()))?;
    let sql = sql.to_string();

    tokio::task::spawn_blocking(move || match oracle_support::run_statement(&conn, &sql) {
        Ok(outcome) => {
            conn.commit().map_err(|e| AppError::QueryFailed(e.to_string()))?;
            Ok(outcome)
        }
        Err(e) => {
            if let Err(rollback) = conn.rollback() {
                tracing::warn!(error = %rollback, "回滚失败");
            }
            Err(AppError::QueryFailed(e.to_string()))
        }
    })
    .await?
}

#[cfg(not(feature = "oracle"))]
async fn execute_oracle(_live: &mut LiveConnection, _sql: &str) -> AppResult<StatementOutcome> {
    Err(AppError::DatabaseConnection("oracle support not compiled in".into()))
}

#[cfg(feature = "oracle")]
mod oracle_support {
    use oracle::sql_type::OracleType;
    use oracle::{Connection, SqlValue};
    use serde_json::{json, Value};

    use super::{hex, StatementOutcome};
    use common::models::JsonRow;

    /// Runs one statement; `is_query` comes from the OCI statement metadata.
    pub(super) fn run_statement(conn: &Connection, sql: &str) -> oracle::Result<StatementOutcome> {
        let mut stmt = conn.statement(sql).build()?;
        if !stmt.is_query() {
            stmt.execute(&[])?;
            return Ok(StatementOutcome::Executed);
        }

        let result_set = stmt.query(&[])?;
        let names: Vec<String> = result_set
            .column_info()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let mut rows = Vec::new();
        for row in result_set {
            let row = row?;
            let mut out = JsonRow::with_capacity(names.len());
            for (name, value) in names.iter().zip(row.sql_values()) {
                out.insert(name.clone(), to_json(value)?);
            }
            rows.push(out);
        }
        Ok(StatementOutcome::Rows(rows))
    }

    fn to_json(value: &SqlValue) -> oracle::Result<Value> {
        if value.is_null()? {
            return Ok(Value::Null);
        }
        Ok(match value.oracle_type()? {
            OracleType::Int64 => json!(value.get::<i64>()?),
            OracleType::UInt64 => json!(value.get::<u64>()?),
            OracleType::BinaryFloat | OracleType::BinaryDouble | OracleType::Float(_) => {
                json!(value.get::<f64>()?)
            }
            // Integral NUMBERs become JSON integers; scaled ones keep full precision as text.
            OracleType::Number(_, scale) if *scale <= 0 => match value.get::<i64>() {
                Ok(n) => json!(n),
                Err(_) => Value::String(value.get::<String>()?),
            },
            OracleType::Raw(_) | OracleType::LongRaw | OracleType::BLOB => {
                Value::String(hex(&value.get::<Vec<u8>>()?))
            }
            _ => Value::String(value.get::<String>()?),
        })
    }
}
