// PostgreSQL target connection

use super::{scalar_from_rows, Row, TargetConnection};
use crate::composer::sql::Dialect;
use crate::errors::TargetError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::types::{Decimal, Uuid};
use sqlx::{Column, PgPool, Postgres, Row as _, TypeInfo, ValueRef};
use std::time::Duration;

pub struct PostgresConnection {
    pool: PgPool,
}

impl PostgresConnection {
    #[tracing::instrument(skip(dsn), fields(database_type = "postgresql"))]
    pub async fn connect(dsn: &str, timeout: Duration) -> Result<Self, TargetError> {
        tracing::debug!("Connecting to PostgreSQL database");

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(timeout)
            .connect(dsn)
            .await
            .map_err(|e| {
                TargetError::ConnectionFailed(format!("Failed to connect to PostgreSQL: {}", e))
            })?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl TargetConnection for PostgresConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Dollar
    }

    #[tracing::instrument(skip(self, sql, args), fields(args = args.len()))]
    async fn fetch_rows(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Row>, TargetError> {
        let query = args
            .iter()
            .fold(sqlx::query(sql), |query, arg| bind_json(query, arg));

        let rows = query.fetch_all(&self.pool).await.map_err(|e| {
            TargetError::QueryFailed(format!("PostgreSQL query failed: {}", e))
        })?;

        let result: Vec<Row> = rows.iter().map(row_to_json).collect();
        tracing::debug!(rows = result.len(), "PostgreSQL query returned rows");
        Ok(result)
    }

    async fn fetch_scalar(&mut self, sql: &str, args: &[Value]) -> Result<i64, TargetError> {
        let rows = self.fetch_rows(sql, args).await?;
        scalar_from_rows(&rows)
    }

    async fn close(self: Box<Self>) -> Result<(), TargetError> {
        self.pool.close().await;
        Ok(())
    }
}

fn bind_json<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(sqlx::types::Json(other.clone())),
    }
}

fn row_to_json(row: &PgRow) -> Row {
    let mut row_map = Row::new();

    for (i, column) in row.columns().iter().enumerate() {
        let value = match column_value(row, i) {
            Some(value) => value,
            None => {
                tracing::warn!(
                    column = column.name(),
                    column_type = column.type_info().name(),
                    "Unsupported PostgreSQL column type, returning null"
                );
                Value::Null
            }
        };

        row_map.insert(column.name().to_string(), value);
    }

    row_map
}

/// Decode one column, `None` when no known Rust type matches it
fn column_value(row: &PgRow, i: usize) -> Option<Value> {
    match row.try_get_raw(i) {
        Ok(raw) if raw.is_null() => return Some(Value::Null),
        Ok(_) => {}
        Err(_) => return None,
    }

    let value = if let Ok(v) = row.try_get::<String, _>(i) {
        json!(v)
    } else if let Ok(v) = row.try_get::<i16, _>(i) {
        json!(v)
    } else if let Ok(v) = row.try_get::<i32, _>(i) {
        json!(v)
    } else if let Ok(v) = row.try_get::<i64, _>(i) {
        json!(v)
    } else if let Ok(v) = row.try_get::<f32, _>(i) {
        json!(v)
    } else if let Ok(v) = row.try_get::<f64, _>(i) {
        json!(v)
    } else if let Ok(v) = row.try_get::<Decimal, _>(i) {
        // Kept as text so no precision is lost
        json!(v.to_string())
    } else if let Ok(v) = row.try_get::<bool, _>(i) {
        json!(v)
    } else if let Ok(v) = row.try_get::<Uuid, _>(i) {
        json!(v.to_string())
    } else if let Ok(v) = row.try_get::<chrono::NaiveDateTime, _>(i) {
        json!(v.to_string())
    } else if let Ok(v) = row.try_get::<chrono::DateTime<Utc>, _>(i) {
        json!(v.to_rfc3339())
    } else if let Ok(v) = row.try_get::<chrono::NaiveDate, _>(i) {
        json!(v.to_string())
    } else if let Ok(v) = row.try_get::<chrono::NaiveTime, _>(i) {
        json!(v.to_string())
    } else if let Ok(v) = row.try_get::<Value, _>(i) {
        v
    } else if let Ok(v) = row.try_get::<Vec<u8>, _>(i) {
        json!(String::from_utf8_lossy(&v))
    } else if let Ok(v) = row.try_get::<Vec<Option<String>>, _>(i) {
        json!(v)
    } else if let Ok(v) = row.try_get::<Vec<Option<i16>>, _>(i) {
        json!(v)
    } else if let Ok(v) = row.try_get::<Vec<Option<i32>>, _>(i) {
        json!(v)
    } else if let Ok(v) = row.try_get::<Vec<Option<i64>>, _>(i) {
        json!(v)
    } else if let Ok(v) = row.try_get::<Vec<Option<f64>>, _>(i) {
        json!(v)
    } else if let Ok(v) = row.try_get::<Vec<Option<bool>>, _>(i) {
        json!(v)
    } else if let Ok(v) = row.try_get::<Vec<Option<Decimal>>, _>(i) {
        json!(v
            .iter()
            .map(|d| d.map(|d| d.to_string()))
            .collect::<Vec<_>>())
    } else if let Ok(v) = row.try_get::<Vec<Option<Uuid>>, _>(i) {
        json!(v
            .iter()
            .map(|u| u.map(|u| u.to_string()))
            .collect::<Vec<_>>())
    } else {
        return None;
    };

    Some(value)
}
