// MySQL target connection

use super::{scalar_from_rows, Row, TargetConnection};
use crate::composer::sql::Dialect;
use crate::errors::TargetError;
use async_trait::async_trait;
use mysql_async::prelude::*;
use serde_json::{json, Value};
use std::time::Duration;

pub struct MySqlConnection {
    pool: mysql_async::Pool,
    conn: mysql_async::Conn,
}

impl MySqlConnection {
    /// Open a connection; accepts `mysql://` URLs and `user:pass@tcp(host:port)/db` DSNs
    #[tracing::instrument(skip(dsn), fields(database_type = "mysql"))]
    pub async fn connect(dsn: &str, timeout: Duration) -> Result<Self, TargetError> {
        tracing::debug!("Connecting to MySQL database");

        let url = normalize_dsn(dsn)?;
        let opts = mysql_async::Opts::from_url(&url).map_err(|e| {
            TargetError::ConnectionFailed(format!("Invalid MySQL connection string: {}", e))
        })?;

        let pool = mysql_async::Pool::new(opts);
        let conn = match tokio::time::timeout(timeout, pool.get_conn()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                let _ = pool.disconnect().await;
                return Err(TargetError::ConnectionFailed(format!(
                    "Failed to connect to MySQL: {}",
                    e
                )));
            }
            Err(_) => {
                let _ = pool.disconnect().await;
                return Err(TargetError::ConnectionFailed(format!(
                    "Timed out connecting to MySQL after {:?}",
                    timeout
                )));
            }
        };

        Ok(Self { pool, conn })
    }
}

#[async_trait]
impl TargetConnection for MySqlConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Question
    }

    #[tracing::instrument(skip(self, sql, args), fields(args = args.len()))]
    async fn fetch_rows(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Row>, TargetError> {
        let params: Vec<mysql_async::Value> = args.iter().map(to_mysql_value).collect();

        let rows: Vec<mysql_async::Row> = self
            .conn
            .exec(sql, mysql_async::Params::from(params))
            .await
            .map_err(|e| TargetError::QueryFailed(format!("MySQL query failed: {}", e)))?;

        let result: Vec<Row> = rows.iter().map(row_to_json).collect();
        tracing::debug!(rows = result.len(), "MySQL query returned rows");
        Ok(result)
    }

    async fn fetch_scalar(&mut self, sql: &str, args: &[Value]) -> Result<i64, TargetError> {
        let rows = self.fetch_rows(sql, args).await?;
        scalar_from_rows(&rows)
    }

    async fn close(self: Box<Self>) -> Result<(), TargetError> {
        let Self { pool, conn } = *self;
        drop(conn);
        pool.disconnect().await.map_err(|e| {
            TargetError::ConnectionFailed(format!("Failed to disconnect from MySQL: {}", e))
        })
    }
}

/// Convert a Go-driver style DSN into a `mysql://` URL; URLs pass through.
/// Driver options after `?` in the Go form are dropped.
fn normalize_dsn(dsn: &str) -> Result<String, TargetError> {
    let dsn = dsn.trim();
    if dsn.starts_with("mysql://") {
        return Ok(dsn.to_string());
    }

    let invalid = || TargetError::ConnectionFailed(format!("Unrecognized MySQL DSN format: {}", dsn));

    let (credentials, rest) = dsn.rsplit_once('@').ok_or_else(invalid)?;
    let (address, database) = rest.split_once('/').ok_or_else(invalid)?;
    let database = database.split('?').next().unwrap_or_default();

    let host = match address.split_once('(') {
        Some((_protocol, tail)) => tail.strip_suffix(')').ok_or_else(invalid)?,
        None => address,
    };
    if host.is_empty() {
        return Err(invalid());
    }

    Ok(format!("mysql://{}@{}/{}", credentials, host, database))
}

fn to_mysql_value(value: &Value) -> mysql_async::Value {
    match value {
        Value::Null => mysql_async::Value::NULL,
        Value::Bool(b) => mysql_async::Value::Int(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                mysql_async::Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                mysql_async::Value::UInt(u)
            } else {
                mysql_async::Value::Double(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => mysql_async::Value::Bytes(s.clone().into_bytes()),
        other => mysql_async::Value::Bytes(other.to_string().into_bytes()),
    }
}

fn row_to_json(row: &mysql_async::Row) -> Row {
    let mut row_map = Row::new();
    for (i, column) in row.columns_ref().iter().enumerate() {
        let value = row.as_ref(i).map(cell_to_json).unwrap_or(Value::Null);
        row_map.insert(column.name_str().to_string(), value);
    }
    row_map
}

/// Binary and text cells both come back as strings
fn cell_to_json(value: &mysql_async::Value) -> Value {
    match value {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Bytes(bytes) => json!(String::from_utf8_lossy(bytes)),
        mysql_async::Value::Int(i) => json!(i),
        mysql_async::Value::UInt(u) => json!(u),
        mysql_async::Value::Float(f) => json!(f),
        mysql_async::Value::Double(d) => json!(d),
        mysql_async::Value::Date(year, month, day, hour, minute, second, micros) => {
            if *micros > 0 {
                json!(format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
                    year, month, day, hour, minute, second, micros
                ))
            } else {
                json!(format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    year, month, day, hour, minute, second
                ))
            }
        }
        mysql_async::Value::Time(negative, days, hours, minutes, seconds, _micros) => {
            let sign = if *negative { "-" } else { "" };
            let hours = u32::from(*hours) + days * 24;
            json!(format!("{}{:02}:{:02}:{:02}", sign, hours, minutes, seconds))
        }
    }
}
