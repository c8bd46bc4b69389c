// Target database access
//
// A target connection is opened per request from a connection descriptor,
// runs the rendered statements and is closed before the response is built.

pub mod mysql;
pub mod postgres;

use crate::composer::sql::Dialect;
use crate::errors::TargetError;
use crate::models::{ConnectionDescriptor, DriverKind};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// One result row, columns in select order
pub type Row = serde_json::Map<String, Value>;

/// An open connection to a target database
#[async_trait]
pub trait TargetConnection: Send {
    /// Placeholder convention expected by this connection
    fn dialect(&self) -> Dialect;

    /// Run a statement and collect every row
    async fn fetch_rows(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Row>, TargetError>;

    /// Run a statement returning a single integer (first column of first row)
    async fn fetch_scalar(&mut self, sql: &str, args: &[Value]) -> Result<i64, TargetError>;

    /// Release the connection
    async fn close(self: Box<Self>) -> Result<(), TargetError>;
}

/// Opens target connections from descriptors
#[async_trait]
pub trait TargetConnector: Send + Sync {
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn TargetConnection>, TargetError>;
}

/// Connector dispatching on the descriptor's driver
#[derive(Debug, Clone)]
pub struct DefaultConnector {
    connect_timeout: Duration,
}

impl DefaultConnector {
    pub fn new(connect_timeout_seconds: u64) -> Self {
        Self {
            connect_timeout: Duration::from_secs(connect_timeout_seconds),
        }
    }
}

#[async_trait]
impl TargetConnector for DefaultConnector {
    #[tracing::instrument(skip(self, descriptor), fields(driver = %descriptor.driver))]
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn TargetConnection>, TargetError> {
        let driver: DriverKind = descriptor
            .driver
            .parse()
            .map_err(|_| TargetError::UnsupportedDriver(descriptor.driver.clone()))?;

        match driver {
            DriverKind::MySql => {
                let conn = mysql::MySqlConnection::connect(&descriptor.dsn, self.connect_timeout).await?;
                Ok(Box::new(conn))
            }
            DriverKind::Postgres => {
                let conn =
                    postgres::PostgresConnection::connect(&descriptor.dsn, self.connect_timeout).await?;
                Ok(Box::new(conn))
            }
        }
    }
}

/// Interpret the first column of the first row as an integer count
pub(crate) fn scalar_from_rows(rows: &[Row]) -> Result<i64, TargetError> {
    let value = rows
        .first()
        .and_then(|row| row.values().next())
        .ok_or_else(|| TargetError::QueryFailed("Scalar query returned no rows".to_string()))?;

    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| TargetError::QueryFailed(format!("Scalar value {} is out of range", n))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| TargetError::QueryFailed(format!("Scalar value '{}' is not an integer", s))),
        Value::Null => Ok(0),
        other => Err(TargetError::QueryFailed(format!(
            "Scalar value {} is not an integer",
            other
        ))),
    }
}
