use chrono::{DateTime, Utc};
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Metadata Models
// ============================================================================

/// A stored query template document, addressed by `path`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DocRecord {
    pub id: i64,
    pub path: String,
    pub db_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A named target-database connection record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DsnRecord {
    pub id: i64,
    pub name: String,
    pub driver: String,
    pub dsn: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DsnRecord {
    pub fn descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor {
            driver: self.driver.clone(),
            dsn: self.dsn.clone(),
        }
    }
}

/// Connection parameters resolved from the DSN registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub driver: String,
    pub dsn: String,
}

/// Supported target database drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    MySql,
    Postgres,
}

impl FromStr for DriverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(DriverKind::MySql),
            "postgres" | "postgresql" | "pg" => Ok(DriverKind::Postgres),
            other => Err(format!("unsupported driver '{}'", other)),
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::MySql => write!(f, "mysql"),
            DriverKind::Postgres => write!(f, "postgres"),
        }
    }
}

/// Fields of a new template document
#[derive(Debug, Clone, Deserialize)]
pub struct NewDoc {
    pub path: String,
    pub db_name: String,
    pub content: String,
}

/// Partial update of a template document; absent fields are kept
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocPatch {
    pub path: Option<String>,
    pub db_name: Option<String>,
    pub content: Option<String>,
}

/// Fields of a new DSN record
#[derive(Debug, Clone, Deserialize)]
pub struct NewDsn {
    pub name: String,
    pub driver: String,
    pub dsn: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DsnPatch {
    pub name: Option<String>,
    pub driver: Option<String>,
    pub dsn: Option<String>,
}

// ============================================================================
// Request Models
// ============================================================================

/// Filter comparison operators accepted from callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=", alias = "eq")]
    Eq,
    #[serde(rename = "!=", alias = "<>", alias = "ne")]
    Ne,
    #[serde(rename = ">", alias = "gt")]
    Gt,
    #[serde(rename = ">=", alias = "gte")]
    Gte,
    #[serde(rename = "<", alias = "lt")]
    Lt,
    #[serde(rename = "<=", alias = "lte")]
    Lte,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not in", alias = "not_in")]
    NotIn,
    #[serde(rename = "like")]
    Like,
    #[serde(rename = "not like", alias = "not_like")]
    NotLike,
    #[serde(rename = "is null", alias = "is_null")]
    IsNull,
    #[serde(rename = "is not null", alias = "is_not_null")]
    IsNotNull,
    #[serde(rename = "between")]
    Between,
}

impl Operator {
    /// SQL keyword for the binary operators
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
            Operator::Between => "BETWEEN",
        }
    }
}

/// A caller-supplied predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub attr: String,
    pub op: Operator,
    #[serde(default)]
    pub val: serde_json::Value,
}

impl Filter {
    pub fn new(attr: impl Into<String>, op: Operator, val: serde_json::Value) -> Self {
        Self {
            attr: attr.into(),
            op,
            val,
        }
    }

    /// Check that the value shape fits the operator
    pub fn validate(&self) -> Result<(), String> {
        use serde_json::Value;

        match (self.op, &self.val) {
            (Operator::IsNull | Operator::IsNotNull, _) => Ok(()),
            (_, Value::Object(_)) => Err("object values are not supported".to_string()),
            (Operator::In | Operator::NotIn, Value::Array(items)) => {
                if items.is_empty() {
                    Err("membership requires a non-empty array".to_string())
                } else if items.iter().any(|v| !is_scalar(v)) {
                    Err("membership values must be scalars".to_string())
                } else {
                    Ok(())
                }
            }
            (Operator::In | Operator::NotIn, _) => {
                Err("membership requires an array value".to_string())
            }
            (Operator::Between, Value::Array(items)) => {
                if items.len() != 2 || items.iter().any(|v| !is_scalar(v)) {
                    Err("between requires exactly two scalar values".to_string())
                } else {
                    Ok(())
                }
            }
            (Operator::Between, _) => Err("between requires an array value".to_string()),
            (_, Value::Array(_)) => Err("comparison requires a scalar value".to_string()),
            (_, Value::Null) => Err("comparison against null, use 'is null'".to_string()),
            _ => Ok(()),
        }
    }
}

fn is_scalar(value: &serde_json::Value) -> bool {
    !matches!(
        value,
        serde_json::Value::Array(_) | serde_json::Value::Object(_)
    )
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    /// Case-insensitive "asc" is ascending; anything else, including an
    /// empty string, is descending.
    pub fn parse_lenient(text: &str) -> Self {
        if text.trim().eq_ignore_ascii_case("asc") {
            Direction::Asc
        } else {
            Direction::Desc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// One ordering term, decoded from `[field]` or `[field, direction]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: Direction,
}

impl SortSpec {
    pub fn new(field: impl Into<String>, direction: Direction) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

impl<'de> Deserialize<'de> for SortSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SortSpecVisitor;

        impl<'de> Visitor<'de> for SortSpecVisitor {
            type Value = SortSpec;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an array of [field] or [field, direction]")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<SortSpec, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let field: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let direction: Option<String> = seq.next_element()?;
                if seq.next_element::<de::IgnoredAny>()?.is_some() {
                    return Err(de::Error::invalid_length(3, &self));
                }

                Ok(SortSpec {
                    field,
                    direction: Direction::parse_lenient(direction.as_deref().unwrap_or("")),
                })
            }
        }

        deserializer.deserialize_seq(SortSpecVisitor)
    }
}

/// Request body for the execute endpoint
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default, alias = "pageIndex")]
    pub page_index: i64,
    #[serde(default, alias = "pageLimit")]
    pub page_limit: i64,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub sorts: Vec<SortSpec>,
}

impl ExecuteRequest {
    /// Decode a request body; an empty body is the default request
    pub fn from_slice(body: &[u8]) -> Result<Self, String> {
        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Self::default());
        }

        let request: ExecuteRequest = serde_json::from_slice(body).map_err(|e| e.to_string())?;
        for filter in &request.filters {
            filter
                .validate()
                .map_err(|reason| format!("filter on '{}': {}", filter.attr, reason))?;
        }
        Ok(request)
    }
}

/// Response body for the execute endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<serde_json::Map<String, serde_json::Value>>>,
    #[serde(default)]
    pub sql: BTreeMap<String, String>,
    pub exec_time: String,
}
