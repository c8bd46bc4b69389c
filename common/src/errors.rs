// Error handling framework
// One enum per layer; conversions happen at the layer boundary.

use thiserror::Error;

/// Request-level failures surfaced by the execution orchestrator
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Connection resolution failed: {0}")]
    ConnectionResolutionFailed(String),

    #[error("Request decode failed: {0}")]
    RequestDecodeFailed(String),

    #[error("Template parse failed: {0}")]
    TemplateParseFailed(String),

    #[error("Token resolution failed: {0}")]
    TokenResolutionFailed(String),

    #[error("Render failed: {0}")]
    RenderFailed(String),

    #[error("Execution of subject '{subject}' failed: {message}")]
    ExecutionFailed {
        subject: String,
        message: String,
        sql: String,
    },
}

/// Coarse HTTP-facing classification of a [`QueryError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    NotFound,
    BadInput,
    Execution,
}

impl QueryError {
    /// Stable machine-readable code, used for logs and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::TemplateNotFound(_) => "template_not_found",
            QueryError::ConnectionResolutionFailed(_) => "connection_resolution_failed",
            QueryError::RequestDecodeFailed(_) => "request_decode_failed",
            QueryError::TemplateParseFailed(_) => "template_parse_failed",
            QueryError::TokenResolutionFailed(_) => "token_resolution_failed",
            QueryError::RenderFailed(_) => "render_failed",
            QueryError::ExecutionFailed { .. } => "execution_failed",
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            QueryError::TemplateNotFound(_) => FailureClass::NotFound,
            QueryError::ExecutionFailed { .. } => FailureClass::Execution,
            _ => FailureClass::BadInput,
        }
    }

    /// The statement text attached to the failure, if execution had begun
    pub fn sql(&self) -> Option<&str> {
        match self {
            QueryError::ExecutionFailed { sql, .. } => Some(sql.as_str()),
            _ => None,
        }
    }
}

/// Failures while rendering one subject of a template
#[derive(Error, Debug, PartialEq)]
pub enum ComposeError {
    #[error("Unknown subject: {0}")]
    UnknownSubject(String),

    #[error("Unresolved token '{0}'")]
    UnresolvedToken(String),

    #[error("Token '{name}' failed: {source}")]
    TokenFailed {
        name: String,
        #[source]
        source: TokenError,
    },

    #[error("Malformed placeholder near '{0}'")]
    MalformedPlaceholder(String),

    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Invalid filter on '{attr}': {reason}")]
    InvalidFilter { attr: String, reason: String },

    #[error("Statement has {placeholders} placeholders but {arguments} arguments")]
    PlaceholderMismatch {
        placeholders: usize,
        arguments: usize,
    },

    #[error("Pipeline '{name}' failed: {reason}")]
    PipelineFailed { name: String, reason: String },
}

impl ComposeError {
    pub fn is_token_failure(&self) -> bool {
        matches!(
            self,
            ComposeError::UnresolvedToken(_) | ComposeError::TokenFailed { .. }
        )
    }
}

impl From<ComposeError> for QueryError {
    fn from(err: ComposeError) -> Self {
        if err.is_token_failure() {
            QueryError::TokenResolutionFailed(err.to_string())
        } else {
            QueryError::RenderFailed(err.to_string())
        }
    }
}

/// Failures raised by token factories and replacers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TokenError {
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Attribute code '{0}' has no dictionary entry")]
    UnknownAttribute(String),

    #[error("Attribute dictionary is not loaded")]
    DictionaryNotLoaded,
}

/// Template document parse errors
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Invalid template document: {0}")]
    InvalidDocument(String),

    #[error("Template has no subjects")]
    NoSubjects,

    #[error("Template subject '{0}' is empty")]
    EmptySubject(String),
}

impl From<serde_yaml::Error> for TemplateError {
    fn from(err: serde_yaml::Error) -> Self {
        TemplateError::InvalidDocument(err.to_string())
    }
}

impl From<TemplateError> for QueryError {
    fn from(err: TemplateError) -> Self {
        QueryError::TemplateParseFailed(err.to_string())
    }
}

/// Target database (per-request connection) errors
#[derive(Error, Debug)]
pub enum TargetError {
    #[error("Unsupported driver: {0}")]
    UnsupportedDriver(String),

    #[error("Target connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Target query failed: {0}")]
    QueryFailed(String),
}

/// Metadata-store errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate key violation: {0}")]
    DuplicateKey(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => match db_err.code() {
                Some(code) if code.as_ref() == "23505" => {
                    DatabaseError::DuplicateKey(db_err.message().to_string())
                }
                _ => DatabaseError::QueryFailed(db_err.message().to_string()),
            },
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::MigrationFailed(err.to_string())
    }
}
