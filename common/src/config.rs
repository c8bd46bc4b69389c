// Configuration management with layered configuration (defaults, file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub composer: ComposerConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Metadata store holding template documents and DSN records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposerConfig {
    /// Upper bound on opening the per-request target connection
    pub connect_timeout_seconds: u64,
    /// Value of the `debug` query parameter that enables SQL capture
    #[serde(default = "default_debug_param_value")]
    pub debug_param_value: String,
    #[serde(default)]
    pub attributes: AttributeConfig,
}

fn default_debug_param_value() -> String {
    "1".to_string()
}

/// Schema names used by the EAV join/select tokens and the dictionary loader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeConfig {
    pub table: String,
    pub id_column: String,
    pub entity_column: String,
    pub value_column: String,
    pub entity_key: String,
    pub dictionary_query: String,
}

impl Default for AttributeConfig {
    fn default() -> Self {
        Self {
            table: "fty_obj_attr".to_string(),
            id_column: "attr_sid".to_string(),
            entity_column: "obj_sid".to_string(),
            value_column: "attr_value".to_string(),
            entity_key: "fty_product.sid".to_string(),
            dictionary_query: "SELECT code, sid FROM fty_dictionary_type".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    pub tracing_endpoint: Option<String>,
}

fn default_metrics_enabled() -> bool {
    true
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let defaults = Config::try_from(&Settings::default())?;

        let builder = Config::builder()
            // Start with the built-in defaults
            .add_source(defaults)
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port must be greater than 0".to_string());
        }

        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }

        if self.composer.connect_timeout_seconds == 0 {
            return Err("Composer connect_timeout_seconds must be greater than 0".to_string());
        }
        if !crate::token::attrs::schema_is_valid(&self.composer.attributes) {
            return Err("Composer attribute schema names must be plain SQL identifiers".to_string());
        }
        if self.composer.attributes.dictionary_query.trim().is_empty() {
            return Err("Composer dictionary_query cannot be empty".to_string());
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/sql_composer".to_string(),
                max_connections: 10,
                min_connections: 1,
                connect_timeout_seconds: 30,
            },
            composer: ComposerConfig {
                connect_timeout_seconds: 10,
                debug_param_value: default_debug_param_value(),
                attributes: AttributeConfig::default(),
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                metrics_enabled: true,
                tracing_endpoint: None,
            },
        }
    }
}
