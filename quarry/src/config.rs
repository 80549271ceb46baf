//! # Configuration Module
//!
//! Declarative connection settings for a [`DatabaseManager`](crate::DatabaseManager).
//! Both types deserialize with serde, so they can come from JSON, TOML or any
//! other format the application already reads.
//!
//! ```json
//! {
//!   "default": "main",
//!   "log_queries": true,
//!   "connections": {
//!     "main": { "driver": "sqlite", "database": ":memory:" },
//!     "reporting": {
//!       "driver": "pgsql",
//!       "host": "db.internal",
//!       "database": "reports",
//!       "username": "app",
//!       "password": "secret",
//!       "max_cache_size": 250
//!     }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use crate::{Error, connection::ConnectionBuilder, database::Drivers, statement_cache::DEFAULT_MAX_CACHE_SIZE};

fn default_connection_name() -> String {
    "default".to_string()
}

fn default_log_queries() -> bool {
    true
}

fn default_cache_size() -> usize {
    DEFAULT_MAX_CACHE_SIZE
}

/// The named connections known to a manager.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_connection_name")]
    pub default: String,
    #[serde(default = "default_log_queries")]
    pub log_queries: bool,
    #[serde(default)]
    pub connections: HashMap<String, ConnectionConfig>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { default: default_connection_name(), log_queries: default_log_queries(), connections: HashMap::new() }
    }
}

impl DatabaseConfig {
    pub fn new(default: impl Into<String>) -> Self {
        Self { default: default.into(), ..Self::default() }
    }

    pub fn with_connection(mut self, name: impl Into<String>, config: ConnectionConfig) -> Self {
        self.connections.insert(name.into(), config);
        self
    }
}

/// Settings for one connection.
///
/// Either `dsn` is given verbatim, or it is assembled from the discrete fields
/// (`database`/`path`/`file` for SQLite, `host`/`port`/`database`/`username`/
/// `password` for MySQL and PostgreSQL).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionConfig {
    pub driver: String,
    #[serde(default)]
    pub dsn: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub persistent: bool,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default = "default_cache_size")]
    pub max_cache_size: usize,
}

impl ConnectionConfig {
    pub fn sqlite(database: impl Into<String>) -> Self {
        Self {
            driver: "sqlite".to_string(),
            database: Some(database.into()),
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            ..Self::default()
        }
    }

    /// The DSN string handed to [`Dsn::parse`](crate::Dsn::parse).
    pub fn to_dsn(&self) -> Result<String, Error> {
        if let Some(dsn) = &self.dsn {
            return Ok(dsn.clone());
        }

        match Drivers::from_name(&self.driver)? {
            Drivers::SQLite => match (&self.database, &self.path, &self.file) {
                (Some(database), _, _) if database == ":memory:" => Ok("sqlite::memory:".to_string()),
                (_, Some(path), Some(file)) => Ok(format!("sqlite:{}/{}", path.trim_end_matches('/'), file)),
                (Some(database), _, _) => Ok(format!("sqlite:{}", database)),
                (None, _, Some(file)) => Ok(format!("sqlite:{}", file)),
                _ => Err(Error::configuration("sqlite connection needs a database, path or file")),
            },
            driver => {
                let mut parts = vec![format!("host={}", self.host.as_deref().unwrap_or("localhost"))];
                if let Some(port) = self.port {
                    parts.push(format!("port={}", port));
                }
                if let Some(database) = &self.database {
                    parts.push(format!("dbname={}", database));
                }
                if let Some(username) = &self.username {
                    parts.push(format!("user={}", username));
                }
                if let Some(password) = &self.password {
                    parts.push(format!("password={}", password));
                }
                Ok(format!("{}:{}", driver.name(), parts.join(";")))
            }
        }
    }

    /// A connection builder carrying every setting except the query log.
    pub fn builder(&self, name: &str) -> Result<ConnectionBuilder, Error> {
        Ok(crate::Connection::configure(self.to_dsn()?)
            .name(name)
            .persistent(self.persistent)
            .options(self.options.clone())
            .max_cache_size(self.max_cache_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_memory_dsn() {
        assert_eq!(ConnectionConfig::sqlite(":memory:").to_dsn().unwrap(), "sqlite::memory:");
    }

    #[test]
    fn query_log_is_on_unless_turned_off() {
        assert!(DatabaseConfig::default().log_queries);

        let config: DatabaseConfig = serde_json::from_str(r#"{ "default": "main" }"#).unwrap();
        assert!(config.log_queries);

        let config: DatabaseConfig = serde_json::from_str(r#"{ "default": "main", "log_queries": false }"#).unwrap();
        assert!(!config.log_queries);
    }

    #[test]
    fn sqlite_path_and_file() {
        let config = ConnectionConfig {
            driver: "sqlite".into(),
            path: Some("/var/data/".into()),
            file: Some("app.db".into()),
            ..ConnectionConfig::default()
        };
        assert_eq!(config.to_dsn().unwrap(), "sqlite:/var/data/app.db");
    }

    #[test]
    fn server_dsn_from_fields() {
        let config = ConnectionConfig {
            driver: "mysql".into(),
            host: Some("db".into()),
            port: Some(3307),
            database: Some("shop".into()),
            username: Some("root".into()),
            ..ConnectionConfig::default()
        };
        assert_eq!(config.to_dsn().unwrap(), "mysql:host=db;port=3307;dbname=shop;user=root");
    }

    #[test]
    fn unknown_driver_is_rejected() {
        let config = ConnectionConfig { driver: "oracle".into(), ..ConnectionConfig::default() };
        assert!(matches!(config.to_dsn(), Err(Error::Configuration(_))));
    }
}
