//! Error types for pgclient.
//!
//! Pool bootstrap failures carry fixed messages and keep the driver error as
//! their source. Driver errors raised later are classified by SQLSTATE.

use thiserror::Error;

/// Message reported when the pool cannot be constructed.
pub const POOL_CREATION_MESSAGE: &str = "Error while creating connection to the database";

/// Message reported when the first connection cannot be checked out.
pub const ACQUIRE_MESSAGE: &str = "Error while acquiring connection from the database pool";

/// Message reported when the startup ping fails.
pub const PING_MESSAGE: &str = "Couldn't send ping to the database";

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PgClientError>;

/// Main error type for pgclient.
#[derive(Debug, Error)]
pub enum PgClientError {
    /// Options are missing or malformed.
    #[error("Config error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },

    /// The pooling library refused to build the pool.
    #[error("{message}")]
    PoolCreation {
        /// Human-readable error message.
        message: String,
        /// Underlying library error.
        #[source]
        source: Option<BoxedSource>,
    },

    /// No connection could be checked out of the pool.
    #[error("{message}")]
    Acquire {
        /// Human-readable error message.
        message: String,
        /// Underlying library error.
        #[source]
        source: Option<BoxedSource>,
    },

    /// The server did not answer the ping.
    #[error("{message}")]
    Ping {
        /// Human-readable error message.
        message: String,
        /// Underlying driver error.
        #[source]
        source: Option<BoxedSource>,
    },

    /// Pool exhausted and the wait timed out.
    #[error("Pool timeout: {message}")]
    PoolTimeout {
        /// Human-readable error message.
        message: String,
        /// Number of tasks waiting for connections.
        waiting: usize,
    },

    /// Connection failed or was lost.
    #[error("Connection error: {message}")]
    Connection {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<BoxedSource>,
    },

    /// The server rejected the credentials.
    #[error("Authentication error: {message}")]
    Authentication {
        /// Human-readable error message.
        message: String,
        /// Actionable hint for the user.
        hint: Option<String>,
    },

    /// Statement failed with PostgreSQL-specific details.
    #[error("{message}")]
    Query {
        /// PostgreSQL error message.
        message: String,
        /// Additional detail from PostgreSQL.
        detail: Option<String>,
        /// PostgreSQL hint.
        hint: Option<String>,
        /// Position in query (1-indexed).
        position: Option<usize>,
        /// PostgreSQL error code (e.g., "42P01").
        code: Option<String>,
    },

    /// Reading a configuration file failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Human-readable error message.
        message: String,
        /// Actionable hint for the user.
        hint: Option<String>,
        /// Optional underlying error source.
        #[source]
        source: Option<BoxedSource>,
    },
}

impl PgClientError {
    // ========== Constructors ==========

    /// Create a new config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Pool construction failed.
    pub fn pool_creation(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::PoolCreation { message: POOL_CREATION_MESSAGE.to_string(), source: Some(Box::new(source)) }
    }

    /// Checking out the first connection failed.
    pub fn acquire(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Acquire { message: ACQUIRE_MESSAGE.to_string(), source: Some(Box::new(source)) }
    }

    /// The startup ping failed.
    pub fn ping(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Ping { message: PING_MESSAGE.to_string(), source: Some(Box::new(source)) }
    }

    /// Create a new pool timeout error.
    pub fn pool_timeout(message: impl Into<String>, waiting: usize) -> Self {
        Self::PoolTimeout { message: message.into(), waiting }
    }

    /// Create a new connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Create a new connection error with source.
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Box::new(source)) }
    }

    // ========== Methods ==========

    /// Whether this error happened while bringing the pool up.
    pub fn is_startup_failure(&self) -> bool {
        matches!(self, Self::PoolCreation { .. } | Self::Acquire { .. } | Self::Ping { .. })
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "Config",
            Self::PoolCreation { .. } | Self::Acquire { .. } | Self::PoolTimeout { .. } => "Pool",
            Self::Ping { .. } | Self::Connection { .. } => "Connection",
            Self::Authentication { .. } => "Authentication",
            Self::Query { .. } => "Query",
            Self::Storage { .. } => "Storage",
        }
    }

    /// Get actionable hint for the user.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Config { .. } => Some("Check the host, database, username and pool size settings"),
            Self::PoolCreation { .. } => Some("Check the pool settings"),
            Self::Acquire { .. } | Self::Ping { .. } | Self::Connection { .. } => {
                Some("Check that the database server is running")
            }
            Self::PoolTimeout { .. } => Some("Increase the pool size or release connections sooner"),
            Self::Authentication { hint, .. } => hint.as_deref(),
            Self::Query { hint, .. } => hint.as_deref(),
            Self::Storage { hint, .. } => hint.as_deref(),
        }
    }

    /// Get PostgreSQL error code (if applicable).
    pub fn pg_code(&self) -> Option<&str> {
        match self {
            Self::Query { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Get position in query (if applicable).
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Query { position, .. } => *position,
            _ => None,
        }
    }
}

// ========== Error Conversions ==========

/// Convert from tokio_postgres::Error to PgClientError.
impl From<tokio_postgres::Error> for PgClientError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let message = db_err.message().to_string();
            let detail = db_err.detail().map(String::from);
            let hint = db_err.hint().map(String::from);
            let position = db_err.position().and_then(|p| match p {
                tokio_postgres::error::ErrorPosition::Original(pos) => Some(*pos as usize),
                tokio_postgres::error::ErrorPosition::Internal { .. } => None,
            });
            let code_str = db_err.code().code();

            return match code_str {
                "28P01" => PgClientError::Authentication {
                    message,
                    hint: Some("Invalid password - check your credentials".to_string()),
                },
                _ if code_str.starts_with("28") => PgClientError::Authentication {
                    message,
                    hint: Some("Authentication failed - check username and permissions".to_string()),
                },
                _ if code_str.starts_with("08") => {
                    PgClientError::Connection { message, source: Some(Box::new(err)) }
                }
                _ => PgClientError::Query {
                    message,
                    detail,
                    hint,
                    position,
                    code: Some(code_str.to_string()),
                },
            };
        }

        if err.is_closed() {
            return PgClientError::Connection {
                message: "Connection closed".to_string(),
                source: Some(Box::new(err)),
            };
        }

        PgClientError::Connection { message: err.to_string(), source: Some(Box::new(err)) }
    }
}

/// Convert from std::io::Error to PgClientError.
impl From<std::io::Error> for PgClientError {
    fn from(err: std::io::Error) -> Self {
        PgClientError::Storage {
            message: err.to_string(),
            hint: Some("Check that the config file exists and is readable".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

/// Convert from serde_json::Error to PgClientError.
impl From<serde_json::Error> for PgClientError {
    fn from(err: serde_json::Error) -> Self {
        PgClientError::Storage {
            message: format!("JSON error: {err}"),
            hint: Some("Config file must be a JSON object with host, database and username".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_startup_errors_use_fixed_messages() {
        let io = || std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");

        let err = PgClientError::pool_creation(io());
        assert_eq!(err.to_string(), POOL_CREATION_MESSAGE);
        assert!(err.source().is_some());

        let err = PgClientError::acquire(io());
        assert_eq!(err.to_string(), ACQUIRE_MESSAGE);
        assert_eq!(err.source().map(|s| s.to_string()), Some("refused".to_string()));

        let err = PgClientError::ping(io());
        assert_eq!(err.to_string(), PING_MESSAGE);
        assert!(err.is_startup_failure());
    }

    #[test]
    fn test_categories_and_hints() {
        assert_eq!(PgClientError::config("x").category(), "Config");
        assert_eq!(PgClientError::pool_timeout("x", 3).category(), "Pool");
        assert_eq!(PgClientError::connection("x").category(), "Connection");
        assert!(PgClientError::connection("x").hint().is_some());
        assert!(!PgClientError::connection("x").is_startup_failure());
    }

    #[test]
    fn test_query_error_accessors() {
        let err = PgClientError::Query {
            message: "relation \"missing\" does not exist".to_string(),
            detail: None,
            hint: None,
            position: Some(15),
            code: Some("42P01".to_string()),
        };
        assert_eq!(err.pg_code(), Some("42P01"));
        assert_eq!(err.position(), Some(15));
        assert_eq!(err.to_string(), "relation \"missing\" does not exist");
    }

    #[test]
    fn test_json_error_maps_to_storage() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = PgClientError::from(json_err);
        assert_eq!(err.category(), "Storage");
        assert!(err.to_string().starts_with("Storage error: JSON error:"));
    }
}
