//! Error types for the realm agent.
//!
//! Startup failures (`ConfigError`, `LoadError`, `FactoryError`) abort realm construction.
//! Per-request failures (`SerializationError`, `EngineError`, `RealmError`) are folded into
//! a denied result by [`crate::realm::RealmFacade`] and never reach the host as faults.

use thiserror::Error;

/// Result type alias for realm operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by plugin constructors
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Type or resource loading error
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// Plugin instantiation error
    #[error("Plugin factory error: {0}")]
    Factory(#[from] FactoryError),

    /// Session snapshot error
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Authorization engine error
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Realm state error
    #[error("Realm error: {0}")]
    Realm(#[from] RealmError),
}

/// Configuration errors, always fatal at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required value absent or empty
    #[error("missing configuration: {0}")]
    Missing(String),

    /// Value present but unusable
    #[error("malformed configuration: {0}")]
    Malformed(String),

    /// Layered settings could not be read
    #[error("settings error: {0}")]
    Settings(#[from] config::ConfigError),
}

/// Loading errors raised by a [`crate::loader::LoadingContext`]
#[derive(Debug, Error)]
pub enum LoadError {
    /// Nothing in the loader chain declares the type
    #[error("type not found: {0}")]
    NotFound(String),

    /// A plugin library was built against another plugin API
    #[error("plugin library incompatible: {0}")]
    Incompatible(String),

    /// The dynamic library could not be opened or lacks its declaration
    #[error("dynamic library error: {0}")]
    Library(#[from] libloading::Error),

    /// A location could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Plugin factory errors, all fatal at startup
#[derive(Debug, Error)]
pub enum FactoryError {
    /// The plugin type could not be resolved
    #[error("plugin type not found: {type_name}")]
    NotFound {
        type_name: String,
        #[source]
        source: LoadError,
    },

    /// The plugin constructor failed
    #[error("plugin type {type_name} could not be instantiated: {reason}")]
    InstantiationFailed { type_name: String, reason: String },

    /// The plugin type is not visible to the host
    #[error("plugin type {0} is not accessible to the host")]
    AccessDenied(String),
}

/// Session snapshot errors
#[derive(Debug, Error)]
pub enum SerializationError {
    /// Encoder or decoder stream failure
    #[error("snapshot I/O failure: {0}")]
    Io(String),

    /// Snapshot text contains a character outside the single-byte range
    #[error("snapshot encoding invalid: {0}")]
    BadEncoding(String),

    /// Decoded bytes are not a session snapshot
    #[error("snapshot type not recognized: {0}")]
    UnrecognizedType(String),
}

impl From<bincode::Error> for SerializationError {
    fn from(err: bincode::Error) -> Self {
        match *err {
            bincode::ErrorKind::Io(ref io) => SerializationError::Io(io.to_string()),
            ref other => SerializationError::UnrecognizedType(other.to_string()),
        }
    }
}

/// Errors reported by the external authorization engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Password check failed
    #[error("invalid credentials for user {0}")]
    InvalidCredentials(String),

    /// Unknown user
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Unknown role
    #[error("role not found: {0}")]
    RoleNotFound(String),

    /// Engine could not be reached or timed out
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// Any other engine failure
    #[error("engine failure: {0}")]
    Internal(String),
}

/// Realm state errors
#[derive(Debug, Error)]
pub enum RealmError {
    /// The identity token does not carry a live session
    #[error("identity token for {subject} carries no session: {reason}")]
    SessionMissing { subject: String, reason: String },
}
