use crate::engine::DEFAULT_CONTEXT_ID;
use crate::loader::ResolutionOrder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Realm configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealmConfig {
    /// OS-delimited list of plugin directories and libraries
    pub classpath: Option<String>,

    /// Plugin type name; the built-in default when absent or empty
    pub implementation: Option<String>,

    /// Comma-delimited roles every authentication is scoped to
    pub default_roles: Option<String>,

    /// Context (tenant) id forwarded to every engine call
    pub context_id: String,

    /// How the plugin is loaded
    pub loader_mode: LoaderMode,

    /// Properties handed to the plugin constructor
    pub properties: HashMap<String, String>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for RealmConfig {
    fn default() -> Self {
        Self {
            classpath: None,
            implementation: None,
            default_roles: None,
            context_id: DEFAULT_CONTEXT_ID.to_string(),
            loader_mode: LoaderMode::default(),
            properties: HashMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Plugin loading strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderMode {
    /// Classpath searched before the host
    #[default]
    Isolated,
    /// Host searched before the classpath
    Delegating,
    /// No classpath; types come from the host only
    Host,
}

impl LoaderMode {
    /// Resolution order of the classpath loader, `None` when no classpath is used
    pub fn resolution_order(&self) -> Option<ResolutionOrder> {
        match self {
            LoaderMode::Isolated => Some(ResolutionOrder::ChildFirst),
            LoaderMode::Delegating => Some(ResolutionOrder::ParentFirst),
            LoaderMode::Host => None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (error, warn, info, debug, trace)
    pub level: String,

    /// Log format
    pub format: LogFormat,

    /// Enable console output
    pub console: bool,

    /// Enable file output
    pub file: bool,

    /// Directory for log files
    pub directory: Option<PathBuf>,

    /// File rotation
    pub rotation: RotationStrategy,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            console: true,
            file: false,
            directory: None,
            rotation: RotationStrategy::Daily,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationStrategy {
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "hourly")]
    Hourly,
    #[serde(rename = "never")]
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    /// Pretty-printed format
    #[serde(rename = "pretty")]
    Pretty,

    /// JSON format
    #[serde(rename = "json")]
    Json,

    /// Compact format
    #[serde(rename = "compact")]
    Compact,
}
