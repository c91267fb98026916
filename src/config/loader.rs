use super::types::RealmConfig;
use crate::error::ConfigError;
use config::{Config, Environment, File};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// Environment variable prefix of realm settings (`REALM_CLASSPATH`, `REALM_LOGGING__LEVEL`)
pub const ENV_PREFIX: &str = "REALM";

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    config_file: Option<PathBuf>,
    load_env: bool,
    env_source: Option<HashMap<String, String>>,
    overrides: Vec<(String, String)>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            config_file: None,
            load_env: false,
            env_source: None,
            overrides: Vec::new(),
        }
    }

    /// Load configuration from a file; `realm.toml` in the working directory otherwise
    pub fn load_from_file(mut self, path: Option<PathBuf>) -> Self {
        self.config_file = path;
        self
    }

    /// Load configuration from environment variables
    pub fn load_from_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Read environment settings from a map instead of the process environment
    pub fn with_env_source(mut self, source: HashMap<String, String>) -> Self {
        self.load_env = true;
        self.env_source = Some(source);
        self
    }

    /// Set a key with the highest precedence, e.g. from a CLI flag
    pub fn with_override(mut self, key: &str, value: impl Into<String>) -> Self {
        self.overrides.push((key.to_string(), value.into()));
        self
    }

    /// Build the final configuration
    pub fn build(self) -> Result<RealmConfig, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = &self.config_file {
            debug!(path = %path.display(), "Loading realm configuration file");
            builder = builder.add_source(File::from(path.as_path()).required(true));
        } else {
            builder = builder.add_source(File::with_name("realm").required(false));
        }

        if self.load_env {
            let environment = Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(self.env_source.map(|m| m.into_iter().collect()));
            builder = builder.add_source(environment);
        }

        for (key, value) in self.overrides {
            builder = builder.set_override(key, value)?;
        }

        let config: RealmConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
