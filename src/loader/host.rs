//! The host's own loading context.

use super::LoadingContext;
use crate::classpath::Location;
use crate::error::LoadError;
use crate::plugins::{PluginType, PolicyRealm, DEFAULT_PLUGIN_TYPE};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

static GLOBAL: OnceLock<Arc<HostContext>> = OnceLock::new();

/// Plugin types linked into the host process, plus the host's resource roots
#[derive(Debug, Default)]
pub struct HostContext {
    types: RwLock<HashMap<String, Arc<PluginType>>>,
    resource_roots: RwLock<Vec<Location>>,
}

impl HostContext {
    /// Empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Context holding the built-in plugin types
    pub fn with_builtins() -> Self {
        let context = Self::new();
        context.register(PluginType::new(DEFAULT_PLUGIN_TYPE, PolicyRealm::construct));
        context
    }

    /// The process-wide default context, consulted by loaders without a parent
    pub fn global() -> Arc<HostContext> {
        GLOBAL
            .get_or_init(|| {
                debug!("Initializing global host context");
                Arc::new(Self::with_builtins())
            })
            .clone()
    }

    /// Register a type, replacing any type of the same name
    pub fn register(&self, plugin_type: PluginType) -> Option<Arc<PluginType>> {
        let name = plugin_type.name().to_string();
        info!(type_name = %name, "Host plugin type registered");
        self.types.write().insert(name, Arc::new(plugin_type))
    }

    /// Add a directory or file the host serves resources from
    pub fn add_resource_root(&self, location: Location) {
        let mut roots = self.resource_roots.write();
        if !roots.contains(&location) {
            roots.push(location);
        }
    }

    /// Registered type names, sorted
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl LoadingContext for HostContext {
    fn load_type(&self, name: &str) -> Result<Arc<PluginType>, LoadError> {
        self.types
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(name.to_string()))
    }

    fn load_resource(&self, name: &str) -> Option<Location> {
        self.resource_roots
            .read()
            .iter()
            .find_map(|root| root.find_resource(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_context_holds_builtin_type() {
        let global = HostContext::global();
        assert!(global.load_type(DEFAULT_PLUGIN_TYPE).is_ok());
        assert!(Arc::ptr_eq(&global, &HostContext::global()));
    }

    #[test]
    fn test_unknown_type_is_not_found() {
        let host = HostContext::new();
        assert!(matches!(
            host.load_type(DEFAULT_PLUGIN_TYPE),
            Err(LoadError::NotFound(_))
        ));
        assert!(host.type_names().is_empty());
    }

    #[test]
    fn test_register_replaces_existing_type() {
        let host = HostContext::with_builtins();
        let previous = host.register(PluginType::internal(DEFAULT_PLUGIN_TYPE, PolicyRealm::construct));
        assert!(previous.is_some());
        assert_eq!(host.type_names(), vec![DEFAULT_PLUGIN_TYPE.to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_resource_lookup_in_host_roots() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("realm.properties"), b"").unwrap();

        let host = HostContext::new();
        host.add_resource_root(Location::from_path(dir.path()).unwrap());

        assert!(host.load_resource("realm.properties").is_some());
        assert!(host.load_resource("missing.properties").is_none());
    }
}
