//! Plugin instantiation.

use super::{PluginContext, PluginType, RealmPlugin, Visibility};
use crate::error::FactoryError;
use crate::loader::LoadingContext;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info};

/// The single plugin instance a realm holds for its lifetime
pub struct PluginHandle {
    // dropped before `plugin_type`, which may own the backing library
    instance: Arc<dyn RealmPlugin>,
    plugin_type: Arc<PluginType>,
    loader: Arc<dyn LoadingContext>,
}

impl PluginHandle {
    pub fn instance(&self) -> &Arc<dyn RealmPlugin> {
        &self.instance
    }

    /// Type name the instance was created from
    pub fn type_name(&self) -> &str {
        self.plugin_type.name()
    }

    pub fn plugin_type(&self) -> &PluginType {
        &self.plugin_type
    }

    /// Loading context that resolved the type
    pub fn loader(&self) -> &Arc<dyn LoadingContext> {
        &self.loader
    }
}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandle")
            .field("plugin_type", &self.plugin_type)
            .finish_non_exhaustive()
    }
}

/// Creates realm plugins from type names
pub struct PluginFactory;

impl PluginFactory {
    /// Resolve `type_name` through `loader` and instantiate it exactly once.
    ///
    /// An empty `type_name` selects `default_type_name`. Every failure is final; callers
    /// treat it as fatal to realm startup.
    pub fn create(
        type_name: &str,
        default_type_name: &str,
        loader: Arc<dyn LoadingContext>,
        context: &PluginContext,
    ) -> Result<PluginHandle, FactoryError> {
        let type_name = if type_name.trim().is_empty() {
            debug!(default_type_name, "No plugin type configured, using default");
            default_type_name
        } else {
            type_name.trim()
        };

        let plugin_type = loader.load_type(type_name).map_err(|e| {
            error!(type_name, error = %e, "Plugin type could not be loaded");
            FactoryError::NotFound {
                type_name: type_name.to_string(),
                source: e,
            }
        })?;

        if plugin_type.visibility() == Visibility::Internal {
            error!(type_name, "Plugin type is not accessible to the host");
            return Err(FactoryError::AccessDenied(type_name.to_string()));
        }

        let constructed = catch_unwind(AssertUnwindSafe(|| plugin_type.instantiate(context)));
        let instance = match constructed {
            Ok(Ok(instance)) => instance,
            Ok(Err(e)) => {
                error!(type_name, error = %e, "Plugin instantiation failed");
                return Err(FactoryError::InstantiationFailed {
                    type_name: type_name.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "constructor panicked".to_string());
                error!(type_name, reason = %reason, "Plugin constructor panicked");
                return Err(FactoryError::InstantiationFailed {
                    type_name: type_name.to_string(),
                    reason,
                });
            }
        };

        info!(type_name, origin = %plugin_type.origin(), "Realm plugin instantiated");

        Ok(PluginHandle {
            instance,
            plugin_type,
            loader,
        })
    }
}
