//! Isolated Plugin Loading
//!
//! An [`IsolatedLoader`] resolves plugin types and resources from its own classpath
//! before consulting its parent, so a plugin's bundled implementation always wins over
//! a same-named type already present in the host.
//!
//! # Examples
//!
//! ```rust
//! use realm_agent::classpath::ClasspathSpec;
//! use realm_agent::loader::{IsolatedLoader, LoadingContext};
//! use realm_agent::plugins::DEFAULT_PLUGIN_TYPE;
//!
//! // no classpath, no parent: everything comes from the global host context
//! let loader = IsolatedLoader::new(ClasspathSpec::empty(), None);
//! assert!(loader.load_type(DEFAULT_PLUGIN_TYPE).is_ok());
//! ```

pub mod dylib;
pub mod host;

pub use dylib::DylibScanner;
pub use host::HostContext;

use crate::classpath::{ClasspathSpec, Location};
use crate::error::LoadError;
use crate::plugins::PluginType;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A context plugin types and resources are resolved through
pub trait LoadingContext: Send + Sync {
    /// Resolve a plugin type by name
    fn load_type(&self, name: &str) -> Result<Arc<PluginType>, LoadError>;

    /// Find a named resource, `None` when nothing provides it
    fn load_resource(&self, name: &str) -> Option<Location>;
}

/// Discovers the plugin types a single classpath location declares
pub trait LocationScanner: Send + Sync {
    fn scan(&self, location: &Location) -> Result<Vec<PluginType>, LoadError>;
}

impl<F> LocationScanner for F
where
    F: Fn(&Location) -> Result<Vec<PluginType>, LoadError> + Send + Sync,
{
    fn scan(&self, location: &Location) -> Result<Vec<PluginType>, LoadError> {
        self(location)
    }
}

/// Which side of the loader chain is searched first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOrder {
    /// Own classpath, then parent
    #[default]
    ChildFirst,
    /// Parent, then own classpath
    ParentFirst,
}

type TypeIndex = HashMap<String, Arc<PluginType>>;

/// Loader over one realm classpath with child-first delegation
pub struct IsolatedLoader {
    classpath: ClasspathSpec,
    parent: Arc<dyn LoadingContext>,
    order: ResolutionOrder,
    scanner: Arc<dyn LocationScanner>,
    /// Types declared by the classpath, built on first lookup
    index: Mutex<Option<Arc<TypeIndex>>>,
    /// Every type this loader has resolved
    loaded: RwLock<TypeIndex>,
}

impl IsolatedLoader {
    /// Child-first loader; a `None` parent delegates to [`HostContext::global`]
    pub fn new(classpath: ClasspathSpec, parent: Option<Arc<dyn LoadingContext>>) -> Self {
        let parent = parent.unwrap_or_else(|| HostContext::global() as Arc<dyn LoadingContext>);
        info!(locations = classpath.len(), "Isolated loader created");
        Self {
            classpath,
            parent,
            order: ResolutionOrder::default(),
            scanner: Arc::new(DylibScanner::new()),
            index: Mutex::new(None),
            loaded: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_order(mut self, order: ResolutionOrder) -> Self {
        self.order = order;
        self
    }

    /// Replace the scanner used to discover types in classpath locations
    pub fn with_scanner(mut self, scanner: Arc<dyn LocationScanner>) -> Self {
        self.scanner = scanner;
        *self.index.get_mut() = None;
        self
    }

    pub fn classpath(&self) -> &ClasspathSpec {
        &self.classpath
    }

    pub fn order(&self) -> ResolutionOrder {
        self.order
    }

    pub fn parent(&self) -> &Arc<dyn LoadingContext> {
        &self.parent
    }

    /// Names of the types the classpath itself declares, sorted
    pub fn local_type_names(&self) -> Result<Vec<String>, LoadError> {
        let mut names: Vec<String> = self.local_index()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Build (once) the index of types declared by the classpath.
    ///
    /// Locations are scanned in classpath order; when two locations declare the same
    /// name, the earlier one wins. A failed scan is returned and not cached.
    fn local_index(&self) -> Result<Arc<TypeIndex>, LoadError> {
        let mut slot = self.index.lock();
        if let Some(index) = slot.as_ref() {
            return Ok(index.clone());
        }

        let mut index = TypeIndex::new();
        for location in self.classpath.iter() {
            for plugin_type in self.scanner.scan(location)? {
                let name = plugin_type.name().to_string();
                if index.contains_key(&name) {
                    warn!(type_name = %name, location = %location, "Type shadowed by earlier classpath entry");
                    continue;
                }
                debug!(type_name = %name, location = %location, "Type declared on classpath");
                index.insert(name, Arc::new(plugin_type));
            }
        }

        let index = Arc::new(index);
        *slot = Some(index.clone());
        Ok(index)
    }

    fn find_local(&self, name: &str) -> Result<Option<Arc<PluginType>>, LoadError> {
        Ok(self.local_index()?.get(name).cloned())
    }

    fn find_parent(&self, name: &str) -> Result<Option<Arc<PluginType>>, LoadError> {
        match self.parent.load_type(name) {
            Ok(plugin_type) => Ok(Some(plugin_type)),
            Err(LoadError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn find_local_resource(&self, name: &str) -> Option<Location> {
        self.classpath.iter().find_map(|l| l.find_resource(name))
    }
}

impl LoadingContext for IsolatedLoader {
    fn load_type(&self, name: &str) -> Result<Arc<PluginType>, LoadError> {
        if let Some(cached) = self.loaded.read().get(name) {
            return Ok(cached.clone());
        }

        let found = match self.order {
            ResolutionOrder::ChildFirst => match self.find_local(name)? {
                Some(local) => Some(local),
                None => self.find_parent(name)?,
            },
            ResolutionOrder::ParentFirst => match self.find_parent(name)? {
                Some(inherited) => Some(inherited),
                None => self.find_local(name)?,
            },
        };

        let Some(plugin_type) = found else {
            debug!(type_name = name, "Type not found in loader chain");
            return Err(LoadError::NotFound(name.to_string()));
        };

        debug!(type_name = name, origin = %plugin_type.origin(), "Type resolved");
        // a concurrent resolution of the same name keeps the first result
        let mut loaded = self.loaded.write();
        Ok(loaded
            .entry(name.to_string())
            .or_insert(plugin_type)
            .clone())
    }

    fn load_resource(&self, name: &str) -> Option<Location> {
        match self.order {
            ResolutionOrder::ChildFirst => self
                .find_local_resource(name)
                .or_else(|| self.parent.load_resource(name)),
            ResolutionOrder::ParentFirst => self
                .parent
                .load_resource(name)
                .or_else(|| self.find_local_resource(name)),
        }
    }
}

impl fmt::Debug for IsolatedLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolatedLoader")
            .field("classpath", &self.classpath.raw())
            .field("order", &self.order)
            .field("loaded", &self.loaded.read().len())
            .finish()
    }
}

impl Drop for IsolatedLoader {
    fn drop(&mut self) {
        debug!(loaded = self.loaded.get_mut().len(), "Isolated loader released");
    }
}
