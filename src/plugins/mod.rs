//! Realm Plugin System
//!
//! A realm plugin is the capability the host delegates authentication and role
//! decisions to. Plugin implementations are published as [`PluginType`]s, either
//! registered with the host ([`crate::loader::HostContext`]) or declared by a dynamic
//! library on the realm classpath with [`export_realm_plugin!`](crate::export_realm_plugin).
//!
//! # Examples
//!
//! ## Declaring a plugin library
//!
//! ```rust,ignore
//! use realm_agent::plugins::{PluginRegistrar, PluginType};
//!
//! fn register(registrar: &mut dyn PluginRegistrar) {
//!     registrar.register(PluginType::new("ldap-realm", LdapRealm::construct));
//! }
//!
//! realm_agent::export_realm_plugin!(register);
//! ```

pub mod factory;
pub mod policy;

pub use factory::{PluginFactory, PluginHandle};
pub use policy::{PolicyRealm, DEFAULT_PLUGIN_TYPE};

use crate::classpath::Location;
use crate::engine::{AuthorizationEngine, RequestContext, Role, Session, User};
use crate::error::{BoxError, EngineError, LoadError};
use async_trait::async_trait;
use libloading::Library;
use secrecy::SecretSlice;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Plugin API version for ABI compatibility checking
pub const PLUGIN_API_VERSION: &str = "1.0.0";

/// Version of this crate, recorded by plugin libraries at build time
pub const CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exported symbol every plugin library must define
pub const PLUGIN_DECLARATION_SYMBOL: &[u8] = b"realm_plugin_declaration\0";

/// Capability contract every realm plugin implements.
///
/// One instance is shared by all request tasks for the life of the realm, so
/// implementations must not keep per-request mutable state.
#[async_trait]
pub trait RealmPlugin: Send + Sync {
    /// Check a password without activating roles
    async fn authenticate(
        &self,
        context: &RequestContext,
        user_id: &str,
        password: &SecretSlice<u8>,
    ) -> Result<bool, EngineError>;

    /// Authenticate and activate roles; an empty `requested_roles` activates all
    async fn create_session(
        &self,
        context: &RequestContext,
        user_id: &str,
        password: &SecretSlice<u8>,
        requested_roles: &[String],
    ) -> Result<Session, EngineError>;

    /// Activate roles without a password check
    async fn create_trusted_session(
        &self,
        context: &RequestContext,
        user_id: &str,
    ) -> Result<Session, EngineError>;

    async fn authorized_roles(
        &self,
        context: &RequestContext,
        session: &Session,
    ) -> Result<BTreeSet<String>, EngineError>;

    async fn read_user(&self, context: &RequestContext, user_id: &str)
        -> Result<User, EngineError>;

    async fn read_role(&self, context: &RequestContext, role_name: &str)
        -> Result<Role, EngineError>;

    async fn search_users(
        &self,
        context: &RequestContext,
        search: &str,
        limit: usize,
    ) -> Result<Vec<String>, EngineError>;

    async fn search_roles(
        &self,
        context: &RequestContext,
        search: &str,
        limit: usize,
    ) -> Result<Vec<String>, EngineError>;

    async fn assigned_users(
        &self,
        context: &RequestContext,
        role_name: &str,
        limit: usize,
    ) -> Result<Vec<String>, EngineError>;
}

/// What a plugin constructor receives
#[derive(Clone, Default)]
pub struct PluginContext {
    /// Engine supplied by the host, if any
    pub engine: Option<Arc<dyn AuthorizationEngine>>,
    /// Free-form plugin properties from the realm configuration
    pub properties: HashMap<String, String>,
}

impl PluginContext {
    pub fn with_engine(engine: Arc<dyn AuthorizationEngine>) -> Self {
        Self {
            engine: Some(engine),
            properties: HashMap::new(),
        }
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

impl fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginContext")
            .field("engine", &self.engine.is_some())
            .field("properties", &self.properties)
            .finish()
    }
}

/// Constructor of a plugin type
pub type PluginConstructor = fn(&PluginContext) -> Result<Arc<dyn RealmPlugin>, BoxError>;

/// Whether the host may instantiate a type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Instantiable by the plugin factory
    Public,
    /// Resolvable, but reserved for use inside its own library
    Internal,
}

/// Where a type was declared
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeOrigin {
    /// Linked into the host process
    Host,
    /// Declared by a classpath location
    Location(Location),
}

impl fmt::Display for TypeOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeOrigin::Host => write!(f, "host"),
            TypeOrigin::Location(location) => write!(f, "{}", location),
        }
    }
}

/// A named, instantiable plugin type
#[derive(Clone)]
pub struct PluginType {
    name: String,
    visibility: Visibility,
    constructor: PluginConstructor,
    origin: TypeOrigin,
    // keeps the declaring library mapped while the type (and its instances) live
    library: Option<Arc<Library>>,
}

impl PluginType {
    pub fn new(name: impl Into<String>, constructor: PluginConstructor) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Public,
            constructor,
            origin: TypeOrigin::Host,
            library: None,
        }
    }

    /// A type other code may resolve but the factory refuses to instantiate
    pub fn internal(name: impl Into<String>, constructor: PluginConstructor) -> Self {
        Self {
            visibility: Visibility::Internal,
            ..Self::new(name, constructor)
        }
    }

    /// Mark the type as declared by a classpath location, optionally backed by a library
    pub fn declared_at(mut self, location: &Location, library: Option<Arc<Library>>) -> Self {
        self.origin = TypeOrigin::Location(location.clone());
        if library.is_some() {
            self.library = library;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn origin(&self) -> &TypeOrigin {
        &self.origin
    }

    /// Run the constructor once
    pub fn instantiate(&self, context: &PluginContext) -> Result<Arc<dyn RealmPlugin>, BoxError> {
        (self.constructor)(context)
    }
}

impl fmt::Debug for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginType")
            .field("name", &self.name)
            .field("visibility", &self.visibility)
            .field("origin", &self.origin)
            .field("library", &self.library.is_some())
            .finish()
    }
}

/// Collects the types a plugin library declares
pub trait PluginRegistrar {
    fn register(&mut self, plugin_type: PluginType);
}

impl PluginRegistrar for Vec<PluginType> {
    fn register(&mut self, plugin_type: PluginType) {
        self.push(plugin_type);
    }
}

/// Static exported by every plugin library under [`PLUGIN_DECLARATION_SYMBOL`]
#[derive(Clone, Copy)]
pub struct PluginDeclaration {
    pub api_version: &'static str,
    pub core_version: &'static str,
    pub register: fn(&mut dyn PluginRegistrar),
}

/// Plugin ABI compatibility check
pub fn check_plugin_abi_compatibility(declaration: &PluginDeclaration) -> Result<(), LoadError> {
    if declaration.api_version != PLUGIN_API_VERSION {
        return Err(LoadError::Incompatible(format!(
            "plugin built with API version {} but runtime uses {}",
            declaration.api_version, PLUGIN_API_VERSION
        )));
    }
    // trait objects cross the boundary, so the core crate must match exactly
    if declaration.core_version != CORE_VERSION {
        return Err(LoadError::Incompatible(format!(
            "plugin built against realm-agent {} but runtime is {}",
            declaration.core_version, CORE_VERSION
        )));
    }
    Ok(())
}

/// Declare the plugin types a dynamic library exports
#[macro_export]
macro_rules! export_realm_plugin {
    ($register:expr) => {
        #[doc(hidden)]
        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static realm_plugin_declaration: $crate::plugins::PluginDeclaration =
            $crate::plugins::PluginDeclaration {
                api_version: $crate::plugins::PLUGIN_API_VERSION,
                core_version: $crate::plugins::CORE_VERSION,
                register: $register,
            };
    };
}
