//! Realm Facade
//!
//! The per-request entry point the host calls: authenticate a subject into an
//! [`IdentityToken`], check a role on a token (fail closed), and scope activation to a
//! default role set. A realm is assembled once by [`RealmBuilder`]; any startup failure
//! aborts construction and no partial realm is ever returned.
//!
//! # Examples
//!
//! ```rust,no_run
//! use realm_agent::config::{LoaderMode, RealmConfig};
//! use realm_agent::engine::InMemoryEngine;
//! use realm_agent::realm::RealmBuilder;
//! use secrecy::SecretSlice;
//! use std::sync::Arc;
//!
//! # async fn run() -> realm_agent::Result<()> {
//! let engine = InMemoryEngine::from_toml_file("users.toml".as_ref()).await?;
//! let config = RealmConfig {
//!     loader_mode: LoaderMode::Host,
//!     ..Default::default()
//! };
//! let realm = RealmBuilder::new(config).engine(Arc::new(engine)).build()?;
//!
//! let password = SecretSlice::from(b"alice-pw".to_vec());
//! if let Some(token) = realm.authenticate("alice", &password).await {
//!     assert!(realm.has_role(&token, "teller").await);
//! }
//! # Ok(())
//! # }
//! ```

pub mod roles;

pub use roles::DefaultRoleRestriction;

use crate::classpath::{ClasspathResolver, REALM_CLASSPATH};
use crate::config::{LoaderMode, RealmConfig};
use crate::engine::{AuthorizationEngine, RequestContext, Role, User};
use crate::error::{RealmError, Result};
use crate::loader::{HostContext, IsolatedLoader, LoadingContext, LocationScanner};
use crate::plugins::{PluginContext, PluginFactory, PluginHandle, RealmPlugin, DEFAULT_PLUGIN_TYPE};
use crate::token::{IdentityToken, IdentityTokenBridge};
use parking_lot::RwLock;
use secrecy::SecretSlice;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Builds a [`RealmFacade`] from configuration
pub struct RealmBuilder {
    config: RealmConfig,
    engine: Option<Arc<dyn AuthorizationEngine>>,
    parent: Option<Arc<dyn LoadingContext>>,
    scanner: Option<Arc<dyn LocationScanner>>,
    resolver: ClasspathResolver,
}

impl RealmBuilder {
    pub fn new(config: RealmConfig) -> Self {
        Self {
            config,
            engine: None,
            parent: None,
            scanner: None,
            resolver: ClasspathResolver::new(),
        }
    }

    /// Engine handed to the plugin constructor
    pub fn engine(mut self, engine: Arc<dyn AuthorizationEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Parent loading context; the global host context otherwise
    pub fn parent(mut self, parent: Arc<dyn LoadingContext>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Scanner for classpath locations; dynamic libraries otherwise
    pub fn scanner(mut self, scanner: Arc<dyn LocationScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    pub fn resolver(mut self, resolver: ClasspathResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Resolve the classpath, create the loader and instantiate the plugin
    pub fn build(self) -> Result<RealmFacade> {
        let context = RequestContext::new(self.config.context_id.clone());
        info!(
            context = %context,
            loader_mode = ?self.config.loader_mode,
            "Initializing realm"
        );

        let loader: Arc<dyn LoadingContext> = match self.config.loader_mode.resolution_order() {
            None => self
                .parent
                .clone()
                .unwrap_or_else(|| HostContext::global() as Arc<dyn LoadingContext>),
            Some(order) => {
                let classpath = match self.config.classpath.as_deref() {
                    Some(value) if !value.trim().is_empty() => self.resolver.resolve(value)?,
                    _ => self.resolver.resolve_env(REALM_CLASSPATH)?,
                };
                let mut loader = IsolatedLoader::new(classpath, self.parent.clone()).with_order(order);
                if let Some(scanner) = self.scanner.clone() {
                    loader = loader.with_scanner(scanner);
                }
                Arc::new(loader)
            }
        };

        let plugin_context = PluginContext {
            engine: self.engine.clone(),
            properties: self.config.properties.clone(),
        };
        let plugin = PluginFactory::create(
            self.config.implementation.as_deref().unwrap_or_default(),
            DEFAULT_PLUGIN_TYPE,
            loader,
            &plugin_context,
        )?;

        let default_roles = DefaultRoleRestriction::parse(self.config.default_roles.as_deref());
        if !default_roles.is_empty() {
            info!(default_roles = %default_roles, "Default role restriction configured");
        }

        info!(
            context = %context,
            type_name = plugin.type_name(),
            "Realm initialized"
        );

        Ok(RealmFacade {
            plugin,
            context,
            default_roles: RwLock::new(Arc::new(default_roles)),
        })
    }
}

/// Host-facing realm operations.
///
/// Shared across request tasks behind an `Arc`. The context id is fixed at
/// construction; the default role restriction is an immutable snapshot replaced
/// atomically by [`set_default_roles`](Self::set_default_roles).
pub struct RealmFacade {
    plugin: PluginHandle,
    context: RequestContext,
    default_roles: RwLock<Arc<DefaultRoleRestriction>>,
}

impl RealmFacade {
    fn realm(&self) -> &Arc<dyn RealmPlugin> {
        self.plugin.instance()
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Type name of the plugin in use
    pub fn type_name(&self) -> &str {
        self.plugin.type_name()
    }

    pub fn plugin(&self) -> &PluginHandle {
        &self.plugin
    }

    /// Authenticate a subject.
    ///
    /// Returns `None` on any authentication failure; that is an expected outcome, not
    /// a fault.
    pub async fn authenticate(
        &self,
        user_id: &str,
        credential: &SecretSlice<u8>,
    ) -> Option<IdentityToken> {
        let default_roles = self.default_roles();
        let session = match self
            .realm()
            .create_session(&self.context, user_id, credential, default_roles.roles())
            .await
        {
            Ok(session) => session,
            Err(e) => {
                warn!(user_id, context = %self.context, error = %e, "Authentication failed");
                return None;
            }
        };

        match IdentityTokenBridge::to_token(user_id, session) {
            Ok(token) => {
                debug!(user_id, context = %self.context, "Identity token issued");
                Some(token)
            }
            Err(e) => {
                error!(user_id, error = %e, "Session could not be serialized, authentication denied");
                None
            }
        }
    }

    /// Whether the token's subject holds `role`. Fails closed.
    pub async fn has_role(&self, token: &IdentityToken, role: &str) -> bool {
        match self.check_role(token, role).await {
            Ok(held) => held,
            Err(crate::Error::Realm(e)) => {
                error!(subject = token.subject(), role, error = %e, "Role check fault, access denied");
                false
            }
            Err(e) => {
                warn!(subject = token.subject(), role, error = %e, "Role check failed, access denied");
                false
            }
        }
    }

    /// Role check that reports why a decision could not be made
    pub async fn check_role(&self, token: &IdentityToken, role: &str) -> Result<bool> {
        let session = token.session().ok_or_else(|| RealmError::SessionMissing {
            subject: token.subject().to_string(),
            reason: "payload carries no live session".to_string(),
        })?;

        let authorized = self
            .realm()
            .authorized_roles(&self.context, session)
            .await?;
        if authorized.is_empty() {
            info!(subject = token.subject(), role, "Subject has no authorized roles");
            return Ok(false);
        }

        let held = authorized.contains(role);
        debug!(subject = token.subject(), role, held, "Role checked");
        Ok(held)
    }

    /// Replace the default role restriction; empty input clears it
    pub fn set_default_roles(&self, csv: &str) {
        let restriction = Arc::new(DefaultRoleRestriction::parse(Some(csv)));
        if restriction.is_empty() {
            info!("Default role restriction cleared");
        } else {
            info!(default_roles = %restriction, "Default role restriction set");
        }
        *self.default_roles.write() = restriction;
    }

    /// Current default role restriction snapshot
    pub fn default_roles(&self) -> Arc<DefaultRoleRestriction> {
        self.default_roles.read().clone()
    }

    /// Verify a password without creating a token
    pub async fn verify(&self, user_id: &str, credential: &SecretSlice<u8>) -> bool {
        match self.realm().authenticate(&self.context, user_id, credential).await {
            Ok(verified) => verified,
            Err(e) => {
                warn!(user_id, error = %e, "Password verification failed");
                false
            }
        }
    }

    /// Rebuild a token from its text form, `None` when the text is not a snapshot
    pub fn assert_session(&self, text: &str) -> Option<IdentityToken> {
        match IdentityTokenBridge::rehydrate(text) {
            Ok(token) => Some(token),
            Err(e) => {
                error!(error = %e, "Asserted session could not be restored");
                None
            }
        }
    }

    /// Roles authorized for a user, resolved through a trusted session
    pub async fn authorized_roles(&self, user_id: &str) -> Result<BTreeSet<String>> {
        let session = self
            .realm()
            .create_trusted_session(&self.context, user_id)
            .await?;
        Ok(self.realm().authorized_roles(&self.context, &session).await?)
    }

    pub async fn read_user(&self, user_id: &str) -> Result<User> {
        Ok(self.realm().read_user(&self.context, user_id).await?)
    }

    pub async fn read_role(&self, role_name: &str) -> Result<Role> {
        Ok(self.realm().read_role(&self.context, role_name).await?)
    }

    pub async fn search_users(&self, search: &str, limit: usize) -> Result<Vec<String>> {
        Ok(self.realm().search_users(&self.context, search, limit).await?)
    }

    pub async fn search_roles(&self, search: &str, limit: usize) -> Result<Vec<String>> {
        Ok(self.realm().search_roles(&self.context, search, limit).await?)
    }

    pub async fn assigned_users(&self, role_name: &str, limit: usize) -> Result<Vec<String>> {
        Ok(self
            .realm()
            .assigned_users(&self.context, role_name, limit)
            .await?)
    }

    pub async fn is_valid_user(&self, user_id: &str) -> bool {
        self.read_user(user_id).await.is_ok()
    }

    pub async fn is_valid_role(&self, role_name: &str) -> bool {
        self.read_role(role_name).await.is_ok()
    }
}

impl fmt::Debug for RealmFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealmFacade")
            .field("type_name", &self.type_name())
            .field("context", &self.context)
            .field("default_roles", &self.default_roles())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::InMemoryEngine;
    use crate::token::SESSION;
    use tracing_test::traced_test;

    async fn realm() -> RealmFacade {
        let engine = InMemoryEngine::new();
        let ctx = RequestContext::default();
        engine
            .add_user(&ctx, "alice", b"alice-pw", None, vec!["teller".to_string()])
            .await
            .unwrap();
        engine
            .add_user(&ctx, "nobody", b"nobody-pw", None, Vec::new())
            .await
            .unwrap();

        let config = RealmConfig {
            loader_mode: LoaderMode::Host,
            ..Default::default()
        };
        RealmBuilder::new(config)
            .engine(Arc::new(engine))
            .build()
            .unwrap()
    }

    fn secret(value: &str) -> SecretSlice<u8> {
        SecretSlice::from(value.as_bytes().to_vec())
    }

    #[tokio::test]
    #[traced_test]
    async fn test_deny_without_roles_is_not_a_fault() {
        let realm = realm().await;
        let token = realm.authenticate("nobody", &secret("nobody-pw")).await.unwrap();

        assert!(!realm.has_role(&token, "teller").await);
        assert!(logs_contain("no authorized roles"));
        assert!(!logs_contain("Role check fault"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_missing_session_is_a_fault() {
        let realm = realm().await;
        let token = realm.authenticate("alice", &secret("alice-pw")).await.unwrap();
        assert!(realm.has_role(&token, "teller").await);

        let stripped = token.without_entry(SESSION);
        assert!(!realm.has_role(&stripped, "teller").await);
        assert!(logs_contain("Role check fault"));
        assert!(matches!(
            realm.check_role(&stripped, "teller").await,
            Err(crate::Error::Realm(RealmError::SessionMissing { .. }))
        ));
    }

    #[tokio::test]
    async fn test_wrong_password_yields_no_token() {
        let realm = realm().await;
        assert!(realm.authenticate("alice", &secret("guess")).await.is_none());
        assert!(realm.authenticate("mallory", &secret("guess")).await.is_none());
    }

    #[tokio::test]
    async fn test_role_match_is_case_sensitive() {
        let realm = realm().await;
        let token = realm.authenticate("alice", &secret("alice-pw")).await.unwrap();
        assert!(!realm.has_role(&token, "Teller").await);
    }

    #[tokio::test]
    async fn test_set_default_roles_swaps_snapshot() {
        let realm = realm().await;
        let before = realm.default_roles();
        realm.set_default_roles("teller , auditor");

        assert!(before.is_empty());
        assert_eq!(realm.default_roles().roles(), ["teller", "auditor"]);

        realm.set_default_roles("");
        assert!(realm.default_roles().is_empty());
    }

    #[tokio::test]
    async fn test_assert_session_restores_token() {
        let realm = realm().await;
        let token = realm.authenticate("alice", &secret("alice-pw")).await.unwrap();

        let restored = realm.assert_session(&token.to_string()).unwrap();
        assert_eq!(restored, token);
        assert!(realm.has_role(&restored, "teller").await);
        assert!(realm.assert_session("not a snapshot").is_none());
    }

    #[tokio::test]
    async fn test_directory_queries() {
        let realm = realm().await;
        assert!(realm.is_valid_user("alice").await);
        assert!(!realm.is_valid_user("mallory").await);
        assert!(realm.is_valid_role("teller").await);
        assert_eq!(realm.assigned_users("teller", 10).await.unwrap(), vec!["alice"]);
        assert_eq!(realm.search_users("", 10).await.unwrap(), vec!["alice", "nobody"]);
        assert!(realm.authorized_roles("alice").await.unwrap().contains("teller"));
        assert!(realm.verify("alice", &secret("alice-pw")).await);
        assert!(!realm.verify("alice", &secret("nope")).await);
    }
}
