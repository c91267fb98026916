//! Realm plugin serving one account taken from the plugin properties.

use async_trait::async_trait;
use realm_agent::engine::{RequestContext, Role, Session, User};
use realm_agent::error::{BoxError, EngineError};
use realm_agent::plugins::{PluginContext, PluginRegistrar, PluginType, RealmPlugin};
use secrecy::{ExposeSecret, SecretSlice};
use std::collections::BTreeSet;
use std::sync::Arc;

pub const ACCOUNT_REALM_TYPE: &str = "account-realm";

pub const USER_PROPERTY: &str = "account.user";
pub const PASSWORD_PROPERTY: &str = "account.password";
pub const ROLES_PROPERTY: &str = "account.roles";

struct AccountRealm {
    user_id: String,
    password: Vec<u8>,
    roles: BTreeSet<String>,
}

impl AccountRealm {
    fn construct(context: &PluginContext) -> Result<Arc<dyn RealmPlugin>, BoxError> {
        let user_id = context
            .property(USER_PROPERTY)
            .ok_or("account realm requires account.user")?;
        let password = context
            .property(PASSWORD_PROPERTY)
            .ok_or("account realm requires account.password")?;
        let roles = context
            .property(ROLES_PROPERTY)
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Arc::new(Self {
            user_id: user_id.to_string(),
            password: password.as_bytes().to_vec(),
            roles,
        }))
    }

    fn check_user(&self, user_id: &str) -> Result<(), EngineError> {
        if user_id == self.user_id {
            Ok(())
        } else {
            Err(EngineError::UserNotFound(user_id.to_string()))
        }
    }

    fn session(&self, context: &RequestContext, requested_roles: &[String]) -> Session {
        let mut session = Session::new(&self.user_id, context);
        session.authenticated = true;
        session.requested_roles = requested_roles.iter().cloned().collect();
        session.activated_roles = if requested_roles.is_empty() {
            self.roles.clone()
        } else {
            self.roles
                .intersection(&session.requested_roles)
                .cloned()
                .collect()
        };
        session
    }
}

#[async_trait]
impl RealmPlugin for AccountRealm {
    async fn authenticate(
        &self,
        _context: &RequestContext,
        user_id: &str,
        password: &SecretSlice<u8>,
    ) -> Result<bool, EngineError> {
        self.check_user(user_id)?;
        Ok(password.expose_secret() == self.password.as_slice())
    }

    async fn create_session(
        &self,
        context: &RequestContext,
        user_id: &str,
        password: &SecretSlice<u8>,
        requested_roles: &[String],
    ) -> Result<Session, EngineError> {
        if !self.authenticate(context, user_id, password).await? {
            return Err(EngineError::InvalidCredentials(user_id.to_string()));
        }
        Ok(self.session(context, requested_roles))
    }

    async fn create_trusted_session(
        &self,
        context: &RequestContext,
        user_id: &str,
    ) -> Result<Session, EngineError> {
        self.check_user(user_id)?;
        let mut session = self.session(context, &[]);
        session.trusted = true;
        Ok(session)
    }

    async fn authorized_roles(
        &self,
        _context: &RequestContext,
        session: &Session,
    ) -> Result<BTreeSet<String>, EngineError> {
        self.check_user(&session.user_id)?;
        Ok(session.activated_roles.clone())
    }

    async fn read_user(&self, _context: &RequestContext, user_id: &str) -> Result<User, EngineError> {
        self.check_user(user_id)?;
        Ok(User {
            user_id: self.user_id.clone(),
            display_name: None,
            description: None,
            roles: self.roles.iter().cloned().collect(),
        })
    }

    async fn read_role(&self, _context: &RequestContext, role_name: &str) -> Result<Role, EngineError> {
        if !self.roles.contains(role_name) {
            return Err(EngineError::RoleNotFound(role_name.to_string()));
        }
        Ok(Role {
            name: role_name.to_string(),
            description: None,
            inherits: Vec::new(),
        })
    }

    async fn search_users(
        &self,
        _context: &RequestContext,
        search: &str,
        limit: usize,
    ) -> Result<Vec<String>, EngineError> {
        Ok(std::iter::once(self.user_id.clone())
            .filter(|u| u.starts_with(search))
            .take(limit)
            .collect())
    }

    async fn search_roles(
        &self,
        _context: &RequestContext,
        search: &str,
        limit: usize,
    ) -> Result<Vec<String>, EngineError> {
        Ok(self
            .roles
            .iter()
            .filter(|r| r.starts_with(search))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn assigned_users(
        &self,
        _context: &RequestContext,
        role_name: &str,
        limit: usize,
    ) -> Result<Vec<String>, EngineError> {
        Ok(std::iter::once(self.user_id.clone())
            .filter(|_| self.roles.contains(role_name))
            .take(limit)
            .collect())
    }
}

fn register(registrar: &mut dyn PluginRegistrar) {
    registrar.register(PluginType::new(ACCOUNT_REALM_TYPE, AccountRealm::construct));
}

#[cfg(not(feature = "stale-api"))]
realm_agent::export_realm_plugin!(register);

#[cfg(feature = "stale-api")]
#[no_mangle]
#[allow(non_upper_case_globals)]
pub static realm_plugin_declaration: realm_agent::plugins::PluginDeclaration =
    realm_agent::plugins::PluginDeclaration {
        api_version: "0.9.0",
        core_version: realm_agent::plugins::CORE_VERSION,
        register,
    };
