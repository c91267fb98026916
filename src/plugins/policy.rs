//! Built-in realm plugin delegating straight to the authorization engine.

use super::{PluginContext, RealmPlugin};
use crate::engine::{AuthorizationEngine, RequestContext, Role, Session, SessionRequest, User};
use crate::error::{BoxError, EngineError};
use async_trait::async_trait;
use secrecy::SecretSlice;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Type name of the plugin used when none is configured
pub const DEFAULT_PLUGIN_TYPE: &str = "policy-realm";

/// Realm plugin that forwards every call to an [`AuthorizationEngine`]
pub struct PolicyRealm {
    engine: Arc<dyn AuthorizationEngine>,
}

impl PolicyRealm {
    pub fn new(engine: Arc<dyn AuthorizationEngine>) -> Self {
        Self { engine }
    }

    /// Constructor registered for [`DEFAULT_PLUGIN_TYPE`]
    pub fn construct(context: &PluginContext) -> Result<Arc<dyn RealmPlugin>, BoxError> {
        let engine = context
            .engine
            .clone()
            .ok_or("policy realm requires an authorization engine")?;
        Ok(Arc::new(Self::new(engine)))
    }
}

#[async_trait]
impl RealmPlugin for PolicyRealm {
    async fn authenticate(
        &self,
        context: &RequestContext,
        user_id: &str,
        password: &SecretSlice<u8>,
    ) -> Result<bool, EngineError> {
        let session = self.engine.authenticate(context, user_id, password).await?;
        debug!(user_id, context = %context, "Password verified");
        Ok(session.authenticated)
    }

    async fn create_session(
        &self,
        context: &RequestContext,
        user_id: &str,
        password: &SecretSlice<u8>,
        requested_roles: &[String],
    ) -> Result<Session, EngineError> {
        let session = self
            .engine
            .create_session(
                context,
                SessionRequest {
                    user_id,
                    password: Some(password),
                    requested_roles,
                },
            )
            .await?;
        for warning in &session.warnings {
            warn!(user_id, warning = %warning, "Session created with warning");
        }
        info!(
            user_id,
            context = %context,
            activated = session.activated_roles.len(),
            "Session created"
        );
        Ok(session)
    }

    async fn create_trusted_session(
        &self,
        context: &RequestContext,
        user_id: &str,
    ) -> Result<Session, EngineError> {
        let session = self
            .engine
            .create_session(
                context,
                SessionRequest {
                    user_id,
                    password: None,
                    requested_roles: &[],
                },
            )
            .await?;
        info!(user_id, context = %context, "Trusted session created");
        Ok(session)
    }

    async fn authorized_roles(
        &self,
        context: &RequestContext,
        session: &Session,
    ) -> Result<BTreeSet<String>, EngineError> {
        self.engine.authorized_roles(context, session).await
    }

    async fn read_user(&self, context: &RequestContext, user_id: &str)
        -> Result<User, EngineError> {
        self.engine.read_user(context, user_id).await
    }

    async fn read_role(&self, context: &RequestContext, role_name: &str)
        -> Result<Role, EngineError> {
        self.engine.read_role(context, role_name).await
    }

    async fn search_users(
        &self,
        context: &RequestContext,
        search: &str,
        limit: usize,
    ) -> Result<Vec<String>, EngineError> {
        self.engine.find_users(context, search, limit).await
    }

    async fn search_roles(
        &self,
        context: &RequestContext,
        search: &str,
        limit: usize,
    ) -> Result<Vec<String>, EngineError> {
        self.engine.find_roles(context, search, limit).await
    }

    async fn assigned_users(
        &self,
        context: &RequestContext,
        role_name: &str,
        limit: usize,
    ) -> Result<Vec<String>, EngineError> {
        self.engine.assigned_users(context, role_name, limit).await
    }
}
