//! Authorization Engine Interface
//!
//! The RBAC decision engine is an external collaborator: it checks passwords, activates
//! roles and answers "which roles does this session hold". The realm only forwards
//! credentials to it and consumes its results.

pub mod memory;

pub use memory::InMemoryEngine;

use crate::error::EngineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretSlice;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Context (tenant) id used when none is configured
pub const DEFAULT_CONTEXT_ID: &str = "HOME";

/// Per-call context forwarded to every engine call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestContext {
    context_id: String,
}

impl RequestContext {
    pub fn new(context_id: impl Into<String>) -> Self {
        let context_id = context_id.into();
        if context_id.trim().is_empty() {
            return Self::default();
        }
        Self { context_id }
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            context_id: DEFAULT_CONTEXT_ID.to_string(),
        }
    }
}

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.context_id)
    }
}

/// Result of one successful authentication, as produced by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub context_id: String,
    pub authenticated: bool,
    /// Created without a password check
    pub trusted: bool,
    /// Roles the caller asked to activate; empty means all assigned roles
    pub requested_roles: BTreeSet<String>,
    pub activated_roles: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub warnings: Vec<String>,
    /// Engine-private state carried through the realm untouched
    pub engine_state: Vec<u8>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, context: &RequestContext) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            context_id: context.context_id().to_string(),
            authenticated: false,
            trusted: false,
            requested_roles: BTreeSet::new(),
            activated_roles: BTreeSet::new(),
            created_at: Utc::now(),
            warnings: Vec::new(),
            engine_state: Vec::new(),
        }
    }

    pub fn is_activated(&self, role: &str) -> bool {
        self.activated_roles.contains(role)
    }
}

/// A user entry as known to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    /// Directly assigned role names
    pub roles: Vec<String>,
}

/// A role entry as known to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub description: Option<String>,
    /// Junior roles whose authority this role inherits
    pub inherits: Vec<String>,
}

/// Parameters of a session request
#[derive(Clone, Copy)]
pub struct SessionRequest<'a> {
    pub user_id: &'a str,
    /// `None` creates a trusted session without a password check
    pub password: Option<&'a SecretSlice<u8>>,
    /// Roles eligible for activation; empty activates every assigned role
    pub requested_roles: &'a [String],
}

impl fmt::Debug for SessionRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRequest")
            .field("user_id", &self.user_id)
            .field("trusted", &self.password.is_none())
            .field("requested_roles", &self.requested_roles)
            .finish()
    }
}

/// Interface presented by the external RBAC engine
#[async_trait]
pub trait AuthorizationEngine: Send + Sync {
    /// Check a password without activating roles
    async fn authenticate(
        &self,
        context: &RequestContext,
        user_id: &str,
        password: &SecretSlice<u8>,
    ) -> Result<Session, EngineError>;

    /// Authenticate (unless trusted) and activate roles
    async fn create_session(
        &self,
        context: &RequestContext,
        request: SessionRequest<'_>,
    ) -> Result<Session, EngineError>;

    /// Roles the session is authorized for, including inherited ones
    async fn authorized_roles(
        &self,
        context: &RequestContext,
        session: &Session,
    ) -> Result<BTreeSet<String>, EngineError>;

    async fn read_user(&self, context: &RequestContext, user_id: &str)
        -> Result<User, EngineError>;

    async fn read_role(&self, context: &RequestContext, role_name: &str)
        -> Result<Role, EngineError>;

    /// User ids starting with `search`
    async fn find_users(
        &self,
        context: &RequestContext,
        search: &str,
        limit: usize,
    ) -> Result<Vec<String>, EngineError>;

    /// Role names starting with `search`
    async fn find_roles(
        &self,
        context: &RequestContext,
        search: &str,
        limit: usize,
    ) -> Result<Vec<String>, EngineError>;

    /// User ids directly assigned to a role
    async fn assigned_users(
        &self,
        context: &RequestContext,
        role_name: &str,
        limit: usize,
    ) -> Result<Vec<String>, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_context_falls_back_to_default() {
        assert_eq!(RequestContext::new("  ").context_id(), DEFAULT_CONTEXT_ID);
        assert_eq!(RequestContext::new("tenant-a").context_id(), "tenant-a");
    }

    #[test]
    fn test_session_request_debug_hides_password() {
        let password = SecretSlice::from(b"s3cret".to_vec());
        let request = SessionRequest {
            user_id: "alice",
            password: Some(&password),
            requested_roles: &[],
        };
        let rendered = format!("{:?}", request);
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("s3cret"));
    }
}
