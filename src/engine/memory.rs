use super::{AuthorizationEngine, RequestContext, Role, Session, SessionRequest, User};
use crate::error::EngineError;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretSlice};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// In-memory authorization engine
///
/// Users, password hashes and a role hierarchy held in HashMaps, partitioned by
/// context id. Intended for development, tests and the CLI; it implements the same
/// interface a directory-backed engine would.
#[derive(Clone, Default)]
pub struct InMemoryEngine {
    partitions: Arc<RwLock<HashMap<String, Partition>>>,
}

#[derive(Debug, Clone, Default)]
struct Partition {
    users: HashMap<String, StoredUser>,
    roles: HashMap<String, Role>,
}

#[derive(Debug, Clone)]
struct StoredUser {
    user: User,
    password_hash: String,
}

/// Directory file layout accepted by [`InMemoryEngine::from_toml_str`]
#[derive(Debug, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    roles: Vec<RoleEntry>,
    #[serde(default)]
    users: Vec<UserEntry>,
}

#[derive(Debug, Deserialize)]
struct RoleEntry {
    name: String,
    description: Option<String>,
    #[serde(default)]
    inherits: Vec<String>,
    context_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserEntry {
    user_id: String,
    password: String,
    display_name: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
    context_id: Option<String>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load users and roles from a TOML directory document
    pub async fn from_toml_str(content: &str) -> Result<Self, EngineError> {
        let directory: DirectoryFile = toml::from_str(content)
            .map_err(|e| EngineError::Internal(format!("invalid directory file: {}", e)))?;
        let engine = Self::new();

        for entry in directory.roles {
            let context = RequestContext::new(entry.context_id.unwrap_or_default());
            engine
                .add_role(
                    &context,
                    Role {
                        name: entry.name,
                        description: entry.description,
                        inherits: entry.inherits,
                    },
                )
                .await;
        }
        for entry in directory.users {
            let context = RequestContext::new(entry.context_id.unwrap_or_default());
            engine
                .add_user(
                    &context,
                    &entry.user_id,
                    entry.password.as_bytes(),
                    entry.display_name,
                    entry.roles,
                )
                .await?;
        }

        Ok(engine)
    }

    pub async fn from_toml_file(path: &Path) -> Result<Self, EngineError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| EngineError::Unavailable(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content).await
    }

    /// Register or replace a role
    pub async fn add_role(&self, context: &RequestContext, role: Role) {
        let mut partitions = self.partitions.write().await;
        debug!(context = %context, role = %role.name, "Role added");
        partitions
            .entry(context.context_id().to_string())
            .or_default()
            .roles
            .insert(role.name.clone(), role);
    }

    /// Register or replace a user, hashing the password with argon2
    pub async fn add_user(
        &self,
        context: &RequestContext,
        user_id: &str,
        password: &[u8],
        display_name: Option<String>,
        roles: Vec<String>,
    ) -> Result<(), EngineError> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password, &salt)
            .map_err(|e| EngineError::Internal(format!("password hashing failed: {}", e)))?
            .to_string();

        let mut partitions = self.partitions.write().await;
        let partition = partitions
            .entry(context.context_id().to_string())
            .or_default();
        for role in &roles {
            partition
                .roles
                .entry(role.clone())
                .or_insert_with(|| Role {
                    name: role.clone(),
                    description: None,
                    inherits: Vec::new(),
                });
        }
        partition.users.insert(
            user_id.to_string(),
            StoredUser {
                user: User {
                    user_id: user_id.to_string(),
                    display_name,
                    description: None,
                    roles,
                },
                password_hash,
            },
        );
        info!(context = %context, user_id, "User added");
        Ok(())
    }

    async fn verified_user(
        &self,
        context: &RequestContext,
        user_id: &str,
        password: Option<&SecretSlice<u8>>,
    ) -> Result<User, EngineError> {
        let partitions = self.partitions.read().await;
        let stored = partitions
            .get(context.context_id())
            .and_then(|p| p.users.get(user_id))
            .ok_or_else(|| EngineError::UserNotFound(user_id.to_string()))?;

        if let Some(password) = password {
            let parsed = PasswordHash::new(&stored.password_hash)
                .map_err(|e| EngineError::Internal(format!("invalid password hash: {}", e)))?;
            Argon2::default()
                .verify_password(password.expose_secret(), &parsed)
                .map_err(|_| EngineError::InvalidCredentials(user_id.to_string()))?;
        }

        Ok(stored.user.clone())
    }
}

/// Closure of `roles` over the inheritance graph
fn inherited_closure(roles: &HashMap<String, Role>, start: &BTreeSet<String>) -> BTreeSet<String> {
    let mut authorized = BTreeSet::new();
    let mut pending: Vec<String> = start.iter().cloned().collect();
    while let Some(name) = pending.pop() {
        if !authorized.insert(name.clone()) {
            continue;
        }
        if let Some(role) = roles.get(&name) {
            pending.extend(role.inherits.iter().cloned());
        }
    }
    authorized
}

#[async_trait]
impl AuthorizationEngine for InMemoryEngine {
    async fn authenticate(
        &self,
        context: &RequestContext,
        user_id: &str,
        password: &SecretSlice<u8>,
    ) -> Result<Session, EngineError> {
        self.verified_user(context, user_id, Some(password)).await?;
        let mut session = Session::new(user_id, context);
        session.authenticated = true;
        Ok(session)
    }

    async fn create_session(
        &self,
        context: &RequestContext,
        request: SessionRequest<'_>,
    ) -> Result<Session, EngineError> {
        let user = self
            .verified_user(context, request.user_id, request.password)
            .await?;

        let requested: BTreeSet<String> = request.requested_roles.iter().cloned().collect();
        let mut session = Session::new(request.user_id, context);
        session.authenticated = request.password.is_some();
        session.trusted = request.password.is_none();
        session.activated_roles = user
            .roles
            .iter()
            .filter(|r| requested.is_empty() || requested.contains(*r))
            .cloned()
            .collect();
        for role in requested.difference(&session.activated_roles) {
            session
                .warnings
                .push(format!("role {} is not assigned to {}", role, user.user_id));
        }
        session.requested_roles = requested;

        debug!(
            context = %context,
            user_id = request.user_id,
            activated = ?session.activated_roles,
            "Session created"
        );
        Ok(session)
    }

    async fn authorized_roles(
        &self,
        context: &RequestContext,
        session: &Session,
    ) -> Result<BTreeSet<String>, EngineError> {
        let partitions = self.partitions.read().await;
        let Some(partition) = partitions.get(context.context_id()) else {
            return Ok(BTreeSet::new());
        };
        if !partition.users.contains_key(&session.user_id) {
            return Err(EngineError::UserNotFound(session.user_id.clone()));
        }
        Ok(inherited_closure(&partition.roles, &session.activated_roles))
    }

    async fn read_user(&self, context: &RequestContext, user_id: &str) -> Result<User, EngineError> {
        self.verified_user(context, user_id, None).await
    }

    async fn read_role(&self, context: &RequestContext, role_name: &str) -> Result<Role, EngineError> {
        let partitions = self.partitions.read().await;
        partitions
            .get(context.context_id())
            .and_then(|p| p.roles.get(role_name))
            .cloned()
            .ok_or_else(|| EngineError::RoleNotFound(role_name.to_string()))
    }

    async fn find_users(
        &self,
        context: &RequestContext,
        search: &str,
        limit: usize,
    ) -> Result<Vec<String>, EngineError> {
        let partitions = self.partitions.read().await;
        let mut found: Vec<String> = partitions
            .get(context.context_id())
            .map(|p| {
                p.users
                    .keys()
                    .filter(|id| id.starts_with(search))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        found.sort();
        found.truncate(limit);
        Ok(found)
    }

    async fn find_roles(
        &self,
        context: &RequestContext,
        search: &str,
        limit: usize,
    ) -> Result<Vec<String>, EngineError> {
        let partitions = self.partitions.read().await;
        let mut found: Vec<String> = partitions
            .get(context.context_id())
            .map(|p| {
                p.roles
                    .keys()
                    .filter(|name| name.starts_with(search))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        found.sort();
        found.truncate(limit);
        Ok(found)
    }

    async fn assigned_users(
        &self,
        context: &RequestContext,
        role_name: &str,
        limit: usize,
    ) -> Result<Vec<String>, EngineError> {
        let partitions = self.partitions.read().await;
        let partition = partitions
            .get(context.context_id())
            .ok_or_else(|| EngineError::RoleNotFound(role_name.to_string()))?;
        if !partition.roles.contains_key(role_name) {
            return Err(EngineError::RoleNotFound(role_name.to_string()));
        }
        let mut users: Vec<String> = partition
            .users
            .values()
            .filter(|s| s.user.roles.iter().any(|r| r == role_name))
            .map(|s| s.user.user_id.clone())
            .collect();
        users.sort();
        users.truncate(limit);
        Ok(users)
    }
}
