//! # realm-agent
//!
//! Isolated plugin loader and identity-token bridge for delegating a host container's
//! authentication and role checks to an external RBAC engine.
//!
//! Startup runs once: [`classpath`] resolves the realm classpath, [`loader`] builds a
//! child-first loading context over it, and [`plugins`] instantiates the configured
//! realm plugin. Per request, [`realm::RealmFacade`] authenticates subjects into
//! [`token::IdentityToken`]s and answers role checks, failing closed.

pub mod classpath;
pub mod config;
pub mod engine;
pub mod error;
pub mod loader;
pub mod logging;
pub mod plugins;
pub mod realm;
pub mod token;

pub use error::{Error, Result};
pub use realm::{RealmBuilder, RealmFacade};
pub use token::{IdentityToken, IdentityTokenBridge};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err: Error = error::RealmError::SessionMissing {
            subject: "alice".to_string(),
            reason: "test".to_string(),
        }
        .into();
        assert!(err.to_string().contains("alice"));
    }
}
