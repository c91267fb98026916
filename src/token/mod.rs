//! Identity Tokens
//!
//! The host-facing result of a successful authentication. A token carries the live
//! engine [`Session`] for same-process reuse and its byte-exact snapshot text for
//! contexts that only see strings. Reading a token as text always yields the snapshot.

pub mod bridge;

pub use bridge::IdentityTokenBridge;

use crate::engine::Session;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Payload key of the live session
pub const SESSION: &str = "session";

/// Payload key of the serialized session snapshot
pub const SERIALIZED: &str = "SERIALIZED";

/// Opaque payload value
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadValue {
    Session(Arc<Session>),
    Text(String),
}

/// Authenticated identity handed to the host.
///
/// Immutable once built; replacing the payload yields a new token.
#[derive(Clone)]
pub struct IdentityToken {
    subject: String,
    payload: Arc<HashMap<String, PayloadValue>>,
}

impl IdentityToken {
    pub fn new(subject: impl Into<String>, payload: HashMap<String, PayloadValue>) -> Self {
        Self {
            subject: subject.into(),
            payload: Arc::new(payload),
        }
    }

    /// Name of the authenticated subject
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn payload(&self) -> &HashMap<String, PayloadValue> {
        &self.payload
    }

    /// The live session, if the payload still carries one
    pub fn session(&self) -> Option<&Arc<Session>> {
        match self.payload.get(SESSION) {
            Some(PayloadValue::Session(session)) => Some(session),
            _ => None,
        }
    }

    /// The serialized session snapshot
    pub fn serialized(&self) -> Option<&str> {
        match self.payload.get(SERIALIZED) {
            Some(PayloadValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// New token for the same subject with a replaced payload
    pub fn with_payload(&self, payload: HashMap<String, PayloadValue>) -> Self {
        Self::new(self.subject.clone(), payload)
    }

    /// New token for the same subject without one payload entry
    pub fn without_entry(&self, key: &str) -> Self {
        let mut payload = (*self.payload).clone();
        payload.remove(key);
        self.with_payload(payload)
    }
}

impl PartialEq for IdentityToken {
    fn eq(&self, other: &Self) -> bool {
        self.subject == other.subject
    }
}

impl Eq for IdentityToken {}

impl Hash for IdentityToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.subject.hash(state);
    }
}

impl fmt::Display for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.serialized().unwrap_or_default())
    }
}

impl fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.payload.keys().collect();
        keys.sort();
        f.debug_struct("IdentityToken")
            .field("subject", &self.subject)
            .field("payload", &keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RequestContext;
    use std::collections::HashSet;

    fn token(subject: &str, text: &str) -> IdentityToken {
        let session = Session::new(subject, &RequestContext::default());
        let mut payload = HashMap::new();
        payload.insert(SESSION.to_string(), PayloadValue::Session(Arc::new(session)));
        payload.insert(SERIALIZED.to_string(), PayloadValue::Text(text.to_string()));
        IdentityToken::new(subject, payload)
    }

    #[test]
    fn test_equality_uses_subject_only() {
        let a = token("alice", "one");
        let b = token("alice", "two");
        assert_eq!(a, b);
        assert_ne!(a, token("bob", "one"));

        let set: HashSet<IdentityToken> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_display_is_snapshot_text() {
        let t = token("alice", "\u{0}\u{ff}snapshot");
        assert_eq!(t.to_string(), "\u{0}\u{ff}snapshot");
        assert_eq!(t.without_entry(SERIALIZED).to_string(), "");
    }

    #[test]
    fn test_without_entry_leaves_original_untouched() {
        let original = token("alice", "x");
        let stripped = original.without_entry(SESSION);

        assert!(stripped.session().is_none());
        assert!(original.session().is_some());
        assert_eq!(stripped.serialized(), Some("x"));
    }
}
