//! Session snapshot encoding.
//!
//! A snapshot is `SNAPSHOT_MAGIC` followed by the bincode encoding of the session. The
//! bytes are carried as text one character per byte (U+0000..=U+00FF), which maps every
//! byte value to exactly one character and back.

use super::{IdentityToken, PayloadValue, SERIALIZED, SESSION};
use crate::engine::Session;
use crate::error::SerializationError;
use bincode::Options;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Leading bytes of every session snapshot
pub const SNAPSHOT_MAGIC: &[u8] = b"RSS\x01";

/// Upper bound on the encoded size of one session
const MAX_SNAPSHOT_BYTES: u64 = 1 << 20;

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_SNAPSHOT_BYTES)
        .reject_trailing_bytes()
}

/// Converts between sessions, snapshot text and identity tokens
pub struct IdentityTokenBridge;

impl IdentityTokenBridge {
    /// Encode a session as snapshot text
    pub fn serialize(session: &Session) -> Result<String, SerializationError> {
        let mut bytes = SNAPSHOT_MAGIC.to_vec();
        codec().serialize_into(&mut bytes, session).map_err(|e| {
            error!(user_id = %session.user_id, error = %e, "Session snapshot encoding failed");
            SerializationError::from(e)
        })?;
        debug!(user_id = %session.user_id, bytes = bytes.len(), "Session serialized");
        Ok(Self::bytes_to_text(&bytes))
    }

    /// Decode snapshot text back into a session
    pub fn deserialize(text: &str) -> Result<Session, SerializationError> {
        let bytes = Self::text_to_bytes(text)?;
        if bytes.len() < SNAPSHOT_MAGIC.len() && SNAPSHOT_MAGIC.starts_with(&bytes) {
            return Err(SerializationError::Io(format!(
                "snapshot truncated after {} bytes",
                bytes.len()
            )));
        }
        let Some(body) = bytes.strip_prefix(SNAPSHOT_MAGIC) else {
            return Err(SerializationError::UnrecognizedType(
                "text is not a session snapshot".to_string(),
            ));
        };
        let session: Session = codec().deserialize(body)?;
        Ok(session)
    }

    /// Build the token for a subject, carrying the live session and its snapshot
    pub fn to_token(
        subject: impl Into<String>,
        session: Session,
    ) -> Result<IdentityToken, SerializationError> {
        let serialized = Self::serialize(&session)?;
        Ok(IdentityToken::new(subject, Self::payload(session, serialized)))
    }

    /// Build a new token from snapshot text alone
    pub fn rehydrate(text: &str) -> Result<IdentityToken, SerializationError> {
        let session = Self::deserialize(text)?;
        let subject = session.user_id.clone();
        Ok(IdentityToken::new(
            subject,
            Self::payload(session, text.to_string()),
        ))
    }

    /// New token whose live session is decoded from `token`'s own snapshot
    pub fn restore(token: &IdentityToken) -> Result<IdentityToken, SerializationError> {
        let text = token.serialized().ok_or_else(|| {
            SerializationError::UnrecognizedType(format!(
                "token for {} carries no snapshot",
                token.subject()
            ))
        })?;
        let session = Self::deserialize(text)?;
        Ok(token.with_payload(Self::payload(session, text.to_string())))
    }

    /// Map each byte to the character with the same code point
    pub fn bytes_to_text(bytes: &[u8]) -> String {
        bytes.iter().map(|&b| char::from(b)).collect()
    }

    /// Inverse of [`bytes_to_text`](Self::bytes_to_text)
    pub fn text_to_bytes(text: &str) -> Result<Vec<u8>, SerializationError> {
        text.chars()
            .enumerate()
            .map(|(position, c)| {
                u8::try_from(c).map_err(|_| {
                    SerializationError::BadEncoding(format!(
                        "character U+{:04X} at position {} is outside the single-byte range",
                        u32::from(c),
                        position
                    ))
                })
            })
            .collect()
    }

    fn payload(session: Session, serialized: String) -> HashMap<String, PayloadValue> {
        let mut payload = HashMap::new();
        payload.insert(
            SESSION.to_string(),
            PayloadValue::Session(Arc::new(session)),
        );
        payload.insert(SERIALIZED.to_string(), PayloadValue::Text(serialized));
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RequestContext;

    fn session() -> Session {
        let mut session = Session::new("alice", &RequestContext::new("branch-7"));
        session.authenticated = true;
        session.requested_roles = ["teller", "auditor"].iter().map(|r| r.to_string()).collect();
        session.activated_roles = session.requested_roles.clone();
        session.warnings.push("password expires in 3 days".to_string());
        session
    }

    #[test]
    fn test_round_trip_preserves_session() {
        let original = session();
        let text = IdentityTokenBridge::serialize(&original).unwrap();
        let decoded = IdentityTokenBridge::deserialize(&text).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_every_byte_value_survives_text_form() {
        let all: Vec<u8> = (0..=255).collect();
        for len in [0, 1, 128, 256] {
            let bytes = &all[..len];
            let text = IdentityTokenBridge::bytes_to_text(bytes);
            assert_eq!(text.chars().count(), len);
            assert_eq!(IdentityTokenBridge::text_to_bytes(&text).unwrap(), bytes);
        }
    }

    #[test]
    fn test_engine_state_survives_byte_for_byte() {
        let mut original = session();
        original.engine_state = (0u8..37).map(|b| b.wrapping_mul(7).wrapping_add(200)).collect();
        assert_eq!(original.engine_state.len(), 37);

        let text = IdentityTokenBridge::serialize(&original).unwrap();
        let decoded = IdentityTokenBridge::deserialize(&text).unwrap();

        assert_eq!(decoded.engine_state, original.engine_state);
        assert_eq!(decoded.activated_roles, original.activated_roles);
    }

    #[test]
    fn test_multibyte_character_is_bad_encoding() {
        let result = IdentityTokenBridge::deserialize("RSS\u{1}\u{263a}");
        assert!(matches!(result, Err(SerializationError::BadEncoding(_))));
    }

    #[test]
    fn test_foreign_text_is_unrecognized() {
        let result = IdentityTokenBridge::deserialize("alice:teller,auditor");
        assert!(matches!(result, Err(SerializationError::UnrecognizedType(_))));
    }

    #[test]
    fn test_truncated_snapshot_is_io_failure() {
        let text = IdentityTokenBridge::serialize(&session()).unwrap();
        let truncated: String = text.chars().take(text.chars().count() / 2).collect();
        assert!(matches!(
            IdentityTokenBridge::deserialize(&truncated),
            Err(SerializationError::Io(_))
        ));
        assert!(matches!(
            IdentityTokenBridge::deserialize(""),
            Err(SerializationError::Io(_))
        ));
    }

    #[test]
    fn test_trailing_bytes_are_unrecognized() {
        let mut text = IdentityTokenBridge::serialize(&session()).unwrap();
        text.push('\u{0}');
        assert!(matches!(
            IdentityTokenBridge::deserialize(&text),
            Err(SerializationError::UnrecognizedType(_))
        ));
    }

    #[test]
    fn test_to_token_carries_live_session_and_snapshot() {
        let original = session();
        let token = IdentityTokenBridge::to_token("alice", original.clone()).unwrap();

        assert_eq!(token.subject(), "alice");
        assert_eq!(token.session().map(|s| s.as_ref()), Some(&original));
        assert_eq!(
            token.to_string(),
            IdentityTokenBridge::serialize(&original).unwrap()
        );
    }

    #[test]
    fn test_restore_rebuilds_live_session() {
        let token = IdentityTokenBridge::to_token("alice", session()).unwrap();
        let stripped = token.without_entry(SESSION);

        let restored = IdentityTokenBridge::restore(&stripped).unwrap();
        assert_eq!(restored, token);
        assert_eq!(restored.session(), token.session());
        assert!(stripped.session().is_none());

        let rehydrated = IdentityTokenBridge::rehydrate(&token.to_string()).unwrap();
        assert_eq!(rehydrated.subject(), "alice");
    }
}
