//! Message records and correlation identifiers

use std::borrow::Borrow;
use std::fmt;

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use crate::error::EngineError;
use crate::types::{MessageRole, MessageType};

/// Maximum length of an OCPP-J message id
pub const MESSAGE_ID_MAX_LEN: usize = 36;

/// Correlation token shared by a request and its response.
///
/// Non-empty, printable ASCII, at most [`MESSAGE_ID_MAX_LEN`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Result<Self, EngineError> {
        let id = id.into();
        let printable = id.bytes().all(|b| b.is_ascii_graphic());

        if id.is_empty() || id.len() > MESSAGE_ID_MAX_LEN || !printable {
            return Err(EngineError::InvalidId(id));
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for MessageId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for MessageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A request or response owned by the engine.
///
/// The payload is opaque to the engine; it is copied in on push and handed to
/// the transport unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub role: MessageRole,
    pub message_type: MessageType,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn is_transaction_related(&self) -> bool {
        self.message_type.is_transaction_related()
    }
}

/// Envelope produced by `Transport::receive`.
///
/// Responses do not name their action on the wire, so `message_type` is only
/// expected for inbound calls; the correlator takes the type of a response
/// from the request it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: String,
    pub role: MessageRole,
    pub message_type: Option<MessageType>,
    pub payload: Vec<u8>,
}

// ============================================================================
// Identifier generation
// ============================================================================

/// Source of fresh correlation tokens for outgoing requests
pub trait IdGenerator: Send {
    fn generate(&mut self) -> String;
}

/// UUID v4 ids, 36 characters
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&mut self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Alphanumeric ids drawn from an injected RNG
#[derive(Debug, Clone)]
pub struct RandomIdGenerator<R = StdRng> {
    rng: R,
    len: usize,
}

impl RandomIdGenerator<StdRng> {
    /// Entropy-seeded generator producing full-length ids
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy(), MESSAGE_ID_MAX_LEN)
    }

    /// Deterministic generator, for reproducible runs
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed), MESSAGE_ID_MAX_LEN)
    }
}

impl<R: Rng> RandomIdGenerator<R> {
    pub fn new(rng: R, len: usize) -> Self {
        Self {
            rng,
            len: len.clamp(1, MESSAGE_ID_MAX_LEN),
        }
    }
}

impl<R: Rng + Send> IdGenerator for RandomIdGenerator<R> {
    fn generate(&mut self) -> String {
        (0..self.len)
            .map(|_| self.rng.sample(Alphanumeric) as char)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_validation() {
        assert!(MessageId::new("msg-123").is_ok());
        assert!(MessageId::new("").is_err());
        assert!(MessageId::new("has space").is_err());
        assert!(MessageId::new("x".repeat(MESSAGE_ID_MAX_LEN)).is_ok());
        assert!(MessageId::new("x".repeat(MESSAGE_ID_MAX_LEN + 1)).is_err());
    }

    #[test]
    fn test_uuid_ids_are_valid() {
        let mut ids = UuidGenerator;
        let id = ids.generate();
        assert_eq!(id.len(), 36);
        assert!(MessageId::new(id).is_ok());
    }

    #[test]
    fn test_seeded_ids_repeat() {
        let mut a = RandomIdGenerator::seeded(7);
        let mut b = RandomIdGenerator::seeded(7);
        let first = a.generate();

        assert_eq!(first, b.generate());
        assert_ne!(first, a.generate());
        assert!(first.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_short_ids() {
        let mut ids = RandomIdGenerator::new(StdRng::seed_from_u64(1), 8);
        assert_eq!(ids.generate().len(), 8);
    }
}
