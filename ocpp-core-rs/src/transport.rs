//! Collaborators injected into the engine: transport and clock

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::TransportError;
use crate::message::{InboundMessage, Message};

/// Seconds on the engine's clock
pub type Timestamp = u64;

/// Message transport to the central system.
///
/// Both calls must return promptly: the engine drives them from `step` and
/// has no suspension points of its own.
pub trait Transport {
    /// Hand one message to the wire
    fn send(&mut self, message: &Message) -> Result<(), TransportError>;

    /// Non-blocking poll; `Ok(None)` when nothing has arrived
    fn receive(&mut self) -> Result<Option<InboundMessage>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        (**self).send(message)
    }

    fn receive(&mut self) -> Result<Option<InboundMessage>, TransportError> {
        (**self).receive()
    }
}

/// Time source, read once at construction and once per step
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Wall clock in Unix seconds
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp().max(0) as Timestamp
    }
}

/// Settable clock; clones share the same time
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
