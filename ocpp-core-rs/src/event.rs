//! Lifecycle notifications delivered to the embedder

use crate::message::Message;
use crate::queue::MessageQueue;

/// Externally observable transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A response to one of our requests, or a request from the central
    /// system, has arrived
    Incoming,
    /// A message was handed to the transport
    Outgoing,
    /// A message is about to be released. It is still findable in the queue
    /// during the callback and gone once it returns.
    Free,
}

/// Receives every event synchronously from inside `step` and the push
/// operations.
///
/// Handlers only get shared access to the queue, so they cannot mutate the
/// engine while it is notifying them.
pub trait EventHandler {
    fn on_event(&mut self, kind: EventKind, message: &Message, queue: &MessageQueue);
}

impl<F> EventHandler for F
where
    F: FnMut(EventKind, &Message, &MessageQueue),
{
    fn on_event(&mut self, kind: EventKind, message: &Message, queue: &MessageQueue) {
        self(kind, message, queue)
    }
}
