//! Shared fixtures: a scripted transport, a recording event handler and a
//! harness that steps the engine on a manual clock.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use ocpp_core::{
    Configuration, Engine, EngineConfig, EventHandler, EventKind, IdGenerator, InboundMessage,
    ManualClock,
    Message, MessageQueue, MessageRole, MessageState, MessageType, StepReport, Timestamp,
    Transport, TransportError,
};
use parking_lot::Mutex;

// ============================================================================
// Transport
// ============================================================================

#[derive(Debug, Default)]
struct LinkState {
    /// Every send attempt, successful or not
    attempts: Vec<Message>,
    /// Messages accepted by the wire
    sent: Vec<Message>,
    inbox: VecDeque<InboundMessage>,
    failing: bool,
}

/// Scripted transport; clones share state
#[derive(Debug, Clone, Default)]
pub struct Link {
    state: Arc<Mutex<LinkState>>,
}

impl Link {
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    pub fn deliver(&self, inbound: InboundMessage) {
        self.state.lock().inbox.push_back(inbound);
    }

    pub fn deliver_result(&self, id: &str, payload: &str) {
        self.deliver(InboundMessage {
            id: id.to_string(),
            role: MessageRole::CallResult,
            message_type: None,
            payload: payload.as_bytes().to_vec(),
        });
    }

    pub fn deliver_error(&self, id: &str) {
        self.deliver(InboundMessage {
            id: id.to_string(),
            role: MessageRole::CallError,
            message_type: None,
            payload: br#"{"errorCode":"InternalError","errorDescription":"","errorDetails":{}}"#
                .to_vec(),
        });
    }

    pub fn deliver_call(&self, id: &str, message_type: MessageType, payload: &str) {
        self.deliver(InboundMessage {
            id: id.to_string(),
            role: MessageRole::Call,
            message_type: Some(message_type),
            payload: payload.as_bytes().to_vec(),
        });
    }

    pub fn sent(&self) -> Vec<Message> {
        self.state.lock().sent.clone()
    }

    pub fn attempts(&self) -> Vec<Message> {
        self.state.lock().attempts.clone()
    }

    pub fn last_sent(&self) -> Option<Message> {
        self.state.lock().sent.last().cloned()
    }
}

impl Transport for Link {
    fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.attempts.push(message.clone());
        if state.failing {
            return Err(TransportError::Disconnected);
        }
        state.sent.push(message.clone());
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<InboundMessage>, TransportError> {
        Ok(self.state.lock().inbox.pop_front())
    }
}

// ============================================================================
// Events
// ============================================================================

/// One delivered event, with what the queue looked like at that moment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub kind: EventKind,
    pub message: Message,
    pub findable: bool,
    pub state: Option<MessageState>,
    pub live: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Recorded>>>,
}

impl Recorder {
    pub fn all(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<Recorded> {
        self.all().into_iter().filter(|e| e.kind == kind).collect()
    }

    pub fn for_id(&self, id: &str) -> Vec<Recorded> {
        self.all()
            .into_iter()
            .filter(|e| e.message.id.as_str() == id)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventHandler for Recorder {
    fn on_event(&mut self, kind: EventKind, message: &Message, queue: &MessageQueue) {
        let id = message.id.as_str();
        self.events.lock().push(Recorded {
            kind,
            message: message.clone(),
            findable: queue.find_by_id(id).is_some(),
            state: queue.state_of(id),
            live: queue.len(),
        });
    }
}

// ============================================================================
// Harness
// ============================================================================

pub type TestEngine = Engine<Link, ManualClock, Recorder>;

pub struct Harness {
    pub engine: TestEngine,
    pub link: Link,
    pub clock: ManualClock,
    pub events: Recorder,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(EngineConfig::default(), Configuration::new())
    }

    pub fn with(config: EngineConfig, configuration: Configuration) -> Self {
        let link = Link::default();
        let clock = ManualClock::new(0);
        let events = Recorder::default();

        let engine = Engine::builder(link.clone(), clock.clone(), events.clone())
            .config(config)
            .configuration(configuration.shared())
            .build();

        Self {
            engine,
            link,
            clock,
            events,
        }
    }

    /// Harness whose message ids come from `ids`
    pub fn with_ids(config: EngineConfig, ids: impl IdGenerator + 'static) -> Self {
        let link = Link::default();
        let clock = ManualClock::new(0);
        let events = Recorder::default();

        let engine = Engine::builder(link.clone(), clock.clone(), events.clone())
            .config(config)
            .id_generator(ids)
            .build();

        Self {
            engine,
            link,
            clock,
            events,
        }
    }

    pub fn step_at(&mut self, now: Timestamp) -> StepReport {
        self.clock.set(now);
        self.engine.step()
    }

    /// Id of the most recent successfully sent message
    pub fn last_id(&self) -> String {
        self.link
            .last_sent()
            .map(|m| m.id.to_string())
            .unwrap_or_default()
    }

    /// BootNotification sent at `at`, accepted at `at + 1`
    pub fn boot(&mut self, at: Timestamp, interval: i32) {
        self.engine
            .push_force(MessageType::BootNotification, b"{}".to_vec())
            .unwrap();
        self.step_at(at);
        let id = self.last_id();
        self.link.deliver_result(
            &id,
            &format!(
                r#"{{"status":"Accepted","currentTime":"2024-01-01T00:00:00Z","interval":{}}}"#,
                interval
            ),
        );
        self.step_at(at + 1);
        assert!(self.engine.is_session_accepted());
    }
}
