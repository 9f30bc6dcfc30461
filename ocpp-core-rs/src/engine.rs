//! Message engine
//!
//! Owns the slot pool and drives everything from [`Engine::step`]:
//!
//! 1. poll the transport once and correlate what arrived
//! 2. send the next ready message
//! 3. sweep the wait list for timed-out requests
//! 4. inject a Heartbeat when the link has been idle long enough
//!
//! The clock is read once per step; all timing in that step uses that value.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::configuration::{
    Configuration, SharedConfiguration, Value, HEARTBEAT_INTERVAL, TRANSACTION_MESSAGE_ATTEMPTS,
    TRANSACTION_MESSAGE_RETRY_INTERVAL,
};
use crate::error::{EngineError, Result};
use crate::event::{EventHandler, EventKind};
use crate::eviction;
use crate::heartbeat::{BootNotificationConf, HeartbeatMonitor};
use crate::message::{IdGenerator, InboundMessage, Message, MessageId, UuidGenerator};
use crate::pool::SlotId;
use crate::queue::{MessageHandle, MessageQueue, MessageState};
use crate::transport::{Clock, Timestamp, Transport};
use crate::types::{MessageRole, MessageType, RegistrationStatus};

/// Attempts at drawing an id that no live message uses
const MAX_ID_ATTEMPTS: usize = 8;

/// Engine shared between tasks
pub type SharedEngine<T, C, H> = Arc<Mutex<Engine<T, C, H>>>;

/// What one `step` did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    pub received: usize,
    pub sent: usize,
    pub send_failures: usize,
    pub requeued: usize,
    pub completed: usize,
    pub dropped: usize,
    pub heartbeat_queued: bool,
}

/// Builder for the engine
pub struct EngineBuilder<T, C, H> {
    transport: T,
    clock: C,
    handler: H,
    config: EngineConfig,
    configuration: Option<SharedConfiguration>,
    ids: Option<Box<dyn IdGenerator>>,
}

impl<T, C, H> EngineBuilder<T, C, H>
where
    T: Transport,
    C: Clock,
    H: EventHandler,
{
    /// Create a builder around the injected collaborators
    pub fn new(transport: T, clock: C, handler: H) -> Self {
        Self {
            transport,
            clock,
            handler,
            config: EngineConfig::default(),
            configuration: None,
            ids: None,
        }
    }

    /// Set engine tuning
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing configuration store
    pub fn configuration(mut self, configuration: SharedConfiguration) -> Self {
        self.configuration = Some(configuration);
        self
    }

    /// Replace the default UUID generator
    pub fn id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Some(Box::new(ids));
        self
    }

    pub fn build(self) -> Engine<T, C, H> {
        let now = self.clock.now();
        info!(
            "Message engine ready: {} slots, retry limit {}, timeout {}s",
            self.config.capacity,
            self.config.retry_limit,
            self.config.timeout_secs()
        );

        Engine {
            queue: MessageQueue::with_capacity(self.config.capacity),
            heartbeat: HeartbeatMonitor::new(now),
            configuration: self
                .configuration
                .unwrap_or_else(|| Configuration::new().shared()),
            ids: self.ids.unwrap_or_else(|| Box::new(UuidGenerator)),
            config: self.config,
            transport: self.transport,
            clock: self.clock,
            handler: self.handler,
            now,
        }
    }
}

/// Charge-point message engine
pub struct Engine<T, C, H> {
    config: EngineConfig,
    configuration: SharedConfiguration,
    transport: T,
    clock: C,
    handler: H,
    ids: Box<dyn IdGenerator>,
    queue: MessageQueue,
    heartbeat: HeartbeatMonitor,
    /// Clock value of the last step (or of construction)
    now: Timestamp,
}

impl<T, C, H> Engine<T, C, H>
where
    T: Transport,
    C: Clock,
    H: EventHandler,
{
    pub fn builder(transport: T, clock: C, handler: H) -> EngineBuilder<T, C, H> {
        EngineBuilder::new(transport, clock, handler)
    }

    pub fn into_shared(self) -> SharedEngine<T, C, H> {
        Arc::new(Mutex::new(self))
    }

    // ========================================================================
    // Admission
    // ========================================================================

    /// Queue a request. Fails with `OutOfCapacity` when the pool is full.
    pub fn push(&mut self, message_type: MessageType, payload: impl Into<Vec<u8>>) -> Result<MessageHandle> {
        self.admit_request(message_type, payload.into(), self.now, false)
    }

    /// Queue a request, evicting the oldest ordinary message if the pool is
    /// full. Fails only when every live message is transaction-class.
    pub fn push_force(&mut self, message_type: MessageType, payload: impl Into<Vec<u8>>) -> Result<MessageHandle> {
        self.admit_request(message_type, payload.into(), self.now, true)
    }

    /// Queue a request that is not sent before `delay_secs` have passed
    pub fn push_deferred(
        &mut self,
        message_type: MessageType,
        payload: impl Into<Vec<u8>>,
        delay_secs: u32,
    ) -> Result<()> {
        let due_at = self.now.saturating_add(u64::from(delay_secs));
        self.admit_request(message_type, payload.into(), due_at, false)
            .map(|_| ())
    }

    /// Answer a request received from the central system
    pub fn push_response(&mut self, request: &Message, payload: impl Into<Vec<u8>>, is_error: bool) -> Result<()> {
        if request.role != MessageRole::Call {
            return Err(EngineError::NotARequest(request.id.to_string()));
        }
        if self.queue.contains_id(request.id.as_str()) {
            return Err(EngineError::DuplicateId(request.id.to_string()));
        }
        if self.queue.is_full() {
            warn!("No slot for response to {} {}", request.message_type, request.id);
            return Err(EngineError::OutOfCapacity);
        }

        let role = if is_error {
            MessageRole::CallError
        } else {
            MessageRole::CallResult
        };
        let message = Message {
            id: request.id.clone(),
            role,
            message_type: request.message_type,
            payload: payload.into(),
        };

        self.queue
            .admit(message, self.now, self.now)
            .map_err(|_| EngineError::OutOfCapacity)?;
        debug!("Queued {} for {} {}", role, request.message_type, request.id);
        Ok(())
    }

    fn admit_request(
        &mut self,
        message_type: MessageType,
        payload: Vec<u8>,
        due_at: Timestamp,
        force: bool,
    ) -> Result<MessageHandle> {
        let id = self.fresh_id()?;

        if self.queue.is_full() {
            if !force {
                warn!("Pool full, {} not queued", message_type);
                return Err(EngineError::OutOfCapacity);
            }
            self.evict_one()?;
        }

        let message = Message {
            id,
            role: MessageRole::Call,
            message_type,
            payload,
        };
        let handle = self
            .queue
            .admit(message, self.now, due_at)
            .map_err(|_| EngineError::OutOfCapacity)?;

        debug!(
            "Queued {} ({} of {} slots live)",
            message_type,
            self.queue.len(),
            self.queue.capacity()
        );
        Ok(handle)
    }

    fn fresh_id(&mut self) -> Result<MessageId> {
        for _ in 0..MAX_ID_ATTEMPTS {
            match MessageId::new(self.ids.generate()) {
                Ok(id) if !self.queue.contains_id(id.as_str()) => return Ok(id),
                Ok(id) => debug!("Generated id {} is already live, drawing again", id),
                Err(e) => warn!("Id generator: {}", e),
            }
        }
        Err(EngineError::IdGeneration)
    }

    fn evict_one(&mut self) -> Result<()> {
        let victim = eviction::select_victim(&self.queue).ok_or_else(|| {
            warn!("Pool full of transaction messages, nothing to evict");
            EngineError::OutOfCapacity
        })?;

        if let Some(message) = self.queue.get(victim) {
            info!("Evicting {} {} to make room", message.message_type, message.id);
        }
        self.release(victim, MessageState::Dropped);
        Ok(())
    }

    // ========================================================================
    // Step
    // ========================================================================

    /// Advance the engine by one tick
    ///
    /// Timeouts are swept after the send, so a request found timed out is
    /// re-sent on the following step. Stepping once per response timeout
    /// therefore spaces retries two timeouts apart; step more often than
    /// the timeout to keep the spacing close to it.
    pub fn step(&mut self) -> StepReport {
        let now = self.clock.now();
        self.now = now;

        let mut report = StepReport::default();
        self.poll_incoming(now, &mut report);
        self.transmit(now, &mut report);
        self.sweep_timeouts(now, &mut report);
        self.check_heartbeat(now, &mut report);
        report
    }

    fn poll_incoming(&mut self, now: Timestamp, report: &mut StepReport) {
        match self.transport.receive() {
            Ok(Some(inbound)) => {
                report.received += 1;
                self.correlate(inbound, now, report);
            }
            Ok(None) => {}
            Err(e) => debug!("Receive failed: {}", e),
        }
    }

    fn correlate(&mut self, inbound: InboundMessage, now: Timestamp, report: &mut StepReport) {
        let InboundMessage {
            id,
            role,
            message_type,
            payload,
        } = inbound;

        let id = match MessageId::new(id) {
            Ok(id) => id,
            Err(e) => {
                debug!("Ignoring inbound {}: {}", role, e);
                return;
            }
        };

        match role {
            MessageRole::Call => {
                let Some(message_type) = message_type else {
                    debug!("Ignoring call {} without action", id);
                    return;
                };
                debug!("Received {} request {}", message_type, id);

                let request = Message {
                    id,
                    role,
                    message_type,
                    payload,
                };
                self.handler.on_event(EventKind::Incoming, &request, &self.queue);
            }
            MessageRole::CallResult | MessageRole::CallError => {
                let Some(slot) = self.queue.waiting_slot(id.as_str()) else {
                    debug!("No request waiting for {} {}", role, id);
                    return;
                };
                let Some(message_type) = self.queue.entry(slot).map(|e| e.message.message_type) else {
                    return;
                };
                debug!("{} for {} {}", role, message_type, id);

                let response = Message {
                    id,
                    role,
                    message_type,
                    payload,
                };
                if role == MessageRole::CallResult && message_type == MessageType::BootNotification {
                    self.apply_boot_response(&response.payload);
                }
                self.handler.on_event(EventKind::Incoming, &response, &self.queue);

                if role == MessageRole::CallError && message_type.is_transaction_related() {
                    self.reject_transaction(slot, now, report);
                } else {
                    self.release(slot, MessageState::Completed);
                    report.completed += 1;
                }
            }
            _ => debug!("Ignoring inbound {} {}", role, id),
        }
    }

    fn apply_boot_response(&mut self, payload: &[u8]) {
        match BootNotificationConf::from_payload(payload) {
            Ok(conf) if conf.status == RegistrationStatus::Accepted => {
                self.heartbeat.accept();
                if conf.interval > 0 {
                    let result = self
                        .configuration
                        .write()
                        .set(HEARTBEAT_INTERVAL, Value::Int(conf.interval));
                    match result {
                        Ok(()) => info!("Heartbeat interval set to {}s", conf.interval),
                        Err(e) => warn!("Heartbeat interval not applied: {}", e),
                    }
                }
            }
            Ok(conf) => info!("BootNotification answered with {:?}", conf.status),
            Err(e) => warn!("Undecodable BootNotification response: {}", e),
        }
    }

    /// CallError for a transaction-class request: back off quadratically, or
    /// give up once the configured number of error responses is reached
    fn reject_transaction(&mut self, slot: SlotId, now: Timestamp, report: &mut StepReport) {
        let (max_attempts, interval) = self.transaction_policy();

        let Some(entry) = self.queue.entry_mut(slot) else {
            return;
        };
        entry.rejections += 1;
        let rejections = entry.rejections;
        let message_type = entry.message.message_type;

        if rejections >= max_attempts {
            warn!(
                "{} rejected {} times, dropping",
                message_type, rejections
            );
            self.release(slot, MessageState::Dropped);
            report.dropped += 1;
            return;
        }

        let k = u64::from(rejections);
        let delay = interval.saturating_mul(k * k);
        info!("{} rejected, retrying in {}s", message_type, delay);
        self.queue.requeue(slot, now.saturating_add(delay));
        report.requeued += 1;
    }

    fn transaction_policy(&self) -> (u32, u64) {
        let configuration = self.configuration.read();
        let attempts = configuration
            .get_int(TRANSACTION_MESSAGE_ATTEMPTS)
            .unwrap_or(1)
            .max(1);
        let interval = configuration
            .get_int(TRANSACTION_MESSAGE_RETRY_INTERVAL)
            .unwrap_or(0)
            .max(0);
        (attempts as u32, interval as u64)
    }

    fn transmit(&mut self, now: Timestamp, report: &mut StepReport) {
        let Some(slot) = self.queue.dequeue_ready(now) else {
            return;
        };
        let Some(entry) = self.queue.entry(slot) else {
            return;
        };
        let outcome = self.transport.send(&entry.message);

        let Some(entry) = self.queue.entry_mut(slot) else {
            return;
        };
        entry.attempts += 1;
        let attempts = entry.attempts;
        let role = entry.message.role;
        let message_type = entry.message.message_type;

        match outcome {
            Ok(()) => {
                report.sent += 1;
                self.heartbeat.record_activity(now);
                debug!("Sent {} {} (attempt {})", role, message_type, attempts);

                if role == MessageRole::Call {
                    self.queue.move_to_wait(slot, now);
                    self.notify(EventKind::Outgoing, slot);
                } else {
                    // Nothing answers a response
                    self.notify(EventKind::Outgoing, slot);
                    self.release(slot, MessageState::Completed);
                    report.completed += 1;
                }
            }
            Err(e) => {
                report.send_failures += 1;

                if !message_type.is_transaction_related() && attempts >= self.config.retry_limit {
                    warn!(
                        "Dropping {} {} after {} failed sends: {}",
                        role, message_type, attempts, e
                    );
                    self.release(slot, MessageState::Dropped);
                    report.dropped += 1;
                } else {
                    let due_at = now.saturating_add(self.config.timeout_secs());
                    entry.due_at = due_at;
                    debug!(
                        "Send of {} {} failed ({}), next attempt at {}",
                        role, message_type, e, due_at
                    );
                }
            }
        }
    }

    fn sweep_timeouts(&mut self, now: Timestamp, report: &mut StepReport) {
        let timeout = self.config.timeout_secs();

        for slot in self.queue.expired(now, timeout) {
            let Some(entry) = self.queue.entry(slot) else {
                continue;
            };
            let message_type = entry.message.message_type;
            let attempts = entry.attempts;
            let age = now.saturating_sub(entry.created_at);
            let give_up =
                !message_type.is_transaction_related() && attempts >= self.config.retry_limit;

            if give_up {
                warn!(
                    "No response to {} after {} attempts ({}s), dropping",
                    message_type, attempts, age
                );
                self.release(slot, MessageState::Dropped);
                report.dropped += 1;
            } else {
                debug!("No response to {} within {}s, re-queuing", message_type, timeout);
                self.queue.requeue(slot, now);
                report.requeued += 1;
            }
        }
    }

    fn check_heartbeat(&mut self, now: Timestamp, report: &mut StepReport) {
        let interval = self
            .configuration
            .read()
            .get_int(HEARTBEAT_INTERVAL)
            .unwrap_or(0);

        if !self.heartbeat.is_due(now, interval) || self.queue.contains_type(MessageType::Heartbeat) {
            return;
        }

        match self.push(MessageType::Heartbeat, b"{}".to_vec()) {
            Ok(_) => {
                debug!("Idle for {}s, heartbeat queued", interval);
                report.heartbeat_queued = true;
            }
            Err(e) => debug!("Heartbeat not queued: {}", e),
        }
    }

    /// Fire FREE while the message is still findable, then reclaim the slot
    fn release(&mut self, slot: SlotId, state: MessageState) {
        if let Some(entry) = self.queue.entry_mut(slot) {
            entry.state = state;
        }
        self.notify(EventKind::Free, slot);
        self.queue.remove(slot);
    }

    fn notify(&mut self, kind: EventKind, slot: SlotId) {
        let queue = &self.queue;
        if let Some(entry) = queue.entry(slot) {
            self.handler.on_event(kind, &entry.message, queue);
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Live messages, queued and awaiting a response
    pub fn count_pending(&self) -> usize {
        self.queue.len()
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Message> {
        self.queue.find_by_id(id)
    }

    pub fn get(&self, handle: MessageHandle) -> Option<&Message> {
        self.queue.get(handle)
    }

    pub fn type_of_id(&self, id: &str) -> Option<MessageType> {
        self.queue.find_by_id(id).map(|m| m.message_type)
    }

    pub fn state_of(&self, id: &str) -> Option<MessageState> {
        self.queue.state_of(id)
    }

    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    pub fn configuration(&self) -> &SharedConfiguration {
        &self.configuration
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Clock value of the last step
    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn is_session_accepted(&self) -> bool {
        self.heartbeat.is_accepted()
    }

    /// Forget the accepted BootNotification, e.g. after a reconnect
    pub fn reset_session(&mut self) {
        info!("Session reset");
        self.heartbeat.reset();
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }
}
