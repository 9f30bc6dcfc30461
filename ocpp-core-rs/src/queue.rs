//! Pending queue and wait list over the slot pool
//!
//! A live message is in exactly one of two views: the pending queue
//! (`Queued`/`Retrying`, admission order) or the wait list (`Sent`, send
//! order). Both are searchable by id through a shared index.

use std::collections::{HashMap, VecDeque};

use crate::message::{Message, MessageId};
use crate::pool::{SlotId, SlotPool};
use crate::transport::Timestamp;
use crate::types::{MessageRole, MessageType};

/// Handle returned by push operations
pub type MessageHandle = SlotId;

/// Lifecycle of a live message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageState {
    /// Admitted, never handed to the transport
    Queued,
    /// Sent, awaiting a response
    Sent,
    /// Back in the pending queue after a timeout or an error response
    Retrying,
    /// Answered or (for responses) sent; about to be released
    Completed,
    /// Given up on or evicted; about to be released
    Dropped,
}

/// Engine bookkeeping kept next to each message
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub message: Message,
    pub seq: u64,
    pub created_at: Timestamp,
    pub due_at: Timestamp,
    pub last_attempt: Option<Timestamp>,
    pub attempts: u32,
    pub rejections: u32,
    pub state: MessageState,
}

/// Read-only view handed to event handlers, plus the engine's mutators
#[derive(Debug)]
pub struct MessageQueue {
    pool: SlotPool<Entry>,
    pending: VecDeque<SlotId>,
    waiting: Vec<SlotId>,
    ids: HashMap<MessageId, SlotId>,
    next_seq: u64,
}

impl MessageQueue {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            pool: SlotPool::with_capacity(capacity),
            pending: VecDeque::with_capacity(capacity),
            waiting: Vec::with_capacity(capacity),
            ids: HashMap::with_capacity(capacity),
            next_seq: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Live messages, pending and waiting
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.pool.is_full()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Message> {
        self.find_slot(id)
            .and_then(|slot| self.pool.get(slot))
            .map(|entry| &entry.message)
    }

    pub fn state_of(&self, id: &str) -> Option<MessageState> {
        self.find_slot(id)
            .and_then(|slot| self.pool.get(slot))
            .map(|entry| entry.state)
    }

    /// Send attempts made so far for a live message
    pub fn attempts_of(&self, id: &str) -> Option<u32> {
        self.find_slot(id)
            .and_then(|slot| self.pool.get(slot))
            .map(|entry| entry.attempts)
    }

    pub fn get(&self, handle: MessageHandle) -> Option<&Message> {
        self.pool.get(handle).map(|entry| &entry.message)
    }

    pub fn contains_type(&self, message_type: MessageType) -> bool {
        self.pool
            .iter()
            .any(|(_, entry)| entry.message.message_type == message_type)
    }

    /// Live messages ordered by admission, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.oldest_first()
            .into_iter()
            .filter_map(|slot| self.get(slot))
    }

    // ------------------------------------------------------------------
    // Engine side
    // ------------------------------------------------------------------

    pub(crate) fn entry(&self, slot: SlotId) -> Option<&Entry> {
        self.pool.get(slot)
    }

    pub(crate) fn entry_mut(&mut self, slot: SlotId) -> Option<&mut Entry> {
        self.pool.get_mut(slot)
    }

    pub(crate) fn find_slot(&self, id: &str) -> Option<SlotId> {
        self.ids.get(id).copied()
    }

    /// Slot of a `Sent` message with this id; pending messages never match
    pub(crate) fn waiting_slot(&self, id: &str) -> Option<SlotId> {
        self.find_slot(id).filter(|slot| self.waiting.contains(slot))
    }

    /// Admit at the tail of the pending queue. Hands the message back when
    /// the pool is full or the id is taken.
    pub(crate) fn admit(
        &mut self,
        message: Message,
        now: Timestamp,
        due_at: Timestamp,
    ) -> Result<SlotId, Message> {
        if self.ids.contains_key(message.id.as_str()) {
            return Err(message);
        }

        let id = message.id.clone();
        let entry = Entry {
            message,
            seq: self.next_seq,
            created_at: now,
            due_at,
            last_attempt: None,
            attempts: 0,
            rejections: 0,
            state: MessageState::Queued,
        };

        let slot = self.pool.allocate(entry).map_err(|entry| entry.message)?;
        self.next_seq += 1;
        self.ids.insert(id, slot);
        self.pending.push_back(slot);

        Ok(slot)
    }

    pub(crate) fn has_call_in_flight(&self) -> bool {
        self.waiting.iter().any(|slot| {
            self.pool
                .get(*slot)
                .is_some_and(|entry| entry.message.role == MessageRole::Call)
        })
    }

    /// Next pending message due for a send attempt.
    ///
    /// Walks the queue in admission order. No Call is ready while another
    /// Call is outstanding. A transaction-class Call that has already been
    /// tried and is waiting out a retry delay holds back later
    /// transaction-class Calls, keeping their relative order. Anything else
    /// that is not yet due, a never-sent deferred message included, is
    /// skipped.
    pub(crate) fn dequeue_ready(&self, now: Timestamp) -> Option<SlotId> {
        let calls_blocked = self.has_call_in_flight();
        let mut transactions_blocked = false;

        for &slot in &self.pending {
            let Some(entry) = self.pool.get(slot) else {
                continue;
            };
            let message = &entry.message;
            let is_call = message.role == MessageRole::Call;
            let ordered = is_call && message.is_transaction_related();

            if is_call && calls_blocked {
                continue;
            }
            if ordered && transactions_blocked {
                continue;
            }
            if entry.due_at <= now {
                return Some(slot);
            }
            if ordered && (entry.attempts > 0 || entry.state == MessageState::Retrying) {
                transactions_blocked = true;
            }
        }

        None
    }

    pub(crate) fn move_to_wait(&mut self, slot: SlotId, now: Timestamp) {
        self.pending.retain(|s| *s != slot);
        if let Some(entry) = self.pool.get_mut(slot) {
            entry.state = MessageState::Sent;
            entry.last_attempt = Some(now);
            self.waiting.push(slot);
        }
    }

    /// Put a sent message back into the pending queue at its admission
    /// position, due at `due_at`.
    pub(crate) fn requeue(&mut self, slot: SlotId, due_at: Timestamp) {
        let Some(entry) = self.pool.get_mut(slot) else {
            return;
        };
        entry.state = MessageState::Retrying;
        entry.due_at = due_at;
        let seq = entry.seq;

        self.waiting.retain(|s| *s != slot);
        if self.pending.contains(&slot) {
            return;
        }

        let position = self
            .pending
            .iter()
            .position(|s| self.pool.get(*s).is_some_and(|e| e.seq > seq))
            .unwrap_or(self.pending.len());
        self.pending.insert(position, slot);
    }

    /// Wait-list entries whose last send is at least `timeout` seconds old
    pub(crate) fn expired(&self, now: Timestamp, timeout: u64) -> Vec<SlotId> {
        self.waiting
            .iter()
            .copied()
            .filter(|slot| {
                self.pool
                    .get(*slot)
                    .and_then(|entry| entry.last_attempt)
                    .is_some_and(|sent| now.saturating_sub(sent) >= timeout)
            })
            .collect()
    }

    pub(crate) fn oldest_first(&self) -> Vec<SlotId> {
        let mut live: Vec<(u64, SlotId)> = self
            .pool
            .iter()
            .map(|(slot, entry)| (entry.seq, slot))
            .collect();
        live.sort_unstable_by_key(|(seq, _)| *seq);
        live.into_iter().map(|(_, slot)| slot).collect()
    }

    pub(crate) fn remove(&mut self, slot: SlotId) -> Option<Entry> {
        let entry = self.pool.release(slot)?;
        self.pending.retain(|s| *s != slot);
        self.waiting.retain(|s| *s != slot);
        self.ids.remove(entry.message.id.as_str());
        Some(entry)
    }
}
