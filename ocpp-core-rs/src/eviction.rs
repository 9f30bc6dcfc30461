//! Victim selection for forced admission

use crate::message::Message;
use crate::pool::SlotId;
use crate::queue::MessageQueue;

/// Transaction-class messages are never sacrificed
pub fn is_evictable(message: &Message) -> bool {
    !message.is_transaction_related()
}

/// Oldest evictable message across the pending queue and the wait list
pub(crate) fn select_victim(queue: &MessageQueue) -> Option<SlotId> {
    queue.oldest_first().into_iter().find(|slot| {
        queue
            .entry(*slot)
            .is_some_and(|entry| is_evictable(&entry.message))
    })
}
