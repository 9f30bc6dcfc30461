//! Forced admission into a full pool

mod common;

use common::Harness;
use ocpp_core::{EngineError, EventKind, MessageState, MessageType};

#[test]
fn force_push_evicts_oldest_ordinary_message() {
    let mut h = Harness::new();

    let mut ids = Vec::new();
    for _ in 0..8 {
        let handle = h.engine.push(MessageType::MeterValues, b"{}".to_vec()).unwrap();
        ids.push(h.engine.get(handle).unwrap().id.to_string());
    }
    assert_eq!(
        h.engine.push(MessageType::Heartbeat, b"{}".to_vec()),
        Err(EngineError::OutOfCapacity)
    );

    h.engine
        .push_force(MessageType::StartTransaction, br#"{"connectorId":1}"#.to_vec())
        .unwrap();
    assert_eq!(h.engine.count_pending(), 8);

    let freed = h.events.of_kind(EventKind::Free);
    assert_eq!(freed.len(), 1);
    assert_eq!(freed[0].message.id.as_str(), ids[0]);
    assert_eq!(freed[0].state, Some(MessageState::Dropped));
    assert_eq!(h.engine.find_by_id(&ids[0]), None);

    // Answer everything in order; StartTransaction goes out last
    h.step_at(0);
    for now in 1..=8 {
        let id = h.last_id();
        h.link.deliver_result(&id, "{}");
        h.step_at(now);
    }

    let sent = h.link.sent();
    assert_eq!(sent.len(), 8);
    for (message, id) in sent.iter().zip(&ids[1..]) {
        assert_eq!(message.id.as_str(), id);
    }
    assert_eq!(sent[7].message_type, MessageType::StartTransaction);
}

#[test]
fn force_push_fails_when_only_transaction_messages_are_live() {
    let mut h = Harness::new();

    h.engine.push(MessageType::BootNotification, b"{}".to_vec()).unwrap();
    for i in 0..7 {
        let message_type = if i % 2 == 0 {
            MessageType::StartTransaction
        } else {
            MessageType::StopTransaction
        };
        h.engine.push(message_type, b"{}".to_vec()).unwrap();
    }
    let before: Vec<String> = h.engine.queue().iter().map(|m| m.id.to_string()).collect();

    assert_eq!(
        h.engine.push_force(MessageType::Heartbeat, b"{}".to_vec()),
        Err(EngineError::OutOfCapacity)
    );

    let after: Vec<String> = h.engine.queue().iter().map(|m| m.id.to_string()).collect();
    assert_eq!(before, after);
    assert!(h.events.all().is_empty());
}

#[test]
fn sent_message_can_be_evicted() {
    let mut h = Harness::new();
    for _ in 0..8 {
        h.engine.push(MessageType::DataTransfer, b"{}".to_vec()).unwrap();
    }
    h.step_at(0);
    let in_flight = h.last_id();

    h.engine.push_force(MessageType::StopTransaction, b"{}".to_vec()).unwrap();
    assert_eq!(h.engine.find_by_id(&in_flight), None);
    assert_eq!(h.engine.queue().waiting_len(), 0);

    // A late answer for the evicted request is ignored
    h.link.deliver_result(&in_flight, "{}");
    let report = h.step_at(1);
    assert_eq!(report.received, 1);
    assert_eq!(report.completed, 0);
    assert!(h.events.for_id(&in_flight).iter().all(|e| e.kind != EventKind::Incoming));
}
