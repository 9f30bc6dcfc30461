//! Link state changes applied to the engine

use ocpp_core::{Clock, Engine, EventHandler, MessageType, Transport};
use tracing::{debug, warn};

use crate::ws::LinkEvent;

/// Restart the OCPP session when the link comes up or goes down.
///
/// Every new connection needs a BootNotification, but one that is still
/// live (queued or awaiting its answer from an earlier connection) is
/// reused rather than joined by another.
pub fn on_link_event<T, C, H>(engine: &mut Engine<T, C, H>, event: LinkEvent, boot: &[u8])
where
    T: Transport,
    C: Clock,
    H: EventHandler,
{
    engine.reset_session();
    if event != LinkEvent::Connected {
        return;
    }

    if engine.queue().contains_type(MessageType::BootNotification) {
        debug!("BootNotification already live, not queueing another");
        return;
    }
    if let Err(e) = engine.push_force(MessageType::BootNotification, boot.to_vec()) {
        warn!("BootNotification not queued: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocpp_core::{
        EventKind, InboundMessage, ManualClock, Message, MessageQueue, TransportError,
    };

    /// Accepts every frame, never answers
    #[derive(Default)]
    struct Silent {
        sent: Vec<MessageType>,
    }

    impl Transport for Silent {
        fn send(&mut self, message: &Message) -> Result<(), TransportError> {
            self.sent.push(message.message_type);
            Ok(())
        }

        fn receive(&mut self) -> Result<Option<InboundMessage>, TransportError> {
            Ok(None)
        }
    }

    fn live_boots(queue: &MessageQueue) -> usize {
        queue
            .iter()
            .filter(|m| m.message_type == MessageType::BootNotification)
            .count()
    }

    #[test]
    fn test_reconnects_keep_one_boot_notification() {
        let clock = ManualClock::new(0);
        let mut engine = Engine::builder(
            Silent::default(),
            clock.clone(),
            |_: EventKind, _: &Message, _: &MessageQueue| {},
        )
        .build();

        let mut now = 0;
        for _ in 0..8 {
            on_link_event(&mut engine, LinkEvent::Connected, b"{}");
            for _ in 0..20 {
                clock.set(now);
                engine.step();
                now += 1;
            }
            on_link_event(&mut engine, LinkEvent::Disconnected, b"{}");
        }

        assert_eq!(live_boots(engine.queue()), 1);
        assert!(engine.transport().sent.len() > 1);
        assert!(engine
            .push_force(MessageType::StartTransaction, b"{}".to_vec())
            .is_ok());
    }

    #[test]
    fn test_disconnect_only_resets_session() {
        let mut engine = Engine::builder(
            Silent::default(),
            ManualClock::new(0),
            |_: EventKind, _: &Message, _: &MessageQueue| {},
        )
        .build();

        on_link_event(&mut engine, LinkEvent::Disconnected, b"{}");
        assert_eq!(engine.count_pending(), 0);

        on_link_event(&mut engine, LinkEvent::Connected, b"{}");
        assert_eq!(live_boots(engine.queue()), 1);
        assert!(!engine.is_session_accepted());
    }
}
