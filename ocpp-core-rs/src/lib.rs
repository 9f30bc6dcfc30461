//! # OCPP Core
//!
//! Charge-point side message engine for OCPP 1.6.
//!
//! The engine queues outgoing requests in a fixed-capacity pool, hands them to
//! an injected transport one at a time, correlates responses by message id,
//! and retries or drops messages according to their class. Transaction-class
//! messages (BootNotification, StartTransaction, StopTransaction) are never
//! lost to a send failure or a timeout.
//!
//! ## Architecture
//!
//! ```text
//!  embedder ── push / push_force / push_response ──┐
//!                                                  ▼
//! ┌──────────────────────────────────────────────────────┐
//! │ Engine                                               │
//! │  ┌────────────┐   ┌────────────┐   ┌──────────────┐  │
//! │  │ SlotPool   │◄──│ Queue +    │◄──│ Eviction     │  │
//! │  │ (N slots)  │   │ wait list  │   │ policy       │  │
//! │  └────────────┘   └─────┬──────┘   └──────────────┘  │
//! │          step() ────────┤                            │
//! │  receive → correlate → send → sweep → heartbeat      │
//! └──────────┬───────────────────────────┬───────────────┘
//!            │ Transport                 │ EventHandler
//!            ▼                           ▼
//!      central system            INCOMING / OUTGOING / FREE
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use ocpp_core::{Engine, EventKind, Message, MessageQueue, MessageType, SystemClock};
//! # use ocpp_core::{InboundMessage, Transport, TransportError};
//! # struct Link;
//! # impl Transport for Link {
//! #     fn send(&mut self, _: &Message) -> Result<(), TransportError> { Ok(()) }
//! #     fn receive(&mut self) -> Result<Option<InboundMessage>, TransportError> { Ok(None) }
//! # }
//!
//! let handler = |kind: EventKind, message: &Message, _queue: &MessageQueue| {
//!     println!("{:?} {} {}", kind, message.message_type, message.id);
//! };
//! let mut engine = Engine::builder(Link, SystemClock, handler).build();
//!
//! engine.push_force(MessageType::BootNotification, br#"{"chargePointVendor":"EK","chargePointModel":"EK3"}"#.to_vec())?;
//! loop {
//!     engine.step();
//!     std::thread::sleep(std::time::Duration::from_secs(1));
//! }
//! # Ok::<(), ocpp_core::EngineError>(())
//! ```

pub mod config;
pub mod configuration;
pub mod engine;
pub mod error;
pub mod event;
pub mod eviction;
pub mod frame;
pub mod heartbeat;
pub mod message;
pub mod pool;
pub mod queue;
pub mod transport;
pub mod types;

pub use config::EngineConfig;
pub use configuration::{Configuration, ConfigurationError, SharedConfiguration, Value};
pub use engine::{Engine, EngineBuilder, SharedEngine, StepReport};
pub use error::{EngineError, TransportError};
pub use event::{EventHandler, EventKind};
pub use message::{
    IdGenerator, InboundMessage, Message, MessageId, RandomIdGenerator, UuidGenerator,
};
pub use queue::{MessageHandle, MessageQueue, MessageState};
pub use transport::{Clock, ManualClock, SystemClock, Timestamp, Transport};
pub use types::{MessageRole, MessageType, RegistrationStatus};
