//! Broker module for RabbitMQ publishing.
//!
//! This module provides:
//! - The exchange topology and its fixed routing keys
//! - JSON message conversion
//! - A transport seam with a lapin-backed implementation
//! - The publishing client and delivery outcome observation
//!
//! ## Flow
//!
//! ```text
//! Handler → Publisher → AmqpTransport → exchange (topic)
//!                                          │
//!            observer task ← outcome channel ┘ (ack / nack / return)
//! ```

pub mod converter;
pub mod outcome;
pub mod publisher;
pub mod topology;
pub mod transport;

pub use converter::JsonMessageConverter;
pub use outcome::{
    spawn_observer, DeliveryObserver, DeliveryOutcome, LoggingObserver, OutcomeEvent,
    OutcomeSender, ReturnedMessage,
};
pub use publisher::Publisher;
pub use topology::{Topology, COLOR_ROUTING_KEY, EXCHANGE_NAME, SHAPE_ROUTING_KEY};
pub use transport::{AmqpTransport, BrokerTransport, OutgoingMessage, PendingConfirm};
