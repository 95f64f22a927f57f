//! Rabbit Publisher - HTTP façade over a RabbitMQ topic exchange.
//!
//! Two endpoints accept `Color` and `Shape` payloads and publish them,
//! unmodified, to the durable topic exchange `exchange` with one fixed routing
//! key per payload type.
//!
//! ## Architecture
//!
//! ```text
//! POST /publish/{color,shape} → Publisher → exchange → bound queues
//!                                   └→ confirms / returns → observer (logs)
//! ```

pub mod broker;
pub mod config;
pub mod error;
pub mod models;
pub mod web;

// Re-export commonly used types
pub use broker::{
    AmqpTransport, LoggingObserver, Publisher, Topology, COLOR_ROUTING_KEY, EXCHANGE_NAME,
    SHAPE_ROUTING_KEY,
};
pub use config::Config;
pub use error::PublishError;
pub use models::{Color, Shape};
pub use web::AppState;
