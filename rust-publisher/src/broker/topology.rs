//! Exchange topology shared by the transport and the HTTP handlers.

use lapin::{options::ExchangeDeclareOptions, types::FieldTable, Channel, ExchangeKind};
use tracing::info;

/// Name of the topic exchange every message is published to.
pub const EXCHANGE_NAME: &str = "exchange";

/// Routing key for `Color` messages.
pub const COLOR_ROUTING_KEY: &str = "color_routing_key";

/// Routing key for `Shape` messages.
pub const SHAPE_ROUTING_KEY: &str = "shape_routing_key";

/// Immutable exchange/routing-key set, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub exchange: String,
    pub color_routing_key: String,
    pub shape_routing_key: String,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            exchange: EXCHANGE_NAME.to_string(),
            color_routing_key: COLOR_ROUTING_KEY.to_string(),
            shape_routing_key: SHAPE_ROUTING_KEY.to_string(),
        }
    }
}

impl Topology {
    /// Options for the exchange: survives broker restarts and is kept while
    /// it has no bindings.
    pub fn exchange_options() -> ExchangeDeclareOptions {
        ExchangeDeclareOptions {
            durable: true,
            auto_delete: false,
            ..Default::default()
        }
    }

    /// Declare the topic exchange on `channel` (idempotent).
    pub async fn declare(&self, channel: &Channel) -> lapin::Result<()> {
        channel
            .exchange_declare(
                &self.exchange,
                ExchangeKind::Topic,
                Self::exchange_options(),
                FieldTable::default(),
            )
            .await?;

        info!(
            exchange = %self.exchange,
            kind = "topic",
            color_routing_key = %self.color_routing_key,
            shape_routing_key = %self.shape_routing_key,
            "rabbitmq_exchange_declared"
        );

        Ok(())
    }
}
