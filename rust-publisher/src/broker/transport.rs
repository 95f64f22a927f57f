//! Broker transport: the seam between the publishing client and RabbitMQ.
//!
//! [`AmqpTransport`] keeps a persistent connection and channel, reconnecting on
//! demand. Every (re)connect declares the exchange topology and puts the
//! channel into publisher-confirm mode.

use std::sync::Arc;

use futures::future::BoxFuture;
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::converter::JsonMessageConverter;
use super::outcome::DeliveryOutcome;
use super::topology::Topology;
use crate::error::Result;

/// Resolves once the broker has answered for a sent message.
pub type PendingConfirm = BoxFuture<'static, DeliveryOutcome>;

/// A serialized message ready to be handed to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub correlation_id: String,
    /// Ask the broker to return the message if no queue binding matches.
    pub mandatory: bool,
}

/// Something that can put a message on the wire.
///
/// `send` resolves as soon as the message has been written; the returned
/// [`PendingConfirm`] carries the broker's eventual verdict.
pub trait BrokerTransport: Send + Sync + 'static {
    fn send(&self, message: OutgoingMessage) -> BoxFuture<'_, Result<PendingConfirm>>;
}

/// RabbitMQ transport with connection management.
pub struct AmqpTransport {
    url: String,
    topology: Arc<Topology>,
    connection: RwLock<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
}

impl AmqpTransport {
    /// Create a transport for the given AMQP URL. No connection is made yet.
    pub fn new(url: String, topology: Arc<Topology>) -> Self {
        Self {
            url,
            topology,
            connection: RwLock::new(None),
            channel: RwLock::new(None),
        }
    }

    /// Connect eagerly and declare the topology.
    pub async fn connect(&self) -> Result<()> {
        self.ensure_connected().await.map(|_| ())
    }

    /// Ensure we have a valid connection and channel.
    async fn ensure_connected(&self) -> Result<Channel> {
        {
            let channel = self.channel.read().await;
            if let Some(ch) = channel.as_ref() {
                if ch.status().connected() {
                    return Ok(ch.clone());
                }
            }
        }

        let mut connection = self.connection.write().await;
        let mut channel = self.channel.write().await;

        // Double-check after acquiring write lock
        if let Some(ch) = channel.as_ref() {
            if ch.status().connected() {
                return Ok(ch.clone());
            }
        }

        // Only the channel died: open a new one on the live connection.
        // Otherwise close what is left of the old connection before replacing it.
        let conn = match connection.take() {
            Some(conn) if conn.status().connected() => {
                info!("rabbitmq_publisher_reusing_connection");
                conn
            }
            stale => {
                if let Some(old) = stale {
                    close_stale(old).await;
                }

                info!("rabbitmq_publisher_connecting");

                let conn = Connection::connect(&self.url, ConnectionProperties::default()).await?;

                info!("rabbitmq_publisher_connected");

                conn
            }
        };

        let created = conn.create_channel().await;
        *connection = Some(conn);
        let ch = created?;

        self.topology.declare(&ch).await?;

        ch.confirm_select(ConfirmSelectOptions::default()).await?;

        info!(channel_id = ch.id(), "rabbitmq_confirms_enabled");

        *channel = Some(ch.clone());

        Ok(ch)
    }

    /// Close the connection gracefully.
    pub async fn close(&self) {
        let mut connection = self.connection.write().await;
        let mut channel = self.channel.write().await;

        if let Some(ch) = channel.take() {
            if let Err(e) = ch.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_channel_close_error");
            }
        }

        if let Some(conn) = connection.take() {
            if let Err(e) = conn.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_connection_close_error");
            }
        }

        info!("rabbitmq_publisher_closed");
    }
}

/// Close a connection that is no longer usable.
async fn close_stale(conn: Connection) {
    if let Err(e) = conn.close(200, "Reconnecting").await {
        warn!(error = %e, "rabbitmq_stale_connection_close_error");
    }
}

impl BrokerTransport for AmqpTransport {
    fn send(&self, message: OutgoingMessage) -> BoxFuture<'_, Result<PendingConfirm>> {
        Box::pin(async move {
            let channel = self.ensure_connected().await?;

            let OutgoingMessage {
                exchange,
                routing_key,
                body,
                correlation_id,
                mandatory,
            } = message;

            let properties = BasicProperties::default()
                .with_delivery_mode(2) // Persistent
                .with_content_type(JsonMessageConverter::CONTENT_TYPE.into())
                .with_message_id(correlation_id.clone().into())
                .with_correlation_id(correlation_id.into());

            let confirm = channel
                .basic_publish(
                    &exchange,
                    &routing_key,
                    BasicPublishOptions {
                        mandatory,
                        ..Default::default()
                    },
                    &body,
                    properties,
                )
                .await?;

            let pending: PendingConfirm =
                Box::pin(async move { DeliveryOutcome::from_confirmation(confirm.await) });

            Ok(pending)
        })
    }
}
