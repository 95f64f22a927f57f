//! Publishing client shared by all request handlers.
//!
//! `publish` returns once the message has been written to the broker. The
//! broker's confirm (or return) is awaited on a spawned task and forwarded to
//! the delivery observer, so callers never wait for it.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use serde::Serialize;
use tracing::{info, warn};

use super::converter::JsonMessageConverter;
use super::outcome::{OutcomeEvent, OutcomeSender};
use super::transport::{BrokerTransport, OutgoingMessage};
use crate::error::Result;

/// Cloneable handle to the publishing client.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

struct PublisherInner {
    transport: Arc<dyn BrokerTransport>,
    converter: JsonMessageConverter,
    outcomes: OutcomeSender,
    sequence: AtomicU64,
}

impl Publisher {
    /// Create a publisher sending through `transport` and reporting delivery
    /// outcomes to `outcomes`.
    pub fn new(transport: Arc<dyn BrokerTransport>, outcomes: OutcomeSender) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                transport,
                converter: JsonMessageConverter,
                outcomes,
                sequence: AtomicU64::new(0),
            }),
        }
    }

    /// Serialize `payload` to JSON and publish it as a mandatory message.
    ///
    /// Returns the correlation id stamped on the message.
    pub async fn publish<T>(&self, exchange: &str, routing_key: &str, payload: &T) -> Result<String>
    where
        T: Serialize + ?Sized,
    {
        let body = self.inner.converter.to_message(payload)?;

        let sequence = self.inner.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let correlation_id = format!("{}-{}", routing_key, sequence);
        let body_length = body.len();

        let pending = self
            .inner
            .transport
            .send(OutgoingMessage {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                body,
                correlation_id: correlation_id.clone(),
                mandatory: true,
            })
            .await?;

        info!(
            exchange = %exchange,
            routing_key = %routing_key,
            correlation_id = %correlation_id,
            body_length = body_length,
            "publish_issued"
        );

        let outcomes = self.inner.outcomes.clone();
        let event_exchange = exchange.to_string();
        let event_routing_key = routing_key.to_string();
        let event_correlation_id = correlation_id.clone();

        tokio::spawn(async move {
            let outcome = pending.await;
            let event = OutcomeEvent {
                correlation_id: event_correlation_id,
                exchange: event_exchange,
                routing_key: event_routing_key,
                outcome,
            };
            if let Err(e) = outcomes.send(event) {
                warn!(correlation_id = %e.0.correlation_id, "delivery_observer_gone");
            }
        });

        Ok(correlation_id)
    }
}
