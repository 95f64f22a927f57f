//! Delivery outcome observation.
//!
//! Publisher confirms and mandatory returns arrive from the broker long after
//! the publishing request has been answered. Each one is turned into an
//! [`OutcomeEvent`] and pushed onto a channel drained by a single observer
//! task, so nothing on the request path ever waits for them.

use lapin::{message::BasicReturnMessage, publisher_confirm::Confirmation};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info};

/// A mandatory message the broker could not route to any queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub reply_code: u16,
    pub reply_text: String,
}

impl From<&BasicReturnMessage> for ReturnedMessage {
    fn from(message: &BasicReturnMessage) -> Self {
        Self {
            exchange: message.delivery.exchange.as_str().to_string(),
            routing_key: message.delivery.routing_key.as_str().to_string(),
            reply_code: message.reply_code,
            reply_text: message.reply_text.as_str().to_string(),
        }
    }
}

/// What eventually happened to a single publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The broker acknowledged the message.
    Confirmed,
    /// The broker nacked the message, or the channel died before it answered.
    /// A nacked mandatory message may also have been returned as unroutable.
    Rejected {
        cause: Option<String>,
        returned: Option<ReturnedMessage>,
    },
    /// The message was acknowledged but matched no queue binding.
    Returned(ReturnedMessage),
}

impl DeliveryOutcome {
    /// Interpret the result of awaiting a lapin publisher confirm.
    pub fn from_confirmation(result: lapin::Result<Confirmation>) -> Self {
        match result {
            Ok(Confirmation::Ack(Some(returned))) => Self::Returned(ReturnedMessage::from(&*returned)),
            Ok(Confirmation::Ack(None)) | Ok(Confirmation::NotRequested) => Self::Confirmed,
            Ok(Confirmation::Nack(returned)) => Self::Rejected {
                cause: None,
                returned: returned.map(|message| ReturnedMessage::from(&*message)),
            },
            Err(e) => Self::Rejected {
                cause: Some(e.to_string()),
                returned: None,
            },
        }
    }
}

/// A delivery outcome tagged with the publish it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeEvent {
    pub correlation_id: String,
    pub exchange: String,
    pub routing_key: String,
    pub outcome: DeliveryOutcome,
}

/// Callbacks invoked for broker delivery signals.
///
/// Registered once for the lifetime of the connection, not per publish.
pub trait DeliveryObserver: Send + Sync + 'static {
    /// Called exactly once per publish with the broker's verdict.
    fn on_confirm(&self, correlation_id: &str, ack: bool, cause: Option<&str>);

    /// Called when a mandatory message could not be routed.
    fn on_return(&self, correlation_id: &str, returned: &ReturnedMessage);
}

/// Observer that only logs. No retry or dead-lettering is attempted.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl DeliveryObserver for LoggingObserver {
    fn on_confirm(&self, correlation_id: &str, ack: bool, cause: Option<&str>) {
        if ack {
            debug!(correlation_id = %correlation_id, "publish_confirmed");
        } else {
            error!(
                correlation_id = %correlation_id,
                cause = cause.unwrap_or("none"),
                "publish_rejected"
            );
        }
    }

    fn on_return(&self, correlation_id: &str, returned: &ReturnedMessage) {
        error!(
            correlation_id = %correlation_id,
            exchange = %returned.exchange,
            routing_key = %returned.routing_key,
            reply_code = returned.reply_code,
            reply_text = %returned.reply_text,
            "message_returned"
        );
    }
}

/// Sending half handed to the publisher.
pub type OutcomeSender = mpsc::UnboundedSender<OutcomeEvent>;

/// Route one event to the observer's callbacks.
///
/// A returned message reaches both callbacks, return first, whether the broker
/// acked or nacked it.
pub fn dispatch<O: DeliveryObserver + ?Sized>(observer: &O, event: &OutcomeEvent) {
    match &event.outcome {
        DeliveryOutcome::Confirmed => observer.on_confirm(&event.correlation_id, true, None),
        DeliveryOutcome::Rejected { cause, returned } => {
            if let Some(returned) = returned {
                observer.on_return(&event.correlation_id, returned);
            }
            observer.on_confirm(&event.correlation_id, false, cause.as_deref())
        }
        DeliveryOutcome::Returned(returned) => {
            observer.on_return(&event.correlation_id, returned);
            observer.on_confirm(&event.correlation_id, true, None);
        }
    }
}

/// Spawn the observer task.
///
/// The task runs until every clone of the returned sender has been dropped.
pub fn spawn_observer<O: DeliveryObserver>(observer: O) -> (OutcomeSender, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutcomeEvent>();

    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            dispatch(&observer, &event);
        }
        info!("delivery_observer_stopped");
    });

    (tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    use tracing::Level;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Confirm(String, bool, Option<String>),
        Return(String, ReturnedMessage),
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Call>>>);

    impl DeliveryObserver for Recorder {
        fn on_confirm(&self, correlation_id: &str, ack: bool, cause: Option<&str>) {
            self.0.lock().unwrap().push(Call::Confirm(
                correlation_id.to_string(),
                ack,
                cause.map(str::to_string),
            ));
        }

        fn on_return(&self, correlation_id: &str, returned: &ReturnedMessage) {
            self.0
                .lock()
                .unwrap()
                .push(Call::Return(correlation_id.to_string(), returned.clone()));
        }
    }

    fn event(outcome: DeliveryOutcome) -> OutcomeEvent {
        OutcomeEvent {
            correlation_id: "color_routing_key-1".to_string(),
            exchange: "exchange".to_string(),
            routing_key: "color_routing_key".to_string(),
            outcome,
        }
    }

    fn unroutable() -> ReturnedMessage {
        ReturnedMessage {
            exchange: "exchange".to_string(),
            routing_key: "color_routing_key".to_string(),
            reply_code: 312,
            reply_text: "NO_ROUTE".to_string(),
        }
    }

    #[test]
    fn test_ack_is_confirmed() {
        let outcome = DeliveryOutcome::from_confirmation(Ok(Confirmation::Ack(None)));
        assert_eq!(outcome, DeliveryOutcome::Confirmed);
    }

    #[test]
    fn test_nack_is_rejected() {
        let outcome = DeliveryOutcome::from_confirmation(Ok(Confirmation::Nack(None)));
        assert_eq!(
            outcome,
            DeliveryOutcome::Rejected {
                cause: None,
                returned: None
            }
        );
    }

    #[test]
    fn test_not_requested_is_confirmed() {
        let outcome = DeliveryOutcome::from_confirmation(Ok(Confirmation::NotRequested));
        assert_eq!(outcome, DeliveryOutcome::Confirmed);
    }

    #[test]
    fn test_dispatch_rejected() {
        let recorder = Recorder::default();
        dispatch(
            &recorder,
            &event(DeliveryOutcome::Rejected {
                cause: Some("channel closed".to_string()),
                returned: None,
            }),
        );

        let calls = recorder.0.lock().unwrap();
        assert_eq!(
            *calls,
            vec![Call::Confirm(
                "color_routing_key-1".to_string(),
                false,
                Some("channel closed".to_string())
            )]
        );
    }

    #[test]
    fn test_dispatch_returned_hits_both_callbacks() {
        let recorder = Recorder::default();
        dispatch(&recorder, &event(DeliveryOutcome::Returned(unroutable())));

        let calls = recorder.0.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], Call::Return("color_routing_key-1".to_string(), unroutable()));
        assert_eq!(calls[1], Call::Confirm("color_routing_key-1".to_string(), true, None));
    }

    #[test]
    fn test_dispatch_nacked_return_hits_both_callbacks() {
        let recorder = Recorder::default();
        dispatch(
            &recorder,
            &event(DeliveryOutcome::Rejected {
                cause: None,
                returned: Some(unroutable()),
            }),
        );

        let calls = recorder.0.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], Call::Return("color_routing_key-1".to_string(), unroutable()));
        assert_eq!(calls[1], Call::Confirm("color_routing_key-1".to_string(), false, None));
    }

    /// In-memory log sink for a `fmt` subscriber.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn logged(outcome: DeliveryOutcome) -> String {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(Level::DEBUG)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            dispatch(&LoggingObserver, &event(outcome));
        });

        logs.contents()
    }

    #[test]
    fn test_logging_observer_logs_rejection_as_error() {
        let output = logged(DeliveryOutcome::Rejected {
            cause: Some("channel closed".to_string()),
            returned: None,
        });

        let line = output
            .lines()
            .find(|line| line.contains("publish_rejected"))
            .expect("no rejection logged");
        assert!(line.contains("ERROR"));
        assert!(line.contains("correlation_id=color_routing_key-1"));
        assert!(line.contains("channel closed"));
    }

    #[test]
    fn test_logging_observer_logs_return_details() {
        let output = logged(DeliveryOutcome::Returned(unroutable()));

        let line = output
            .lines()
            .find(|line| line.contains("message_returned"))
            .expect("no return logged");
        assert!(line.contains("ERROR"));
        assert!(line.contains("exchange=exchange"));
        assert!(line.contains("routing_key=color_routing_key"));
        assert!(line.contains("reply_code=312"));
        assert!(line.contains("reply_text=NO_ROUTE"));

        // The broker acked it, so the confirm side stays at debug
        assert!(output.contains("publish_confirmed"));
        assert!(!output.contains("publish_rejected"));
    }

    #[test]
    fn test_logging_observer_logs_ack_at_debug() {
        let output = logged(DeliveryOutcome::Confirmed);

        let line = output
            .lines()
            .find(|line| line.contains("publish_confirmed"))
            .expect("no confirm logged");
        assert!(line.contains("DEBUG"));
        assert!(!output.contains("ERROR"));
    }

    #[tokio::test]
    async fn test_observer_task_drains_and_stops() {
        let recorder = Recorder::default();
        let (tx, handle) = spawn_observer(recorder.clone());

        tx.send(event(DeliveryOutcome::Confirmed)).unwrap();
        tx.send(event(DeliveryOutcome::Rejected {
            cause: None,
            returned: None,
        }))
        .unwrap();
        drop(tx);

        handle.await.unwrap();

        let calls = recorder.0.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], Call::Confirm("color_routing_key-1".to_string(), true, None));
        assert_eq!(calls[1], Call::Confirm("color_routing_key-1".to_string(), false, None));
    }
}
