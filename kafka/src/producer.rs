//! Single-message Kafka producer with delivery confirmation.

use crate::config::SessionConfig;
use crate::error::{KafkaError, Result};
use crate::session::{Delivery, ProduceSession};
use kafka_messages::{DeliveryFailure, DeliveryOutcome, Message};
use rdkafka::producer::FutureProducer;
use std::time::Duration;
use tracing::{debug, error, info};

/// Kafka producer that publishes one message at a time and waits for the
/// broker's delivery report.
///
/// # Example
///
/// ```no_run
/// use kafka::{Producer, SecurityMode, SessionConfig};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> anyhow::Result<()> {
///     let config = SessionConfig::new("localhost:9092", SecurityMode::Plaintext);
///     let producer = Producer::new(&config)?;
///
///     let outcome = producer.publish("test-topic", b"hello").await;
///     println!("{outcome}");
///     Ok(())
/// }
/// ```
pub struct Producer<S = FutureProducer> {
    inner: S,
    delivery_timeout: Duration,
}

impl Producer {
    /// Creates a new Kafka producer.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the producer cannot
    /// be created.
    pub fn new(config: &SessionConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "Creating Kafka producer with brokers: {} ({})",
            config.bootstrap, config.security_mode
        );

        let producer: FutureProducer = config.producer_client_config().create()?;
        Ok(Self {
            inner: producer,
            delivery_timeout: config.message_delivery_timeout,
        })
    }
}

impl<S: ProduceSession> Producer<S> {
    /// Creates a producer over an existing session.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_session(config: &SessionConfig, session: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: session,
            delivery_timeout: config.message_delivery_timeout,
        })
    }

    /// Upper bound on the wait for a delivery report.
    pub fn delivery_timeout(&self) -> Duration {
        self.delivery_timeout
    }

    /// Publishes `payload` to `topic` and waits for the delivery report.
    ///
    /// Resolves once the broker acknowledges or rejects the message, or once
    /// the delivery timeout elapses. Submission errors resolve immediately.
    pub async fn publish(&self, topic: &str, payload: &[u8]) -> DeliveryOutcome {
        let message = Message::new(topic, payload);
        debug!(
            "Sending message to topic '{}' ({} bytes)",
            topic,
            message.payload.len()
        );

        let pending = match self.inner.submit(&message) {
            Ok(pending) => pending,
            Err(e) => {
                error!("Failed to queue message for topic '{}': {}", topic, e);
                return DeliveryOutcome::Failed(DeliveryFailure::Rejected(detail(&e)));
            }
        };

        match tokio::time::timeout(self.delivery_timeout, pending).await {
            Ok(Ok(Delivery { partition, offset })) => {
                info!(
                    "Message sent successfully to topic '{}' (partition: {}, offset: {})",
                    topic, partition, offset
                );
                DeliveryOutcome::Acknowledged {
                    message,
                    partition,
                    offset,
                }
            }
            Ok(Err(e)) => {
                error!("Failed to send message to topic '{}': {}", topic, e);
                DeliveryOutcome::Failed(DeliveryFailure::Broker(detail(&e)))
            }
            Err(_) => {
                error!(
                    "No delivery report for topic '{}' within {:?}",
                    topic, self.delivery_timeout
                );
                DeliveryOutcome::Failed(DeliveryFailure::TimedOut(self.delivery_timeout))
            }
        }
    }
}

fn detail(err: &KafkaError) -> String {
    match err {
        KafkaError::Kafka(inner) => inner.to_string(),
        other => other.to_string(),
    }
}
