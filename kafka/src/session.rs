//! Broker sessions behind the producer and the subscriber.
//!
//! [`ProduceSession`] and [`ConsumeSession`] are the only operations the client
//! needs from the broker: publish with a delivery report, subscribe, poll and
//! close. They are implemented for rdkafka's `FutureProducer` and
//! `StreamConsumer`; tests plug in in-memory sessions instead.

use crate::error::{KafkaError, Result};
use kafka_messages::{Message, Record};
use rdkafka::consumer::{CommitMode, Consumer as RdConsumer, StreamConsumer};
use rdkafka::error::{KafkaError as RdKafkaError, RDKafkaErrorCode};
use rdkafka::message::Message as RdMessage;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Broker position of an acknowledged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
}

/// Future resolving once the broker reports on a submitted message.
pub type PendingDelivery = Pin<Box<dyn Future<Output = Result<Delivery>> + Send>>;

/// A producer session.
pub trait ProduceSession {
    /// Queues `message` for delivery.
    ///
    /// Errors raised while queueing are returned immediately. Otherwise the
    /// returned future resolves with the broker's delivery report; it never
    /// times out on its own.
    fn submit(&self, message: &Message) -> Result<PendingDelivery>;
}

/// A consumer session bound to a consumer group.
pub trait ConsumeSession: Send {
    /// Subscribes to `topic`.
    fn subscribe(&mut self, topic: &str) -> Result<()>;

    /// Waits up to `wait` for the next record.
    ///
    /// `None` means nothing arrived in time. The future may be dropped before
    /// it completes.
    fn poll(&mut self, wait: Duration) -> impl Future<Output = Option<Record>> + Send + '_;

    /// Releases partition assignments and commits consumed offsets.
    fn close(&mut self) -> Result<()>;
}

impl ProduceSession for FutureProducer {
    fn submit(&self, message: &Message) -> Result<PendingDelivery> {
        let record = FutureRecord::<(), [u8]>::to(&message.topic).payload(&message.payload);
        let delivery = self
            .send_result(record)
            .map_err(|(err, _record)| KafkaError::Kafka(err))?;

        Ok(Box::pin(async move {
            match delivery.await {
                Ok(Ok((partition, offset))) => Ok(Delivery { partition, offset }),
                Ok(Err((err, _message))) => Err(KafkaError::Kafka(err)),
                Err(_canceled) => Err(KafkaError::Delivery(
                    "producer dropped before a delivery report arrived".to_string(),
                )),
            }
        }))
    }
}

impl ConsumeSession for StreamConsumer {
    fn subscribe(&mut self, topic: &str) -> Result<()> {
        info!("Subscribing to topic: {}", topic);
        RdConsumer::subscribe(self, &[topic])?;
        Ok(())
    }

    fn poll(&mut self, wait: Duration) -> impl Future<Output = Option<Record>> + Send + '_ {
        async move {
            match tokio::time::timeout(wait, self.recv()).await {
                Ok(Ok(message)) => Some(record_from(&message)),
                Ok(Err(e)) => Some(Record::Error(e.to_string())),
                Err(_) => None,
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        let committed = match self.commit_consumer_state(CommitMode::Sync) {
            Ok(()) => {
                debug!("Committed consumer offsets");
                Ok(())
            }
            Err(RdKafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => {
                debug!("No consumed offsets to commit");
                Ok(())
            }
            Err(e) => Err(KafkaError::Kafka(e)),
        };
        self.unsubscribe();
        committed
    }
}

fn record_from<M: RdMessage>(message: &M) -> Record {
    let payload = match message.payload() {
        Some(payload) => payload.to_vec(),
        None => {
            warn!(
                "Received message with no payload from topic '{}' (partition: {}, offset: {})",
                message.topic(),
                message.partition(),
                message.offset()
            );
            Vec::new()
        }
    };

    Record::Message {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        payload,
    }
}

/// Owns a consume session and closes it exactly once.
///
/// The session is closed by [`SessionGuard::release`] or, failing that, when the
/// guard is dropped, so every exit path of the caller releases it.
pub struct SessionGuard<S: ConsumeSession> {
    session: S,
    closed: bool,
}

impl<S: ConsumeSession> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            closed: false,
        }
    }

    /// Closes the session and reports the result.
    ///
    /// Later calls, and the drop of the guard, do nothing.
    pub fn release(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        info!("Closing consumer session");
        self.session.close()
    }
}

impl<S: ConsumeSession> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: ConsumeSession> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: ConsumeSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        warn!("Consumer session dropped without release, closing");
        if let Err(e) = self.session.close() {
            error!("Failed to close consumer session: {}", e);
        }
    }
}
