//! Single-topic Kafka subscriber with graceful shutdown.

use crate::config::SessionConfig;
use crate::error::{KafkaError, Result};
use crate::session::{ConsumeSession, SessionGuard};
use kafka_messages::Record;
use rdkafka::consumer::StreamConsumer;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Lifecycle of a [`Subscriber::run`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    /// Subscribing to the topic.
    Initializing,
    /// Pulling records until interrupted.
    Polling,
    /// Releasing the session after an interruption.
    ShuttingDown,
    /// Session released, run complete.
    Terminated,
    /// Subscription failed.
    Failed,
}

/// Kafka subscriber that prints every record of one topic until shut down.
///
/// Poll-level errors are logged and polling continues. Shutdown is requested
/// through a [`ShutdownHandle`] and always ends with the session being closed,
/// which commits the consumed offsets for the group.
pub struct Subscriber<S: ConsumeSession = StreamConsumer> {
    session: SessionGuard<S>,
    group_id: String,
    poll_wait: Duration,
    error_backoff: Duration,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Subscriber {
    /// Creates a new Kafka subscriber.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the consumer cannot
    /// be created.
    pub fn new(config: &SessionConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "Creating Kafka consumer with brokers: {}, group: {} ({})",
            config.bootstrap, config.group_id, config.security_mode
        );

        let consumer: StreamConsumer = config.consumer_client_config().create()?;
        Ok(Self::from_parts(config, consumer))
    }
}

impl<S: ConsumeSession> Subscriber<S> {
    /// Creates a subscriber over an existing session.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid. The session is closed
    /// in that case.
    pub fn with_session(config: &SessionConfig, session: S) -> Result<Self> {
        let session = SessionGuard::new(session);
        config.validate()?;
        Ok(Self::build(config, session))
    }

    fn from_parts(config: &SessionConfig, session: S) -> Self {
        Self::build(config, SessionGuard::new(session))
    }

    fn build(config: &SessionConfig, session: SessionGuard<S>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            session,
            group_id: config.group_id.clone(),
            poll_wait: Duration::from_secs(1),
            error_backoff: Duration::from_secs(1),
            shutdown: Arc::new(shutdown),
        }
    }

    /// Sets how long each poll waits for a record.
    pub fn with_poll_wait(mut self, wait: Duration) -> Self {
        self.poll_wait = wait;
        self
    }

    /// Sets the pause after a poll-level error.
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Returns a handle that can request shutdown from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Subscribes to `topic` and writes each record to `out` until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription fails or if writing to `out` fails.
    /// Poll-level errors never end the run, and a failure to close the session
    /// after shutdown is logged rather than returned.
    pub async fn run<W: Write>(self, topic: &str, out: &mut W) -> Result<()> {
        let Subscriber {
            mut session,
            group_id,
            poll_wait,
            error_backoff,
            shutdown,
        } = self;
        let mut shutdown_rx = shutdown.subscribe();
        let mut failure = None;
        let mut state = SubscriberState::Initializing;

        loop {
            debug!("Subscriber state: {:?}", state);
            state = match state {
                SubscriberState::Initializing => match session.subscribe(topic) {
                    Ok(()) => {
                        info!("Consuming '{}' as group '{}'", topic, group_id);
                        writeln!(out, "Listening for messages on '{topic}'... (Ctrl+C to stop)")?;
                        SubscriberState::Polling
                    }
                    Err(e) => {
                        error!("Failed to subscribe to '{}': {}", topic, e);
                        failure = Some(e);
                        SubscriberState::Failed
                    }
                },
                SubscriberState::Polling => {
                    let polled = tokio::select! {
                        biased;
                        _ = stop_requested(&mut shutdown_rx) => None,
                        record = session.poll(poll_wait) => Some(record),
                    };

                    match polled {
                        None => SubscriberState::ShuttingDown,
                        Some(None) => SubscriberState::Polling,
                        Some(Some(record)) => {
                            emit(&record, out)?;
                            let failed = matches!(record, Record::Error(_));
                            if failed && pause(error_backoff, &mut shutdown_rx).await {
                                SubscriberState::ShuttingDown
                            } else {
                                SubscriberState::Polling
                            }
                        }
                    }
                }
                SubscriberState::ShuttingDown => {
                    info!("Shutdown signal received, stopping consumer");
                    writeln!(out, "Stopping consumer...")?;
                    // Interruption is a clean exit even when the final commit fails.
                    if let Err(e) = session.release() {
                        error!("Failed to close consumer session: {}", e);
                    }
                    SubscriberState::Terminated
                }
                SubscriberState::Terminated => {
                    info!("Consumer stopped");
                    return Ok(());
                }
                SubscriberState::Failed => {
                    if let Err(e) = session.release() {
                        error!("Failed to close consumer session: {}", e);
                    }
                    return Err(failure.unwrap_or_else(|| {
                        KafkaError::Other(format!("subscription to '{topic}' failed"))
                    }));
                }
            };
        }
    }
}

fn emit<W: Write>(record: &Record, out: &mut W) -> Result<()> {
    match record {
        Record::Message {
            topic,
            partition,
            offset,
            ..
        } => debug!(
            "Received message from topic '{}' (partition: {}, offset: {})",
            topic, partition, offset
        ),
        Record::Error(detail) => error!("Error receiving message: {}", detail),
    }
    writeln!(out, "{record}")?;
    out.flush()?;
    Ok(())
}

async fn stop_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    // The sender lives as long as the run, so an error cannot occur here.
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}

/// Sleeps for `backoff`, returning `true` if shutdown was requested meanwhile.
async fn pause(backoff: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;
        _ = stop_requested(shutdown_rx) => true,
        _ = tokio::time::sleep(backoff) => false,
    }
}

/// Handle for requesting subscriber shutdown from another task.
#[derive(Clone)]
pub struct ShutdownHandle {
    shutdown: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Requests a graceful shutdown of the subscriber.
    ///
    /// Safe to call more than once, and before the subscriber starts running.
    pub fn shutdown(&self) {
        info!("Requesting consumer shutdown via handle");
        self.shutdown.send_replace(true);
    }
}
