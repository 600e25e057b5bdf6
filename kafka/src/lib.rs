//! Minimal Kafka publish/subscribe client.
//!
//! This crate provides a single-topic Kafka client built on top of `rdkafka`
//! and `tokio`.
//!
//! # Features
//!
//! - [`Producer::publish`] sends one message and waits for the delivery report,
//!   bounded by the configured delivery timeout
//! - [`Subscriber::run`] polls a topic as part of a consumer group, prints each
//!   record and keeps going through poll-level errors
//! - Graceful shutdown that always closes the consumer session, committing the
//!   group's consumed offsets
//! - [`SessionConfig`] with eager validation of timeouts and security settings
//! - Integrated tracing
//!
//! # Example Producer
//!
//! ```no_run
//! use kafka::{Producer, SecurityMode, SessionConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SessionConfig::new("localhost:9092", SecurityMode::Plaintext);
//!     let producer = Producer::new(&config)?;
//!
//!     let outcome = producer.publish("test-topic", b"hello").await;
//!     println!("{outcome}");
//!     std::process::exit(outcome.exit_code().into());
//! }
//! ```
//!
//! # Example Subscriber
//!
//! ```no_run
//! use kafka::{OffsetReset, SecurityMode, SessionConfig, Subscriber};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SessionConfig::new("localhost:9092", SecurityMode::Plaintext)
//!         .with_group_id("readers")
//!         .with_offset_reset(OffsetReset::Earliest);
//!     let subscriber = Subscriber::new(&config)?;
//!
//!     let shutdown = subscriber.shutdown_handle();
//!     tokio::spawn(async move {
//!         if tokio::signal::ctrl_c().await.is_ok() {
//!             shutdown.shutdown();
//!         }
//!     });
//!
//!     subscriber.run("test-topic", &mut std::io::stdout()).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod producer;
mod session;
mod subscriber;

pub use config::{
    OffsetReset, SaslCredentials, SecurityMode, SessionConfig, DEFAULT_GROUP_ID, LOCAL_BOOTSTRAP,
};
pub use error::{KafkaError, Result};
pub use producer::Producer;
pub use session::{ConsumeSession, Delivery, PendingDelivery, ProduceSession, SessionGuard};
pub use subscriber::{ShutdownHandle, Subscriber, SubscriberState};

/// Re-export the broker-independent message types for convenience
pub use kafka_messages::{DeliveryFailure, DeliveryOutcome, Message, Record};
