//! Broker-independent message types.
//!
//! This crate holds the data that flows between a caller and the broker client:
//! the outgoing [`Message`], the [`DeliveryOutcome`] of a publish, and the
//! [`Record`] produced by each consumer poll. None of these types depend on the
//! broker client library, so they can be shared with code that never talks to
//! Kafka directly.
//!
//! Every type renders as a single line of operator-facing text through
//! `Display`. Scripts may grep for the `Sent:`, `Message failed delivery:`,
//! `Received:` and `Consumer error:` markers.

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// An opaque payload addressed to a topic.
///
/// No key, headers or partition are carried; the broker assigns the partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Destination topic.
    pub topic: String,

    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

impl Message {
    /// Creates a message for `topic`.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Payload decoded as UTF-8, with invalid sequences replaced.
    pub fn payload_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Why a publish did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The client refused the message before it was queued (queue full,
    /// unknown topic, oversized payload and the like).
    #[error("submission rejected: {0}")]
    Rejected(String),

    /// The broker reported a delivery error through the delivery callback.
    #[error("{0}")]
    Broker(String),

    /// No delivery report arrived within the delivery timeout.
    #[error("no acknowledgement within {0:?}")]
    TimedOut(Duration),
}

/// Result of a single publish attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The broker accepted the message.
    Acknowledged {
        message: Message,
        partition: i32,
        offset: i64,
    },

    /// The message was not delivered.
    Failed(DeliveryFailure),
}

impl DeliveryOutcome {
    /// Returns `true` when the broker acknowledged the message.
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, DeliveryOutcome::Acknowledged { .. })
    }

    /// Process exit status for this outcome.
    pub fn exit_code(&self) -> u8 {
        if self.is_acknowledged() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryOutcome::Acknowledged { message, .. } => {
                write!(f, "Sent: {}", message.payload_text())
            }
            DeliveryOutcome::Failed(failure) => write!(f, "Message failed delivery: {failure}"),
        }
    }
}

/// A single result of a consumer poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// A record fetched from the broker.
    Message {
        topic: String,
        partition: i32,
        offset: i64,
        payload: Vec<u8>,
    },

    /// A broker-reported error returned in place of data.
    Error(String),
}

impl Record {
    /// Payload bytes, if this is a data record.
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Record::Message { payload, .. } => Some(payload),
            Record::Error(_) => None,
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Message { payload, .. } => {
                write!(f, "Received: {}", String::from_utf8_lossy(payload))
            }
            Record::Error(detail) => write!(f, "Consumer error: {detail}"),
        }
    }
}
