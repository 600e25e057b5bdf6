//! In-memory broker used by the integration tests.
//!
//! Keeps a single-partition log per topic and committed offsets per
//! (group, topic), and hands out sessions implementing the client traits.

#![allow(dead_code)]

use kafka::{
    ConsumeSession, Delivery, KafkaError, Message, OffsetReset, PendingDelivery, ProduceSession,
    Record, Result,
};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, Vec<Vec<u8>>>,
    committed: HashMap<(String, String), usize>,
    poll_errors: VecDeque<String>,
}

#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record and returns its offset.
    pub fn append(&self, topic: &str, payload: impl Into<Vec<u8>>) -> i64 {
        let mut state = self.state.lock().unwrap();
        let log = state.topics.entry(topic.to_string()).or_default();
        log.push(payload.into());
        (log.len() - 1) as i64
    }

    pub fn records(&self, topic: &str) -> Vec<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state.topics.get(topic).cloned().unwrap_or_default()
    }

    pub fn committed(&self, group: &str, topic: &str) -> Option<usize> {
        let state = self.state.lock().unwrap();
        state
            .committed
            .get(&(group.to_string(), topic.to_string()))
            .copied()
    }

    /// Makes the next poll of any consumer return a broker error.
    pub fn fail_next_poll(&self, detail: &str) {
        let mut state = self.state.lock().unwrap();
        state.poll_errors.push_back(detail.to_string());
    }

    pub fn producer(&self, behavior: AckBehavior) -> MemoryProducer {
        MemoryProducer {
            broker: self.clone(),
            behavior,
        }
    }

    pub fn consumer(&self, group: &str, reset: OffsetReset) -> MemoryConsumer {
        MemoryConsumer {
            broker: self.clone(),
            group: group.to_string(),
            reset,
            topic: None,
            position: 0,
            fail_subscribe: false,
            fail_close: None,
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// How a [`MemoryProducer`] answers a submitted message.
#[derive(Clone)]
pub enum AckBehavior {
    /// Append to the log and acknowledge.
    Acknowledge,
    /// Accept the message but never report delivery.
    Silent,
    /// Refuse the message at submission.
    Reject(String),
    /// Report a broker delivery error.
    Fail(String),
}

pub struct MemoryProducer {
    broker: MemoryBroker,
    behavior: AckBehavior,
}

impl ProduceSession for MemoryProducer {
    fn submit(&self, message: &Message) -> Result<PendingDelivery> {
        match &self.behavior {
            AckBehavior::Acknowledge => {
                let offset = self.broker.append(&message.topic, message.payload.clone());
                Ok(Box::pin(async move {
                    Ok::<_, KafkaError>(Delivery {
                        partition: 0,
                        offset,
                    })
                }))
            }
            AckBehavior::Silent => Ok(Box::pin(std::future::pending::<Result<Delivery>>())),
            AckBehavior::Reject(detail) => Err(KafkaError::Other(detail.clone())),
            AckBehavior::Fail(detail) => {
                let detail = detail.clone();
                Ok(Box::pin(async move { Err::<Delivery, _>(KafkaError::Other(detail)) }))
            }
        }
    }
}

pub struct MemoryConsumer {
    broker: MemoryBroker,
    group: String,
    reset: OffsetReset,
    topic: Option<String>,
    position: usize,
    fail_subscribe: bool,
    fail_close: Option<String>,
    closes: Arc<AtomicUsize>,
}

impl MemoryConsumer {
    pub fn failing_subscribe(mut self) -> Self {
        self.fail_subscribe = true;
        self
    }

    /// Makes `close` fail without committing.
    pub fn failing_close(mut self, detail: &str) -> Self {
        self.fail_close = Some(detail.to_string());
        self
    }

    /// Counter of `close` calls, readable after the consumer moved away.
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }

    fn next_record(&mut self) -> Option<Record> {
        let mut state = self.broker.state.lock().unwrap();
        if let Some(detail) = state.poll_errors.pop_front() {
            return Some(Record::Error(detail));
        }

        let topic = self.topic.as_ref()?;
        let payload = state.topics.get(topic)?.get(self.position)?.clone();
        let record = Record::Message {
            topic: topic.clone(),
            partition: 0,
            offset: self.position as i64,
            payload,
        };
        self.position += 1;
        Some(record)
    }
}

impl ConsumeSession for MemoryConsumer {
    fn subscribe(&mut self, topic: &str) -> Result<()> {
        if self.fail_subscribe {
            return Err(KafkaError::Other("Broker: Unknown topic or partition".to_string()));
        }

        let state = self.broker.state.lock().unwrap();
        let committed = state
            .committed
            .get(&(self.group.clone(), topic.to_string()))
            .copied();
        self.position = committed.unwrap_or_else(|| match self.reset {
            OffsetReset::Earliest => 0,
            OffsetReset::Latest => state.topics.get(topic).map_or(0, Vec::len),
        });
        self.topic = Some(topic.to_string());
        Ok(())
    }

    fn poll(&mut self, wait: Duration) -> impl Future<Output = Option<Record>> + Send + '_ {
        async move {
            if let Some(record) = self.next_record() {
                return Some(record);
            }
            tokio::time::sleep(wait).await;
            self.next_record()
        }
    }

    fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if let Some(detail) = &self.fail_close {
            return Err(KafkaError::Other(detail.clone()));
        }
        if let Some(topic) = self.topic.take() {
            let mut state = self.broker.state.lock().unwrap();
            state.committed.insert((self.group.clone(), topic), self.position);
        }
        Ok(())
    }
}

/// Cloneable output sink shared between a running subscriber and the test.
#[derive(Clone, Default)]
pub struct SharedOutput {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl SharedOutput {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock().unwrap()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.text().lines().map(str::to_string).collect()
    }

    /// Waits until `predicate` holds for the output, panicking after 5 seconds.
    pub async fn wait_until(&self, predicate: impl Fn(&str) -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !predicate(&self.text()) {
            if tokio::time::Instant::now() > deadline {
                panic!("timed out waiting for output, got:\n{}", self.text());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Write for SharedOutput {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
