//! In-memory stand-ins for the broker clients
//!
//! `MemoryBroker` is a single-partition topic log shared by any number of
//! `MemoryProducer` and `MemoryConsumer` handles. Faults can be queued up
//! front so tests can drive the error paths without a live cluster.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use crate::kafka::consumer::PollClient;
use crate::kafka::error::ClientError;
use crate::kafka::message::RawMessage;
use crate::kafka::producer::{OutboundRecord, ProduceClient};

#[derive(Default)]
struct BrokerState {
    log: Vec<RawMessage>,
    rejections: VecDeque<String>,
    poll_faults: VecDeque<String>,
    stalled: i32,
    polls: usize,
    closed_consumers: usize,
}

/// Shared single-partition log
#[derive(Clone)]
pub struct MemoryBroker {
    topic: String,
    state: Arc<Mutex<BrokerState>>,
    arrived: Arc<Condvar>,
}

impl MemoryBroker {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            state: Arc::new(Mutex::new(BrokerState::default())),
            arrived: Arc::new(Condvar::new()),
        }
    }

    pub fn producer(&self) -> MemoryProducer {
        MemoryProducer {
            broker: self.clone(),
        }
    }

    /// Consumer reading from the start of the log
    pub fn consumer(&self) -> MemoryConsumer {
        MemoryConsumer {
            broker: self.clone(),
            cursor: 0,
        }
    }

    /// Append a record directly, bypassing any producer faults
    pub fn publish(&self, key: &str, value: &[u8]) -> i64 {
        self.append(
            Some(Bytes::copy_from_slice(key.as_bytes())),
            Some(Bytes::copy_from_slice(value)),
            Vec::new(),
        )
    }

    pub fn messages(&self) -> Vec<RawMessage> {
        self.state.lock().log.clone()
    }

    /// Fail the next `send` with `reason`
    pub fn reject_next(&self, reason: &str) {
        self.state.lock().rejections.push_back(reason.to_string());
    }

    /// Fail the next `count` polls with `reason`
    pub fn fail_next_polls(&self, count: usize, reason: &str) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state.poll_faults.push_back(reason.to_string());
        }
        drop(state);
        self.arrived.notify_all();
    }

    /// Keep `pending` records in flight so every flush times out
    pub fn stall_flush(&self, pending: i32) {
        self.state.lock().stalled = pending;
    }

    /// Total `poll` calls made by all consumers
    pub fn polls(&self) -> usize {
        self.state.lock().polls
    }

    pub fn closed_consumers(&self) -> usize {
        self.state.lock().closed_consumers
    }

    fn append(
        &self,
        key: Option<Bytes>,
        value: Option<Bytes>,
        headers: Vec<(String, Option<Bytes>)>,
    ) -> i64 {
        let mut state = self.state.lock();
        let offset = state.log.len() as i64;
        let mut message = RawMessage::new(self.topic.clone(), key, value);
        message.partition = 0;
        message.offset = offset;
        message.timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|elapsed| elapsed.as_millis() as i64);
        message.headers = headers;
        state.log.push(message);
        drop(state);
        self.arrived.notify_all();
        offset
    }
}

/// Producer handle appending to a `MemoryBroker`
pub struct MemoryProducer {
    broker: MemoryBroker,
}

#[async_trait]
impl ProduceClient for MemoryProducer {
    async fn send(
        &self,
        record: OutboundRecord<'_>,
        _queue_timeout: Duration,
    ) -> Result<(i32, i64), ClientError> {
        if let Some(reason) = self.broker.state.lock().rejections.pop_front() {
            return Err(ClientError::new(reason));
        }

        let headers = record
            .headers
            .iter()
            .map(|&(key, value)| (key.to_string(), Some(Bytes::copy_from_slice(value))))
            .collect();
        let offset = self.broker.append(
            Some(Bytes::copy_from_slice(record.key)),
            Some(Bytes::copy_from_slice(record.payload)),
            headers,
        );
        Ok((0, offset))
    }

    fn flush(&self, timeout: Duration) -> Result<(), ClientError> {
        if self.broker.state.lock().stalled > 0 {
            std::thread::sleep(timeout);
            return Err(ClientError::new("Local: Timed out"));
        }
        Ok(())
    }

    fn in_flight_count(&self) -> i32 {
        self.broker.state.lock().stalled
    }
}

/// Consumer handle with its own read position
pub struct MemoryConsumer {
    broker: MemoryBroker,
    cursor: usize,
}

impl PollClient for MemoryConsumer {
    fn poll(&mut self, timeout: Duration) -> Option<Result<RawMessage, ClientError>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.broker.state.lock();
        state.polls += 1;

        loop {
            if let Some(reason) = state.poll_faults.pop_front() {
                return Some(Err(ClientError::new(reason)));
            }
            if let Some(message) = state.log.get(self.cursor) {
                self.cursor += 1;
                return Some(Ok(message.clone()));
            }
            if Instant::now() >= deadline {
                return None;
            }
            self.broker.arrived.wait_until(&mut state, deadline);
        }
    }

    fn close(&mut self) {
        self.broker.state.lock().closed_consumers += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_assigns_sequential_offsets() {
        let broker = MemoryBroker::new("events");
        assert_eq!(broker.publish("a", b"1"), 0);
        assert_eq!(broker.publish("b", b"2"), 1);

        let log = broker.messages();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].offset, 1);
        assert_eq!(log[1].partition, 0);
        assert_eq!(log[1].topic, "events");
    }

    #[test]
    fn test_consumer_reads_in_order_then_times_out() {
        let broker = MemoryBroker::new("events");
        broker.publish("a", b"1");
        broker.publish("b", b"2");

        let mut consumer = broker.consumer();
        let first = consumer.poll(Duration::ZERO).unwrap().unwrap();
        let second = consumer.poll(Duration::ZERO).unwrap().unwrap();
        assert_eq!(first.offset, 0);
        assert_eq!(second.offset, 1);
        assert!(consumer.poll(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_poll_faults_come_before_records() {
        let broker = MemoryBroker::new("events");
        broker.publish("a", b"1");
        broker.fail_next_polls(1, "Broker: Not coordinator");

        let mut consumer = broker.consumer();
        let err = consumer.poll(Duration::ZERO).unwrap().unwrap_err();
        assert_eq!(err.to_string(), "Broker: Not coordinator");
        assert!(consumer.poll(Duration::ZERO).unwrap().is_ok());
    }

    #[test]
    fn test_poll_wakes_on_publish() {
        let broker = MemoryBroker::new("events");
        let mut consumer = broker.consumer();

        let publisher = broker.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            publisher.publish("late", b"x");
        });

        let message = consumer.poll(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(message.key_str().as_deref(), Some("late"));
        handle.join().unwrap();
    }
}
