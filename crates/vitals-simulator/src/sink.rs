//! Broker delivery path.
//!
//! [`RecordSink`] is the seam between the publish loop and the broker client:
//! `send` only enqueues, `flush` is the synchronous barrier that waits for
//! everything enqueued so far to be acknowledged or to fail.

use crate::config::Config;
use crate::error::{Result, SimulatorError};
use rdkafka::client::ClientContext;
use rdkafka::message::Message;
use rdkafka::producer::{BaseRecord, DeliveryResult, Producer, ProducerContext, ThreadedProducer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Destination for serialized records.
pub trait RecordSink {
    /// Enqueues a value-only message for asynchronous delivery.
    fn send(&mut self, topic: &str, payload: &[u8]) -> Result<()>;

    /// Blocks until every enqueued message has been acknowledged or has failed.
    fn flush(&mut self, timeout: Duration) -> Result<()>;
}

/// Delivery outcomes reported by the broker client.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    pub delivered: AtomicU64,
    pub failed: AtomicU64,
}

impl DeliveryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Producer context that counts delivery reports.
///
/// Runs on the producer's background polling thread.
pub struct DeliveryTracker {
    stats: Arc<DeliveryStats>,
}

impl ClientContext for DeliveryTracker {}

impl ProducerContext for DeliveryTracker {
    type DeliveryOpaque = ();

    fn delivery(&self, result: &DeliveryResult<'_>, _opaque: Self::DeliveryOpaque) {
        match result {
            Ok(_) => self.stats.record_delivered(),
            Err((err, message)) => {
                self.stats.record_failed();
                warn!(
                    topic = message.topic(),
                    partition = message.partition(),
                    error = %err,
                    "Message delivery failed"
                );
            }
        }
    }
}

/// How long `flush` waits for delivery callbacks still running on the
/// polling thread after the client reports an empty queue.
const REPORT_SETTLE: Duration = Duration::from_millis(500);

/// Kafka-backed sink.
pub struct KafkaSink {
    producer: ThreadedProducer<DeliveryTracker>,
    stats: Arc<DeliveryStats>,
    sent_since_flush: u64,
}

impl KafkaSink {
    /// Creates the producer and fetches topic metadata, so an unreachable
    /// broker or rejected credentials fail here rather than at the first flush.
    pub fn new(config: &Config) -> Result<Self> {
        let sink = Self::create(config)?;

        sink.producer
            .client()
            .fetch_metadata(Some(config.topic.as_str()), config.connect_timeout)?;

        info!(
            "Connected to Kafka at {} ({})",
            config.bootstrap_servers, config.security_protocol
        );

        Ok(sink)
    }

    /// Creates the producer without contacting the broker.
    pub(crate) fn create(config: &Config) -> Result<Self> {
        let stats = Arc::new(DeliveryStats::new());
        let context = DeliveryTracker {
            stats: Arc::clone(&stats),
        };

        let producer: ThreadedProducer<DeliveryTracker> =
            config.client_config().create_with_context(context)?;

        Ok(Self {
            producer,
            stats,
            sent_since_flush: 0,
        })
    }

    pub fn stats(&self) -> Arc<DeliveryStats> {
        Arc::clone(&self.stats)
    }

    fn in_flight(&self) -> usize {
        self.producer.in_flight_count().max(0) as usize
    }
}

impl RecordSink for KafkaSink {
    fn send(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        self.producer
            .send(BaseRecord::<(), [u8]>::to(topic).payload(payload))
            .map_err(|(source, _)| SimulatorError::Enqueue {
                topic: topic.to_string(),
                source,
            })?;
        self.sent_since_flush += 1;
        Ok(())
    }

    /// Fails when the barrier times out, or when every message sent since the
    /// previous flush was reported as undelivered.
    fn flush(&mut self, timeout: Duration) -> Result<()> {
        let delivered_before = self.stats.delivered();
        let failed_before = self.stats.failed();
        let sent = std::mem::take(&mut self.sent_since_flush);

        self.producer
            .flush(timeout)
            .map_err(|e| SimulatorError::Flush {
                pending: self.in_flight(),
                reason: e.to_string(),
            })?;

        // The queue drains before the last callback has finished counting.
        let settle_by = Instant::now() + REPORT_SETTLE;
        let (delivered, failed) = loop {
            let delivered = self.stats.delivered() - delivered_before;
            let failed = self.stats.failed() - failed_before;
            if delivered + failed >= sent || Instant::now() >= settle_by {
                break (delivered, failed);
            }
            std::thread::sleep(Duration::from_millis(1));
        };

        if failed > 0 && delivered == 0 {
            return Err(SimulatorError::Flush {
                pending: 0,
                reason: format!("all {} message(s) since the previous flush failed delivery", failed),
            });
        }
        if failed > 0 {
            warn!("{} message(s) failed delivery since the previous flush", failed);
        }
        debug!(
            delivered = self.stats.delivered(),
            failed = self.stats.failed(),
            "Flush complete"
        );
        Ok(())
    }
}

/// A message accepted by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// In-process sink that keeps every message. Used by tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    sent: Vec<SentMessage>,
    pending: usize,
    flushes: u64,
    fail_flush_on: Option<u64>,
    flush_delay: Duration,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink whose `n`th flush (1-based) fails.
    pub fn failing_flush(n: u64) -> Self {
        Self {
            fail_flush_on: Some(n),
            ..Self::default()
        }
    }

    /// Makes every flush block the calling thread for `delay`, like a slow broker.
    pub fn with_flush_delay(mut self, delay: Duration) -> Self {
        self.flush_delay = delay;
        self
    }

    pub fn sent(&self) -> &[SentMessage] {
        &self.sent
    }

    /// Number of flush calls made so far, including a failed one.
    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    /// Messages sent since the last successful flush.
    pub fn pending(&self) -> usize {
        self.pending
    }
}

impl RecordSink for MemorySink {
    fn send(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        self.sent.push(SentMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
        self.pending += 1;
        Ok(())
    }

    fn flush(&mut self, _timeout: Duration) -> Result<()> {
        if !self.flush_delay.is_zero() {
            std::thread::sleep(self.flush_delay);
        }
        self.flushes += 1;
        if self.fail_flush_on == Some(self.flushes) {
            return Err(SimulatorError::Flush {
                pending: self.pending,
                reason: "simulated broker failure".to_string(),
            });
        }
        self.pending = 0;
        Ok(())
    }
}
