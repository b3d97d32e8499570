//! Generate-then-publish loop.

use crate::config::Config;
use crate::error::Result;
use crate::sink::RecordSink;
use crate::vitals::VitalsGenerator;
use rand::rngs::StdRng;
use rand::Rng;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Outcome of a single cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub records: u64,
    pub bytes: u64,
}

/// Totals across every completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishStats {
    pub cycles: u64,
    pub records_sent: u64,
    pub bytes_sent: u64,
}

impl PublishStats {
    fn record_cycle(&mut self, report: &CycleReport) {
        self.cycles += 1;
        self.records_sent += report.records;
        self.bytes_sent += report.bytes;
    }
}

/// Owns the sink and drives one record per patient per cycle into it.
pub struct Publisher<S, R = StdRng> {
    sink: S,
    generator: VitalsGenerator<R>,
    patients: Vec<String>,
    topic: String,
    interval: Duration,
    flush_timeout: Duration,
    stats: PublishStats,
}

impl<S: RecordSink, R: Rng> Publisher<S, R> {
    pub fn new(config: &Config, sink: S, generator: VitalsGenerator<R>) -> Self {
        Self {
            sink,
            generator,
            patients: config.patients.clone(),
            topic: config.topic.clone(),
            interval: config.interval,
            flush_timeout: config.flush_timeout,
            stats: PublishStats::default(),
        }
    }

    /// Runs one cycle: generate, serialize and enqueue one record per
    /// patient in roster order, then flush.
    pub fn run_cycle(&mut self) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        for patient_id in &self.patients {
            let record = self.generator.generate(patient_id);
            info!(?record, "Sending vitals");

            let payload = record.to_json_bytes()?;
            self.sink.send(&self.topic, &payload)?;

            report.records += 1;
            report.bytes += payload.len() as u64;
        }

        self.sink.flush(self.flush_timeout)?;
        self.stats.record_cycle(&report);

        Ok(report)
    }

    /// Publishes until `shutdown` is cancelled. The first failed cycle ends
    /// the run with its error.
    ///
    /// Cycles block on the flush barrier and run under
    /// [`tokio::task::block_in_place`], so this needs the multi-threaded runtime.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<PublishStats> {
        self.run_until(&shutdown, None).await
    }

    /// Publishes at most `cycles` cycles, stopping early on cancellation.
    pub async fn run_cycles(
        &mut self,
        cycles: u64,
        shutdown: CancellationToken,
    ) -> Result<PublishStats> {
        self.run_until(&shutdown, Some(cycles)).await
    }

    async fn run_until(
        &mut self,
        shutdown: &CancellationToken,
        max_cycles: Option<u64>,
    ) -> Result<PublishStats> {
        info!(
            "Publishing vitals for {} patients to '{}' every {:?}",
            self.patients.len(),
            self.topic,
            self.interval
        );

        let start = Instant::now();
        let limit_reached = |stats: &PublishStats| max_cycles.is_some_and(|max| stats.cycles >= max);

        while !shutdown.is_cancelled() && !limit_reached(&self.stats) {
            let report = tokio::task::block_in_place(|| self.run_cycle())?;
            debug!(
                cycle = self.stats.cycles,
                records = report.records,
                bytes = report.bytes,
                "Cycle flushed"
            );

            if limit_reached(&self.stats) {
                break;
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        // Final barrier so shutdown never leaves enqueued messages behind.
        tokio::task::block_in_place(|| self.sink.flush(self.flush_timeout))?;

        info!(
            "Publisher stopped after {} cycles ({} records, {} bytes) in {:?}",
            self.stats.cycles,
            self.stats.records_sent,
            self.stats.bytes_sent,
            start.elapsed()
        );

        Ok(self.stats.clone())
    }

    pub fn stats(&self) -> &PublishStats {
        &self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
