//! Synthetic patient vital-sign generator.
//!
//! Produces one randomized vitals reading per simulated patient at a fixed
//! cadence and publishes each reading as a JSON message to a Kafka topic.
//!
//! # Pipeline
//! - [`VitalsGenerator`] draws every field independently from its range
//! - [`Publisher`] serializes each record, enqueues it on a [`RecordSink`]
//!   and issues a flush barrier after every full pass over the roster
//! - [`KafkaSink`] is the production sink, [`MemorySink`] keeps messages
//!   in memory for tests
//!
//! # Usage
//! ```bash
//! KAFKA_BOOTSTRAP_SERVERS=localhost:9092 SECURITY_PROTOCOL=PLAINTEXT vitals-simulator
//! ```

pub mod config;
pub mod error;
pub mod publisher;
pub mod sink;
pub mod vitals;
pub mod ward;

pub use config::{Config, SecurityProtocol};
pub use error::{Result, SimulatorError};
pub use publisher::{CycleReport, PublishStats, Publisher};
pub use sink::{KafkaSink, MemorySink, RecordSink};
pub use vitals::{VitalsGenerator, VitalsRecord};
pub use ward::patient_ids;
