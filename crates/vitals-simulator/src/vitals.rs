//! Vital-sign record generator.
//!
//! Every field is drawn independently and uniformly from its range on each
//! call. No continuity between successive readings of the same patient is
//! modelled.

use crate::error::Result;
use chrono::{DateTime, Utc};
use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Body temperature range in degrees Celsius.
pub const BODY_TEMPERATURE_C: RangeInclusive<f64> = 36.0..=40.0;
/// Heart rate range in beats per minute.
pub const HEART_RATE_BPM: RangeInclusive<u32> = 60..=120;
/// Systolic blood pressure range in mmHg.
pub const SYSTOLIC_MMHG: RangeInclusive<u32> = 90..=160;
/// Diastolic blood pressure range in mmHg.
pub const DIASTOLIC_MMHG: RangeInclusive<u32> = 60..=100;
/// Respiratory rate range in breaths per minute.
pub const RESPIRATORY_RATE_BPM: RangeInclusive<u32> = 12..=20;
/// Oxygen saturation range in percent.
pub const OXYGEN_SATURATION_PCT: RangeInclusive<u32> = 95..=100;
/// Blood glucose range in mg/dL.
pub const BLOOD_GLUCOSE_MG_DL: RangeInclusive<u32> = 70..=140;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// One simulated reading for a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalsRecord {
    pub patient_id: String,

    /// ISO-8601 UTC instant with a trailing `Z`
    pub timestamp: String,

    /// Celsius, one fractional digit
    pub body_temperature: f64,

    pub heart_rate: u32,
    pub systolic_blood_pressure: u32,
    pub diastolic_blood_pressure: u32,
    pub respiratory_rate: u32,
    pub oxygen_saturation: u32,
    pub blood_glucose: u32,
}

impl VitalsRecord {
    /// Serializes the record as a UTF-8 JSON object.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a record from its JSON encoding.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Generates vitals records from an injectable random source.
pub struct VitalsGenerator<R = StdRng> {
    rng: R,
    last_timestamp: Option<DateTime<Utc>>,
}

impl VitalsGenerator<StdRng> {
    /// Creates a deterministic generator from a seed.
    pub fn new(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    /// Creates a generator seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl<R: Rng> VitalsGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            last_timestamp: None,
        }
    }

    /// Generates one reading for `patient_id`, stamped with the current UTC time.
    pub fn generate(&mut self, patient_id: &str) -> VitalsRecord {
        let timestamp = self.next_timestamp().format(TIMESTAMP_FORMAT).to_string();

        let body_temperature = round_one_decimal(self.rng.gen_range(BODY_TEMPERATURE_C));

        VitalsRecord {
            patient_id: patient_id.to_string(),
            timestamp,
            body_temperature,
            heart_rate: self.rng.gen_range(HEART_RATE_BPM),
            systolic_blood_pressure: self.rng.gen_range(SYSTOLIC_MMHG),
            diastolic_blood_pressure: self.rng.gen_range(DIASTOLIC_MMHG),
            respiratory_rate: self.rng.gen_range(RESPIRATORY_RATE_BPM),
            oxygen_saturation: self.rng.gen_range(OXYGEN_SATURATION_PCT),
            blood_glucose: self.rng.gen_range(BLOOD_GLUCOSE_MG_DL),
        }
    }

    /// Wall-clock now, never earlier than the previous stamp.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_timestamp = Some(stamp);
        stamp
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
