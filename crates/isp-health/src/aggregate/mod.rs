//! Reducers from raw probe samples to sensor readings.
//!
//! Every reducer is a pure function returning a [`Measurement`]; the store
//! turns it into a timestamped [`SensorReading`], merging in the previous
//! reading when a failed run asks to carry it forward.

mod dns;
mod lookup;
mod route;
mod rtt;

pub use dns::{ServerSummary, reliability};
pub use lookup::{dns_config, identity, throughput};
pub use route::{HopDetail, RouteHistory, RouteStability, TargetWindow, route_stability, stability};
pub use rtt::{RttSummary, jitter, jitter_ms, latency, loss_pct, packet_loss, summarize};

use serde_json::Value;

use crate::error::ProbeError;
use crate::sensor::{Attributes, SensorReading, SensorStatus, SensorType, SensorValue};

/// Attribute keys present on every reading
pub const ERROR_KEY: &str = "error";
pub const ERROR_KIND_KEY: &str = "error_kind";
pub const STALE_KEY: &str = "stale";

/// Outcome of one run, before it is timestamped and stored
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub state: SensorValue,
    pub attributes: Attributes,
    pub status: SensorStatus,

    /// On error, keep the previous reading's state and attributes (marked stale)
    pub carry_forward: bool,
}

impl Measurement {
    pub fn new(state: SensorValue, status: SensorStatus) -> Self {
        Self { state, attributes: Attributes::new(), status, carry_forward: false }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Total failure with a stable error label
    pub fn failed(kind: &str, message: impl Into<String>) -> Self {
        Measurement::new(SensorValue::Unknown, SensorStatus::Error)
            .with(ERROR_KEY, message.into())
            .with(ERROR_KIND_KEY, kind)
    }

    pub fn from_error(error: &ProbeError) -> Self {
        Measurement::failed(error.kind(), error.to_string())
    }

    pub fn carrying_forward(mut self) -> Self {
        self.carry_forward = true;
        self
    }

    /// Timestamp the measurement, filling the keys every reading carries
    pub fn into_reading(self, sensor: SensorType, previous: Option<&SensorReading>) -> SensorReading {
        let Measurement { mut state, mut attributes, status, carry_forward } = self;

        let previous = previous.filter(|_| carry_forward && status == SensorStatus::Error);
        let stale = match previous {
            Some(previous) => {
                let mut merged = previous.attributes.clone();
                merged.extend(attributes);
                attributes = merged;
                if state == SensorValue::Unknown {
                    state = previous.state.clone();
                }
                true
            }
            None => false,
        };

        attributes.entry(ERROR_KEY.to_string()).or_insert(Value::Null);
        attributes.entry(ERROR_KIND_KEY.to_string()).or_insert(Value::Null);
        attributes.insert(STALE_KEY.to_string(), Value::Bool(stale));

        SensorReading::new(sensor, state, attributes, status)
    }
}

/// Round to two decimal places for presentation
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
