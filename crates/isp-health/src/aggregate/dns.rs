use serde_json::{Map, Value, json};

use super::{Measurement, mean, round2};
use crate::probe::ServerSamples;
use crate::sensor::{SensorStatus, SensorValue};

#[derive(Debug, Clone, PartialEq)]
pub struct ServerSummary {
    pub attempts: usize,
    pub successes: usize,

    /// Percent of queries answered
    pub success_rate: f64,
    pub avg_ms: Option<f64>,
}

impl ServerSummary {
    pub fn from_samples(samples: &ServerSamples) -> Self {
        let times: Vec<f64> = samples
            .successes()
            .iter()
            .map(|elapsed| elapsed.as_secs_f64() * 1000.0)
            .collect();
        let attempts = samples.attempts.len();
        let success_rate =
            if attempts == 0 { 0.0 } else { times.len() as f64 / attempts as f64 * 100.0 };
        Self { attempts, successes: times.len(), success_rate, avg_ms: mean(&times) }
    }
}

/// Mean success rate across servers; silent servers count as 0%
pub fn reliability(results: &[ServerSamples]) -> Measurement {
    let mut servers = Map::new();
    let mut rates = Vec::with_capacity(results.len());
    let mut failures = Vec::new();

    for samples in results {
        let summary = ServerSummary::from_samples(samples);
        rates.push(summary.success_rate);
        if let Some(error) = samples.last_error() {
            failures.push(format!("{}: {error}", samples.server.label));
        }
        servers.insert(
            samples.server.label.clone(),
            json!({
                "address": samples.server.address,
                "queries": summary.attempts,
                "successes": summary.successes,
                "success_rate": round2(summary.success_rate),
                "avg_response_ms": summary.avg_ms.map(round2),
                "last_error": samples.last_error().map(|error| error.to_string()),
            }),
        );
    }

    let Some(state) = mean(&rates) else {
        return Measurement::failed("resource_unavailable", "no DNS servers configured");
    };

    let answering = rates.iter().filter(|rate| **rate > 0.0).count();
    let status = SensorStatus::from_counts(answering, rates.len());
    let mut measurement = Measurement::new(SensorValue::Number(round2(state)), status)
        .with("servers", Value::Object(servers));

    if !failures.is_empty() {
        measurement = measurement.with(super::ERROR_KEY, failures.join("; "));
    }
    if status == SensorStatus::Error {
        let kind = results
            .iter()
            .find_map(|samples| samples.last_error())
            .map_or("timeout", |error| error.kind());
        measurement = measurement.with(super::ERROR_KIND_KEY, kind);
    }
    measurement
}
