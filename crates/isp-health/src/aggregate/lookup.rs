//! Single-shot lookups: public identity, DNS configuration, throughput.

use std::time::Duration;

use serde_json::{Value, json};

use super::{Measurement, round2};
use crate::error::{IdentityError, ProbeError};
use crate::identity::IdentityRecord;
use crate::probe::{DetectedDns, ThroughputSample};
use crate::sensor::{SensorStatus, SensorValue};

/// Public IP as state, canonical identity fields as attributes
///
/// When every provider fails the previous identity is kept, marked stale.
pub fn identity(result: Result<IdentityRecord, IdentityError>) -> Measurement {
    match result {
        Ok(record) => {
            let mut measurement = Measurement::new(SensorValue::Text(record.ip.clone()), SensorStatus::Ok);
            measurement.attributes.extend(record.to_attributes());
            measurement
        }
        Err(error) => {
            let failures: Vec<Value> = error
                .failures()
                .iter()
                .map(|failure| json!({ "provider": failure.provider, "reason": failure.reason.to_string() }))
                .collect();
            Measurement::failed("provider_exhausted", error.to_string())
                .with("failures", failures)
                .carrying_forward()
        }
    }
}

/// Primary upstream resolver as state; status reflects whether it resolves
pub fn dns_config(detected: &DetectedDns, resolution: Result<Duration, ProbeError>) -> Measurement {
    let primary = detected.primary().map(str::to_string);
    let state = primary.clone().map_or(SensorValue::Unknown, SensorValue::Text);

    let measurement = match &resolution {
        Ok(_) => Measurement::new(state, SensorStatus::Ok),
        Err(error) => Measurement::new(state, SensorStatus::Error)
            .with(super::ERROR_KEY, format!("DNS resolution failed: {error}"))
            .with(super::ERROR_KIND_KEY, error.kind()),
    };

    measurement
        .with("primary_dns", primary)
        .with("secondary_dns", detected.secondary().map(str::to_string))
        .with("all_dns_servers", detected.servers.clone())
        .with("source", detected.source.clone())
        .with(
            "resolution_ms",
            resolution.ok().map(|elapsed| round2(elapsed.as_secs_f64() * 1000.0)),
        )
}

/// Download rate as state; a failed test keeps the previous result, marked stale
pub fn throughput(result: Result<ThroughputSample, ProbeError>) -> Measurement {
    match result {
        Ok(sample) => Measurement::new(SensorValue::Number(round2(sample.download_mbps)), SensorStatus::Ok)
            .with("download_mbps", round2(sample.download_mbps))
            .with("upload_mbps", round2(sample.upload_mbps))
            .with("latency_ms", round2(sample.latency_ms))
            .with("server", serde_json::to_value(&sample.server).unwrap_or(Value::Null)),
        Err(error) => Measurement::from_error(&error).carrying_forward(),
    }
}
